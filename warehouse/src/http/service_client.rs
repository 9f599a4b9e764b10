use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Response;
use reqwest_middleware::{ClientWithMiddleware as Client, RequestBuilder};

use token_source::TokenSource;

use crate::http::dataset::list::ListDatasetsResponse;
use crate::http::dataset::Dataset;
use crate::http::error::{Error, ErrorWrapper};
use crate::http::job::get_query_results::{GetQueryResultsRequest, GetQueryResultsResponse};
use crate::http::job::query::{QueryRequest, QueryResponse};
use crate::http::job::Job;
use crate::http::table::list::ListTablesResponse;
use crate::http::table::Table;
use crate::http::tabledata::insert_all::{InsertAllRequest, InsertAllResponse};
use crate::http::{dataset, job, table, tabledata};
use crate::service::WarehouseService;

pub const SCOPES: [&str; 4] = [
    "https://www.googleapis.com/auth/bigquery",
    "https://www.googleapis.com/auth/bigquery.insertdata",
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/devstorage.read_only",
];

/// REST transport for the warehouse v2 API.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    ts: Arc<dyn TokenSource>,
    endpoint: String,
    http: Client,
    debug: bool,
}

impl ServiceClient {
    pub fn new(ts: Arc<dyn TokenSource>, endpoint: &str, http: Client, debug: bool) -> Self {
        Self {
            ts,
            endpoint: format!("{endpoint}/bigquery/v2"),
            http,
            debug,
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    async fn with_headers(&self, builder: RequestBuilder) -> Result<RequestBuilder, Error> {
        let token = self.ts.token().await.map_err(Error::TokenSource)?;
        Ok(builder
            .header("X-Goog-Api-Client", "rust")
            .header(reqwest::header::USER_AGENT, "gcloud-warehouse")
            .header(reqwest::header::AUTHORIZATION, token))
    }

    pub async fn send<T>(&self, builder: RequestBuilder) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let request = self.with_headers(builder).await?;
        let response = request.send().await?;
        let response = Self::check_response_status(response).await?;
        if self.debug {
            let text = response.text().await?;
            tracing::info!("{}", text);
            Ok(serde_json::from_str(text.as_str())?)
        } else {
            Ok(response.json().await?)
        }
    }

    pub async fn send_get_empty(&self, builder: RequestBuilder) -> Result<(), Error> {
        let builder = self.with_headers(builder).await?;
        let response = builder.send().await?;
        Self::check_response_status(response).await?;
        Ok(())
    }

    /// Checks whether an HTTP response is successful and returns it, or returns an error.
    async fn check_response_status(response: Response) -> Result<Response, Error> {
        // Check the status code, returning the response if it is not an error.
        let error = match response.error_for_status_ref() {
            Ok(_) => return Ok(response),
            Err(error) => error,
        };

        // try to extract a response error, falling back to the status error if it can not be parsed.
        Err(response
            .json::<ErrorWrapper>()
            .await
            .map(|wrapper| Error::Response(wrapper.error))
            .unwrap_or(Error::HttpClient(error)))
    }
}

#[async_trait]
impl WarehouseService for ServiceClient {
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn insert_dataset(&self, metadata: &Dataset) -> Result<Dataset, Error> {
        let builder = dataset::insert::build(self.endpoint(), self.http(), metadata);
        self.send(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn get_dataset(&self, project_id: &str, dataset_id: &str) -> Result<Dataset, Error> {
        let builder = dataset::get::build(self.endpoint(), self.http(), project_id, dataset_id);
        self.send(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn list_datasets(&self, project_id: &str, page_token: Option<&str>) -> Result<ListDatasetsResponse, Error> {
        let builder = dataset::list::build(self.endpoint(), self.http(), project_id, page_token);
        self.send(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn patch_dataset(
        &self,
        project_id: &str,
        dataset_id: &str,
        body: &serde_json::Value,
        etag: Option<&str>,
    ) -> Result<Dataset, Error> {
        let builder = dataset::patch::build(self.endpoint(), self.http(), project_id, dataset_id, body, etag);
        self.send(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn delete_dataset(&self, project_id: &str, dataset_id: &str, delete_contents: bool) -> Result<(), Error> {
        let builder = dataset::delete::build(self.endpoint(), self.http(), project_id, dataset_id, delete_contents);
        self.send_get_empty(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn insert_table(&self, metadata: &Table) -> Result<Table, Error> {
        let builder = table::insert::build(self.endpoint(), self.http(), metadata);
        self.send(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn get_table(&self, project_id: &str, dataset_id: &str, table_id: &str) -> Result<Table, Error> {
        let builder = table::get::build(self.endpoint(), self.http(), project_id, dataset_id, table_id);
        self.send(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn list_tables(
        &self,
        project_id: &str,
        dataset_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListTablesResponse, Error> {
        let builder = table::list::build(self.endpoint(), self.http(), project_id, dataset_id, page_token);
        self.send(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn patch_table(
        &self,
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
        body: &serde_json::Value,
        etag: Option<&str>,
    ) -> Result<Table, Error> {
        let builder = table::patch::build(self.endpoint(), self.http(), project_id, dataset_id, table_id, body, etag);
        self.send(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn delete_table(&self, project_id: &str, dataset_id: &str, table_id: &str) -> Result<(), Error> {
        let builder = table::delete::build(self.endpoint(), self.http(), project_id, dataset_id, table_id);
        self.send_get_empty(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn insert_job(&self, metadata: &Job) -> Result<Job, Error> {
        let builder = job::insert::build(self.endpoint(), self.http(), metadata);
        self.send(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn get_job(&self, project_id: &str, job_id: &str, location: Option<&str>) -> Result<Job, Error> {
        let builder = job::get::build(self.endpoint(), self.http(), project_id, job_id, location);
        self.send(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn query(&self, project_id: &str, request: &QueryRequest) -> Result<QueryResponse, Error> {
        let builder = job::query::build(self.endpoint(), self.http(), project_id, request);
        self.send(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn get_query_results(
        &self,
        project_id: &str,
        job_id: &str,
        request: &GetQueryResultsRequest,
    ) -> Result<GetQueryResultsResponse, Error> {
        let builder = job::get_query_results::build(self.endpoint(), self.http(), project_id, job_id, request);
        self.send(builder).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    async fn insert_all(
        &self,
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
        request: &InsertAllRequest<serde_json::Value>,
    ) -> Result<InsertAllResponse, Error> {
        let builder =
            tabledata::insert_all::build(self.endpoint(), self.http(), project_id, dataset_id, table_id, request);
        self.send(builder).await
    }
}

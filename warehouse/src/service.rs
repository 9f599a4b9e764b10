use async_trait::async_trait;

use crate::http::dataset::list::ListDatasetsResponse;
use crate::http::dataset::Dataset;
use crate::http::error::Error;
use crate::http::job::get_query_results::{GetQueryResultsRequest, GetQueryResultsResponse};
use crate::http::job::query::{QueryRequest, QueryResponse};
use crate::http::job::Job;
use crate::http::table::list::ListTablesResponse;
use crate::http::table::Table;
use crate::http::tabledata::insert_all::{InsertAllRequest, InsertAllResponse};

/// The remote surface the managers talk to.
///
/// Every method maps to exactly one REST call of the warehouse v2 API. Implemented by
/// [`ServiceClient`](crate::http::service_client::ServiceClient) for the real service and by
/// [`InMemoryWarehouse`](crate::emulator::InMemoryWarehouse) for hermetic tests.
#[async_trait]
pub trait WarehouseService: std::fmt::Debug + Send + Sync {
    async fn insert_dataset(&self, dataset: &Dataset) -> Result<Dataset, Error>;

    async fn get_dataset(&self, project_id: &str, dataset_id: &str) -> Result<Dataset, Error>;

    async fn list_datasets(&self, project_id: &str, page_token: Option<&str>) -> Result<ListDatasetsResponse, Error>;

    /// `body` only contains the fields to change. When `etag` is set the call fails with 412 if the
    /// dataset changed since it was read.
    async fn patch_dataset(
        &self,
        project_id: &str,
        dataset_id: &str,
        body: &serde_json::Value,
        etag: Option<&str>,
    ) -> Result<Dataset, Error>;

    async fn delete_dataset(&self, project_id: &str, dataset_id: &str, delete_contents: bool) -> Result<(), Error>;

    async fn insert_table(&self, table: &Table) -> Result<Table, Error>;

    async fn get_table(&self, project_id: &str, dataset_id: &str, table_id: &str) -> Result<Table, Error>;

    async fn list_tables(
        &self,
        project_id: &str,
        dataset_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListTablesResponse, Error>;

    async fn patch_table(
        &self,
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
        body: &serde_json::Value,
        etag: Option<&str>,
    ) -> Result<Table, Error>;

    async fn delete_table(&self, project_id: &str, dataset_id: &str, table_id: &str) -> Result<(), Error>;

    async fn insert_job(&self, job: &Job) -> Result<Job, Error>;

    async fn get_job(&self, project_id: &str, job_id: &str, location: Option<&str>) -> Result<Job, Error>;

    async fn query(&self, project_id: &str, request: &QueryRequest) -> Result<QueryResponse, Error>;

    async fn get_query_results(
        &self,
        project_id: &str,
        job_id: &str,
        request: &GetQueryResultsRequest,
    ) -> Result<GetQueryResultsResponse, Error>;

    async fn insert_all(
        &self,
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
        request: &InsertAllRequest<serde_json::Value>,
    ) -> Result<InsertAllResponse, Error>;
}

use reqwest_middleware::{ClientWithMiddleware as Client, RequestBuilder};

use crate::http::dataset::DatasetReference;
use crate::http::job::{ErrorProto, JobReference};
use crate::http::table::TableSchema;
use crate::http::tabledata::Tuple;

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Required. A query string to execute, using Google Standard SQL or legacy SQL syntax.
    /// Example: "SELECT COUNT(f1) FROM myProjectId.myDatasetId.myTableId".
    pub query: String,
    /// Optional. The maximum number of rows of data to return per page of results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<i64>,
    /// Optional. Specifies the default datasetId and projectId to assume for any unqualified table names in the query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dataset: Option<DatasetReference>,
    /// Optional. Specifies the maximum amount of time, in milliseconds,
    /// that the client is willing to wait for the query to complete.
    /// If the query has not yet completed, jobComplete is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,
    /// Optional. If set to true, the service doesn't run the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    /// Specifies whether to use the legacy SQL dialect for this query.
    pub use_legacy_sql: bool,
    /// The geographic location where the job should run.
    pub location: String,
    /// Optional. A unique user provided identifier to ensure idempotent behavior for queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// The resource type.
    #[serde(default)]
    pub kind: String,
    /// The schema of the results. Present only when the query completes successfully.
    #[serde(default)]
    pub schema: Option<TableSchema>,
    /// Reference to the Job that was created to run the query.
    /// This field will be present even if the original request timed out,
    /// in which case jobs.getQueryResults can be used to read the results once the query has completed.
    pub job_reference: JobReference,
    /// The total number of rows in the complete query result set,
    /// which can be more than the number of rows in this single page of results.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    #[serde(serialize_with = "crate::http::to_str_option")]
    pub total_rows: Option<u64>,
    /// A token used for paging results.
    /// A non-empty token indicates that additional results are available.
    #[serde(default)]
    pub page_token: Option<String>,
    /// An object with as many results as can be contained within the maximum permitted reply size.
    #[serde(default)]
    pub rows: Option<Vec<Tuple>>,
    /// Whether the query has completed or not.
    /// If rows or totalRows are present, this will always be true.
    #[serde(default)]
    pub job_complete: bool,
    /// Output only. The first errors or warnings encountered during the running of the job.
    #[serde(default)]
    pub errors: Option<Vec<ErrorProto>>,
}

pub fn build(base_url: &str, client: &Client, project_id: &str, data: &QueryRequest) -> RequestBuilder {
    let url = format!("{}/projects/{}/queries", base_url, project_id);
    client.post(url).json(data)
}

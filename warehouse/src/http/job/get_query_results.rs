use reqwest_middleware::{ClientWithMiddleware as Client, RequestBuilder};

use crate::http::job::{ErrorProto, JobReference};
use crate::http::table::TableSchema;
use crate::http::tabledata::Tuple;

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GetQueryResultsRequest {
    /// Zero-based index of the starting row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<u64>,
    /// Page token, returned by a previous call, to request the next page of results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    /// Maximum number of results to read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<i64>,
    /// Optional: Specifies the maximum amount of time, in milliseconds,
    /// that the client is willing to wait for the query to complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,
    /// The geographic location of the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GetQueryResultsResponse {
    /// The resource type.
    #[serde(default)]
    pub kind: String,
    /// A hash of this response.
    #[serde(default)]
    pub etag: String,
    /// The schema of the results. Present only when the query completes successfully.
    #[serde(default)]
    pub schema: Option<TableSchema>,
    /// Reference to the Job that was created to run the query.
    pub job_reference: JobReference,
    /// The total number of rows in the complete query result set.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    #[serde(serialize_with = "crate::http::to_str_option")]
    pub total_rows: Option<u64>,
    /// A token used for paging results.
    #[serde(default)]
    pub page_token: Option<String>,
    /// An object with as many results as can be contained within the maximum permitted reply size.
    #[serde(default)]
    pub rows: Option<Vec<Tuple>>,
    /// Whether the query has completed or not.
    #[serde(default)]
    pub job_complete: bool,
    /// Output only. The first errors or warnings encountered during the running of the job.
    #[serde(default)]
    pub errors: Option<Vec<ErrorProto>>,
}

pub fn build(
    base_url: &str,
    client: &Client,
    project_id: &str,
    job_id: &str,
    data: &GetQueryResultsRequest,
) -> RequestBuilder {
    let url = format!("{}/projects/{}/queries/{}", base_url, project_id, job_id);
    client.get(url).query(data)
}

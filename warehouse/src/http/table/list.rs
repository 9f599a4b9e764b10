use std::collections::HashMap;

use reqwest_middleware::{ClientWithMiddleware as Client, RequestBuilder};

use crate::http::table::{TableReference, TimePartitioning};

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TableOverview {
    /// An opaque ID of the table.
    #[serde(default)]
    pub id: String,
    /// A reference uniquely identifying table.
    pub table_reference: TableReference,
    /// The user-friendly name for this table.
    #[serde(default)]
    pub friendly_name: Option<String>,
    /// The type of table.
    #[serde(default, rename = "type")]
    pub table_type: String,
    /// The time-based partitioning for this table.
    #[serde(default)]
    pub time_partitioning: Option<TimePartitioning>,
    /// The labels associated with this table.
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    /// The time when this table was created, in milliseconds since the epoch.
    #[serde(default, deserialize_with = "crate::http::from_str_or_default")]
    pub creation_time: i64,
    /// The time when this table expires, in milliseconds since the epoch.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    pub expiration_time: Option<i64>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListTablesResponse {
    /// A hash of this page of results.
    #[serde(default)]
    pub etag: String,
    /// A token to request the next page of results.
    #[serde(default)]
    pub next_page_token: Option<String>,
    /// Tables in the requested dataset.
    #[serde(default)]
    pub tables: Vec<TableOverview>,
    /// The total number of tables in the dataset.
    #[serde(default)]
    pub total_items: Option<i64>,
}

pub fn build(
    base_url: &str,
    client: &Client,
    project_id: &str,
    dataset_id: &str,
    page_token: Option<&str>,
) -> RequestBuilder {
    let url = format!("{}/projects/{}/datasets/{}/tables", base_url, project_id, dataset_id);
    let builder = client.get(url);
    if let Some(page_token) = page_token {
        builder.query(&[("pageToken", page_token)])
    } else {
        builder
    }
}

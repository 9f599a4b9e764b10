use std::collections::HashMap;

use reqwest_middleware::{ClientWithMiddleware as Client, RequestBuilder};

use crate::http::dataset::DatasetReference;

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DatasetOverview {
    /// The fully-qualified, unique, opaque ID of the dataset.
    #[serde(default)]
    pub id: String,
    /// The dataset reference.
    pub dataset_reference: DatasetReference,
    /// The labels associated with this dataset.
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    /// An alternate name for the dataset.
    #[serde(default)]
    pub friendly_name: Option<String>,
    /// The geographic location where the dataset resides.
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListDatasetsResponse {
    /// Output only. A hash value of the results page.
    #[serde(default)]
    pub etag: String,
    /// The dataset resources in the project.
    /// This property is omitted when there are no datasets in the project.
    #[serde(default)]
    pub datasets: Vec<DatasetOverview>,
    /// A token that can be used to request the next results page.
    /// This property is omitted on the final results page.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

pub fn build(base_url: &str, client: &Client, project_id: &str, page_token: Option<&str>) -> RequestBuilder {
    let url = format!("{}/projects/{}/datasets", base_url, project_id);
    let builder = client.get(url);
    if let Some(page_token) = page_token {
        builder.query(&[("pageToken", page_token)])
    } else {
        builder
    }
}

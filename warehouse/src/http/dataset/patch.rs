use reqwest_middleware::{ClientWithMiddleware as Client, RequestBuilder};

/// The body carries only the fields being changed; anything absent is left untouched server side.
pub fn build(
    base_url: &str,
    client: &Client,
    project_id: &str,
    dataset_id: &str,
    body: &serde_json::Value,
    etag: Option<&str>,
) -> RequestBuilder {
    let url = format!("{}/projects/{}/datasets/{}", base_url, project_id, dataset_id);
    let mut builder = client.patch(url);
    if let Some(etag) = etag.filter(|e| !e.is_empty()) {
        builder = builder.header(reqwest::header::IF_MATCH, etag)
    }
    builder.json(body)
}

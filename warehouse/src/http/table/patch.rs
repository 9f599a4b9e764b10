use reqwest_middleware::{ClientWithMiddleware as Client, RequestBuilder};

pub fn build(
    base_url: &str,
    client: &Client,
    project_id: &str,
    dataset_id: &str,
    table_id: &str,
    body: &serde_json::Value,
    etag: Option<&str>,
) -> RequestBuilder {
    let url = format!(
        "{}/projects/{}/datasets/{}/tables/{}",
        base_url, project_id, dataset_id, table_id
    );
    let mut builder = client.patch(url);
    if let Some(etag) = etag.filter(|e| !e.is_empty()) {
        builder = builder.header(reqwest::header::IF_MATCH, etag)
    }
    builder.json(body)
}

use reqwest_middleware::{ClientWithMiddleware as Client, RequestBuilder};

pub fn build(
    base_url: &str,
    client: &Client,
    project_id: &str,
    dataset_id: &str,
    delete_contents: bool,
) -> RequestBuilder {
    let url = format!("{}/projects/{}/datasets/{}", base_url, project_id, dataset_id);
    client.delete(url).query(&[("deleteContents", delete_contents)])
}

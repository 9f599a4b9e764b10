#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gcloud_warehouse::client::Client;
use gcloud_warehouse::emulator::InMemoryWarehouse;
use gcloud_warehouse::location::Location;
use gcloud_warehouse::schema::{Field, FieldType, Schema};

pub const PROJECT: &str = "local-project";

pub fn create_client() -> (Client, Arc<InMemoryWarehouse>) {
    let service = Arc::new(InMemoryWarehouse::new().with_page_size(3));
    let client = Client::from_service(PROJECT, service.clone()).with_job_poll_interval(Duration::from_millis(1));
    (client, service)
}

pub fn people_schema() -> Schema {
    Schema::new(vec![
        Field::new("name", FieldType::String).required(),
        Field::new("age", FieldType::Integer),
    ])
}

/// Creates `dataset_id` in `location` with a `people` table holding `rows` people.
pub async fn create_people(client: &Client, dataset_id: &str, location: Location, rows: usize) {
    client.dataset().create(dataset_id, location, None, None).await.unwrap();
    client.table().create_empty(dataset_id, "people", people_schema()).await.unwrap();
    if rows > 0 {
        let people: Vec<_> = (0..rows)
            .map(|i| serde_json::json!({"name": format!("user{i}"), "age": 20 + i}))
            .collect();
        let errors = client.data().insert_rows(dataset_id, "people", &people).await.unwrap();
        assert!(errors.is_empty(), "{errors:?}");
    }
}

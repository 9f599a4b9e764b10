use std::time::Duration;

use common::*;
use gcloud_warehouse::access::{AccessEntry, Role};
use gcloud_warehouse::dataset::DatasetUpdate;
use gcloud_warehouse::error::Error;
use gcloud_warehouse::location::Location;
use gcloud_warehouse::mask::{DatasetField, FieldMask};

mod common;

#[ctor::ctor]
fn init() {
    let filter = tracing_subscriber::filter::EnvFilter::from_default_env()
        .add_directive("gcloud_warehouse=trace".parse().unwrap());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::test]
async fn create_then_get_reports_location_and_defaults() {
    let (client, _) = create_client();
    let two_hours = Duration::from_secs(7200);
    let created = client
        .dataset()
        .create("analytics", Location::Eu, Some("events"), Some(two_hours))
        .await
        .unwrap();
    assert_eq!(created.project_id, PROJECT);

    let dataset = client.dataset().get("analytics").await.unwrap();
    assert_eq!(dataset.location, Location::Eu);
    assert_eq!(dataset.description.as_deref(), Some("events"));
    assert_eq!(dataset.default_table_expiration, Some(two_hours));
    assert!(dataset.tables.is_empty());
    assert!(dataset.labels.is_empty());

    let plain = client.dataset().create("plain", Location::Us, None, None).await.unwrap();
    assert_eq!(plain.location, Location::Us);
    assert_eq!(plain.description, None);
    assert_eq!(plain.default_table_expiration, None);
}

#[tokio::test]
async fn duplicate_create_leaves_dataset_unchanged() {
    let (client, _) = create_client();
    client.dataset().create("sales", Location::Us, Some("first"), None).await.unwrap();
    let before = client.dataset().get("sales").await.unwrap();

    let err = client
        .dataset()
        .create("sales", Location::Eu, Some("second"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }), "{err:?}");

    let after = client.dataset().get("sales").await.unwrap();
    assert_eq!(before, after);
    assert_eq!(after.location, Location::Us);
}

#[tokio::test]
async fn description_update_keeps_expiration() {
    let (client, _) = create_client();
    let expiration = Duration::from_secs(3 * 3600);
    client
        .dataset()
        .create("sales", Location::Us, Some("old"), Some(expiration))
        .await
        .unwrap();

    let updated = client
        .dataset()
        .update(
            "sales",
            FieldMask::new([DatasetField::Description]),
            DatasetUpdate {
                description: Some("new".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.description.as_deref(), Some("new"));
    assert_eq!(updated.default_table_expiration, Some(expiration));

    let fetched = client.dataset().get("sales").await.unwrap();
    assert_eq!(fetched.default_table_expiration, Some(expiration));
}

#[tokio::test]
async fn grant_access_appends_entries() {
    let (client, service) = create_client();
    client.dataset().create("shared", Location::Us, None, None).await.unwrap();

    let reader = AccessEntry::user(Role::Reader, "analyst@example.com");
    let granted = client.dataset().grant_access("shared", reader.clone()).await.unwrap();
    assert_eq!(granted.access_entries, vec![reader.clone()]);

    let err = client.dataset().grant_access("shared", reader.clone()).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }), "{err:?}");

    let writers = AccessEntry::group(Role::Writer, "etl@example.com");
    client.dataset().grant_access("shared", writers.clone()).await.unwrap();
    let dataset = client.dataset().get("shared").await.unwrap();
    assert_eq!(dataset.access_entries.len(), 2);
    assert!(dataset.access_entries.contains(&reader));
    assert!(dataset.access_entries.contains(&writers));

    service.inject_concurrent_modification(PROJECT, "shared");
    let err = client
        .dataset()
        .grant_access("shared", AccessEntry::domain(Role::Reader, "example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }), "{err:?}");
    assert_eq!(client.dataset().get("shared").await.unwrap().access_entries.len(), 2);
}

#[tokio::test]
async fn delete_requires_cascade_for_non_empty_dataset() {
    let (client, _) = create_client();
    create_people(&client, "staging", Location::Us, 2).await;

    let err = client.dataset().delete("staging", false).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }), "{err:?}");
    let table = client.table().get_metadata("staging", "people").await.unwrap();
    assert_eq!(table.num_rows, 2);

    client.dataset().delete("staging", true).await.unwrap();
    assert!(client.dataset().get("staging").await.unwrap_err().is_not_found());
    assert!(client.table().get_metadata("staging", "people").await.unwrap_err().is_not_found());

    client.dataset().create("empty", Location::Us, None, None).await.unwrap();
    client.dataset().delete("empty", false).await.unwrap();
    assert!(client.dataset().get("empty").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn list_follows_pages() {
    let (client, _) = create_client();
    for i in 0..7 {
        client.dataset().create(&format!("ds_{i}"), Location::Eu, None, None).await.unwrap();
    }
    let datasets = client.dataset().list().await.unwrap();
    assert_eq!(datasets.len(), 7);
    assert!(datasets.iter().all(|d| d.location == Some(Location::Eu)));
    assert_eq!(datasets[6].dataset_id, "ds_6");
}

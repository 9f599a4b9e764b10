use std::time::Duration;

use common::*;
use gcloud_warehouse::error::Error;
use gcloud_warehouse::http::job::JobState;
use gcloud_warehouse::location::Location;
use gcloud_warehouse::mask::{FieldMask, TableField};
use gcloud_warehouse::schema::{Field, FieldType, Schema};
use gcloud_warehouse::table::{DataFormat, LoadSource, TableRef, TableType, TableUpdate, WriteMode};

mod common;

#[ctor::ctor]
fn init() {
    let filter = tracing_subscriber::filter::EnvFilter::from_default_env()
        .add_directive("gcloud_warehouse=trace".parse().unwrap());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::test]
async fn get_metadata_is_stable() {
    let (client, _) = create_client();
    create_people(&client, "ds", Location::Us, 3).await;
    let first = client.table().get_metadata("ds", "people").await.unwrap();
    let second = client.table().get_metadata("ds", "people").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.num_rows, 3);
    assert!(first.num_bytes > 0);
    assert_eq!(first.schema, people_schema());
    assert_eq!(first.location, Some(Location::Us));

    let tables = client.table().list("ds").await.unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].table_type, TableType::Native);
}

#[tokio::test]
async fn description_update_keeps_expiration() {
    let (client, _) = create_client();
    create_people(&client, "ds", Location::Us, 0).await;
    let table = client.table().get_metadata("ds", "people").await.unwrap();
    let expiration = table.creation_time + time::Duration::days(7);
    client
        .table()
        .update(
            "ds",
            "people",
            FieldMask::new([TableField::Expiration]),
            TableUpdate {
                expiration_time: Some(expiration),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let updated = client
        .table()
        .update(
            "ds",
            "people",
            FieldMask::new([TableField::Description]),
            TableUpdate {
                description: Some("everyone".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.description.as_deref(), Some("everyone"));
    assert_eq!(
        updated.expiration_time.map(|t| t.unix_timestamp()),
        Some(expiration.unix_timestamp())
    );
}

#[tokio::test]
async fn create_from_query_checks_locations_before_submitting() {
    let (client, service) = create_client();
    create_people(&client, "us_data", Location::Us, 2).await;
    client.dataset().create("eu_reports", Location::Eu, None, None).await.unwrap();

    let err = client
        .table()
        .create_from_query("eu_reports", "adults", "SELECT * FROM us_data.people", Location::Eu, None)
        .await
        .unwrap_err();
    match err {
        Error::LocationMismatch { resource, expected, actual } => {
            assert_eq!(resource, format!("{PROJECT}:us_data"));
            assert_eq!(expected, "EU");
            assert_eq!(actual, "US");
        }
        other => panic!("unexpected {other:?}"),
    }

    let err = client
        .table()
        .create_from_query("eu_reports", "adults", "SELECT 1 AS one", Location::Us, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LocationMismatch { .. }), "{err:?}");
    assert!(service.job_ids(PROJECT).is_empty());
    assert!(client.table().get_metadata("eu_reports", "adults").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn create_from_query_ignores_commented_out_tables() {
    let (client, service) = create_client();
    create_people(&client, "us_ds", Location::Us, 2).await;
    create_people(&client, "eu_ds", Location::Eu, 1).await;

    let table = client
        .table()
        .create_from_query(
            "us_ds",
            "block_comment",
            "SELECT name FROM us_ds.people /* was: SELECT name FROM eu_ds.people */",
            Location::Us,
            None,
        )
        .await
        .unwrap();
    assert_eq!(table.num_rows, 2);

    let table = client
        .table()
        .create_from_query(
            "us_ds",
            "hash_comment",
            "# old source: FROM eu_ds.people\nSELECT name FROM us_ds.people",
            Location::Us,
            None,
        )
        .await
        .unwrap();
    assert_eq!(table.num_rows, 2);
    assert_eq!(service.job_ids(PROJECT).len(), 2);
}

#[tokio::test]
async fn create_from_query_rejects_unparseable_query() {
    let (client, service) = create_client();
    create_people(&client, "us_ds", Location::Us, 1).await;

    let err = client
        .table()
        .create_from_query("us_ds", "broken", "SELECT name FROM us_ds.people WHERE", Location::Us, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{err:?}");
    assert!(service.job_ids(PROJECT).is_empty());
}

#[tokio::test]
async fn create_from_query_materializes_rows() {
    let (client, _) = create_client();
    create_people(&client, "ds", Location::Us, 4).await;
    let table = client
        .table()
        .create_from_query(
            "ds",
            "older",
            "SELECT name, age FROM ds.people WHERE age >= 22",
            Location::Us,
            Some(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert_eq!(table.num_rows, 2);
    assert_eq!(table.schema.fields().len(), 2);
    assert_eq!(table.schema.fields()[0].name, "name");

    let err = client
        .table()
        .create_from_query("ds", "older", "SELECT name FROM ds.people", Location::Us, None)
        .await
        .unwrap_err();
    match err {
        Error::JobFailed { error, .. } => assert_eq!(error.reason.as_deref(), Some("duplicate")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn copy_checks_locations_before_submitting() {
    let (client, service) = create_client();
    create_people(&client, "us_data", Location::Us, 1).await;
    client.dataset().create("eu_data", Location::Eu, None, None).await.unwrap();

    let err = client
        .table()
        .copy(
            &TableRef::new("us_data", "people"),
            &TableRef::new("eu_data", "people"),
            Location::Us,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::LocationMismatch { .. }), "{err:?}");
    assert!(service.job_ids(PROJECT).is_empty());

    client.dataset().create("us_backup", Location::Us, None, None).await.unwrap();
    let copied = client
        .table()
        .copy(
            &TableRef::new("us_data", "people"),
            &TableRef::new("us_backup", "people"),
            Location::Us,
            None,
        )
        .await
        .unwrap();
    assert_eq!(copied.num_rows, 1);
    assert_eq!(copied.schema, people_schema());
}

#[tokio::test]
async fn stalled_job_times_out_and_keeps_running() {
    let (client, service) = create_client();
    create_people(&client, "ds", Location::Us, 1).await;
    service.stall_jobs(true);
    let err = client
        .table()
        .copy(
            &TableRef::new("ds", "people"),
            &TableRef::new("ds", "people_copy"),
            Location::Us,
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    let job_id = match err {
        Error::Timeout { job_id, .. } => job_id,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(service.job_state(PROJECT, &job_id), Some(JobState::Running));
}

#[tokio::test]
async fn load_csv_and_json_files() {
    let (client, service) = create_client();
    client.dataset().create("ds", Location::Eu, None, None).await.unwrap();
    service.put_object("gs://bucket/people/part-0.csv", "name,age\nann,31\n\"smith, bob\",\n");
    service.put_object("gs://bucket/people/part-1.csv", "name,age\ncid,45\n");
    service.put_object(
        "gs://bucket/more.json",
        "{\"name\": \"dan\", \"age\": 19}\n{\"name\": \"eve\"}\n",
    );

    let source = LoadSource {
        schema: Some(people_schema()),
        skip_leading_rows: Some(1),
        ..LoadSource::new(vec!["gs://bucket/people/*.csv".to_string()], DataFormat::Csv)
    };
    let table = client.table().load("ds", "people", source, None).await.unwrap();
    assert_eq!(table.num_rows, 3);

    let json = LoadSource::new(vec!["gs://bucket/more.json".to_string()], DataFormat::NewlineDelimitedJson);
    let table = client.table().load("ds", "people", json.clone(), None).await.unwrap();
    assert_eq!(table.num_rows, 5);

    let replace = LoadSource {
        write_mode: WriteMode::Truncate,
        ..json.clone()
    };
    let table = client.table().load("ds", "people", replace, None).await.unwrap();
    assert_eq!(table.num_rows, 2);

    let err = client
        .table()
        .load("ds", "other", json, None)
        .await
        .unwrap_err();
    match err {
        Error::JobFailed { error, .. } => assert_eq!(error.reason.as_deref(), Some("invalid")),
        other => panic!("unexpected {other:?}"),
    }

    let sheets = LoadSource::new(
        vec!["https://docs.google.com/spreadsheets/d/abc".to_string()],
        DataFormat::GoogleSheets,
    );
    let err = client.table().load("ds", "people", sheets, None).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{err:?}");
}

#[tokio::test]
async fn external_table_reads_objects_at_query_time() {
    let (client, service) = create_client();
    client.dataset().create("lake", Location::Us, None, None).await.unwrap();
    service.put_object("gs://lake/cities.csv", "city,population\nOsaka,2700000\nNara,350000\n");
    let schema = Schema::new(vec![
        Field::new("city", FieldType::String),
        Field::new("population", FieldType::Integer),
    ]);
    let table = client
        .table()
        .create_external(
            "lake",
            "cities",
            schema,
            vec!["gs://lake/cities.csv".to_string()],
            DataFormat::Csv,
            Some(1),
        )
        .await
        .unwrap();
    assert_eq!(table.table_type, TableType::External);
    assert_eq!(table.external_source.unwrap().skip_leading_rows, Some(1));

    let mut iter = client
        .data()
        .run_query(
            "SELECT city FROM lake.cities WHERE population > 1000000",
            Location::Us,
            None,
        )
        .await
        .unwrap();
    let row = iter.next().await.unwrap().unwrap();
    assert_eq!(row.column::<String>(0).unwrap(), "Osaka");
    assert!(iter.next().await.unwrap().is_none());

    // appended objects are visible to the next query
    service.put_object("gs://lake/cities.csv", "city,population\nOsaka,2700000\nNara,350000\nKobe,1500000\n");
    let iter = client
        .data()
        .run_query("SELECT COUNT(*) FROM lake.cities", Location::Us, None)
        .await
        .unwrap();
    assert_eq!(iter.total_size, 1);
    let mut iter = iter;
    let row = iter.next().await.unwrap().unwrap();
    assert_eq!(row.column::<i64>(0).unwrap(), 3);

    let err = client
        .data()
        .insert_rows("lake", "cities", &[serde_json::json!({"city": "Kyoto"})])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{err:?}");
}

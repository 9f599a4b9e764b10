use futures_util::StreamExt;
use serde_json::json;

use common::*;
use gcloud_warehouse::error::Error;
use gcloud_warehouse::location::Location;

mod common;

#[ctor::ctor]
fn init() {
    let filter = tracing_subscriber::filter::EnvFilter::from_default_env()
        .add_directive("gcloud_warehouse=trace".parse().unwrap());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::test]
async fn inserted_rows_are_counted() {
    let (client, _) = create_client();
    create_people(&client, "ds", Location::Us, 0).await;
    let errors = client
        .data()
        .insert_rows(
            "ds",
            "people",
            &[json!({"name": "ann", "age": 31}), json!({"name": "bob"})],
        )
        .await
        .unwrap();
    assert!(errors.is_empty(), "{errors:?}");

    let mut iter = client
        .data()
        .run_query("SELECT COUNT(*) AS n FROM ds.people", Location::Us, None)
        .await
        .unwrap();
    assert_eq!(iter.columns(), ["n".to_string()]);
    let row = iter.next().await.unwrap().unwrap();
    assert_eq!(row.column::<i64>(0).unwrap(), 2);
    assert_eq!(row.column_by_name::<i64>("N").unwrap(), 2);
    assert!(iter.next().await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_rows_do_not_block_valid_ones() {
    let (client, _) = create_client();
    create_people(&client, "ds", Location::Us, 0).await;
    #[derive(serde::Serialize)]
    struct Person {
        name: Option<&'static str>,
        age: i64,
    }
    let rows = [
        Person { name: Some("ann"), age: 1 },
        Person { name: None, age: 2 },
        Person { name: Some("cid"), age: 3 },
    ];
    let errors = client.data().insert_rows("ds", "people", &rows).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].index, 1);
    assert_eq!(errors[0].errors[0].reason, "invalid");
    assert_eq!(errors[0].errors[0].location, "name");
    assert_eq!(client.table().get_metadata("ds", "people").await.unwrap().num_rows, 2);
}

#[tokio::test]
async fn results_are_paged_in_order() {
    let (client, service) = create_client();
    create_people(&client, "ds", Location::Eu, 8).await;
    service.defer_queries(true);
    let iter = client
        .data()
        .run_query(
            "SELECT name, age AS years FROM ds.people ORDER BY age DESC LIMIT 7",
            Location::Eu,
            None,
        )
        .await
        .unwrap();
    assert_eq!(iter.total_size, 7);
    assert_eq!(iter.columns(), ["name".to_string(), "years".to_string()]);
    let rows: Vec<_> = iter.into_stream().collect().await;
    let years: Vec<i64> = rows
        .into_iter()
        .map(|row| row.unwrap().column_by_name::<i64>("years").unwrap())
        .collect();
    assert_eq!(years, vec![27, 26, 25, 24, 23, 22, 21]);
}

#[tokio::test]
async fn query_failures_are_classified() {
    let (client, _) = create_client();
    create_people(&client, "eu_ds", Location::Eu, 1).await;

    let err = client
        .data()
        .run_query("SELECT * FROM eu_ds.missing", Location::Eu, None)
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err:?}");

    // datasets are only visible from their own location
    let err = client
        .data()
        .run_query("SELECT * FROM eu_ds.people", Location::Us, None)
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err:?}");

    let err = client
        .data()
        .run_query("SELECT name FROM eu_ds.people WHERE", Location::Eu, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{err:?}");

    let err = client.data().run_query("  ", Location::Eu, None).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "{err:?}");
}

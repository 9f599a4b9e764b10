#![allow(clippy::large_enum_variant)]
#![allow(clippy::result_large_err)]
//! # gcloud-warehouse
//!
//! Typed dataset, table and query management for Google Cloud BigQuery.
//!
//! ## Quick Start
//!
//! ### CreateClient
//!
//! `ClientConfig::with_auth()` reads the credentials from the file named by the environment variable
//! `GOOGLE_APPLICATION_CREDENTIALS`, from `GOOGLE_APPLICATION_CREDENTIALS_JSON` or from the metadata server.
//!
//! This is also described in [google-cloud-auth](https://github.com/yoshidan/google-cloud-rust/blob/main/foundation/auth/README.md)
//!
//! ```rust
//! use gcloud_warehouse::client::{Client, ClientConfig};
//!
//! async fn run() {
//!     let config = ClientConfig::default().with_auth().await.unwrap();
//!     let client = Client::new(config).unwrap();
//! }
//! ```
//!
//! ### Datasets and tables
//!
//! ```rust
//! use std::time::Duration;
//!
//! use gcloud_warehouse::access::{AccessEntry, Role};
//! use gcloud_warehouse::client::Client;
//! use gcloud_warehouse::location::Location;
//! use gcloud_warehouse::schema::{Field, FieldType, Schema};
//!
//! async fn run(client: &Client) {
//!     client
//!         .dataset()
//!         .create("sales", Location::Eu, Some("daily sales"), Some(Duration::from_secs(86400)))
//!         .await
//!         .unwrap();
//!     client
//!         .dataset()
//!         .grant_access("sales", AccessEntry::user(Role::Reader, "analyst@example.com"))
//!         .await
//!         .unwrap();
//!     let schema = Schema::new(vec![
//!         Field::new("item", FieldType::String).required(),
//!         Field::new("amount", FieldType::Integer),
//!     ]);
//!     client.table().create_empty("sales", "orders", schema).await.unwrap();
//! }
//! ```
//!
//! ### Read Data
//!
//! ```rust
//! use gcloud_warehouse::client::Client;
//! use gcloud_warehouse::location::Location;
//!
//! async fn run(client: &Client) {
//!     let errors = client
//!         .data()
//!         .insert_rows("sales", "orders", &[serde_json::json!({"item": "tea", "amount": 3})])
//!         .await
//!         .unwrap();
//!     assert!(errors.is_empty());
//!
//!     let mut iter = client
//!         .data()
//!         .run_query("SELECT item, amount FROM sales.orders", Location::Eu, None)
//!         .await
//!         .unwrap();
//!     while let Some(row) = iter.next().await.unwrap() {
//!         let item = row.column::<String>(0).unwrap();
//!         let amount = row.column_by_name::<Option<i64>>("amount").unwrap();
//!     }
//! }
//! ```
//!
//! ### Testing
//!
//! [`emulator::InMemoryWarehouse`] implements the same service surface in memory. Pass it to
//! [`client::Client::from_service`] to run everything above without network access.

pub mod access;
pub mod client;
pub mod data;
pub mod dataset;
pub mod emulator;
pub mod error;
pub mod http;
mod job;
pub mod location;
pub mod mask;
pub mod query;
pub mod schema;
pub mod service;
mod sql;
pub mod table;

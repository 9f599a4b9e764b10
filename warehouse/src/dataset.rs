use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::access::AccessEntry;
use crate::client::Context;
use crate::error::Error;
use crate::http::dataset::list::DatasetOverview;
use crate::http::dataset::{Dataset as WireDataset, DatasetReference};
use crate::location::Location;
use crate::mask::{DatasetField, FieldMask};
use crate::table;

/// The service rejects default expirations shorter than an hour.
const MIN_DEFAULT_TABLE_EXPIRATION: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub project_id: String,
    pub dataset_id: String,
    pub location: Location,
    pub description: Option<String>,
    pub default_table_expiration: Option<Duration>,
    pub labels: HashMap<String, String>,
    pub access_entries: Vec<AccessEntry>,
    /// Ids of the tables in the dataset. Only filled by [`DatasetManager::get`].
    pub tables: Vec<String>,
    pub creation_time: OffsetDateTime,
    pub last_modified_time: OffsetDateTime,
    pub etag: String,
}

impl Dataset {
    fn from_wire(value: WireDataset, tables: Vec<String>) -> Result<Self, Error> {
        Ok(Self {
            location: Location::from_service(&value.location),
            project_id: value.dataset_reference.project_id,
            dataset_id: value.dataset_reference.dataset_id,
            description: value.description,
            default_table_expiration: value
                .default_table_expiration_ms
                .map(|ms| Duration::from_millis(ms.max(0) as u64)),
            labels: value.labels.unwrap_or_default(),
            access_entries: value.access.iter().filter_map(AccessEntry::from_wire).collect(),
            tables,
            creation_time: from_millis(value.creation_time)?,
            last_modified_time: from_millis(value.last_modified_time)?,
            etag: value.etag,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DatasetSummary {
    pub project_id: String,
    pub dataset_id: String,
    pub location: Option<Location>,
    pub friendly_name: Option<String>,
    pub labels: HashMap<String, String>,
}

impl From<DatasetOverview> for DatasetSummary {
    fn from(value: DatasetOverview) -> Self {
        Self {
            project_id: value.dataset_reference.project_id,
            dataset_id: value.dataset_reference.dataset_id,
            location: value.location.as_deref().map(Location::from_service),
            friendly_name: value.friendly_name,
            labels: value.labels.unwrap_or_default(),
        }
    }
}

/// New values for [`DatasetManager::update`]. Only fields named by the mask are read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatasetUpdate {
    /// `None` clears the description.
    pub description: Option<String>,
    /// `None` removes the default so new tables never expire.
    pub default_table_expiration: Option<Duration>,
    /// Replaces all labels.
    pub labels: HashMap<String, String>,
    /// Replaces all access entries.
    pub access_entries: Vec<AccessEntry>,
}

#[derive(Clone, Debug)]
pub struct DatasetManager {
    ctx: Arc<Context>,
}

impl DatasetManager {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn create(
        &self,
        dataset_id: &str,
        location: Location,
        description: Option<&str>,
        default_table_expiration: Option<Duration>,
    ) -> Result<Dataset, Error> {
        validate_dataset_id(dataset_id)?;
        if let Some(expiration) = default_table_expiration {
            validate_default_expiration(expiration)?;
        }
        let metadata = WireDataset {
            dataset_reference: DatasetReference {
                dataset_id: dataset_id.to_string(),
                project_id: self.ctx.project_id.clone(),
            },
            description: description.map(str::to_string),
            default_table_expiration_ms: default_table_expiration.map(|d| d.as_millis() as i64),
            location: location.to_string(),
            ..Default::default()
        };
        let created = self.ctx.service.insert_dataset(&metadata).await?;
        tracing::debug!(dataset_id, %location, "dataset created");
        Dataset::from_wire(created, vec![])
    }

    /// Fetches the dataset together with the ids of every table in it.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn get(&self, dataset_id: &str) -> Result<Dataset, Error> {
        let dataset = self.ctx.service.get_dataset(&self.ctx.project_id, dataset_id).await?;
        let tables = self.table_ids(dataset_id).await?;
        Dataset::from_wire(dataset, tables)
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn list(&self) -> Result<Vec<DatasetSummary>, Error> {
        let mut page_token: Option<String> = None;
        let mut datasets = vec![];
        loop {
            let response = self
                .ctx
                .service
                .list_datasets(&self.ctx.project_id, page_token.as_deref())
                .await?;
            datasets.extend(response.datasets.into_iter().map(DatasetSummary::from));
            if response.next_page_token.is_none() {
                break;
            }
            page_token = response.next_page_token;
        }
        Ok(datasets)
    }

    /// Changes exactly the fields named in `mask`. Fields outside the mask are never sent, even if
    /// `values` sets them.
    ///
    /// Masking [`DatasetField::AccessEntries`] replaces the typed grants. Grants the typed model
    /// cannot express (IAM members, routines, other datasets) are written back unchanged. Updates
    /// that read the current dataset first are guarded by its etag.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn update(
        &self,
        dataset_id: &str,
        mask: FieldMask<DatasetField>,
        values: DatasetUpdate,
    ) -> Result<Dataset, Error> {
        mask.validate()?;
        let mut access = if mask.contains(DatasetField::AccessEntries) {
            access_to_wire(&values.access_entries)?
        } else {
            vec![]
        };
        if mask.contains(DatasetField::DefaultTableExpiration) {
            if let Some(expiration) = values.default_table_expiration {
                validate_default_expiration(expiration)?;
            }
        }
        let current = if mask.contains(DatasetField::Labels) || mask.contains(DatasetField::AccessEntries) {
            Some(self.ctx.service.get_dataset(&self.ctx.project_id, dataset_id).await?)
        } else {
            None
        };
        if let Some(current) = current.as_ref().filter(|_| mask.contains(DatasetField::AccessEntries)) {
            let kept: Vec<_> = current
                .access
                .iter()
                .filter(|a| AccessEntry::from_wire(a).is_none())
                .cloned()
                .collect();
            if !kept.is_empty() {
                tracing::debug!(dataset_id, kept = kept.len(), "keeping access entries without a typed form");
            }
            access.extend(kept);
        }
        // label patches are merged remotely, so removed keys must be sent as null
        let removed_labels: Vec<String> = match current.as_ref().filter(|_| mask.contains(DatasetField::Labels)) {
            Some(current) => current
                .labels
                .clone()
                .unwrap_or_default()
                .into_keys()
                .filter(|k| !values.labels.contains_key(k))
                .collect(),
            None => vec![],
        };
        let etag = current.as_ref().map(|c| c.etag.as_str()).filter(|e| !e.is_empty());

        let body = mask.to_body(|field| match field {
            DatasetField::Description => json!(values.description),
            DatasetField::DefaultTableExpiration => {
                json!(values.default_table_expiration.map(|d| d.as_millis().to_string()))
            }
            DatasetField::Labels => {
                let mut labels: serde_json::Map<String, Value> = values
                    .labels
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                for key in &removed_labels {
                    labels.insert(key.clone(), Value::Null);
                }
                Value::Object(labels)
            }
            DatasetField::AccessEntries => json!(access),
        });
        let patched = self
            .ctx
            .service
            .patch_dataset(&self.ctx.project_id, dataset_id, &body, etag)
            .await?;
        let tables = self.table_ids(dataset_id).await?;
        Dataset::from_wire(patched, tables)
    }

    /// Appends one access entry.
    ///
    /// The entry list is read, checked for an identical entry and written back guarded by the
    /// etag of the read. A write that races with another change fails with [`Error::Conflict`]
    /// instead of dropping the other change. When the service does not return an etag the guard
    /// is missing and a concurrent grant can be lost.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn grant_access(&self, dataset_id: &str, entry: AccessEntry) -> Result<Dataset, Error> {
        entry.validate()?;
        let current = self.ctx.service.get_dataset(&self.ctx.project_id, dataset_id).await?;
        if current.access.iter().filter_map(AccessEntry::from_wire).any(|e| e.same_grant(&entry)) {
            return Err(Error::conflict(format!(
                "{:?} {} already has {} on dataset {dataset_id}",
                entry.entity_type, entry.entity_id, entry.role
            )));
        }
        let mut access = current.access.clone();
        access.push(entry.to_wire()?);
        let body = json!({ "access": access });
        let etag = Some(current.etag.as_str()).filter(|e| !e.is_empty());
        let patched = self
            .ctx
            .service
            .patch_dataset(&self.ctx.project_id, dataset_id, &body, etag)
            .await?;
        tracing::debug!(dataset_id, role = %entry.role, entity = %entry.entity_id, "access granted");
        let tables = self.table_ids(dataset_id).await?;
        Dataset::from_wire(patched, tables)
    }

    /// Deletes the dataset. Without `cascade` a dataset that still has tables is left untouched and
    /// [`Error::Conflict`] is returned.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn delete(&self, dataset_id: &str, cascade: bool) -> Result<(), Error> {
        if !cascade {
            let tables = self.table_ids(dataset_id).await?;
            if !tables.is_empty() {
                return Err(Error::conflict(format!(
                    "dataset not empty: {dataset_id} still has {} table(s)",
                    tables.len()
                )));
            }
        }
        self.ctx
            .service
            .delete_dataset(&self.ctx.project_id, dataset_id, cascade)
            .await?;
        tracing::debug!(dataset_id, cascade, "dataset deleted");
        Ok(())
    }

    async fn table_ids(&self, dataset_id: &str) -> Result<Vec<String>, Error> {
        Ok(table::list_all(&self.ctx, dataset_id)
            .await?
            .into_iter()
            .map(|t| t.table_reference.table_id)
            .collect())
    }
}

fn access_to_wire(entries: &[AccessEntry]) -> Result<Vec<crate::http::dataset::Access>, Error> {
    let mut wire = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        entry.validate()?;
        if entries[..i].iter().any(|e| e.same_grant(entry)) {
            return Err(Error::validation(format!("duplicate access entry for {}", entry.entity_id)));
        }
        wire.push(entry.to_wire()?);
    }
    Ok(wire)
}

fn validate_default_expiration(expiration: Duration) -> Result<(), Error> {
    if expiration < MIN_DEFAULT_TABLE_EXPIRATION {
        return Err(Error::validation(format!(
            "default table expiration must be at least one hour, got {expiration:?}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_dataset_id(dataset_id: &str) -> Result<(), Error> {
    if dataset_id.is_empty() || dataset_id.len() > 1024 {
        return Err(Error::validation("dataset id must be 1 to 1024 characters"));
    }
    if !dataset_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::validation(format!(
            "dataset id '{dataset_id}' may only contain letters, numbers and underscores"
        )));
    }
    Ok(())
}

pub(crate) fn from_millis(ms: i64) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .map_err(|e| Error::validation(format!("invalid timestamp {ms}: {e}")))
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use crate::access::{AccessEntry, Role};
    use crate::client::Client;
    use crate::dataset::DatasetUpdate;
    use crate::emulator::InMemoryWarehouse;
    use crate::error::Error;
    use crate::location::Location;
    use crate::mask::{DatasetField, FieldMask};
    use crate::schema::{Field, FieldType, Schema};
    use crate::service::WarehouseService;

    #[ctor::ctor]
    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    fn client() -> Client {
        Client::from_service("proj", Arc::new(InMemoryWarehouse::new().with_page_size(2)))
    }

    #[tokio::test]
    async fn create_rejects_bad_input_before_any_request() {
        let client = client();
        let err = client.dataset().create("bad-id", Location::Us, None, None).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        let err = client
            .dataset()
            .create("ds", Location::Us, None, Some(Duration::from_secs(60)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(client.dataset().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_follows_pages() {
        let client = client();
        for i in 0..5 {
            client
                .dataset()
                .create(&format!("ds_{i}"), Location::Eu, None, None)
                .await
                .unwrap();
        }
        let datasets = client.dataset().list().await.unwrap();
        assert_eq!(datasets.len(), 5);
        assert!(datasets.iter().all(|d| d.location == Some(Location::Eu)));
    }

    #[tokio::test]
    async fn labels_are_replaced() {
        let client = client();
        client.dataset().create("ds", Location::Us, None, None).await.unwrap();
        let mask = FieldMask::new([DatasetField::Labels]);
        let first = DatasetUpdate {
            labels: HashMap::from([("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]),
            ..Default::default()
        };
        client.dataset().update("ds", mask.clone(), first).await.unwrap();
        let second = DatasetUpdate {
            labels: HashMap::from([("b".to_string(), "3".to_string())]),
            ..Default::default()
        };
        let updated = client.dataset().update("ds", mask, second).await.unwrap();
        assert_eq!(updated.labels, HashMap::from([("b".to_string(), "3".to_string())]));
    }

    #[tokio::test]
    async fn masked_expiration_can_be_cleared() {
        let client = client();
        client
            .dataset()
            .create("ds", Location::Us, Some("keep"), Some(Duration::from_secs(7200)))
            .await
            .unwrap();
        let updated = client
            .dataset()
            .update(
                "ds",
                FieldMask::new([DatasetField::DefaultTableExpiration]),
                DatasetUpdate::default(),
            )
            .await
            .unwrap();
        assert_eq!(updated.default_table_expiration, None);
        assert_eq!(updated.description.as_deref(), Some("keep"));
    }

    #[tokio::test]
    async fn empty_mask_is_rejected() {
        let client = client();
        client.dataset().create("ds", Location::Us, None, None).await.unwrap();
        let err = client
            .dataset()
            .update("ds", FieldMask::new([]), DatasetUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn access_entries_can_be_replaced() {
        let client = client();
        client.dataset().create("ds", Location::Us, None, None).await.unwrap();
        let entries = vec![
            AccessEntry::user(Role::Reader, "a@example.com"),
            AccessEntry::domain(Role::Writer, "example.com"),
        ];
        let updated = client
            .dataset()
            .update(
                "ds",
                FieldMask::new([DatasetField::AccessEntries]),
                DatasetUpdate {
                    access_entries: entries.clone(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.access_entries, entries);

        let duplicated = DatasetUpdate {
            access_entries: vec![entries[0].clone(), entries[0].clone()],
            ..Default::default()
        };
        let err = client
            .dataset()
            .update("ds", FieldMask::new([DatasetField::AccessEntries]), duplicated)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn access_update_keeps_untyped_members() {
        let service = Arc::new(InMemoryWarehouse::new());
        let client = Client::from_service("proj", service.clone());
        client.dataset().create("ds", Location::Us, None, None).await.unwrap();
        let body = json!({"access": [
            {"role": "READER", "userByEmail": "old@example.com"},
            {"role": "roles/bigquery.dataViewer", "iamMember": "serviceAccount:etl@proj.iam.gserviceaccount.com"},
            {"routine": {"projectId": "proj", "datasetId": "udfs", "routineId": "mask_email"}},
        ]});
        service.patch_dataset("proj", "ds", &body, None).await.unwrap();
        let dataset = client.dataset().get("ds").await.unwrap();
        assert_eq!(dataset.access_entries, vec![AccessEntry::user(Role::Reader, "old@example.com")]);

        let entries = vec![AccessEntry::user(Role::Writer, "new@example.com")];
        let updated = client
            .dataset()
            .update(
                "ds",
                FieldMask::new([DatasetField::AccessEntries]),
                DatasetUpdate {
                    access_entries: entries.clone(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.access_entries, entries);

        let wire = service.get_dataset("proj", "ds").await.unwrap().access;
        assert_eq!(wire.len(), 3);
        assert_eq!(
            wire[1].iam_member.as_deref(),
            Some("serviceAccount:etl@proj.iam.gserviceaccount.com")
        );
        assert_eq!(wire[2].other["routine"]["routineId"], json!("mask_email"));
        assert!(wire.iter().all(|a| a.user_by_email.as_deref() != Some("old@example.com")));
    }

    #[tokio::test]
    async fn grant_access_ignores_email_case() {
        let client = client();
        client.dataset().create("ds", Location::Us, None, None).await.unwrap();
        client
            .dataset()
            .grant_access("ds", AccessEntry::user(Role::Reader, "analyst@example.com"))
            .await
            .unwrap();
        let err = client
            .dataset()
            .grant_access("ds", AccessEntry::user(Role::Reader, "Analyst@Example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }), "{err:?}");
        assert_eq!(client.dataset().get("ds").await.unwrap().access_entries.len(), 1);
    }

    #[tokio::test]
    async fn region_without_variant_is_readable() {
        let client = client();
        let region = Location::Other("me-west1".to_string());
        let created = client.dataset().create("ds", region.clone(), None, None).await.unwrap();
        assert_eq!(created.location, region);
        let schema = Schema::new(vec![Field::new("x", FieldType::Integer)]);
        client.table().create_empty("ds", "t", schema).await.unwrap();
        assert_eq!(client.dataset().get("ds").await.unwrap().location, region);
        let table = client.table().get_metadata("ds", "t").await.unwrap();
        assert_eq!(table.location, Some(region.clone()));
        let copied = client
            .table()
            .create_from_query("ds", "copied", "SELECT x FROM ds.t", region, None)
            .await
            .unwrap();
        assert_eq!(copied.num_rows, 0);
    }

    #[tokio::test]
    async fn get_lists_every_table() {
        let client = client();
        client.dataset().create("ds", Location::Us, None, None).await.unwrap();
        let schema = Schema::new(vec![Field::new("x", FieldType::Integer)]);
        for t in ["t1", "t2", "t3"] {
            client.table().create_empty("ds", t, schema.clone()).await.unwrap();
        }
        let mut tables = client.dataset().get("ds").await.unwrap().tables;
        tables.sort();
        assert_eq!(tables, vec!["t1", "t2", "t3"]);
    }
}

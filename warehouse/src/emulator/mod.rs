//! An in-process [`WarehouseService`] for hermetic tests.
//!
//! `InMemoryWarehouse` keeps datasets, tables, rows and jobs in memory and answers with the same
//! wire types and error bodies as the REST service, so every manager can be exercised without a
//! network. Jobs advance one state per `jobs.get` call (`PENDING`, `RUNNING`, `DONE`) and do their
//! work on the transition to `DONE`. Queries are evaluated by a small SELECT interpreter and
//! external tables and load jobs read from an object store filled with [`InMemoryWarehouse::put_object`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use gcloud_warehouse::client::Client;
//! use gcloud_warehouse::emulator::InMemoryWarehouse;
//! use gcloud_warehouse::location::Location;
//!
//! # async fn run() -> Result<(), gcloud_warehouse::error::Error> {
//! let client = Client::from_service("my-project", Arc::new(InMemoryWarehouse::new()));
//! let dataset = client.dataset().create("sales", Location::Eu, None, None).await?;
//! assert_eq!(dataset.location, Location::Eu);
//! # Ok(())
//! # }
//! ```

mod sql;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use time::OffsetDateTime;

use crate::http::dataset::list::{DatasetOverview, ListDatasetsResponse};
use crate::http::dataset::{Access, Dataset};
use crate::http::error::{Error, ErrorResponse};
use crate::http::job::get_query_results::{GetQueryResultsRequest, GetQueryResultsResponse};
use crate::http::job::query::{QueryRequest, QueryResponse};
use crate::http::job::{
    CreateDisposition, ErrorProto, Job, JobConfiguration, JobConfigurationQuery, JobReference, JobState, JobStatus,
    JobType, WriteDisposition,
};
use crate::http::table::list::{ListTablesResponse, TableOverview};
use crate::http::table::{SourceFormat, Table, TableReference};
use crate::http::tabledata::insert_all::{Error as RowError, ErrorMessage, InsertAllRequest, InsertAllResponse};
use crate::http::tabledata::{Cell, Tuple, Value as CellValue};
use crate::location::Location;
use crate::schema::{parse_timestamp, Field, FieldMode, FieldType, Schema};
use crate::service::WarehouseService;
use sql::ResultSet;

const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Default)]
struct State {
    datasets: BTreeMap<(String, String), StoredDataset>,
    jobs: HashMap<(String, String), StoredJob>,
    objects: BTreeMap<String, String>,
    stall_jobs: bool,
    defer_queries: bool,
    version: u64,
}

#[derive(Debug)]
struct StoredDataset {
    resource: Dataset,
    tables: BTreeMap<String, StoredTable>,
    /// Another writer changes the dataset right before the next patch.
    concurrent_writer: bool,
}

#[derive(Debug)]
struct StoredTable {
    resource: Table,
    rows: Vec<Map<String, Value>>,
    insert_ids: HashSet<String>,
}

#[derive(Debug)]
struct StoredJob {
    job: Job,
    result: Option<ResultSet>,
}

#[derive(Debug)]
pub struct InMemoryWarehouse {
    page_size: usize,
    state: Mutex<State>,
}

impl Default for InMemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(State::default()),
        }
    }

    /// Maximum number of items in one page of a list call or query result.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Stores a file that external tables and load jobs can read, e.g. `gs://bucket/data.csv`.
    pub fn put_object(&self, uri: impl Into<String>, content: impl Into<String>) {
        self.lock().objects.insert(uri.into(), content.into());
    }

    /// While set, jobs stop at `RUNNING`.
    pub fn stall_jobs(&self, stall: bool) {
        self.lock().stall_jobs = stall;
    }

    /// While set, `jobs.query` answers with `jobComplete: false` and the query runs as a job.
    pub fn defer_queries(&self, defer: bool) {
        self.lock().defer_queries = defer;
    }

    /// Changes the etag of a dataset right before the next patch of it, as if another client had
    /// written in between.
    pub fn inject_concurrent_modification(&self, project_id: &str, dataset_id: &str) {
        if let Some(dataset) = self
            .lock()
            .datasets
            .get_mut(&(project_id.to_string(), dataset_id.to_string()))
        {
            dataset.concurrent_writer = true;
        }
    }

    pub fn job_state(&self, project_id: &str, job_id: &str) -> Option<JobState> {
        self.lock()
            .jobs
            .get(&(project_id.to_string(), job_id.to_string()))
            .map(|j| j.job.status.state)
    }

    /// Ids of every job submitted in the project, including the ones created by `jobs.query`.
    pub fn job_ids(&self, project_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock()
            .jobs
            .keys()
            .filter(|(p, _)| p == project_id)
            .map(|(_, id)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn page<T>(&self, items: Vec<T>, page_token: Option<&str>, max: Option<i64>) -> Result<(Vec<T>, Option<String>), Error> {
        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| invalid(format!("Invalid page token: {token}")))?,
            None => 0,
        };
        let size = max.filter(|m| *m > 0).map(|m| m as usize).unwrap_or(self.page_size);
        let total = items.len();
        let end = start.saturating_add(size).min(total);
        let next = (end < total).then(|| end.to_string());
        Ok((items.into_iter().skip(start).take(size).collect(), next))
    }

    fn result_page(
        &self,
        result: &ResultSet,
        page_token: Option<&str>,
        start_index: Option<u64>,
        max: Option<i64>,
    ) -> Result<(Vec<Tuple>, Option<String>), Error> {
        let start = start_index.map(|i| i.to_string());
        let token = page_token.or(start.as_deref());
        let (rows, next) = self.page(result.rows.iter().collect(), token, max)?;
        Ok((rows.into_iter().map(|r| encode_row(&result.schema, r)).collect(), next))
    }
}

impl State {
    fn etag(&mut self) -> String {
        self.version += 1;
        format!("{:016x}", self.version)
    }

    fn dataset(&self, project_id: &str, dataset_id: &str) -> Result<&StoredDataset, Error> {
        self.datasets
            .get(&(project_id.to_string(), dataset_id.to_string()))
            .ok_or_else(|| not_found(format!("Dataset {project_id}:{dataset_id}")))
    }

    fn dataset_mut(&mut self, project_id: &str, dataset_id: &str) -> Result<&mut StoredDataset, Error> {
        self.datasets
            .get_mut(&(project_id.to_string(), dataset_id.to_string()))
            .ok_or_else(|| not_found(format!("Dataset {project_id}:{dataset_id}")))
    }

    fn table(&self, project_id: &str, dataset_id: &str, table_id: &str) -> Result<&StoredTable, Error> {
        self.dataset(project_id, dataset_id)?
            .tables
            .get(table_id)
            .ok_or_else(|| not_found(format!("Table {project_id}:{dataset_id}.{table_id}")))
    }

    fn table_mut(&mut self, project_id: &str, dataset_id: &str, table_id: &str) -> Result<&mut StoredTable, Error> {
        self.dataset_mut(project_id, dataset_id)?
            .tables
            .get_mut(table_id)
            .ok_or_else(|| not_found(format!("Table {project_id}:{dataset_id}.{table_id}")))
    }

    fn located_dataset(&self, project_id: &str, dataset_id: &str, location: &str) -> Result<&StoredDataset, ErrorProto> {
        let dataset = self
            .datasets
            .get(&(project_id.to_string(), dataset_id.to_string()))
            .ok_or_else(|| job_error("notFound", format!("Not found: Dataset {project_id}:{dataset_id}")))?;
        if !dataset.resource.location.eq_ignore_ascii_case(location) {
            return Err(job_error(
                "notFound",
                format!("Not found: Dataset {project_id}:{dataset_id} was not found in location {location}"),
            ));
        }
        Ok(dataset)
    }

    /// Runs the work of a job. Query jobs return their result set.
    fn execute(&mut self, project_id: &str, location: &str, job: &JobType) -> Result<Option<ResultSet>, ErrorProto> {
        match job {
            JobType::Query(config) => {
                if config.use_legacy_sql == Some(true) {
                    return Err(job_error("invalidQuery", "Legacy SQL is not supported"));
                }
                let result = self.select(project_id, location, &config.query)?;
                if let Some(destination) = &config.destination_table {
                    self.write_table(
                        destination,
                        location,
                        result.schema.clone(),
                        result.to_objects(),
                        config.create_disposition.unwrap_or_default(),
                        config.write_disposition.unwrap_or(WriteDisposition::WriteEmpty),
                    )?;
                }
                Ok(Some(result))
            }
            JobType::Copy(config) => {
                let mut schema = None;
                let mut rows = vec![];
                for source in &config.source_tables {
                    let dataset = self.located_dataset(&source.project_id, &source.dataset_id, location)?;
                    let table = dataset.tables.get(&source.table_id).ok_or_else(|| {
                        job_error(
                            "notFound",
                            format!(
                                "Not found: Table {}:{}.{}",
                                source.project_id, source.dataset_id, source.table_id
                            ),
                        )
                    })?;
                    if table.resource.external_data_configuration.is_some() {
                        return Err(job_error("invalid", "External tables cannot be copied"));
                    }
                    schema.get_or_insert_with(|| Schema::from_wire(table.resource.schema.as_ref()));
                    rows.extend(table.rows.iter().cloned());
                }
                let schema = schema.ok_or_else(|| job_error("invalid", "Copy job needs a source table"))?;
                self.write_table(
                    &config.destination_table,
                    location,
                    schema,
                    rows,
                    config.create_disposition.unwrap_or_default(),
                    config.write_disposition.unwrap_or(WriteDisposition::WriteEmpty),
                )?;
                Ok(None)
            }
            JobType::Load(config) => {
                let destination = &config.destination_table;
                let existing = self
                    .datasets
                    .get(&(destination.project_id.clone(), destination.dataset_id.clone()))
                    .and_then(|d| d.tables.get(&destination.table_id))
                    .and_then(|t| t.resource.schema.clone())
                    .filter(|s| !s.fields.is_empty());
                let wire_schema = existing
                    .or_else(|| config.schema.clone())
                    .ok_or_else(|| job_error("invalid", "No schema specified on job or table."))?;
                let schema = Schema::from_wire(Some(&wire_schema));
                let rows = self.read_objects(
                    &config.source_uris,
                    config.source_format.unwrap_or_default(),
                    config.skip_leading_rows,
                    config.field_delimiter.as_deref(),
                    &schema,
                )?;
                for (i, row) in rows.iter().enumerate() {
                    if let Some(violation) = schema.check_row(&Value::Object(row.clone())).into_iter().next() {
                        return Err(ErrorProto {
                            reason: Some("invalid".to_string()),
                            location: Some(violation.location),
                            message: Some(format!("Error while reading data, row {i}: {}", violation.message)),
                            ..Default::default()
                        });
                    }
                }
                self.write_table(
                    destination,
                    location,
                    schema,
                    rows,
                    config.create_disposition.unwrap_or_default(),
                    config.write_disposition.unwrap_or(WriteDisposition::WriteAppend),
                )?;
                Ok(None)
            }
        }
    }

    fn select(&self, project_id: &str, location: &str, query: &str) -> Result<ResultSet, ErrorProto> {
        let select = sql::parse(query).map_err(|m| job_error("invalidQuery", m))?;
        let Some(path) = &select.from else {
            return select.evaluate(None).map_err(|m| job_error("invalidQuery", m));
        };
        let (project_id, dataset_id, table_id) = match path.as_slice() {
            [p, d, t] => (p.as_str(), d.as_str(), t.as_str()),
            [d, t] => (project_id, d.as_str(), t.as_str()),
            _ => {
                return Err(job_error(
                    "invalid",
                    format!(
                        "Table \"{}\" must be qualified with a dataset (e.g. dataset.table).",
                        path.join(".")
                    ),
                ))
            }
        };
        let dataset = self.located_dataset(project_id, dataset_id, location)?;
        let table = dataset.tables.get(table_id).ok_or_else(|| {
            job_error(
                "notFound",
                format!("Not found: Table {project_id}:{dataset_id}.{table_id}"),
            )
        })?;
        let schema = Schema::from_wire(table.resource.schema.as_ref());
        let rows = match &table.resource.external_data_configuration {
            Some(external) => {
                let csv = external.csv_options.as_ref();
                self.read_objects(
                    &external.source_uris,
                    external.source_format,
                    csv.and_then(|o| o.skip_leading_rows),
                    csv.and_then(|o| o.field_delimiter.as_deref()),
                    &schema,
                )?
            }
            None => table.rows.clone(),
        };
        select
            .evaluate(Some((&schema, &rows)))
            .map_err(|m| job_error("invalidQuery", m))
    }

    fn read_objects(
        &self,
        source_uris: &[String],
        format: SourceFormat,
        skip_leading_rows: Option<i64>,
        field_delimiter: Option<&str>,
        schema: &Schema,
    ) -> Result<Vec<Map<String, Value>>, ErrorProto> {
        let mut rows = vec![];
        for pattern in source_uris {
            let mut matched = self.objects.iter().filter(|(uri, _)| uri_matches(pattern, uri)).peekable();
            if matched.peek().is_none() {
                return Err(job_error("notFound", format!("Not found: URI {pattern}")));
            }
            for (uri, content) in matched {
                let parsed = match format {
                    SourceFormat::Csv => parse_csv(
                        content,
                        skip_leading_rows.unwrap_or_default().max(0) as usize,
                        field_delimiter.and_then(|d| d.bytes().next()).unwrap_or(b','),
                        schema,
                    ),
                    SourceFormat::NewlineDelimitedJson => parse_ndjson(content),
                    other => Err(format!("{other:?} files cannot be read")),
                };
                rows.extend(parsed.map_err(|m| job_error("invalid", format!("Error while reading {uri}: {m}")))?);
            }
        }
        Ok(rows)
    }

    fn write_table(
        &mut self,
        destination: &TableReference,
        location: &str,
        schema: Schema,
        rows: Vec<Map<String, Value>>,
        create: CreateDisposition,
        write: WriteDisposition,
    ) -> Result<(), ErrorProto> {
        let etag = self.etag();
        let TableReference {
            project_id,
            dataset_id,
            table_id,
        } = destination;
        let name = format!("{project_id}:{dataset_id}.{table_id}");
        self.located_dataset(project_id, dataset_id, location)?;
        let Some(dataset) = self.datasets.get_mut(&(project_id.clone(), dataset_id.clone())) else {
            return Err(job_error("notFound", format!("Not found: Dataset {project_id}:{dataset_id}")));
        };
        let now = now_millis();
        match dataset.tables.get_mut(table_id) {
            Some(existing) => {
                if existing.resource.external_data_configuration.is_some() {
                    return Err(job_error("invalid", format!("Cannot write to external table {name}")));
                }
                match write {
                    WriteDisposition::WriteEmpty if !existing.rows.is_empty() => {
                        return Err(job_error("duplicate", format!("Already Exists: Table {name}")));
                    }
                    WriteDisposition::WriteTruncate => {
                        existing.rows = rows;
                        existing.resource.schema = Some(schema.to_wire());
                    }
                    _ => existing.rows.extend(rows),
                }
                existing.resource.etag = etag;
                existing.resource.last_modified_time = now;
            }
            None if create == CreateDisposition::CreateNever => {
                return Err(job_error("notFound", format!("Not found: Table {name}")));
            }
            None => {
                let resource = Table {
                    kind: "bigquery#table".to_string(),
                    etag,
                    id: name,
                    table_reference: destination.clone(),
                    schema: Some(schema.to_wire()),
                    creation_time: now,
                    last_modified_time: now,
                    expiration_time: dataset.resource.default_table_expiration_ms.map(|ms| now + ms),
                    table_type: "TABLE".to_string(),
                    location: dataset.resource.location.clone(),
                    ..Default::default()
                };
                dataset.tables.insert(
                    table_id.clone(),
                    StoredTable {
                        resource,
                        rows,
                        insert_ids: HashSet::new(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Moves a job one state forward and runs it when it reaches DONE.
    fn advance(&mut self, key: &(String, String)) {
        let stall = self.stall_jobs;
        let Some(stored) = self.jobs.get_mut(key) else {
            return;
        };
        let current = stored.job.status.state;
        match current {
            JobState::Pending => stored.job.status.state = JobState::Running,
            JobState::Running if !stall => {
                let location = stored.job.job_reference.location.clone().unwrap_or_default();
                let job = stored.job.configuration.job.clone();
                let outcome = self.execute(&key.0, &location, &job);
                if let Some(stored) = self.jobs.get_mut(key) {
                    finish(stored, outcome);
                }
            }
            _ => {}
        }
    }
}

fn finish(stored: &mut StoredJob, outcome: Result<Option<ResultSet>, ErrorProto>) {
    stored.job.status.state = JobState::Done;
    match outcome {
        Ok(result) => stored.result = result,
        Err(error) => {
            tracing::debug!(job_id = %stored.job.job_reference.job_id, %error, "job failed");
            stored.job.status.errors = Some(vec![error.clone()]);
            stored.job.status.error_result = Some(error);
        }
    }
}

impl StoredTable {
    /// The resource with row statistics filled in.
    fn snapshot(&self) -> Table {
        let mut table = self.resource.clone();
        if table.external_data_configuration.is_none() && table.view.is_none() {
            table.num_rows = Some(self.rows.len() as u64);
            table.num_bytes = Some(
                self.rows
                    .iter()
                    .map(|r| serde_json::to_vec(r).map(|v| v.len() as i64).unwrap_or_default())
                    .sum(),
            );
        }
        table
    }
}

#[async_trait]
impl WarehouseService for InMemoryWarehouse {
    async fn insert_dataset(&self, dataset: &Dataset) -> Result<Dataset, Error> {
        let reference = &dataset.dataset_reference;
        if reference.project_id.is_empty() || reference.dataset_id.is_empty() {
            return Err(invalid("Dataset reference is required"));
        }
        let location = match dataset.location.as_str() {
            "" => Location::Us,
            location => Location::from_service(location),
        };
        if let Some(ms) = dataset.default_table_expiration_ms {
            check_default_expiration(ms)?;
        }
        let mut state = self.lock();
        let key = (reference.project_id.clone(), reference.dataset_id.clone());
        if state.datasets.contains_key(&key) {
            return Err(duplicate(format!("Dataset {}:{}", key.0, key.1)));
        }
        let now = now_millis();
        let resource = Dataset {
            kind: "bigquery#dataset".to_string(),
            etag: state.etag(),
            id: format!("{}:{}", key.0, key.1),
            location: location.as_str().to_string(),
            creation_time: now,
            last_modified_time: now,
            ..dataset.clone()
        };
        state.datasets.insert(
            key,
            StoredDataset {
                resource: resource.clone(),
                tables: BTreeMap::new(),
                concurrent_writer: false,
            },
        );
        Ok(resource)
    }

    async fn get_dataset(&self, project_id: &str, dataset_id: &str) -> Result<Dataset, Error> {
        Ok(self.lock().dataset(project_id, dataset_id)?.resource.clone())
    }

    async fn list_datasets(&self, project_id: &str, page_token: Option<&str>) -> Result<ListDatasetsResponse, Error> {
        let datasets: Vec<DatasetOverview> = self
            .lock()
            .datasets
            .values()
            .filter(|d| d.resource.dataset_reference.project_id == project_id)
            .map(|d| DatasetOverview {
                id: d.resource.id.clone(),
                dataset_reference: d.resource.dataset_reference.clone(),
                labels: d.resource.labels.clone(),
                friendly_name: d.resource.friendly_name.clone(),
                location: Some(d.resource.location.clone()),
            })
            .collect();
        let (datasets, next_page_token) = self.page(datasets, page_token, None)?;
        Ok(ListDatasetsResponse {
            etag: String::new(),
            datasets,
            next_page_token,
        })
    }

    async fn patch_dataset(
        &self,
        project_id: &str,
        dataset_id: &str,
        body: &Value,
        etag: Option<&str>,
    ) -> Result<Dataset, Error> {
        let Value::Object(fields) = body else {
            return Err(invalid("Patch body must be a JSON object"));
        };
        let mut state = self.lock();
        let concurrent_etag = state.etag();
        let next_etag = state.etag();
        let stored = state.dataset_mut(project_id, dataset_id)?;
        if stored.concurrent_writer {
            stored.concurrent_writer = false;
            stored.resource.etag = concurrent_etag;
        }
        if etag.is_some_and(|e| e != stored.resource.etag) {
            return Err(precondition_failed());
        }
        let mut updated = stored.resource.clone();
        for (key, value) in fields {
            match key.as_str() {
                "description" => updated.description = optional_string(key, value)?,
                "friendlyName" => updated.friendly_name = optional_string(key, value)?,
                "defaultTableExpirationMs" => {
                    updated.default_table_expiration_ms = optional_i64(key, value)?;
                    if let Some(ms) = updated.default_table_expiration_ms {
                        check_default_expiration(ms)?;
                    }
                }
                "labels" => updated.labels = merge_labels(updated.labels.take(), value)?,
                "access" => {
                    updated.access = match value {
                        Value::Null => vec![],
                        value => serde_json::from_value::<Vec<Access>>(value.clone())
                            .map_err(|e| invalid(format!("Invalid access entries: {e}")))?,
                    }
                }
                "location" if value.as_str().is_some_and(|l| !l.eq_ignore_ascii_case(&updated.location)) => {
                    return Err(invalid("Cannot change dataset location"));
                }
                _ => {}
            }
        }
        updated.etag = next_etag;
        updated.last_modified_time = now_millis();
        stored.resource = updated.clone();
        Ok(updated)
    }

    async fn delete_dataset(&self, project_id: &str, dataset_id: &str, delete_contents: bool) -> Result<(), Error> {
        let mut state = self.lock();
        let stored = state.dataset(project_id, dataset_id)?;
        if !delete_contents && !stored.tables.is_empty() {
            return Err(Error::Response(ErrorResponse::new(
                400,
                "resourceInUse",
                format!("Dataset {project_id}:{dataset_id} is still in use"),
            )));
        }
        state.datasets.remove(&(project_id.to_string(), dataset_id.to_string()));
        Ok(())
    }

    async fn insert_table(&self, table: &Table) -> Result<Table, Error> {
        let TableReference {
            project_id,
            dataset_id,
            table_id,
        } = &table.table_reference;
        if project_id.is_empty() || dataset_id.is_empty() || table_id.is_empty() {
            return Err(invalid("Table reference is required"));
        }
        let schema = Schema::from_wire(table.schema.as_ref());
        if !schema.is_empty() {
            schema.validate().map_err(|e| invalid(e.to_string()))?;
        }
        if let Some(field) = table.time_partitioning.as_ref().and_then(|p| p.field.as_ref()) {
            match schema.field(field) {
                Some(f) if f.field_type.is_partitionable() && f.mode != FieldMode::Repeated => {}
                _ => return Err(invalid(format!("Invalid time partitioning field {field}"))),
            }
        }
        let mut state = self.lock();
        let etag = state.etag();
        let dataset = state.dataset_mut(project_id, dataset_id)?;
        if dataset.tables.contains_key(table_id) {
            return Err(duplicate(format!("Table {project_id}:{dataset_id}.{table_id}")));
        }
        let now = now_millis();
        let table_type = if table.view.is_some() {
            "VIEW"
        } else if table.external_data_configuration.is_some() {
            "EXTERNAL"
        } else {
            "TABLE"
        };
        let resource = Table {
            kind: "bigquery#table".to_string(),
            etag,
            id: format!("{project_id}:{dataset_id}.{table_id}"),
            creation_time: now,
            last_modified_time: now,
            expiration_time: table
                .expiration_time
                .or(dataset.resource.default_table_expiration_ms.map(|ms| now + ms)),
            table_type: table_type.to_string(),
            location: dataset.resource.location.clone(),
            num_rows: None,
            num_bytes: None,
            ..table.clone()
        };
        let stored = StoredTable {
            resource,
            rows: vec![],
            insert_ids: HashSet::new(),
        };
        let snapshot = stored.snapshot();
        dataset.tables.insert(table_id.clone(), stored);
        Ok(snapshot)
    }

    async fn get_table(&self, project_id: &str, dataset_id: &str, table_id: &str) -> Result<Table, Error> {
        Ok(self.lock().table(project_id, dataset_id, table_id)?.snapshot())
    }

    async fn list_tables(
        &self,
        project_id: &str,
        dataset_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListTablesResponse, Error> {
        let tables: Vec<TableOverview> = self
            .lock()
            .dataset(project_id, dataset_id)?
            .tables
            .values()
            .map(|t| TableOverview {
                id: t.resource.id.clone(),
                table_reference: t.resource.table_reference.clone(),
                friendly_name: t.resource.friendly_name.clone(),
                table_type: t.resource.table_type.clone(),
                time_partitioning: t.resource.time_partitioning.clone(),
                labels: t.resource.labels.clone(),
                creation_time: t.resource.creation_time,
                expiration_time: t.resource.expiration_time,
            })
            .collect();
        let total_items = Some(tables.len() as i64);
        let (tables, next_page_token) = self.page(tables, page_token, None)?;
        Ok(ListTablesResponse {
            etag: String::new(),
            next_page_token,
            tables,
            total_items,
        })
    }

    async fn patch_table(
        &self,
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
        body: &Value,
        etag: Option<&str>,
    ) -> Result<Table, Error> {
        let Value::Object(fields) = body else {
            return Err(invalid("Patch body must be a JSON object"));
        };
        let mut state = self.lock();
        let next_etag = state.etag();
        let stored = state.table_mut(project_id, dataset_id, table_id)?;
        if etag.is_some_and(|e| e != stored.resource.etag) {
            return Err(precondition_failed());
        }
        let mut updated = stored.resource.clone();
        for (key, value) in fields {
            match key.as_str() {
                "description" => updated.description = optional_string(key, value)?,
                "friendlyName" => updated.friendly_name = optional_string(key, value)?,
                "expirationTime" => updated.expiration_time = optional_i64(key, value)?,
                "labels" => updated.labels = merge_labels(updated.labels.take(), value)?,
                _ => {}
            }
        }
        if updated.expiration_time.is_some_and(|e| e < updated.creation_time) {
            return Err(invalid("Expiration time must not be before the creation time"));
        }
        updated.etag = next_etag;
        updated.last_modified_time = now_millis();
        stored.resource = updated;
        Ok(stored.snapshot())
    }

    async fn delete_table(&self, project_id: &str, dataset_id: &str, table_id: &str) -> Result<(), Error> {
        let mut state = self.lock();
        let dataset = state.dataset_mut(project_id, dataset_id)?;
        dataset
            .tables
            .remove(table_id)
            .map(|_| ())
            .ok_or_else(|| not_found(format!("Table {project_id}:{dataset_id}.{table_id}")))
    }

    async fn insert_job(&self, job: &Job) -> Result<Job, Error> {
        let reference = &job.job_reference;
        if reference.project_id.is_empty() {
            return Err(invalid("Job reference is required"));
        }
        let job_id = match reference.job_id.as_str() {
            "" => crate::job::new_job_id(),
            id => id.to_string(),
        };
        let location = parse_location(reference.location.as_deref());
        let mut state = self.lock();
        let key = (reference.project_id.clone(), job_id.clone());
        if state.jobs.contains_key(&key) {
            return Err(duplicate(format!("Job {}:{location}.{job_id}", key.0)));
        }
        let job_type = match &job.configuration.job {
            JobType::Query(_) => "QUERY",
            JobType::Load(_) => "LOAD",
            JobType::Copy(_) => "COPY",
        };
        let stored = Job {
            kind: "bigquery#job".to_string(),
            etag: state.etag(),
            id: format!("{}:{location}.{job_id}", key.0),
            job_reference: JobReference {
                project_id: key.0.clone(),
                job_id,
                location: Some(location.as_str().to_string()),
            },
            configuration: JobConfiguration {
                job_type: job_type.to_string(),
                ..job.configuration.clone()
            },
            status: JobStatus::default(),
            ..job.clone()
        };
        state.jobs.insert(
            key,
            StoredJob {
                job: stored.clone(),
                result: None,
            },
        );
        Ok(stored)
    }

    async fn get_job(&self, project_id: &str, job_id: &str, location: Option<&str>) -> Result<Job, Error> {
        let mut state = self.lock();
        let key = (project_id.to_string(), job_id.to_string());
        let stored = state
            .jobs
            .get(&key)
            .ok_or_else(|| not_found(format!("Job {project_id}:{job_id}")))?;
        let job_location = stored.job.job_reference.location.as_deref().unwrap_or_default();
        if location.is_some_and(|l| !l.eq_ignore_ascii_case(job_location)) {
            return Err(not_found(format!("Job {project_id}:{job_id}")));
        }
        state.advance(&key);
        Ok(state.jobs.get(&key).map(|j| j.job.clone()).unwrap_or_default())
    }

    async fn query(&self, project_id: &str, request: &QueryRequest) -> Result<QueryResponse, Error> {
        if request.use_legacy_sql {
            return Err(Error::Response(ErrorResponse::new(
                400,
                "invalidQuery",
                "Legacy SQL is not supported",
            )));
        }
        let location = parse_location(Some(request.location.as_str()).filter(|l| !l.is_empty()));
        let job_reference = JobReference {
            project_id: project_id.to_string(),
            job_id: crate::job::new_job_id(),
            location: Some(location.as_str().to_string()),
        };
        let mut state = self.lock();
        let job = Job {
            kind: "bigquery#job".to_string(),
            etag: state.etag(),
            id: format!("{project_id}:{location}.{}", job_reference.job_id),
            configuration: JobConfiguration {
                job_type: "QUERY".to_string(),
                job: JobType::Query(JobConfigurationQuery {
                    query: request.query.clone(),
                    default_dataset: request.default_dataset.clone(),
                    use_legacy_sql: Some(false),
                    ..Default::default()
                }),
                dry_run: request.dry_run,
                ..Default::default()
            },
            job_reference: job_reference.clone(),
            ..Default::default()
        };
        let key = (project_id.to_string(), job_reference.job_id.clone());
        let mut stored = StoredJob { job, result: None };
        if state.defer_queries {
            state.jobs.insert(key, stored);
            return Ok(QueryResponse {
                kind: "bigquery#queryResponse".to_string(),
                job_reference,
                job_complete: false,
                ..Default::default()
            });
        }

        let outcome = state.execute(project_id, location.as_str(), &stored.job.configuration.job);
        finish(&mut stored, outcome);
        let error = stored.job.status.error_result.clone();
        let result = stored.result.clone();
        state.jobs.insert(key, stored);
        drop(state);
        if let Some(error) = error {
            return Err(proto_to_response(&error));
        }
        let result = result.unwrap_or_else(|| ResultSet {
            schema: Schema::default(),
            rows: vec![],
        });
        let (rows, page_token) = self.result_page(&result, None, None, request.max_results)?;
        Ok(QueryResponse {
            kind: "bigquery#queryResponse".to_string(),
            schema: Some(result.schema.to_wire()),
            job_reference,
            total_rows: Some(result.rows.len() as u64),
            page_token,
            rows: Some(rows),
            job_complete: true,
            errors: None,
        })
    }

    async fn get_query_results(
        &self,
        project_id: &str,
        job_id: &str,
        request: &GetQueryResultsRequest,
    ) -> Result<GetQueryResultsResponse, Error> {
        let (job, result) = {
            let state = self.lock();
            let stored = state
                .jobs
                .get(&(project_id.to_string(), job_id.to_string()))
                .ok_or_else(|| not_found(format!("Job {project_id}:{job_id}")))?;
            (stored.job.clone(), stored.result.clone())
        };
        if job.status.state != JobState::Done {
            return Ok(GetQueryResultsResponse {
                kind: "bigquery#getQueryResultsResponse".to_string(),
                job_reference: job.job_reference,
                job_complete: false,
                ..Default::default()
            });
        }
        if let Some(error) = &job.status.error_result {
            return Err(proto_to_response(error));
        }
        let result = result.ok_or_else(|| invalid(format!("Job {project_id}:{job_id} is not a query job")))?;
        let (rows, page_token) = self.result_page(
            &result,
            request.page_token.as_deref(),
            request.start_index,
            request.max_results,
        )?;
        Ok(GetQueryResultsResponse {
            kind: "bigquery#getQueryResultsResponse".to_string(),
            etag: job.etag,
            schema: Some(result.schema.to_wire()),
            job_reference: job.job_reference,
            total_rows: Some(result.rows.len() as u64),
            page_token,
            rows: Some(rows),
            job_complete: true,
            errors: None,
        })
    }

    async fn insert_all(
        &self,
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
        request: &InsertAllRequest<Value>,
    ) -> Result<InsertAllResponse, Error> {
        let mut state = self.lock();
        let etag = state.etag();
        let table = state.table_mut(project_id, dataset_id, table_id)?;
        if table.resource.external_data_configuration.is_some() || table.resource.view.is_some() {
            return Err(invalid(format!(
                "Cannot add rows to a table of type {}: {project_id}:{dataset_id}.{table_id}",
                table.resource.table_type
            )));
        }
        let schema = Schema::from_wire(table.resource.schema.as_ref());
        let violations: Vec<_> = request.rows.iter().map(|r| schema.check_row(&r.json)).collect();
        let any_invalid = violations.iter().any(|v| !v.is_empty());
        let skip_invalid = request.skip_invalid_rows.unwrap_or(false);

        let mut insert_errors = vec![];
        let mut inserted = 0;
        for (index, (row, violations)) in request.rows.iter().zip(violations).enumerate() {
            if !violations.is_empty() {
                insert_errors.push(RowError {
                    index,
                    errors: violations
                        .into_iter()
                        .map(|v| ErrorMessage {
                            reason: "invalid".to_string(),
                            location: v.location,
                            message: v.message,
                            ..Default::default()
                        })
                        .collect(),
                });
                continue;
            }
            if any_invalid && !skip_invalid {
                insert_errors.push(RowError {
                    index,
                    errors: vec![ErrorMessage {
                        reason: "stopped".to_string(),
                        ..Default::default()
                    }],
                });
                continue;
            }
            if let Some(insert_id) = &row.insert_id {
                if !table.insert_ids.insert(insert_id.clone()) {
                    continue;
                }
            }
            if let Value::Object(map) = &row.json {
                table.rows.push(map.clone());
                inserted += 1;
            }
        }
        if inserted > 0 {
            table.resource.etag = etag;
            table.resource.last_modified_time = now_millis();
        }
        Ok(InsertAllResponse {
            kind: "bigquery#tableDataInsertAllResponse".to_string(),
            insert_errors: (!insert_errors.is_empty()).then_some(insert_errors),
        })
    }
}

fn not_found(what: impl Display) -> Error {
    Error::Response(ErrorResponse::new(404, "notFound", format!("Not found: {what}")))
}

fn duplicate(what: impl Display) -> Error {
    Error::Response(ErrorResponse::new(409, "duplicate", format!("Already Exists: {what}")))
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Response(ErrorResponse::new(400, "invalid", message))
}

fn precondition_failed() -> Error {
    Error::Response(ErrorResponse::new(412, "conditionNotMet", "Precondition check failed."))
}

fn job_error(reason: &str, message: impl Into<String>) -> ErrorProto {
    ErrorProto {
        reason: Some(reason.to_string()),
        message: Some(message.into()),
        ..Default::default()
    }
}

/// The HTTP error `jobs.query` and `jobs.getQueryResults` answer with for a failed job.
fn proto_to_response(error: &ErrorProto) -> Error {
    let reason = error.reason.as_deref().unwrap_or("invalid");
    let code = match reason {
        "notFound" => 404,
        "duplicate" => 409,
        "accessDenied" => 403,
        _ => 400,
    };
    Error::Response(ErrorResponse::new(code, reason, error.message.clone().unwrap_or_default()))
}

fn parse_location(location: Option<&str>) -> Location {
    location.map(Location::from_service).unwrap_or(Location::Us)
}

fn check_default_expiration(ms: i64) -> Result<(), Error> {
    if ms < 3_600_000 {
        return Err(invalid("Default table expiration must be at least one hour"));
    }
    Ok(())
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn optional_string(key: &str, value: &Value) -> Result<Option<String>, Error> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(invalid(format!("Invalid value for {key}: {other}"))),
    }
}

fn optional_i64(key: &str, value: &Value) -> Result<Option<i64>, Error> {
    match value {
        Value::Null => Some(None),
        Value::Number(n) => n.as_i64().map(Some),
        Value::String(s) => s.parse::<i64>().ok().map(Some),
        _ => None,
    }
    .ok_or_else(|| invalid(format!("Invalid value for {key}: {value}")))
}

/// PATCH merges label maps: a null value removes the key.
fn merge_labels(
    current: Option<HashMap<String, String>>,
    patch: &Value,
) -> Result<Option<HashMap<String, String>>, Error> {
    let Value::Object(patch) = patch else {
        return match patch {
            Value::Null => Ok(None),
            other => Err(invalid(format!("Invalid labels: {other}"))),
        };
    };
    let mut labels = current.unwrap_or_default();
    for (key, value) in patch {
        match value {
            Value::Null => {
                labels.remove(key);
            }
            Value::String(v) => {
                labels.insert(key.clone(), v.clone());
            }
            other => return Err(invalid(format!("Invalid label value for {key}: {other}"))),
        }
    }
    Ok((!labels.is_empty()).then_some(labels))
}

/// `gs://b/dir/*.csv` style matching with at most one wildcard.
fn uri_matches(pattern: &str, uri: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            uri.len() >= prefix.len() + suffix.len() && uri.starts_with(prefix) && uri.ends_with(suffix)
        }
        None => pattern == uri,
    }
}

fn parse_csv(content: &str, skip: usize, delimiter: u8, schema: &Schema) -> Result<Vec<Map<String, Value>>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut rows = vec![];
    for record in reader.records().skip(skip) {
        let record = record.map_err(|e| e.to_string())?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() > schema.fields().len() {
            return Err(format!(
                "line {line}: too many values, expected {} but got {}",
                schema.fields().len(),
                record.len()
            ));
        }
        let mut row = Map::new();
        for (field, text) in schema.fields().iter().zip(record.iter()) {
            let value = csv_value(field, text).map_err(|m| format!("line {line}: {m}"))?;
            row.insert(field.name.clone(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn csv_value(field: &Field, text: &str) -> Result<Value, String> {
    if text.is_empty() {
        return Ok(Value::Null);
    }
    let invalid = || format!("could not parse '{text}' as {:?} for field {}", field.field_type, field.name);
    match field.field_type {
        FieldType::Integer => text.parse::<i64>().map(Value::from).map_err(|_| invalid()),
        FieldType::Float => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        FieldType::Boolean => match text.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        _ => Ok(Value::String(text.to_string())),
    }
}

fn parse_ndjson(content: &str) -> Result<Vec<Map<String, Value>>, String> {
    let mut rows = vec![];
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(row)) => rows.push(row),
            Ok(_) => return Err(format!("line {}: expected a JSON object", line_no + 1)),
            Err(e) => return Err(format!("line {}: {e}", line_no + 1)),
        }
    }
    Ok(rows)
}

fn encode_row(schema: &Schema, row: &[Value]) -> Tuple {
    Tuple {
        f: schema
            .fields()
            .iter()
            .zip(row)
            .map(|(field, value)| Cell {
                v: encode(field, value),
            })
            .collect(),
    }
}

/// Encodes a JSON value the way `tabledata` cells carry it: scalars as strings, records as
/// nested tuples and repeated fields as arrays of cells.
fn encode(field: &Field, value: &Value) -> CellValue {
    match (field.mode, value) {
        (FieldMode::Repeated, Value::Array(items)) => CellValue::Array(
            items
                .iter()
                .map(|item| Cell {
                    v: encode_scalar(field, item),
                })
                .collect(),
        ),
        _ => encode_scalar(field, value),
    }
}

fn encode_scalar(field: &Field, value: &Value) -> CellValue {
    match (field.field_type, value) {
        (_, Value::Null) => CellValue::Null,
        (FieldType::Record, Value::Object(map)) => CellValue::Struct(Tuple {
            f: field
                .fields
                .iter()
                .map(|sub| Cell {
                    v: encode(sub, sql::lookup(map, &sub.name)),
                })
                .collect(),
        }),
        (FieldType::Json, value) => CellValue::String(value.to_string()),
        (FieldType::Timestamp, Value::String(s)) => match parse_timestamp(s) {
            Some(ts) => CellValue::String(((ts.unix_timestamp_nanos() / 1_000) as f64 / 1e6).to_string()),
            None => CellValue::String(s.clone()),
        },
        (FieldType::Datetime, Value::String(s)) => CellValue::String(s.replacen(' ', "T", 1)),
        (_, Value::String(s)) => CellValue::String(s.clone()),
        (_, Value::Bool(b)) => CellValue::String(b.to_string()),
        (_, Value::Number(n)) => CellValue::String(n.to_string()),
        (_, other) => CellValue::String(other.to_string()),
    }
}

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::client::Context;
use crate::dataset::{from_millis, validate_dataset_id};
use crate::error::Error;
use crate::http::job::{
    CreateDisposition, JobConfigurationLoad, JobConfigurationQuery, JobConfigurationTableCopy, JobType,
    WriteDisposition,
};
use crate::http::table::list::TableOverview;
use crate::http::table::{
    CsvOptions, ExternalDataConfiguration, GoogleSheetsOptions, SourceFormat, Table as WireTable, TableReference,
    TimePartitionType, TimePartitioning,
};
use crate::job;
use crate::location::Location;
use crate::mask::{FieldMask, TableField};
use crate::schema::{FieldMode, Schema};
use crate::sql;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableType {
    Native,
    External,
    View,
}

impl TableType {
    fn from_wire(value: &str) -> Self {
        match value {
            "EXTERNAL" => TableType::External,
            "VIEW" | "MATERIALIZED_VIEW" => TableType::View,
            _ => TableType::Native,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Granularity {
    Hour,
    #[default]
    Day,
    Month,
    Year,
}

impl Granularity {
    fn to_wire(self) -> TimePartitionType {
        match self {
            Granularity::Hour => TimePartitionType::Hour,
            Granularity::Day => TimePartitionType::Day,
            Granularity::Month => TimePartitionType::Month,
            Granularity::Year => TimePartitionType::Year,
        }
    }

    fn from_wire(value: TimePartitionType) -> Self {
        match value {
            TimePartitionType::Hour => Granularity::Hour,
            TimePartitionType::Day => Granularity::Day,
            TimePartitionType::Month => Granularity::Month,
            TimePartitionType::Year => Granularity::Year,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Partitioning {
    #[default]
    None,
    /// Partitioned by load or insert time.
    IngestionTime {
        granularity: Granularity,
        expiration: Option<Duration>,
    },
    /// Partitioned by a top level DATE, TIMESTAMP or DATETIME column.
    Column {
        field: String,
        granularity: Granularity,
        expiration: Option<Duration>,
    },
}

impl Partitioning {
    fn to_wire(&self) -> Option<TimePartitioning> {
        let (field, granularity, expiration) = match self {
            Partitioning::None => return None,
            Partitioning::IngestionTime {
                granularity,
                expiration,
            } => (None, granularity, expiration),
            Partitioning::Column {
                field,
                granularity,
                expiration,
            } => (Some(field.clone()), granularity, expiration),
        };
        Some(TimePartitioning {
            partition_type: granularity.to_wire(),
            expiration_ms: expiration.map(|d| d.as_millis() as i64),
            field,
        })
    }

    fn from_wire(value: Option<&TimePartitioning>) -> Self {
        let Some(value) = value else {
            return Partitioning::None;
        };
        let granularity = Granularity::from_wire(value.partition_type);
        let expiration = value.expiration_ms.map(|ms| Duration::from_millis(ms.max(0) as u64));
        match &value.field {
            Some(field) => Partitioning::Column {
                field: field.clone(),
                granularity,
                expiration,
            },
            None => Partitioning::IngestionTime {
                granularity,
                expiration,
            },
        }
    }

    fn validate(&self, schema: &Schema) -> Result<(), Error> {
        if let Partitioning::Column { field, .. } = self {
            let column = schema
                .field(field)
                .ok_or_else(|| Error::validation(format!("partitioning field '{field}' is not in the schema")))?;
            if !column.field_type.is_partitionable() || column.mode == FieldMode::Repeated {
                return Err(Error::validation(format!(
                    "partitioning field '{field}' must be a DATE, TIMESTAMP or DATETIME column"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    NewlineDelimitedJson,
    Avro,
    Parquet,
    Orc,
    GoogleSheets,
}

impl DataFormat {
    fn to_wire(self) -> SourceFormat {
        match self {
            DataFormat::Csv => SourceFormat::Csv,
            DataFormat::NewlineDelimitedJson => SourceFormat::NewlineDelimitedJson,
            DataFormat::Avro => SourceFormat::Avro,
            DataFormat::Parquet => SourceFormat::Parquet,
            DataFormat::Orc => SourceFormat::Orc,
            DataFormat::GoogleSheets => SourceFormat::GoogleSheets,
        }
    }

    fn from_wire(value: SourceFormat) -> Option<Self> {
        match value {
            SourceFormat::Csv => Some(DataFormat::Csv),
            SourceFormat::NewlineDelimitedJson => Some(DataFormat::NewlineDelimitedJson),
            SourceFormat::Avro => Some(DataFormat::Avro),
            SourceFormat::Parquet => Some(DataFormat::Parquet),
            SourceFormat::Orc => Some(DataFormat::Orc),
            SourceFormat::GoogleSheets => Some(DataFormat::GoogleSheets),
            _ => None,
        }
    }

    fn supports_skip_leading_rows(&self) -> bool {
        matches!(self, DataFormat::Csv | DataFormat::GoogleSheets)
    }
}

/// Where the rows of an external table live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalSource {
    pub source_uris: Vec<String>,
    pub format: DataFormat,
    pub skip_leading_rows: Option<u64>,
}

impl ExternalSource {
    fn to_wire(&self) -> ExternalDataConfiguration {
        let skip = self.skip_leading_rows.map(|n| n as i64);
        ExternalDataConfiguration {
            source_uris: self.source_uris.clone(),
            source_format: self.format.to_wire(),
            csv_options: (self.format == DataFormat::Csv).then(|| CsvOptions {
                skip_leading_rows: skip,
                ..Default::default()
            }),
            google_sheets_options: (self.format == DataFormat::GoogleSheets).then(|| GoogleSheetsOptions {
                skip_leading_rows: skip,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn from_wire(value: &ExternalDataConfiguration) -> Option<Self> {
        let skip = value
            .csv_options
            .as_ref()
            .and_then(|o| o.skip_leading_rows)
            .or_else(|| value.google_sheets_options.as_ref().and_then(|o| o.skip_leading_rows));
        Some(Self {
            source_uris: value.source_uris.clone(),
            format: DataFormat::from_wire(value.source_format)?,
            skip_leading_rows: skip.map(|n| n.max(0) as u64),
        })
    }

    fn validate(&self) -> Result<(), Error> {
        if self.source_uris.is_empty() {
            return Err(Error::validation("external table needs at least one source uri"));
        }
        for uri in &self.source_uris {
            validate_source_uri(uri, self.format)?;
        }
        if self.skip_leading_rows.is_some() && !self.format.supports_skip_leading_rows() {
            return Err(Error::validation(format!(
                "skip_leading_rows is only supported for CSV and Google Sheets, not {:?}",
                self.format
            )));
        }
        Ok(())
    }
}

fn validate_source_uri(uri: &str, format: DataFormat) -> Result<(), Error> {
    if format == DataFormat::GoogleSheets && uri.starts_with("https://docs.google.com/spreadsheets/") {
        return Ok(());
    }
    let valid = uri
        .strip_prefix("gs://")
        .and_then(|rest| rest.split_once('/'))
        .is_some_and(|(bucket, object)| !bucket.is_empty() && !object.is_empty());
    if !valid {
        return Err(Error::validation(format!("source uri must look like gs://bucket/object: '{uri}'")));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    pub schema: Schema,
    pub table_type: TableType,
    pub description: Option<String>,
    pub labels: HashMap<String, String>,
    pub creation_time: OffsetDateTime,
    pub last_modified_time: OffsetDateTime,
    /// Absolute point in time the table is deleted at.
    pub expiration_time: Option<OffsetDateTime>,
    pub partitioning: Partitioning,
    pub num_rows: u64,
    pub num_bytes: u64,
    pub external_source: Option<ExternalSource>,
    pub location: Option<Location>,
    pub etag: String,
}

impl Table {
    fn from_wire(value: WireTable) -> Result<Self, Error> {
        Ok(Self {
            schema: Schema::from_wire(value.schema.as_ref()),
            table_type: TableType::from_wire(&value.table_type),
            partitioning: Partitioning::from_wire(value.time_partitioning.as_ref()),
            external_source: value.external_data_configuration.as_ref().and_then(ExternalSource::from_wire),
            location: match value.location.as_str() {
                "" => None,
                location => Some(Location::from_service(location)),
            },
            creation_time: from_millis(value.creation_time)?,
            last_modified_time: from_millis(value.last_modified_time)?,
            expiration_time: value.expiration_time.map(from_millis).transpose()?,
            num_rows: value.num_rows.unwrap_or_default(),
            num_bytes: value.num_bytes.unwrap_or_default().max(0) as u64,
            project_id: value.table_reference.project_id,
            dataset_id: value.table_reference.dataset_id,
            table_id: value.table_reference.table_id,
            description: value.description,
            labels: value.labels.unwrap_or_default(),
            etag: value.etag,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableSummary {
    pub dataset_id: String,
    pub table_id: String,
    pub table_type: TableType,
    pub creation_time: Option<OffsetDateTime>,
    pub expiration_time: Option<OffsetDateTime>,
    pub labels: HashMap<String, String>,
}

impl From<TableOverview> for TableSummary {
    fn from(value: TableOverview) -> Self {
        Self {
            table_type: TableType::from_wire(&value.table_type),
            creation_time: from_millis(value.creation_time).ok(),
            expiration_time: value.expiration_time.and_then(|ms| from_millis(ms).ok()),
            dataset_id: value.table_reference.dataset_id,
            table_id: value.table_reference.table_id,
            labels: value.labels.unwrap_or_default(),
        }
    }
}

/// Optional attributes for [`TableManager::create`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableOptions {
    pub description: Option<String>,
    pub expiration_time: Option<OffsetDateTime>,
    pub partitioning: Partitioning,
    pub labels: HashMap<String, String>,
}

/// New values for [`TableManager::update`]. Only fields named by the mask are read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableUpdate {
    /// `None` clears the description.
    pub description: Option<String>,
    /// Absolute expiration. `None` makes the table permanent.
    pub expiration_time: Option<OffsetDateTime>,
}

/// A table in the client's project.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(dataset_id: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }

    fn to_wire(&self, project_id: &str) -> TableReference {
        TableReference {
            project_id: project_id.to_string(),
            dataset_id: self.dataset_id.clone(),
            table_id: self.table_id.clone(),
        }
    }

    fn validate(&self) -> Result<(), Error> {
        validate_dataset_id(&self.dataset_id)?;
        validate_table_id(&self.table_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Keep existing rows.
    #[default]
    Append,
    /// Replace existing rows.
    Truncate,
    /// Fail when the table already has rows.
    Empty,
}

impl WriteMode {
    fn to_wire(self) -> WriteDisposition {
        match self {
            WriteMode::Append => WriteDisposition::WriteAppend,
            WriteMode::Truncate => WriteDisposition::WriteTruncate,
            WriteMode::Empty => WriteDisposition::WriteEmpty,
        }
    }
}

/// Files to load with [`TableManager::load`].
#[derive(Clone, Debug, PartialEq)]
pub struct LoadSource {
    pub source_uris: Vec<String>,
    pub format: DataFormat,
    /// Required when the table does not exist yet.
    pub schema: Option<Schema>,
    pub skip_leading_rows: Option<u64>,
    pub write_mode: WriteMode,
}

impl LoadSource {
    pub fn new(source_uris: Vec<String>, format: DataFormat) -> Self {
        Self {
            source_uris,
            format,
            schema: None,
            skip_leading_rows: None,
            write_mode: WriteMode::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TableManager {
    ctx: Arc<Context>,
}

impl TableManager {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn create_empty(&self, dataset_id: &str, table_id: &str, schema: Schema) -> Result<Table, Error> {
        self.create(dataset_id, table_id, schema, TableOptions::default()).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn create(
        &self,
        dataset_id: &str,
        table_id: &str,
        schema: Schema,
        options: TableOptions,
    ) -> Result<Table, Error> {
        validate_dataset_id(dataset_id)?;
        validate_table_id(table_id)?;
        schema.validate()?;
        options.partitioning.validate(&schema)?;
        let metadata = WireTable {
            table_reference: self.reference(dataset_id, table_id),
            schema: Some(schema.to_wire()),
            description: options.description,
            labels: (!options.labels.is_empty()).then_some(options.labels),
            expiration_time: options.expiration_time.map(to_millis),
            time_partitioning: options.partitioning.to_wire(),
            ..Default::default()
        };
        self.insert(metadata).await
    }

    /// Creates a table whose rows are read from files in object storage at query time.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn create_external(
        &self,
        dataset_id: &str,
        table_id: &str,
        schema: Schema,
        source_uris: Vec<String>,
        format: DataFormat,
        skip_leading_rows: Option<u64>,
    ) -> Result<Table, Error> {
        validate_dataset_id(dataset_id)?;
        validate_table_id(table_id)?;
        schema.validate()?;
        let source = ExternalSource {
            source_uris,
            format,
            skip_leading_rows,
        };
        source.validate()?;
        let metadata = WireTable {
            table_reference: self.reference(dataset_id, table_id),
            schema: Some(schema.to_wire()),
            external_data_configuration: Some(source.to_wire()),
            ..Default::default()
        };
        self.insert(metadata).await
    }

    /// Materializes the result of `query` into a new table.
    ///
    /// The destination dataset and every dataset the query reads must be in `location`. This is
    /// checked before the job is submitted, datasets that cannot be read are left for the job to
    /// report.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn create_from_query(
        &self,
        dataset_id: &str,
        table_id: &str,
        query: &str,
        location: Location,
        timeout: Option<Duration>,
    ) -> Result<Table, Error> {
        validate_dataset_id(dataset_id)?;
        validate_table_id(table_id)?;
        if query.trim().is_empty() {
            return Err(Error::validation("query must not be empty"));
        }
        self.ensure_location(&self.ctx.project_id, dataset_id, &location, true).await?;
        for (project_id, referenced) in referenced_datasets(query, &self.ctx.project_id)? {
            self.ensure_location(&project_id, &referenced, &location, false).await?;
        }
        let job = JobType::Query(JobConfigurationQuery {
            query: query.to_string(),
            destination_table: Some(self.reference(dataset_id, table_id)),
            create_disposition: Some(CreateDisposition::CreateIfNeeded),
            write_disposition: Some(WriteDisposition::WriteEmpty),
            use_legacy_sql: Some(false),
            ..Default::default()
        });
        self.run_job(location, job, timeout).await?;
        self.get_metadata(dataset_id, table_id).await
    }

    /// Copies `source` to `destination`. Both datasets must be in `location`, which is checked
    /// before the job is submitted. A failed job is returned as [`Error::JobFailed`].
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn copy(
        &self,
        source: &TableRef,
        destination: &TableRef,
        location: Location,
        timeout: Option<Duration>,
    ) -> Result<Table, Error> {
        source.validate()?;
        destination.validate()?;
        self.ensure_location(&self.ctx.project_id, &source.dataset_id, &location, true)
            .await?;
        if destination.dataset_id != source.dataset_id {
            self.ensure_location(&self.ctx.project_id, &destination.dataset_id, &location, true)
                .await?;
        }
        let job = JobType::Copy(JobConfigurationTableCopy {
            source_tables: vec![source.to_wire(&self.ctx.project_id)],
            destination_table: destination.to_wire(&self.ctx.project_id),
            create_disposition: Some(CreateDisposition::CreateIfNeeded),
            write_disposition: Some(WriteDisposition::WriteEmpty),
        });
        self.run_job(location, job, timeout).await?;
        self.get_metadata(&destination.dataset_id, &destination.table_id).await
    }

    /// Renames a table by copying it to `new_table_id` and deleting the original.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn rename(
        &self,
        dataset_id: &str,
        table_id: &str,
        new_table_id: &str,
        timeout: Option<Duration>,
    ) -> Result<Table, Error> {
        let location = self.dataset_location(&self.ctx.project_id, dataset_id).await?;
        let source = TableRef::new(dataset_id, table_id);
        let destination = TableRef::new(dataset_id, new_table_id);
        let renamed = self.copy(&source, &destination, location, timeout).await?;
        self.delete(dataset_id, table_id).await?;
        Ok(renamed)
    }

    /// Loads files from object storage into a table, creating it when needed.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn load(
        &self,
        dataset_id: &str,
        table_id: &str,
        source: LoadSource,
        timeout: Option<Duration>,
    ) -> Result<Table, Error> {
        validate_dataset_id(dataset_id)?;
        validate_table_id(table_id)?;
        if source.format == DataFormat::GoogleSheets {
            return Err(Error::validation("Google Sheets can only back external tables"));
        }
        ExternalSource {
            source_uris: source.source_uris.clone(),
            format: source.format,
            skip_leading_rows: source.skip_leading_rows,
        }
        .validate()?;
        if let Some(schema) = &source.schema {
            schema.validate()?;
        }
        let location = self.dataset_location(&self.ctx.project_id, dataset_id).await?;
        let job = JobType::Load(JobConfigurationLoad {
            source_uris: source.source_uris,
            schema: source.schema.as_ref().map(Schema::to_wire),
            destination_table: self.reference(dataset_id, table_id),
            source_format: Some(source.format.to_wire()),
            skip_leading_rows: source.skip_leading_rows.map(|n| n as i64),
            create_disposition: Some(CreateDisposition::CreateIfNeeded),
            write_disposition: Some(source.write_mode.to_wire()),
            ..Default::default()
        });
        self.run_job(location, job, timeout).await?;
        self.get_metadata(dataset_id, table_id).await
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn get_metadata(&self, dataset_id: &str, table_id: &str) -> Result<Table, Error> {
        let table = self
            .ctx
            .service
            .get_table(&self.ctx.project_id, dataset_id, table_id)
            .await?;
        Table::from_wire(table)
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn list(&self, dataset_id: &str) -> Result<Vec<TableSummary>, Error> {
        Ok(list_all(&self.ctx, dataset_id)
            .await?
            .into_iter()
            .map(TableSummary::from)
            .collect())
    }

    /// Changes exactly the fields named in `mask`.
    ///
    /// The expiration is sent as an absolute timestamp and must not be earlier than the creation
    /// time of the table.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn update(
        &self,
        dataset_id: &str,
        table_id: &str,
        mask: FieldMask<TableField>,
        values: TableUpdate,
    ) -> Result<Table, Error> {
        mask.validate()?;
        if let (true, Some(expiration)) = (mask.contains(TableField::Expiration), values.expiration_time) {
            let current = self.get_metadata(dataset_id, table_id).await?;
            if expiration < current.creation_time {
                return Err(Error::validation(format!(
                    "expiration {expiration} is before the table was created at {}",
                    current.creation_time
                )));
            }
        }
        let body = mask.to_body(|field| match field {
            TableField::Description => json!(values.description),
            TableField::Expiration => match values.expiration_time {
                Some(expiration) => Value::String(to_millis(expiration).to_string()),
                None => Value::Null,
            },
        });
        let patched = self
            .ctx
            .service
            .patch_table(&self.ctx.project_id, dataset_id, table_id, &body, None)
            .await?;
        Table::from_wire(patched)
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    pub async fn delete(&self, dataset_id: &str, table_id: &str) -> Result<(), Error> {
        self.ctx
            .service
            .delete_table(&self.ctx.project_id, dataset_id, table_id)
            .await?;
        tracing::debug!(dataset_id, table_id, "table deleted");
        Ok(())
    }

    async fn insert(&self, metadata: WireTable) -> Result<Table, Error> {
        let created = self.ctx.service.insert_table(&metadata).await?;
        tracing::debug!(table = %created.id, "table created");
        Table::from_wire(created)
    }

    async fn run_job(&self, location: Location, job: JobType, timeout: Option<Duration>) -> Result<(), Error> {
        job::run(
            self.ctx.service.as_ref(),
            &self.ctx.project_id,
            location,
            job,
            self.ctx.job_poll_interval,
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn dataset_location(&self, project_id: &str, dataset_id: &str) -> Result<Location, Error> {
        let dataset = self.ctx.service.get_dataset(project_id, dataset_id).await?;
        Ok(Location::from_service(&dataset.location))
    }

    /// Fails with [`Error::LocationMismatch`] when the dataset lives elsewhere. Unless `required`,
    /// a dataset that is missing or unreadable is skipped.
    async fn ensure_location(
        &self,
        project_id: &str,
        dataset_id: &str,
        expected: &Location,
        required: bool,
    ) -> Result<(), Error> {
        let actual = match self.dataset_location(project_id, dataset_id).await {
            Ok(actual) => actual,
            Err(Error::NotFound { .. } | Error::PermissionDenied { .. }) if !required => {
                tracing::debug!(project_id, dataset_id, "skipping location check of unreadable dataset");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if !actual.as_str().eq_ignore_ascii_case(expected.as_str()) {
            return Err(Error::LocationMismatch {
                resource: format!("{project_id}:{dataset_id}"),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    fn reference(&self, dataset_id: &str, table_id: &str) -> TableReference {
        TableReference {
            project_id: self.ctx.project_id.clone(),
            dataset_id: dataset_id.to_string(),
            table_id: table_id.to_string(),
        }
    }
}

/// Every table of a dataset, following page tokens.
pub(crate) async fn list_all(ctx: &Context, dataset_id: &str) -> Result<Vec<TableOverview>, Error> {
    let mut page_token: Option<String> = None;
    let mut tables = vec![];
    loop {
        let response = ctx
            .service
            .list_tables(&ctx.project_id, dataset_id, page_token.as_deref())
            .await?;
        tables.extend(response.tables);
        if response.next_page_token.is_none() {
            break;
        }
        page_token = response.next_page_token;
    }
    Ok(tables)
}

/// `(project, dataset)` pairs read by `query`. Two part paths belong to `default_project`,
/// unqualified tables are ignored. A query that does not parse is rejected, since its datasets
/// cannot be checked.
fn referenced_datasets(query: &str, default_project: &str) -> Result<BTreeSet<(String, String)>, Error> {
    let tables =
        sql::referenced_tables(query).map_err(|e| Error::validation(format!("query could not be parsed: {e}")))?;
    Ok(tables
        .into_iter()
        .filter_map(|path| match path.as_slice() {
            [project, dataset, _] => Some((project.clone(), dataset.clone())),
            [dataset, _] => Some((default_project.to_string(), dataset.clone())),
            _ => None,
        })
        .collect())
}

pub(crate) fn validate_table_id(table_id: &str) -> Result<(), Error> {
    if table_id.is_empty() || table_id.len() > 1024 {
        return Err(Error::validation("table id must be 1 to 1024 characters"));
    }
    if !table_id.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(Error::validation(format!(
            "table id '{table_id}' may only contain letters, numbers, dashes and underscores"
        )));
    }
    Ok(())
}

fn to_millis(value: OffsetDateTime) -> i64 {
    (value.unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use time::OffsetDateTime;

    use crate::client::Client;
    use crate::emulator::InMemoryWarehouse;
    use crate::error::Error;
    use crate::location::Location;
    use crate::mask::{FieldMask, TableField};
    use crate::schema::{Field, FieldType, Schema};
    use crate::table::{
        referenced_datasets, DataFormat, Granularity, Partitioning, TableOptions, TableRef, TableType, TableUpdate,
    };

    #[ctor::ctor]
    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("name", FieldType::String).required(),
            Field::new("created", FieldType::Timestamp),
        ])
    }

    async fn client() -> (Client, Arc<InMemoryWarehouse>) {
        let service = Arc::new(InMemoryWarehouse::new().with_page_size(2));
        let client = Client::from_service("proj", service.clone()).with_job_poll_interval(Duration::from_millis(1));
        client.dataset().create("ds", Location::Us, None, None).await.unwrap();
        (client, service)
    }

    #[test]
    fn referenced_dataset_pairs() {
        let pairs = referenced_datasets("SELECT * FROM a.t JOIN `other.b.u` USING (id) JOIN plain ON true", "proj").unwrap();
        let pairs: Vec<(String, String)> = pairs.into_iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("other".to_string(), "b".to_string()),
                ("proj".to_string(), "a".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn create_validates_locally() {
        let (client, _) = client().await;
        let err = client.table().create_empty("ds", "t", Schema::default()).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        let options = TableOptions {
            partitioning: Partitioning::Column {
                field: "name".to_string(),
                granularity: Granularity::Day,
                expiration: None,
            },
            ..Default::default()
        };
        let err = client.table().create("ds", "t", schema(), options).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(client.table().list("ds").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_with_options() {
        let (client, _) = client().await;
        let expiration = OffsetDateTime::now_utc() + time::Duration::days(1);
        let options = TableOptions {
            description: Some("events".to_string()),
            expiration_time: Some(expiration),
            partitioning: Partitioning::Column {
                field: "created".to_string(),
                granularity: Granularity::Month,
                expiration: Some(Duration::from_secs(86400)),
            },
            ..Default::default()
        };
        let table = client.table().create("ds", "events", schema(), options.clone()).await.unwrap();
        assert_eq!(table.partitioning, options.partitioning);
        assert_eq!(table.description.as_deref(), Some("events"));
        assert_eq!(table.table_type, TableType::Native);
        assert_eq!(table.location, Some(Location::Us));
        let millis = |t: OffsetDateTime| t.unix_timestamp_nanos() / 1_000_000;
        assert_eq!(table.expiration_time.map(millis), Some(millis(expiration)));

        let err = client.table().create_empty("ds", "events", schema()).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn external_table_rules() {
        let (client, _) = client().await;
        let err = client
            .table()
            .create_external("ds", "ext", schema(), vec![], DataFormat::Csv, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        let err = client
            .table()
            .create_external("ds", "ext", schema(), vec!["s3://b/o.csv".to_string()], DataFormat::Csv, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        let err = client
            .table()
            .create_external(
                "ds",
                "ext",
                schema(),
                vec!["gs://b/o.json".to_string()],
                DataFormat::NewlineDelimitedJson,
                Some(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let table = client
            .table()
            .create_external("ds", "ext", schema(), vec!["gs://b/o.csv".to_string()], DataFormat::Csv, Some(1))
            .await
            .unwrap();
        assert_eq!(table.table_type, TableType::External);
        let source = table.external_source.unwrap();
        assert_eq!(source.skip_leading_rows, Some(1));
        assert_eq!(source.format, DataFormat::Csv);
    }

    #[tokio::test]
    async fn expiration_before_creation_is_rejected() {
        let (client, _) = client().await;
        let table = client.table().create_empty("ds", "t", schema()).await.unwrap();
        let err = client
            .table()
            .update(
                "ds",
                "t",
                FieldMask::new([TableField::Expiration]),
                TableUpdate {
                    expiration_time: Some(table.creation_time - time::Duration::hours(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn rename_copies_then_deletes() {
        let (client, _) = client().await;
        client.table().create_empty("ds", "old", schema()).await.unwrap();
        let renamed = client.table().rename("ds", "old", "new", None).await.unwrap();
        assert_eq!(renamed.table_id, "new");
        assert_eq!(renamed.schema, schema());
        assert!(client.table().get_metadata("ds", "old").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn copy_into_existing_table_fails_as_job() {
        let (client, _) = client().await;
        client.table().create_empty("ds", "a", schema()).await.unwrap();
        client.table().create_empty("ds", "b", schema()).await.unwrap();
        client
            .data()
            .insert_rows("ds", "b", &[serde_json::json!({"name": "x"})])
            .await
            .unwrap();
        let err = client
            .table()
            .copy(&TableRef::new("ds", "a"), &TableRef::new("ds", "b"), Location::Us, None)
            .await
            .unwrap_err();
        match err {
            Error::JobFailed { error, .. } => assert_eq!(error.reason.as_deref(), Some("duplicate")),
            other => panic!("unexpected {other:?}"),
        }
    }
}

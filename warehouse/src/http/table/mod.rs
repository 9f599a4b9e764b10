pub mod delete;
pub mod get;
pub mod insert;
pub mod list;
pub mod patch;

use std::collections::HashMap;

#[derive(Clone, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    /// Required. The ID of the project containing this table.
    pub project_id: String,
    /// Required. The ID of the dataset containing this table.
    pub dataset_id: String,
    /// Required. The ID of the table.
    /// The ID must contain only letters (a-z, A-Z), numbers (0-9), or underscores (_).
    /// The maximum length is 1,024 characters.
    pub table_id: String,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CsvOptions {
    /// Optional. The separator character for fields in a CSV file.
    /// The default value is comma (",", U+002C).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_delimiter: Option<String>,
    /// Optional. The number of rows at the top of a CSV file that will be skipped when reading the data.
    /// The default value is 0.
    /// This property is useful if you have header rows in the file that should be skipped.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    #[serde(serialize_with = "crate::http::to_str_option")]
    pub skip_leading_rows: Option<i64>,
    /// Optional. The value that is used to quote data sections in a CSV file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    /// Optional. Indicates if rows that are missing trailing optional columns are accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_jagged_rows: Option<bool>,
    /// Optional. The character encoding of the data. The default value is UTF-8.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableFieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

#[derive(Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableFieldType {
    #[default]
    String,
    Bytes,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Record,
    Date,
    Time,
    Datetime,
    Numeric,
    Bignumeric,
    Geography,
    Interval,
    Json,
    // aliases
    Bool,
    Int64,
    Float64,
    Struct,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TableFieldSchema {
    /// Required. The field name.
    /// The name must contain only letters (a-z, A-Z), numbers (0-9), or underscores (_),
    /// and must start with a letter or underscore.
    /// The maximum length is 300 characters.
    pub name: String,
    /// Required. The field data type.
    /// Use of RECORD/STRUCT indicates that the field contains a nested schema.
    #[serde(rename = "type")]
    pub data_type: TableFieldType,
    /// Optional. The field mode. Possible values include NULLABLE, REQUIRED and REPEATED.
    /// The default value is NULLABLE.
    #[serde(default)]
    pub mode: Option<TableFieldMode>,
    /// Optional. Describes the nested schema fields if the type property is set to RECORD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<TableFieldSchema>>,
    /// Optional. The field description. The maximum length is 1,024 characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Describes the fields in a table.
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimePartitionType {
    Hour,
    #[default]
    Day,
    Month,
    Year,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimePartitioning {
    /// Required. The supported types are DAY, HOUR, MONTH, and YEAR,
    /// which will generate one partition per day, hour, month, and year, respectively.
    #[serde(rename = "type")]
    pub partition_type: TimePartitionType,
    /// Optional. Number of milliseconds for which to keep the storage for a partition.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    #[serde(serialize_with = "crate::http::to_str_option")]
    pub expiration_ms: Option<i64>,
    /// Optional. If not set, the table is partitioned by pseudo column '_PARTITIONTIME';
    /// if set, the table is partitioned by this field.
    /// The field must be a top-level TIMESTAMP or DATE field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceFormat {
    #[default]
    Csv,
    Avro,
    NewlineDelimitedJson,
    DatastoreBackup,
    GoogleSheets,
    Bigtable,
    Parquet,
    Orc,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSheetsOptions {
    /// Optional. The number of rows at the top of a sheet that will be skipped when reading the data.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    #[serde(serialize_with = "crate::http::to_str_option")]
    pub skip_leading_rows: Option<i64>,
    /// Optional. Range of a sheet to query from, e.g. "sheet1!A1:B20".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExternalDataConfiguration {
    /// [Required] The fully-qualified URIs that point to your data in Google Cloud.
    /// Each URI can contain one '*' wildcard character and it must come after the 'bucket' name.
    pub source_uris: Vec<String>,
    /// Optional. The schema for the data.
    /// Schema is required for CSV and JSON formats if autodetect is not on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TableSchema>,
    /// [Required] The data format.
    pub source_format: SourceFormat,
    /// Optional. The maximum number of bad records that can be ignored when reading data.
    #[serde(default)]
    pub max_bad_records: i32,
    /// Try to detect schema and format options automatically.
    #[serde(default)]
    pub autodetect: bool,
    /// Optional. Indicates if extra values that are not represented in the table schema are allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_unknown_values: Option<bool>,
    /// Optional. Additional properties to set if sourceFormat is set to CSV.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_options: Option<CsvOptions>,
    /// Optional. Additional options if sourceFormat is set to GOOGLE_SHEETS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_sheets_options: Option<GoogleSheetsOptions>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ViewDefinition {
    /// Required. A query that is executed when the view is referenced.
    pub query: String,
    /// Specifies whether to use legacy SQL for this view.
    #[serde(default)]
    pub use_legacy_sql: Option<bool>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Output only. The resource type.
    #[serde(default)]
    pub kind: String,
    /// Output only. A hash of the resource.
    #[serde(default)]
    pub etag: String,
    /// Output only. An opaque ID uniquely identifying the table.
    #[serde(default)]
    pub id: String,
    /// Output only. A URL that can be used to access this resource again.
    #[serde(default)]
    pub self_link: String,
    /// Required. Reference describing the ID of this table.
    pub table_reference: TableReference,
    /// Optional. A descriptive name for this table.
    #[serde(default)]
    pub friendly_name: Option<String>,
    /// Optional. A user-friendly description of this table.
    #[serde(default)]
    pub description: Option<String>,
    /// The labels associated with this table.
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    /// Optional. Describes the schema of this table.
    #[serde(default)]
    pub schema: Option<TableSchema>,
    /// If specified, configures time-based partitioning for this table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_partitioning: Option<TimePartitioning>,
    /// Output only. The size of this table in logical bytes, excluding any data in the streaming buffer.
    #[serde(default, deserialize_with = "crate::http::from_str_option", skip_serializing)]
    pub num_bytes: Option<i64>,
    /// Output only. The number of rows of data in this table, excluding any data in the streaming buffer.
    #[serde(default, deserialize_with = "crate::http::from_str_option", skip_serializing)]
    pub num_rows: Option<u64>,
    /// Output only. The time when this table was created, in milliseconds since the epoch.
    #[serde(default, deserialize_with = "crate::http::from_str_or_default", skip_serializing)]
    pub creation_time: i64,
    /// Optional. The time when this table expires, in milliseconds since the epoch.
    /// If not present, the table will persist indefinitely.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    #[serde(serialize_with = "crate::http::to_str_option")]
    pub expiration_time: Option<i64>,
    /// Output only. The time when this table was last modified, in milliseconds since the epoch.
    #[serde(default, deserialize_with = "crate::http::from_str_or_default", skip_serializing)]
    pub last_modified_time: i64,
    /// Output only. Describes the table type: TABLE, VIEW, EXTERNAL, MATERIALIZED_VIEW or SNAPSHOT.
    /// The default value is TABLE.
    #[serde(default, rename = "type", skip_serializing)]
    pub table_type: String,
    /// Optional. The view definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewDefinition>,
    /// Optional. Describes the data format, location,
    /// and other properties of a table stored outside of the warehouse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_data_configuration: Option<ExternalDataConfiguration>,
    /// Output only. The geographic location where the table resides.
    /// This value is inherited from the dataset.
    #[serde(default, skip_serializing)]
    pub location: String,
}

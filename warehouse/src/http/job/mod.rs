pub mod get;
pub mod get_query_results;
pub mod insert;
pub mod query;

use std::collections::HashMap;

use crate::http::dataset::DatasetReference;
use crate::http::table::{SourceFormat, TableReference, TableSchema};

#[derive(Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateDisposition {
    /// If the table does not exist, it is created.
    #[default]
    CreateIfNeeded,
    /// The table must already exist. If it does not, a 'notFound' error is returned in the job result.
    CreateNever,
}

#[derive(Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    /// If the table already exists, the table data is overwritten.
    WriteTruncate,
    /// If the table already exists, the data is appended to the table.
    WriteAppend,
    /// If the table already exists and contains data, a 'duplicate' error is returned in the job result.
    #[default]
    WriteEmpty,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationQuery {
    /// [Required] SQL query text to execute.
    pub query: String,
    /// Optional. Describes the table where the query results should be stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_table: Option<TableReference>,
    /// Optional. Specifies whether the job is allowed to create new tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_disposition: Option<CreateDisposition>,
    /// Optional. Specifies the action that occurs if the destination table already exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<WriteDisposition>,
    /// Optional. Specifies the default dataset to use for unqualified table names in the query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dataset: Option<DatasetReference>,
    /// Optional. Specifies whether to use legacy SQL dialect for this query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_legacy_sql: Option<bool>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationTableCopy {
    /// [Pick one] Source tables to copy.
    pub source_tables: Vec<TableReference>,
    /// [Required] The destination table.
    pub destination_table: TableReference,
    /// Optional. Specifies whether the job is allowed to create new tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_disposition: Option<CreateDisposition>,
    /// Optional. Specifies the action that occurs if the destination table already exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<WriteDisposition>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationLoad {
    /// [Required] The fully-qualified URIs that point to your data in Google Cloud.
    pub source_uris: Vec<String>,
    /// Optional. The schema for the destination table.
    /// The schema can be omitted if the destination table already exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TableSchema>,
    /// [Required] The destination table to load the data into.
    pub destination_table: TableReference,
    /// Optional. The format of the data files. The default value is CSV.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_format: Option<SourceFormat>,
    /// Optional. The number of rows at the top of a CSV file that will be skipped.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    #[serde(serialize_with = "crate::http::to_str_option")]
    pub skip_leading_rows: Option<i64>,
    /// Optional. The separator character for fields in a CSV file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_delimiter: Option<String>,
    /// Optional. Indicates if schema and format options should be inferred automatically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autodetect: Option<bool>,
    /// Optional. Specifies whether the job is allowed to create new tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_disposition: Option<CreateDisposition>,
    /// Optional. Specifies the action that occurs if the destination table already exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<WriteDisposition>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum JobType {
    /// [Pick one] Configures a query job.
    Query(JobConfigurationQuery),
    /// [Pick one] Configures a load job.
    Load(JobConfigurationLoad),
    /// [Pick one] Copies a table.
    Copy(JobConfigurationTableCopy),
}

impl Default for JobType {
    fn default() -> Self {
        Self::Query(JobConfigurationQuery::default())
    }
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    /// Output only. The type of the job. Can be QUERY, LOAD, EXTRACT, COPY or UNKNOWN.
    #[serde(default, skip_serializing)]
    pub job_type: String,
    #[serde(flatten)]
    pub job: JobType,
    /// Optional. If set, don't actually run this job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    /// Optional. Job timeout in milliseconds.
    /// If this time limit is exceeded, the service might attempt to stop the job.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    #[serde(serialize_with = "crate::http::to_str_option")]
    pub job_timeout_ms: Option<i64>,
    /// The labels associated with this job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    /// Required. The ID of the project containing this job.
    pub project_id: String,
    /// Required. The ID of the job.
    /// The ID must contain only letters (a-z, A-Z), numbers (0-9), underscores (_), or dashes (-).
    /// The maximum length is 1,024 characters.
    pub job_id: String,
    /// Optional. The geographic location of the job.
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Done,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorProto {
    /// A short error code that summarizes the error.
    #[serde(default)]
    pub reason: Option<String>,
    /// Specifies where the error occurred, if present.
    #[serde(default)]
    pub location: Option<String>,
    /// Debugging information. This property is internal to Google and should not be used.
    #[serde(default)]
    pub debug_info: Option<String>,
    /// A human-readable description of the error.
    #[serde(default)]
    pub message: Option<String>,
}

impl std::fmt::Display for ErrorProto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.reason.as_deref().unwrap_or("unknown"),
            self.message.as_deref().unwrap_or_default()
        )
    }
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// Output only. Final error result of the job.
    /// If present, indicates that the job has completed and was unsuccessful.
    #[serde(default)]
    pub error_result: Option<ErrorProto>,
    /// Output only. The first errors encountered during the running of the job.
    /// The final message includes the number of errors that caused the process to stop.
    /// Errors here do not necessarily mean that the job has not completed or was unsuccessful.
    #[serde(default)]
    pub errors: Option<Vec<ErrorProto>>,
    /// Output only. Running state of the job. Valid states include 'PENDING', 'RUNNING', and 'DONE'.
    #[serde(default)]
    pub state: JobState,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Output only. The resource type.
    #[serde(default)]
    pub kind: String,
    /// Output only. A hash of the resource.
    #[serde(default)]
    pub etag: String,
    /// Output only. Opaque ID field of the job.
    #[serde(default)]
    pub id: String,
    /// Output only. A URL that can be used to access the resource again.
    #[serde(default)]
    pub self_link: String,
    /// Output only. Email address of the user who ran the job.
    #[serde(default)]
    pub user_email: String,
    /// Required. Describes the job configuration.
    pub configuration: JobConfiguration,
    /// Optional. Reference describing the unique-per-user name of the job.
    pub job_reference: JobReference,
    /// Output only. The status of this job.
    /// Examine this value when polling an asynchronous job to see if the job is complete.
    #[serde(default)]
    pub status: JobStatus,
}

#[cfg(test)]
mod test {
    use crate::http::job::{Job, JobConfiguration, JobConfigurationTableCopy, JobState, JobType};
    use crate::http::table::TableReference;

    #[test]
    fn job_configuration_is_tagged_by_kind() {
        let job = Job {
            configuration: JobConfiguration {
                job: JobType::Copy(JobConfigurationTableCopy {
                    source_tables: vec![TableReference {
                        project_id: "p".to_string(),
                        dataset_id: "a".to_string(),
                        table_id: "t".to_string(),
                    }],
                    destination_table: TableReference {
                        project_id: "p".to_string(),
                        dataset_id: "b".to_string(),
                        table_id: "t".to_string(),
                    },
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["configuration"]["copy"]["destinationTable"]["datasetId"], "b");
        assert!(json["configuration"].get("query").is_none());

        let body = r#"{
            "jobReference": {"projectId": "p", "jobId": "j1", "location": "US"},
            "configuration": {"jobType": "COPY", "copy": {"sourceTables": [], "destinationTable": {"projectId": "p", "datasetId": "b", "tableId": "t"}}},
            "status": {"state": "DONE", "errorResult": {"reason": "notFound", "message": "Not found: Dataset p:a"}}
        }"#;
        let job: Job = serde_json::from_str(body).unwrap();
        assert_eq!(job.status.state, JobState::Done);
        assert_eq!(job.status.error_result.unwrap().reason.as_deref(), Some("notFound"));
        assert!(matches!(job.configuration.job, JobType::Copy(_)));
    }
}

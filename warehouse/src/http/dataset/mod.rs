pub mod delete;
pub mod get;
pub mod insert;
pub mod list;
pub mod patch;

use std::collections::HashMap;

use crate::http::table::TableReference;

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DatasetReference {
    /// Required. A unique ID for this dataset, without the project name.
    /// The ID must contain only letters (a-z, A-Z), numbers (0-9), or underscores (_).
    /// The maximum length is 1,024 characters.
    pub dataset_id: String,
    /// The ID of the project containing this dataset.
    pub project_id: String,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub enum SpecialGroup {
    #[default]
    ProjectOwners,
    ProjectReaders,
    ProjectWriters,
    AllAuthenticatedUsers,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Access {
    /// An IAM role ID that should be granted to the user, group, or domain specified in this access entry.
    /// The following legacy mappings will be applied:
    ///     OWNER <=> roles/bigquery.dataOwner
    ///     WRITER <=> roles/bigquery.dataEditor
    ///     READER <=> roles/bigquery.dataViewer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// [Pick one] An email address of a user to grant access to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_by_email: Option<String>,
    /// [Pick one] An email address of a Google Group to grant access to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by_email: Option<String>,
    /// [Pick one] A domain to grant access to. Example: "example.com".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// [Pick one] A special group to grant access to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_group: Option<SpecialGroup>,
    /// [Pick one] A view from a different dataset to grant access to.
    /// The role field is not required when this field is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<TableReference>,
    /// [Pick one] Some other type of member that appears in the IAM Policy but isn't a user, group,
    /// domain, or special group. Example: `serviceAccount:etl@my-project.iam.gserviceaccount.com`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_member: Option<String>,
    /// Remaining members such as `routine` or `dataset`, kept as received so they survive a
    /// read-modify-write of the access list.
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// Output only. The resource type.
    #[serde(default)]
    pub kind: String,
    /// Output only. A hash of the resource.
    #[serde(default)]
    pub etag: String,
    /// Output only. The fully-qualified unique name of the dataset in the format projectId:datasetId.
    #[serde(default)]
    pub id: String,
    /// Output only. A URL that can be used to access the resource again.
    #[serde(default)]
    pub self_link: String,
    /// Required. A reference that identifies the dataset.
    pub dataset_reference: DatasetReference,
    /// Optional. A descriptive name for the dataset.
    #[serde(default)]
    pub friendly_name: Option<String>,
    /// Optional. A user-friendly description of the dataset.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional. The default lifetime of all tables in the dataset, in milliseconds.
    /// The minimum lifetime value is 3600000 milliseconds (one hour).
    /// Once this property is set, all newly-created tables in the dataset will have an expirationTime
    /// property set to the creation time plus the value in this property.
    /// Changing the value will only affect new tables, not existing ones.
    #[serde(default, deserialize_with = "crate::http::from_str_option")]
    #[serde(serialize_with = "crate::http::to_str_option")]
    pub default_table_expiration_ms: Option<i64>,
    /// The labels associated with this dataset.
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    /// Optional. An array of objects that define dataset access for one or more entities.
    #[serde(default)]
    pub access: Vec<Access>,
    /// Output only. The time when this dataset was created, in milliseconds since the epoch.
    #[serde(default, deserialize_with = "crate::http::from_str_or_default")]
    pub creation_time: i64,
    /// Output only. The date when this dataset was last modified, in milliseconds since the epoch.
    #[serde(default, deserialize_with = "crate::http::from_str_or_default")]
    pub last_modified_time: i64,
    /// The geographic location where the dataset should reside.
    /// See https://cloud.google.com/bigquery/docs/locations for supported locations.
    #[serde(default)]
    pub location: String,
}

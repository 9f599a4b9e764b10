use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::http::dataset::{Access, SpecialGroup};
use crate::http::table::TableReference;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Reader,
    Writer,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "READER",
            Role::Writer => "WRITER",
            Role::Owner => "OWNER",
        }
    }

    /// Accepts both the legacy names and the predefined IAM roles they map to.
    fn from_wire(role: &str) -> Option<Self> {
        match role {
            "READER" | "roles/bigquery.dataViewer" => Some(Role::Reader),
            "WRITER" | "roles/bigquery.dataEditor" => Some(Role::Writer),
            "OWNER" | "roles/bigquery.dataOwner" => Some(Role::Owner),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_wire(&s.to_ascii_uppercase()).ok_or_else(|| Error::validation(format!("unknown role '{s}'")))
    }
}

/// Kind of principal an [`AccessEntry`] grants to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    /// `entity_id` is an email address.
    User,
    /// `entity_id` is a group email address.
    Group,
    /// `entity_id` is a domain such as `example.com`.
    Domain,
    /// `entity_id` is one of `projectOwners`, `projectReaders`, `projectWriters`, `allAuthenticatedUsers`.
    SpecialGroup,
    /// `entity_id` is an authorized view as `project.dataset.table`.
    View,
}

/// A single grant on a dataset. Two entries are duplicates when [`AccessEntry::same_grant`] holds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AccessEntry {
    pub role: Role,
    pub entity_type: EntityType,
    pub entity_id: String,
}

impl AccessEntry {
    pub fn new(role: Role, entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            role,
            entity_type,
            entity_id: entity_id.into(),
        }
    }

    pub fn user(role: Role, email: impl Into<String>) -> Self {
        Self::new(role, EntityType::User, email)
    }

    pub fn group(role: Role, email: impl Into<String>) -> Self {
        Self::new(role, EntityType::Group, email)
    }

    pub fn domain(role: Role, domain: impl Into<String>) -> Self {
        Self::new(role, EntityType::Domain, domain)
    }

    /// Same role to the same principal. Email addresses and domains compare case-insensitively,
    /// as the service does.
    pub fn same_grant(&self, other: &AccessEntry) -> bool {
        self.role == other.role
            && self.entity_type == other.entity_type
            && match self.entity_type {
                EntityType::User | EntityType::Group | EntityType::Domain => {
                    self.entity_id.eq_ignore_ascii_case(&other.entity_id)
                }
                EntityType::SpecialGroup | EntityType::View => self.entity_id == other.entity_id,
            }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.entity_id.trim().is_empty() {
            return Err(Error::validation("access entry needs an entity id"));
        }
        if self.entity_type == EntityType::View && self.role != Role::Reader {
            return Err(Error::validation("authorized views can only be granted READER"));
        }
        self.to_wire().map(|_| ())
    }

    pub(crate) fn to_wire(&self) -> Result<Access, Error> {
        let mut access = Access {
            role: Some(self.role.as_str().to_string()),
            ..Default::default()
        };
        match self.entity_type {
            EntityType::User => access.user_by_email = Some(self.entity_id.clone()),
            EntityType::Group => access.group_by_email = Some(self.entity_id.clone()),
            EntityType::Domain => access.domain = Some(self.entity_id.clone()),
            EntityType::SpecialGroup => access.special_group = Some(special_group(&self.entity_id)?),
            EntityType::View => {
                // authorized views carry no role
                access.role = None;
                access.view = Some(view_reference(&self.entity_id)?);
            }
        }
        Ok(access)
    }

    /// Entries with an IAM role outside the legacy set, or an entity kind not modelled here, are skipped.
    pub(crate) fn from_wire(access: &Access) -> Option<Self> {
        if let Some(view) = &access.view {
            let id = format!("{}.{}.{}", view.project_id, view.dataset_id, view.table_id);
            return Some(Self::new(Role::Reader, EntityType::View, id));
        }
        let role = Role::from_wire(access.role.as_deref()?)?;
        let (entity_type, entity_id) = if let Some(v) = &access.user_by_email {
            (EntityType::User, v.clone())
        } else if let Some(v) = &access.group_by_email {
            (EntityType::Group, v.clone())
        } else if let Some(v) = &access.domain {
            (EntityType::Domain, v.clone())
        } else if let Some(v) = &access.special_group {
            (EntityType::SpecialGroup, special_group_name(v).to_string())
        } else {
            return None;
        };
        Some(Self::new(role, entity_type, entity_id))
    }
}

fn special_group(id: &str) -> Result<SpecialGroup, Error> {
    match id {
        "projectOwners" => Ok(SpecialGroup::ProjectOwners),
        "projectReaders" => Ok(SpecialGroup::ProjectReaders),
        "projectWriters" => Ok(SpecialGroup::ProjectWriters),
        "allAuthenticatedUsers" => Ok(SpecialGroup::AllAuthenticatedUsers),
        _ => Err(Error::validation(format!("unknown special group '{id}'"))),
    }
}

fn special_group_name(group: &SpecialGroup) -> &'static str {
    match group {
        SpecialGroup::ProjectOwners => "projectOwners",
        SpecialGroup::ProjectReaders => "projectReaders",
        SpecialGroup::ProjectWriters => "projectWriters",
        SpecialGroup::AllAuthenticatedUsers => "allAuthenticatedUsers",
    }
}

fn view_reference(id: &str) -> Result<TableReference, Error> {
    let parts: Vec<&str> = id.split('.').collect();
    match parts.as_slice() {
        [project_id, dataset_id, table_id] if parts.iter().all(|p| !p.is_empty()) => Ok(TableReference {
            project_id: project_id.to_string(),
            dataset_id: dataset_id.to_string(),
            table_id: table_id.to_string(),
        }),
        _ => Err(Error::validation(format!("view entity must be project.dataset.table: '{id}'"))),
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use crate::access::{AccessEntry, EntityType, Role};
    use crate::error::Error;
    use crate::http::dataset::{Access, SpecialGroup};

    #[test]
    fn wire_round_trip_keeps_identity() {
        let entries = vec![
            AccessEntry::user(Role::Reader, "alice@example.com"),
            AccessEntry::group(Role::Writer, "team@example.com"),
            AccessEntry::domain(Role::Owner, "example.com"),
            AccessEntry::new(Role::Reader, EntityType::SpecialGroup, "allAuthenticatedUsers"),
            AccessEntry::new(Role::Reader, EntityType::View, "p.d.v"),
        ];
        for entry in entries {
            let wire = entry.to_wire().unwrap();
            assert_eq!(AccessEntry::from_wire(&wire), Some(entry));
        }
    }

    #[test]
    fn iam_roles_map_to_legacy_roles() {
        let access = Access {
            role: Some("roles/bigquery.dataOwner".to_string()),
            special_group: Some(SpecialGroup::ProjectOwners),
            ..Default::default()
        };
        let entry = AccessEntry::from_wire(&access).unwrap();
        assert_eq!(entry.role, Role::Owner);
        assert_eq!(entry.entity_id, "projectOwners");

        let unknown = Access {
            role: Some("roles/bigquery.metadataViewer".to_string()),
            user_by_email: Some("bob@example.com".to_string()),
            ..Default::default()
        };
        assert!(AccessEntry::from_wire(&unknown).is_none());
    }

    #[test]
    fn email_principals_ignore_case() {
        let lower = AccessEntry::user(Role::Reader, "analyst@example.com");
        assert!(lower.same_grant(&AccessEntry::user(Role::Reader, "Analyst@Example.com")));
        assert!(!lower.same_grant(&AccessEntry::user(Role::Writer, "analyst@example.com")));
        assert!(!lower.same_grant(&AccessEntry::group(Role::Reader, "analyst@example.com")));
        let domain = AccessEntry::domain(Role::Reader, "Example.com");
        assert!(domain.same_grant(&AccessEntry::domain(Role::Reader, "example.com")));
        let view = AccessEntry::new(Role::Reader, EntityType::View, "p.d.v");
        assert!(!view.same_grant(&AccessEntry::new(Role::Reader, EntityType::View, "p.d.V")));
    }

    #[test]
    fn invalid_entries() {
        assert!(matches!(AccessEntry::user(Role::Reader, " ").validate(), Err(Error::Validation { .. })));
        assert!(AccessEntry::new(Role::Reader, EntityType::View, "p.d").validate().is_err());
        assert!(AccessEntry::new(Role::Owner, EntityType::View, "p.d.v").validate().is_err());
        assert!(AccessEntry::new(Role::Reader, EntityType::SpecialGroup, "everyone").validate().is_err());
        assert_eq!(Role::from_str("writer").unwrap(), Role::Writer);
        assert!(Role::from_str("admin").is_err());
    }
}

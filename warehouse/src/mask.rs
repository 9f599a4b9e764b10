use std::collections::BTreeSet;

use crate::error::Error;

/// A field that can be named in a [`FieldMask`].
pub trait MaskField: Copy + Ord + std::fmt::Debug {
    /// The JSON key of the field in the resource body.
    fn wire_name(&self) -> &'static str;
}

/// Updatable attributes of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatasetField {
    Description,
    DefaultTableExpiration,
    Labels,
    AccessEntries,
}

impl MaskField for DatasetField {
    fn wire_name(&self) -> &'static str {
        match self {
            DatasetField::Description => "description",
            DatasetField::DefaultTableExpiration => "defaultTableExpirationMs",
            DatasetField::Labels => "labels",
            DatasetField::AccessEntries => "access",
        }
    }
}

/// Updatable attributes of a table. Everything else requires recreating the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableField {
    Description,
    Expiration,
}

impl MaskField for TableField {
    fn wire_name(&self) -> &'static str {
        match self {
            TableField::Description => "description",
            TableField::Expiration => "expirationTime",
        }
    }
}

/// The set of fields an update is allowed to touch.
///
/// Only fields in the mask are written to the update body. Values for other fields are ignored
/// even when set, so an update can never clobber an attribute by accident.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMask<F: MaskField> {
    fields: BTreeSet<F>,
}

impl<F: MaskField> FieldMask<F> {
    pub fn new(fields: impl IntoIterator<Item = F>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn contains(&self, field: F) -> bool {
        self.fields.contains(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = F> + '_ {
        self.fields.iter().copied()
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.is_empty() {
            return Err(Error::validation("field mask must name at least one field"));
        }
        Ok(())
    }

    /// Builds the PATCH body: one key per masked field, valued by `value_of`.
    pub(crate) fn to_body(&self, mut value_of: impl FnMut(F) -> serde_json::Value) -> serde_json::Value {
        let body: serde_json::Map<String, serde_json::Value> = self
            .iter()
            .map(|field| (field.wire_name().to_string(), value_of(field)))
            .collect();
        serde_json::Value::Object(body)
    }
}

impl<F: MaskField> FromIterator<F> for FieldMask<F> {
    fn from_iter<T: IntoIterator<Item = F>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl<F: MaskField> From<F> for FieldMask<F> {
    fn from(field: F) -> Self {
        Self::new([field])
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::error::Error;
    use crate::mask::{DatasetField, FieldMask, TableField};

    #[test]
    fn body_contains_only_masked_keys() {
        let mask = FieldMask::new([DatasetField::Description]);
        let body = mask.to_body(|f| match f {
            DatasetField::Description => json!("d"),
            _ => json!("must not appear"),
        });
        assert_eq!(body, json!({"description": "d"}));
    }

    #[test]
    fn empty_mask_is_rejected() {
        let mask: FieldMask<TableField> = FieldMask::new([]);
        assert!(matches!(mask.validate(), Err(Error::Validation { .. })));
        assert!(FieldMask::from(TableField::Expiration).validate().is_ok());
    }

    #[test]
    fn duplicates_collapse() {
        let mask: FieldMask<DatasetField> = [DatasetField::Labels, DatasetField::Labels].into_iter().collect();
        assert_eq!(mask.iter().count(), 1);
        assert!(mask.contains(DatasetField::Labels));
        assert!(!mask.contains(DatasetField::Description));
    }
}

use std::collections::HashSet;
use std::str::FromStr;

use base64::prelude::*;
use bigdecimal::BigDecimal;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::error::Error;
use crate::http::table::{TableFieldMode, TableFieldSchema, TableFieldType, TableSchema};

const MAX_FIELD_NAME_LENGTH: usize = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Bytes,
    Integer,
    Float,
    Numeric,
    BigNumeric,
    Boolean,
    Timestamp,
    Date,
    Time,
    Datetime,
    Geography,
    Interval,
    Json,
    Record,
}

impl FieldType {
    fn to_wire(self) -> TableFieldType {
        match self {
            FieldType::String => TableFieldType::String,
            FieldType::Bytes => TableFieldType::Bytes,
            FieldType::Integer => TableFieldType::Integer,
            FieldType::Float => TableFieldType::Float,
            FieldType::Numeric => TableFieldType::Numeric,
            FieldType::BigNumeric => TableFieldType::Bignumeric,
            FieldType::Boolean => TableFieldType::Boolean,
            FieldType::Timestamp => TableFieldType::Timestamp,
            FieldType::Date => TableFieldType::Date,
            FieldType::Time => TableFieldType::Time,
            FieldType::Datetime => TableFieldType::Datetime,
            FieldType::Geography => TableFieldType::Geography,
            FieldType::Interval => TableFieldType::Interval,
            FieldType::Json => TableFieldType::Json,
            FieldType::Record => TableFieldType::Record,
        }
    }

    fn from_wire(value: TableFieldType) -> Self {
        match value {
            TableFieldType::String => FieldType::String,
            TableFieldType::Bytes => FieldType::Bytes,
            TableFieldType::Integer | TableFieldType::Int64 => FieldType::Integer,
            TableFieldType::Float | TableFieldType::Float64 => FieldType::Float,
            TableFieldType::Numeric => FieldType::Numeric,
            TableFieldType::Bignumeric => FieldType::BigNumeric,
            TableFieldType::Boolean | TableFieldType::Bool => FieldType::Boolean,
            TableFieldType::Timestamp => FieldType::Timestamp,
            TableFieldType::Date => FieldType::Date,
            TableFieldType::Time => FieldType::Time,
            TableFieldType::Datetime => FieldType::Datetime,
            TableFieldType::Geography => FieldType::Geography,
            TableFieldType::Interval => FieldType::Interval,
            TableFieldType::Json => FieldType::Json,
            TableFieldType::Record | TableFieldType::Struct => FieldType::Record,
        }
    }

    /// Types a column partitioning can be based on.
    pub(crate) fn is_partitionable(&self) -> bool {
        matches!(self, FieldType::Date | FieldType::Timestamp | FieldType::Datetime)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub mode: FieldMode,
    /// Sub-fields, only for [`FieldType::Record`].
    pub fields: Vec<Field>,
    pub description: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::Nullable,
            fields: vec![],
            description: None,
        }
    }

    pub fn record(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            fields,
            ..Self::new(name, FieldType::Record)
        }
    }

    pub fn required(mut self) -> Self {
        self.mode = FieldMode::Required;
        self
    }

    pub fn repeated(mut self) -> Self {
        self.mode = FieldMode::Repeated;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn to_wire(&self) -> TableFieldSchema {
        TableFieldSchema {
            name: self.name.clone(),
            data_type: self.field_type.to_wire(),
            mode: Some(match self.mode {
                FieldMode::Nullable => TableFieldMode::Nullable,
                FieldMode::Required => TableFieldMode::Required,
                FieldMode::Repeated => TableFieldMode::Repeated,
            }),
            fields: if self.fields.is_empty() {
                None
            } else {
                Some(self.fields.iter().map(Field::to_wire).collect())
            },
            description: self.description.clone(),
        }
    }

    fn from_wire(value: &TableFieldSchema) -> Self {
        Self {
            name: value.name.clone(),
            field_type: FieldType::from_wire(value.data_type),
            mode: match value.mode {
                Some(TableFieldMode::Required) => FieldMode::Required,
                Some(TableFieldMode::Repeated) => FieldMode::Repeated,
                _ => FieldMode::Nullable,
            },
            fields: value
                .fields
                .as_ref()
                .map(|f| f.iter().map(Field::from_wire).collect())
                .unwrap_or_default(),
            description: value.description.clone(),
        }
    }
}

/// An ordered list of top level fields.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Checks the structural rules before a table is created: at least one field, well formed and
    /// unique (case insensitive) names at every level, and sub-fields on records only.
    pub fn validate(&self) -> Result<(), Error> {
        if self.fields.is_empty() {
            return Err(Error::validation("schema must contain at least one field"));
        }
        validate_fields(&self.fields, "")
    }

    pub(crate) fn to_wire(&self) -> TableSchema {
        TableSchema {
            fields: self.fields.iter().map(Field::to_wire).collect(),
        }
    }

    pub(crate) fn from_wire(value: Option<&TableSchema>) -> Self {
        Self {
            fields: value
                .map(|s| s.fields.iter().map(Field::from_wire).collect())
                .unwrap_or_default(),
        }
    }

    /// Checks one JSON row against the schema and returns every problem found.
    pub(crate) fn check_row(&self, row: &Value) -> Vec<Violation> {
        let mut violations = vec![];
        match row {
            Value::Object(_) => check_record(&self.fields, row, "", &mut violations),
            _ => violations.push(Violation::new("", "row must serialize to a JSON object")),
        }
        violations
    }
}

impl From<Vec<Field>> for Schema {
    fn from(fields: Vec<Field>) -> Self {
        Self::new(fields)
    }
}

fn validate_fields(fields: &[Field], parent: &str) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for field in fields {
        let path = join(parent, &field.name);
        if !valid_name(&field.name) {
            return Err(Error::validation(format!("invalid field name '{path}'")));
        }
        if !seen.insert(field.name.to_ascii_lowercase()) {
            return Err(Error::validation(format!("duplicate field name '{path}'")));
        }
        match field.field_type {
            FieldType::Record if field.fields.is_empty() => {
                return Err(Error::validation(format!("record field '{path}' has no sub-fields")));
            }
            FieldType::Record => validate_fields(&field.fields, &path)?,
            _ if !field.fields.is_empty() => {
                return Err(Error::validation(format!("only record fields can have sub-fields: '{path}'")));
            }
            _ => {}
        }
    }
    Ok(())
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_FIELD_NAME_LENGTH && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

/// A problem with one value of a row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Violation {
    pub location: String,
    pub message: String,
}

impl Violation {
    fn new(location: &str, message: impl Into<String>) -> Self {
        Self {
            location: location.to_string(),
            message: message.into(),
        }
    }
}

fn check_record(fields: &[Field], value: &Value, parent: &str, out: &mut Vec<Violation>) {
    let Value::Object(map) = value else {
        out.push(Violation::new(parent, "record value must be a JSON object"));
        return;
    };
    for key in map.keys() {
        if !fields.iter().any(|f| f.name.eq_ignore_ascii_case(key)) {
            out.push(Violation::new(&join(parent, key), "no such field"));
        }
    }
    for field in fields {
        let path = join(parent, &field.name);
        let value = map
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&field.name))
            .map(|(_, v)| v)
            .unwrap_or(&Value::Null);
        match (field.mode, value) {
            (FieldMode::Required, Value::Null) => out.push(Violation::new(&path, "missing required field")),
            (FieldMode::Repeated, Value::Null) | (FieldMode::Nullable, Value::Null) => {}
            (FieldMode::Repeated, Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{path}[{i}]");
                    if item.is_null() {
                        out.push(Violation::new(&item_path, "repeated field cannot contain null"));
                    } else {
                        check_value(field, item, &item_path, out);
                    }
                }
            }
            (FieldMode::Repeated, _) => out.push(Violation::new(&path, "repeated field must be an array")),
            (_, value) => check_value(field, value, &path, out),
        }
    }
}

fn check_value(field: &Field, value: &Value, path: &str, out: &mut Vec<Violation>) {
    if field.field_type == FieldType::Record {
        check_record(&field.fields, value, path, out);
        return;
    }
    if !scalar_matches(field.field_type, value) {
        out.push(Violation::new(
            path,
            format!("value {value} is not a valid {:?}", field.field_type),
        ));
    }
}

fn scalar_matches(field_type: FieldType, value: &Value) -> bool {
    match (field_type, value) {
        (FieldType::Json, _) => true,
        (FieldType::Integer, Value::Number(n)) => n.is_i64(),
        (FieldType::Integer, Value::String(s)) => s.parse::<i64>().is_ok(),
        (FieldType::Float, Value::Number(_)) => true,
        (FieldType::Float, Value::String(s)) => s.parse::<f64>().is_ok(),
        (FieldType::Numeric | FieldType::BigNumeric, Value::Number(_)) => true,
        (FieldType::Numeric | FieldType::BigNumeric, Value::String(s)) => BigDecimal::from_str(s).is_ok(),
        (FieldType::Boolean, Value::Bool(_)) => true,
        (FieldType::Boolean, Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "false"),
        (FieldType::Bytes, Value::String(s)) => BASE64_STANDARD.decode(s).is_ok(),
        (FieldType::Timestamp, Value::Number(_)) => true,
        (FieldType::Timestamp, Value::String(s)) => parse_timestamp(s).is_some(),
        (FieldType::Date, Value::String(s)) => Date::parse(s, format_description!("[year]-[month]-[day]")).is_ok(),
        (FieldType::Time, Value::String(s)) => parse_time(s).is_some(),
        (FieldType::Datetime, Value::String(s)) => parse_datetime(s).is_some(),
        (FieldType::String | FieldType::Geography | FieldType::Interval, Value::String(_)) => true,
        _ => false,
    }
}

fn parse_time(s: &str) -> Option<Time> {
    Time::parse(s, format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]")).ok()
}

fn parse_datetime(s: &str) -> Option<PrimitiveDateTime> {
    let normalized = s.replacen('T', " ", 1);
    PrimitiveDateTime::parse(
        &normalized,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"),
    )
    .ok()
}

pub(crate) fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(ts);
    }
    let trimmed = s.trim_end_matches(" UTC").trim_end_matches('Z');
    parse_datetime(trimmed).map(|dt| dt.assume_utc())
}

//! Attribute values and storage-level validation.
//!
//! # Invariants
//! - Field names match `[A-Za-z_][A-Za-z0-9_]*`; they are spliced into JSON
//!   paths, so nothing else may reach SQL.
//! - Reserved fields are owned by storage and never appear in attribute maps.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Columns maintained by storage for every entity kind.
pub const RESERVED_FIELDS: &[&str] = &["id", "created_at", "updated_at", "deleted_at"];

static FIELD_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("field name pattern must compile")
});

/// Attribute mapping of one entity, ordered by field name.
pub type Attributes = BTreeMap<String, FieldValue>;

/// Scalar attribute value.
///
/// Serialized untagged, so persisted attributes are plain JSON objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Value bound into SQL comparisons against `json_extract` output.
    ///
    /// SQLite surfaces JSON booleans as integers `1`/`0`.
    pub(crate) fn to_sql_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(value) => Value::Integer(i64::from(*value)),
            Self::Integer(value) => Value::Integer(*value),
            Self::Real(value) => Value::Real(*value),
            Self::Text(value) => Value::Text(value.clone()),
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Builds an [`Attributes`] map from `field => value` pairs.
///
/// ```
/// let attrs = folio_core::attributes! { "name" => "About", "order" => 3 };
/// assert_eq!(attrs.len(), 2);
/// ```
#[macro_export]
macro_rules! attributes {
    () => { $crate::Attributes::new() };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut attrs = $crate::Attributes::new();
        $(attrs.insert(($field).to_string(), $crate::FieldValue::from($value));)+
        attrs
    }};
}

/// Storage-level constraint violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingField { kind: &'static str, field: String },
    ReservedField(String),
    InvalidFieldName(String),
    UnknownRelation { kind: &'static str, relation: String },
    Duplicate { kind: &'static str, field: String },
    SoftDeletesUnsupported(&'static str),
    /// Constraint reported by SQLite itself.
    Constraint(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField { kind, field } => {
                write!(f, "{kind}: required field `{field}` is missing")
            }
            Self::ReservedField(field) => {
                write!(f, "field `{field}` is managed by storage and cannot be written")
            }
            Self::InvalidFieldName(field) => write!(f, "invalid field name `{field}`"),
            Self::UnknownRelation { kind, relation } => {
                write!(f, "{kind}: unknown relation `{relation}`")
            }
            Self::Duplicate { kind, field } => {
                write!(f, "{kind}: value of unique field `{field}` already exists")
            }
            Self::SoftDeletesUnsupported(kind) => {
                write!(f, "{kind}: kind does not support soft deletes")
            }
            Self::Constraint(message) => write!(f, "constraint violation: {message}"),
        }
    }
}

impl Error for ValidationError {}

/// Rejects names that cannot be used as a JSON path segment.
pub fn validate_field_name(field: &str) -> Result<(), ValidationError> {
    if FIELD_NAME_RE.is_match(field) {
        Ok(())
    } else {
        Err(ValidationError::InvalidFieldName(field.to_string()))
    }
}

pub fn is_reserved_field(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// Rejects attribute maps with reserved or malformed keys.
pub fn validate_attribute_keys(attributes: &Attributes) -> Result<(), ValidationError> {
    for field in attributes.keys() {
        if is_reserved_field(field) {
            return Err(ValidationError::ReservedField(field.clone()));
        }
        validate_field_name(field)?;
    }
    Ok(())
}

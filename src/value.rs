//! Property types and the values entities hold.
//!
//! A schema declares each property with a [`PropertyType`]; entries carry
//! [`Value`]s that must match the declared type.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// A caller-supplied entry: property name to value.
pub type Properties = BTreeMap<String, Value>;

/// Semantic type of a declared property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// UTF-8 text.
    String,
    /// 64-bit float.
    Number,
    /// 64-bit signed integer.
    Integer,
    /// `true` or `false`.
    Boolean,
    /// UTC timestamp, stored as RFC 3339.
    Date,
    /// Any JSON document.
    Json,
    /// UUID, stored in hyphenated form.
    Uuid,
}

impl PropertyType {
    /// Returns the lowercase type name used in descriptors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Json => "json",
            Self::Uuid => "uuid",
        }
    }

    /// Returns true if values of this type may appear in a partition or row key.
    #[must_use]
    pub const fn is_keyable(self) -> bool {
        matches!(self, Self::String | Self::Integer | Self::Uuid)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "integer" => Ok(Self::Integer),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "json" => Ok(Self::Json),
            "uuid" => Ok(Self::Uuid),
            other => Err(ValidationError::UnknownPropertyType {
                name: other.to_string(),
            }),
        }
    }
}

/// A single property value.
///
/// # Examples
///
/// ```
/// use entitystore::{PropertyType, Value};
///
/// let v = Value::from("T1");
/// assert_eq!(v.property_type(), PropertyType::String);
/// assert_eq!(v.as_str(), Some("T1"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A [`PropertyType::String`] value.
    String(String),
    /// A [`PropertyType::Number`] value.
    Number(f64),
    /// A [`PropertyType::Integer`] value.
    Integer(i64),
    /// A [`PropertyType::Boolean`] value.
    Boolean(bool),
    /// A [`PropertyType::Date`] value.
    Date(DateTime<Utc>),
    /// A [`PropertyType::Json`] value.
    Json(serde_json::Value),
    /// A [`PropertyType::Uuid`] value.
    Uuid(Uuid),
}

impl Value {
    /// Returns the type tag of this value.
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::String(_) => PropertyType::String,
            Self::Number(_) => PropertyType::Number,
            Self::Integer(_) => PropertyType::Integer,
            Self::Boolean(_) => PropertyType::Boolean,
            Self::Date(_) => PropertyType::Date,
            Self::Json(_) => PropertyType::Json,
            Self::Uuid(_) => PropertyType::Uuid,
        }
    }

    /// Returns the text of a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the number held by this value, if it is one.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer held by this value, if it is one.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean held by this value, if it is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the date held by this value, if it is one.
    #[must_use]
    pub const fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the JSON document held by this value, if it is one.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the UUID held by this value, if it is one.
    #[must_use]
    pub const fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(v) => Some(*v),
            _ => None,
        }
    }

    /// Text used when this value forms part of an entity id.
    ///
    /// Only keyable types have a key text.
    #[must_use]
    pub fn key_text(&self) -> Option<String> {
        match self {
            Self::String(v) => Some(v.clone()),
            Self::Integer(v) => Some(v.to_string()),
            Self::Uuid(v) => Some(v.hyphenated().to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) => write!(f, "{v:?}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Json(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Date(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

/// Builds a [`Properties`] map from `name => value` pairs.
///
/// ```
/// use entitystore::props;
///
/// let entry = props! { "taskId" => "T1", "retries" => 3 };
/// assert_eq!(entry.len(), 2);
/// ```
#[macro_export]
macro_rules! props {
    ($($name:expr => $value:expr),* $(,)?) => {{
        let mut map = $crate::Properties::new();
        $(map.insert(::std::string::String::from($name), $crate::Value::from($value));)*
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_type_parse_and_display() {
        for name in ["string", "number", "integer", "boolean", "date", "json", "uuid"] {
            let parsed: PropertyType = name.parse().unwrap();
            assert_eq!(parsed.to_string(), name);
        }
    }

    #[test]
    fn test_property_type_unknown() {
        let err = "blob".parse::<PropertyType>().unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownPropertyType {
                name: "blob".to_string()
            }
        );
    }

    #[test]
    fn test_property_type_serde() {
        let json = serde_json::to_string(&PropertyType::Uuid).unwrap();
        assert_eq!(json, "\"uuid\"");
        let back: PropertyType = serde_json::from_str("\"date\"").unwrap();
        assert_eq!(back, PropertyType::Date);
    }

    #[test]
    fn test_keyable_types() {
        assert!(PropertyType::String.is_keyable());
        assert!(PropertyType::Integer.is_keyable());
        assert!(PropertyType::Uuid.is_keyable());
        assert!(!PropertyType::Number.is_keyable());
        assert!(!PropertyType::Json.is_keyable());
        assert!(!PropertyType::Date.is_keyable());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::from(7i64).as_integer(), Some(7));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert!(Value::from(1.5).as_str().is_none());
        assert!(Value::from("x").as_integer().is_none());
    }

    #[test]
    fn test_value_key_text() {
        let id = Uuid::new_v4();
        assert_eq!(Value::from("abc").key_text().as_deref(), Some("abc"));
        assert_eq!(Value::from(-12i64).key_text().as_deref(), Some("-12"));
        assert_eq!(Value::from(id).key_text(), Some(id.hyphenated().to_string()));
        assert!(Value::from(2.5).key_text().is_none());
    }

    #[test]
    fn test_props_macro() {
        let entry = props! { "a" => "x", "b" => 2, "c" => false };
        assert_eq!(entry["a"], Value::String("x".to_string()));
        assert_eq!(entry["b"], Value::Integer(2));
        assert_eq!(entry["c"], Value::Boolean(false));
    }
}

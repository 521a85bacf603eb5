//! Entity schemas and the property mapper.
//!
//! An [`EntitySchema`] is the immutable shape of an entity type: an ordered
//! list of typed properties plus the partition and row [`KeySpec`]s. It
//! validates entries, derives their ids and converts them to and from the
//! JSON object stored by the backend.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, ValidationError};
use crate::keys::{self, KeySpec};
use crate::value::{Properties, PropertyType, Value};

fn property_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("static regex"))
}

/// A declared property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Property name, unique within the schema.
    pub name: String,
    /// Declared value type.
    pub property_type: PropertyType,
}

/// The shape of an entity type.
///
/// # Examples
///
/// ```
/// use entitystore::{EntitySchema, KeySpec, PropertyType};
///
/// let schema = EntitySchema::builder()
///     .property("taskId", PropertyType::String)
///     .property("workerType", PropertyType::String)
///     .partition_key("taskId")
///     .row_key(KeySpec::constant("task"))
///     .build()
///     .unwrap();
/// assert_eq!(schema.row_key().to_string(), "task");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    properties: Vec<PropertyDef>,
    partition_key: KeySpec,
    row_key: KeySpec,
}

impl EntitySchema {
    /// Starts a new schema builder.
    #[must_use]
    pub fn builder() -> EntitySchemaBuilder {
        EntitySchemaBuilder::default()
    }

    /// Declared properties, in declaration order.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDef] {
        &self.properties
    }

    /// Declared type of a property.
    #[must_use]
    pub fn property_type(&self, name: &str) -> Option<PropertyType> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.property_type)
    }

    /// Key the partition component of the id is built from.
    #[must_use]
    pub const fn partition_key(&self) -> &KeySpec {
        &self.partition_key
    }

    /// Key the row component of the id is built from.
    #[must_use]
    pub const fn row_key(&self) -> &KeySpec {
        &self.row_key
    }

    /// Returns true if the property takes part in the partition or row key.
    #[must_use]
    pub fn is_key_property(&self, name: &str) -> bool {
        self.partition_key.uses_property(name) || self.row_key.uses_property(name)
    }

    /// Derives the storage id of an entry.
    ///
    /// Only key properties are read; all other properties may be absent.
    ///
    /// # Errors
    /// Returns a `ValidationError` if a key property is missing or mistyped.
    pub fn calculate_id(&self, entry: &Properties) -> Result<String, ValidationError> {
        let declared = |name: &str| self.property_type(name);
        let partition = self.partition_key.exact(entry, declared)?;
        let row = self.row_key.exact(entry, declared)?;
        Ok(keys::join_id(&partition, &row))
    }

    /// Id prefix shared by every entity in the entry's partition.
    ///
    /// # Errors
    /// Returns a `ValidationError` if a partition key property is missing or mistyped.
    pub fn partition_prefix(&self, entry: &Properties) -> Result<String, ValidationError> {
        let partition = self
            .partition_key
            .exact(entry, |name| self.property_type(name))?;
        Ok(keys::partition_prefix(&partition))
    }

    /// Checks that `entry` holds exactly the declared properties with matching types.
    ///
    /// # Errors
    /// - `MissingProperty` for an absent declared property
    /// - `UnknownProperty` for a property the schema does not declare
    /// - `TypeMismatch` for a value of the wrong type
    /// - `NonFiniteNumber` for NaN or infinite numbers
    pub fn validate(&self, entry: &Properties) -> Result<(), ValidationError> {
        for def in &self.properties {
            let value = entry
                .get(&def.name)
                .ok_or_else(|| ValidationError::MissingProperty {
                    property: def.name.clone(),
                })?;
            if value.property_type() != def.property_type {
                return Err(ValidationError::TypeMismatch {
                    property: def.name.clone(),
                    expected: def.property_type,
                    actual: value.property_type(),
                });
            }
            if let Value::Number(n) = value {
                if !n.is_finite() {
                    return Err(ValidationError::NonFiniteNumber {
                        property: def.name.clone(),
                    });
                }
            }
        }

        if let Some(unknown) = entry.keys().find(|k| self.property_type(k).is_none()) {
            return Err(ValidationError::UnknownProperty {
                property: unknown.clone(),
            });
        }

        Ok(())
    }

    /// Converts a valid entry into the stored JSON object.
    ///
    /// # Errors
    /// Returns the same errors as [`EntitySchema::validate`].
    pub fn serialize(&self, entry: &Properties) -> Result<serde_json::Value, ValidationError> {
        self.validate(entry)?;

        let mut object = serde_json::Map::with_capacity(self.properties.len());
        for def in &self.properties {
            // validate() guarantees presence
            let Some(value) = entry.get(&def.name) else {
                continue;
            };
            object.insert(def.name.clone(), to_json(&def.name, value)?);
        }
        Ok(serde_json::Value::Object(object))
    }

    /// Converts a stored JSON object back into typed properties.
    ///
    /// # Errors
    /// - `NotAnObject` if `stored` is not a JSON object
    /// - `MissingProperty` / `UnknownProperty` if the object does not match the schema
    /// - `InvalidStoredValue` if a value cannot be read as its declared type
    pub fn deserialize(&self, stored: &serde_json::Value) -> Result<Properties, ValidationError> {
        let object = stored.as_object().ok_or(ValidationError::NotAnObject)?;

        let mut entry = Properties::new();
        for def in &self.properties {
            let raw = object
                .get(&def.name)
                .ok_or_else(|| ValidationError::MissingProperty {
                    property: def.name.clone(),
                })?;
            entry.insert(def.name.clone(), from_json(def, raw)?);
        }

        if let Some(unknown) = object.keys().find(|k| self.property_type(k).is_none()) {
            return Err(ValidationError::UnknownProperty {
                property: unknown.clone(),
            });
        }

        Ok(entry)
    }
}

fn to_json(name: &str, value: &Value) -> Result<serde_json::Value, ValidationError> {
    Ok(match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .ok_or_else(|| ValidationError::NonFiniteNumber {
                property: name.to_string(),
            })?,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Date(d) => serde_json::Value::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Value::Json(j) => j.clone(),
        Value::Uuid(u) => serde_json::Value::String(u.hyphenated().to_string()),
    })
}

fn from_json(def: &PropertyDef, raw: &serde_json::Value) -> Result<Value, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidStoredValue {
        property: def.name.clone(),
        reason,
    };
    let expected = |what: &str| invalid(format!("expected {what}, found {raw}"));

    match def.property_type {
        PropertyType::String => raw
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| expected("a string")),
        PropertyType::Number => raw
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| expected("a number")),
        PropertyType::Integer => raw
            .as_i64()
            .map(Value::Integer)
            .ok_or_else(|| expected("an integer")),
        PropertyType::Boolean => raw
            .as_bool()
            .map(Value::Boolean)
            .ok_or_else(|| expected("a boolean")),
        PropertyType::Date => {
            let text = raw.as_str().ok_or_else(|| expected("an RFC 3339 string"))?;
            DateTime::parse_from_rfc3339(text)
                .map(|d| Value::Date(d.with_timezone(&Utc)))
                .map_err(|e| invalid(e.to_string()))
        }
        PropertyType::Json => Ok(Value::Json(raw.clone())),
        PropertyType::Uuid => {
            let text = raw.as_str().ok_or_else(|| expected("a UUID string"))?;
            Uuid::parse_str(text)
                .map(Value::Uuid)
                .map_err(|e| invalid(e.to_string()))
        }
    }
}

/// Builder for [`EntitySchema`].
#[derive(Debug, Clone, Default)]
pub struct EntitySchemaBuilder {
    properties: Vec<PropertyDef>,
    partition_key: Option<KeySpec>,
    row_key: Option<KeySpec>,
}

impl EntitySchemaBuilder {
    /// Declares a property.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, property_type: PropertyType) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            property_type,
        });
        self
    }

    /// Sets the partition key. A plain string names a property.
    #[must_use]
    pub fn partition_key(mut self, key: impl Into<KeySpec>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    /// Sets the row key. A plain string names a property.
    #[must_use]
    pub fn row_key(mut self, key: impl Into<KeySpec>) -> Self {
        self.row_key = Some(key.into());
        self
    }

    /// Sets a constant row key.
    #[must_use]
    pub fn row_key_constant(self, text: impl Into<String>) -> Self {
        self.row_key(KeySpec::constant(text))
    }

    /// Validates the declaration and builds the schema.
    ///
    /// # Errors
    /// Returns a `ConfigurationError` describing the first invalid declaration.
    pub fn build(self) -> Result<EntitySchema, ConfigurationError> {
        if self.properties.is_empty() {
            return Err(ConfigurationError::NoProperties);
        }

        let mut seen = HashSet::new();
        for def in &self.properties {
            if !property_name_pattern().is_match(&def.name) {
                return Err(ConfigurationError::InvalidPropertyName {
                    name: def.name.clone(),
                });
            }
            if !seen.insert(def.name.as_str()) {
                return Err(ConfigurationError::DuplicateProperty {
                    name: def.name.clone(),
                });
            }
        }

        let partition_key = self
            .partition_key
            .ok_or(ConfigurationError::EmptyKey { which: "partition" })?;
        let row_key = self.row_key.ok_or(ConfigurationError::EmptyKey { which: "row" })?;

        check_key(&self.properties, &partition_key, "partition")?;
        check_key(&self.properties, &row_key, "row")?;

        Ok(EntitySchema {
            properties: self.properties,
            partition_key,
            row_key,
        })
    }
}

fn check_key(
    properties: &[PropertyDef],
    key: &KeySpec,
    which: &'static str,
) -> Result<(), ConfigurationError> {
    match key {
        KeySpec::Constant { constant } if constant.is_empty() => {
            return Err(ConfigurationError::EmptyKey { which });
        }
        KeySpec::Composite(names) if names.is_empty() => {
            return Err(ConfigurationError::EmptyKey { which });
        }
        _ => {}
    }

    let mut seen = HashSet::new();
    for name in key.property_names() {
        if !seen.insert(name) {
            return Err(ConfigurationError::DuplicateKeyProperty {
                name: name.to_string(),
                which,
            });
        }
        let def = properties
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigurationError::UnknownKeyProperty {
                name: name.to_string(),
            })?;
        if !def.property_type.is_keyable() {
            return Err(ConfigurationError::UnkeyableProperty {
                name: name.to_string(),
                property_type: def.property_type,
            });
        }
    }
    Ok(())
}

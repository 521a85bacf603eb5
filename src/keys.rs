//! Identifier codec.
//!
//! An entity id is `<partition>_<row>`, where each side is the encoded text
//! of its key. Encoding escapes `_`, `~` and `!`, so the separator and the
//! composite-key joiner never occur inside a component and distinct
//! (partition, row) pairs always produce distinct ids.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::value::{Properties, PropertyType};

/// Separator between the partition and row components of an id.
pub const ID_SEPARATOR: char = '_';

/// Joiner between the parts of a composite key.
pub const COMPOSITE_SEPARATOR: char = '~';

/// Encoding of the empty string.
const EMPTY_COMPONENT: &str = "!";

// Characters left unescaped: alphanumerics plus - . * ' ( )
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Encodes a key component for use inside an entity id.
///
/// ```
/// use entitystore::keys::encode_key_component;
///
/// assert_eq!(encode_key_component("task"), "task");
/// assert_eq!(encode_key_component("a_b"), "a!5Fb");
/// assert_eq!(encode_key_component(""), "!");
/// ```
#[must_use]
pub fn encode_key_component(text: &str) -> String {
    if text.is_empty() {
        return EMPTY_COMPONENT.to_string();
    }
    utf8_percent_encode(text, KEY_ENCODE_SET)
        .to_string()
        .replace('%', "!")
}

/// How one side of the entity id is derived from an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    /// The value of a single declared property.
    Property(String),
    /// Fixed text shared by every entity of the type.
    Constant {
        /// The constant text.
        constant: String,
    },
    /// The values of several declared properties, in order.
    Composite(Vec<String>),
}

impl KeySpec {
    /// Key taken from a single property.
    pub fn property(name: impl Into<String>) -> Self {
        Self::Property(name.into())
    }

    /// Key with fixed text.
    pub fn constant(text: impl Into<String>) -> Self {
        Self::Constant {
            constant: text.into(),
        }
    }

    /// Key joined from several properties.
    pub fn composite<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Composite(names.into_iter().map(Into::into).collect())
    }

    /// Names of the properties this key reads.
    #[must_use]
    pub fn property_names(&self) -> Vec<&str> {
        match self {
            Self::Property(name) => vec![name.as_str()],
            Self::Constant { .. } => Vec::new(),
            Self::Composite(names) => names.iter().map(String::as_str).collect(),
        }
    }

    /// Returns true if this key reads the named property.
    #[must_use]
    pub fn uses_property(&self, name: &str) -> bool {
        self.property_names().contains(&name)
    }

    /// Computes the encoded key text for `entry`.
    ///
    /// `declared` resolves a property name to its declared type.
    ///
    /// # Errors
    /// - `MissingProperty` if a key property is absent from `entry`
    /// - `TypeMismatch` if a key property holds a value of another type
    pub fn exact<F>(&self, entry: &Properties, declared: F) -> Result<String, ValidationError>
    where
        F: Fn(&str) -> Option<PropertyType>,
    {
        match self {
            Self::Constant { constant } => Ok(encode_key_component(constant)),
            Self::Property(name) => key_part(name, entry, &declared),
            Self::Composite(names) => {
                let parts = names
                    .iter()
                    .map(|name| key_part(name, entry, &declared))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(parts.join(&COMPOSITE_SEPARATOR.to_string()))
            }
        }
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(name) => f.write_str(name),
            Self::Constant { constant } => f.write_str(constant),
            Self::Composite(names) => f.write_str(&names.join(&COMPOSITE_SEPARATOR.to_string())),
        }
    }
}

impl From<&str> for KeySpec {
    fn from(name: &str) -> Self {
        Self::Property(name.to_string())
    }
}

impl From<String> for KeySpec {
    fn from(name: String) -> Self {
        Self::Property(name)
    }
}

fn key_part<F>(name: &str, entry: &Properties, declared: &F) -> Result<String, ValidationError>
where
    F: Fn(&str) -> Option<PropertyType>,
{
    let value = entry
        .get(name)
        .ok_or_else(|| ValidationError::MissingProperty {
            property: name.to_string(),
        })?;

    if let Some(expected) = declared(name) {
        if value.property_type() != expected {
            return Err(ValidationError::TypeMismatch {
                property: name.to_string(),
                expected,
                actual: value.property_type(),
            });
        }
    }

    let text = value.key_text().ok_or_else(|| ValidationError::TypeMismatch {
        property: name.to_string(),
        expected: PropertyType::String,
        actual: value.property_type(),
    })?;
    Ok(encode_key_component(&text))
}

/// Joins encoded partition and row components into an entity id.
#[must_use]
pub fn join_id(partition: &str, row: &str) -> String {
    format!("{partition}{ID_SEPARATOR}{row}")
}

/// Prefix shared by every id in the given encoded partition.
#[must_use]
pub fn partition_prefix(partition: &str) -> String {
    format!("{partition}{ID_SEPARATOR}")
}

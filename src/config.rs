//! Entity descriptors and table bindings.
//!
//! [`EntityConfig`] is the declarative form of a schema, usable from code or
//! parsed from JSON:
//!
//! ```json
//! {
//!   "partitionKey": "taskId",
//!   "rowKey": { "constant": "task" },
//!   "properties": { "taskId": "string", "provisionerId": "string", "workerType": "string" }
//! }
//! ```
//!
//! [`SetupOptions`] binds a configured entity to a table on a storage adapter.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::keys::KeySpec;
use crate::schema::{EntitySchema, PropertyDef};
use crate::storage::StorageAdapter;
use crate::value::PropertyType;

fn table_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("static regex"))
}

/// Declarative entity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityConfig {
    /// Key that selects the partition.
    pub partition_key: KeySpec,
    /// Key that identifies the entity inside its partition.
    pub row_key: KeySpec,
    /// Declared properties, in declaration order.
    #[serde(with = "property_map")]
    pub properties: Vec<PropertyDef>,
}

impl EntityConfig {
    /// Starts a configuration with the given keys and no properties.
    pub fn new(partition_key: impl Into<KeySpec>, row_key: impl Into<KeySpec>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            properties: Vec::new(),
        }
    }

    /// Appends a property. Repeated names are reported by [`EntityConfig::to_schema`].
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, property_type: PropertyType) -> Self {
        self.properties.push(PropertyDef {
            name: name.into(),
            property_type,
        });
        self
    }

    /// Parses a JSON descriptor.
    ///
    /// # Errors
    /// `ConfigurationError::InvalidDescriptor` if the JSON is malformed, has
    /// unknown fields, or names an unknown property type.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|e| ConfigurationError::InvalidDescriptor {
            reason: e.to_string(),
        })
    }

    /// Builds the schema this configuration describes.
    ///
    /// # Errors
    /// Any `ConfigurationError` raised by [`crate::schema::EntitySchemaBuilder::build`].
    pub fn to_schema(&self) -> Result<EntitySchema, ConfigurationError> {
        self.properties
            .iter()
            .fold(EntitySchema::builder(), |builder, def| {
                builder.property(def.name.clone(), def.property_type)
            })
            .partition_key(self.partition_key.clone())
            .row_key(self.row_key.clone())
            .build()
    }
}

/// `properties` as a JSON object in declaration order, rejecting repeated names.
mod property_map {
    use super::{fmt, HashSet, PropertyDef, PropertyType};

    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(defs: &[PropertyDef], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(defs.len()))?;
        for def in defs {
            map.serialize_entry(&def.name, &def.property_type)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<PropertyDef>, D::Error> {
        deserializer.deserialize_map(PropertyMapVisitor)
    }

    struct PropertyMapVisitor;

    impl<'de> Visitor<'de> for PropertyMapVisitor {
        type Value = Vec<PropertyDef>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of property names to property types")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut seen = HashSet::new();
            let mut defs = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, property_type)) = access.next_entry::<String, PropertyType>()? {
                if !seen.insert(name.clone()) {
                    return Err(de::Error::custom(format!(
                        "property '{name}' is declared more than once"
                    )));
                }
                defs.push(PropertyDef {
                    name,
                    property_type,
                });
            }
            Ok(defs)
        }
    }
}

/// Binding of an entity to a physical table.
#[derive(Clone)]
pub struct SetupOptions {
    /// Physical table the entity's rows live in.
    pub table_name: String,
    /// Name of the owning service.
    pub service_name: String,
    /// Adapter that stores the rows.
    pub storage: Arc<dyn StorageAdapter>,
}

impl SetupOptions {
    /// Creates a binding; see [`SetupOptions::validate`] for the naming rules.
    pub fn new(
        table_name: impl Into<String>,
        service_name: impl Into<String>,
        storage: Arc<dyn StorageAdapter>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            service_name: service_name.into(),
            storage,
        }
    }

    /// Checks the table and service names.
    ///
    /// # Errors
    /// - `InvalidTableName` unless the table name matches `[a-z][a-z0-9_]*`
    /// - `EmptyServiceName` if the service name is blank
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !table_name_pattern().is_match(&self.table_name) {
            return Err(ConfigurationError::InvalidTableName {
                name: self.table_name.clone(),
            });
        }
        if self.service_name.trim().is_empty() {
            return Err(ConfigurationError::EmptyServiceName);
        }
        Ok(())
    }

    /// Returns true if both options name the same table, service and adapter instance.
    #[must_use]
    pub fn same_binding(&self, other: &Self) -> bool {
        self.table_name == other.table_name
            && self.service_name == other.service_name
            && std::ptr::eq(
                Arc::as_ptr(&self.storage).cast::<()>(),
                Arc::as_ptr(&other.storage).cast::<()>(),
            )
    }
}

impl fmt::Debug for SetupOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupOptions")
            .field("table_name", &self.table_name)
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}

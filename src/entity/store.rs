//! The entity store: a schema bound to a table on a storage adapter.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::config::{EntityConfig, SetupOptions};
use crate::error::{ConfigurationError, EntityError, EntityResult, ValidationError};
use crate::keys::KeySpec;
use crate::schema::{EntitySchema, PropertyDef};
use crate::storage::codes;
use crate::value::Properties;

use super::record::{EntityRecord, ScanOptions, ScanPage};

/// A configured entity type.
///
/// Lifecycle: [`Entity::configure`] (or [`Entity::new`]) → [`Entity::setup`]
/// → operations. Operations before `setup` fail with
/// [`EntityError::NotBound`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use entitystore::{props, Entity, EntityConfig, InMemoryStorage, KeySpec, PropertyType, SetupOptions};
///
/// let entity = Entity::configure(
///     EntityConfig::new("taskId", KeySpec::constant("task"))
///         .property("taskId", PropertyType::String)
///         .property("workerType", PropertyType::String),
/// )
/// .unwrap();
/// entity
///     .setup(SetupOptions::new("tasks", "queue", Arc::new(InMemoryStorage::new())))
///     .unwrap();
///
/// let record = entity.create(&props! { "taskId" => "T1", "workerType" => "w1" }, false).unwrap();
/// assert_eq!(record.id, "T1_task");
/// assert_eq!(record.version, 1);
/// ```
#[derive(Debug)]
pub struct Entity {
    schema: Arc<EntitySchema>,
    binding: OnceLock<SetupOptions>,
}

impl Entity {
    /// Creates an unbound entity from a built schema.
    #[must_use]
    pub fn new(schema: EntitySchema) -> Self {
        Self {
            schema: Arc::new(schema),
            binding: OnceLock::new(),
        }
    }

    /// Builds an unbound entity from a declarative configuration.
    ///
    /// # Errors
    /// Returns a `ConfigurationError` if the configuration is invalid, for
    /// example when a key names an undeclared property.
    pub fn configure(config: EntityConfig) -> Result<Self, ConfigurationError> {
        Ok(Self::new(config.to_schema()?))
    }

    /// The schema this entity type was configured with.
    #[must_use]
    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// Declared properties, in declaration order.
    #[must_use]
    pub fn properties(&self) -> &[PropertyDef] {
        self.schema.properties()
    }

    /// See [`EntitySchema::partition_key`].
    #[must_use]
    pub fn partition_key(&self) -> &KeySpec {
        self.schema.partition_key()
    }

    /// See [`EntitySchema::row_key`].
    #[must_use]
    pub fn row_key(&self) -> &KeySpec {
        self.schema.row_key()
    }

    /// Binds this entity to a table on a storage adapter.
    ///
    /// Repeating the call with the same table, service and adapter instance
    /// is a no-op.
    ///
    /// # Errors
    /// - invalid table or service name
    /// - `AlreadyBound` if the entity is bound to something else
    pub fn setup(&self, options: SetupOptions) -> EntityResult<()> {
        options.validate()?;

        match self.binding.set(options) {
            Ok(()) => {
                if let Some(bound) = self.binding.get() {
                    info!(
                        table = %bound.table_name,
                        service = %bound.service_name,
                        "entity bound to table"
                    );
                }
                Ok(())
            }
            Err(rejected) => {
                let current = self.binding()?;
                if current.same_binding(&rejected) {
                    Ok(())
                } else {
                    Err(ConfigurationError::AlreadyBound {
                        table_name: current.table_name.clone(),
                    }
                    .into())
                }
            }
        }
    }

    /// Returns true once [`Entity::setup`] has succeeded.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.get().is_some()
    }

    /// Table this entity is bound to.
    #[must_use]
    pub fn table_name(&self) -> Option<&str> {
        self.binding.get().map(|b| b.table_name.as_str())
    }

    fn binding(&self) -> EntityResult<&SetupOptions> {
        self.binding.get().ok_or(EntityError::NotBound)
    }

    /// Derives the storage id of an entry from its key properties.
    ///
    /// # Errors
    /// Returns a `ValidationError` if a key property is missing or mistyped.
    pub fn calculate_id(&self, entry: &Properties) -> Result<String, ValidationError> {
        self.schema.calculate_id(entry)
    }

    /// Stores a new entity.
    ///
    /// With `overwrite_if_exists` an existing record is replaced entirely and
    /// gets a new etag and the next version. Without it an existing id fails
    /// with [`EntityError::AlreadyExists`] carrying the native conflict code.
    ///
    /// # Errors
    /// - `NotBound` before setup
    /// - `Validation` if the entry does not match the schema
    /// - `AlreadyExists` on conflict, `StoreUnavailable` / `Storage` from the adapter
    pub fn create(&self, entry: &Properties, overwrite_if_exists: bool) -> EntityResult<EntityRecord> {
        let binding = self.binding()?;
        let id = self.schema.calculate_id(entry)?;
        let value = self.schema.serialize(entry)?;

        debug!(
            table = %binding.table_name,
            id = %id,
            overwrite = overwrite_if_exists,
            "creating entity"
        );
        let version = binding
            .storage
            .create_entity(&binding.table_name, &id, &value, overwrite_if_exists)?;

        Ok(EntityRecord {
            id,
            value: entry.clone(),
            etag: version.etag,
            version: version.version,
        })
    }

    /// Loads the entity addressed by the key properties in `keys`.
    ///
    /// # Errors
    /// - `NotBound` before setup
    /// - `Validation` if a key property is missing, or the stored value no longer matches the schema
    pub fn load(&self, keys: &Properties) -> EntityResult<Option<EntityRecord>> {
        let binding = self.binding()?;
        let id = self.schema.calculate_id(keys)?;

        debug!(table = %binding.table_name, id = %id, "loading entity");
        let row = binding
            .storage
            .get_entity(&binding.table_name, &id)?
            .into_iter()
            .next();

        Ok(row
            .map(|row| EntityRecord::from_row(&self.schema, row))
            .transpose()?)
    }

    /// Applies `modifier` to a copy of `record`'s value and stores the result
    /// if the record has not changed since it was read.
    ///
    /// Key properties cannot be modified. There is no retry: a concurrent
    /// write surfaces as [`EntityError::Modified`], and the caller decides
    /// whether to reload and try again.
    ///
    /// # Errors
    /// - `NotBound` before setup
    /// - `Validation` (`KeyChanged` included) for an invalid new value
    /// - `Modified` on a stale etag, `NotFound` if the record was removed
    pub fn modify<F>(&self, record: &EntityRecord, modifier: F) -> EntityResult<EntityRecord>
    where
        F: FnOnce(&mut Properties),
    {
        let binding = self.binding()?;

        let mut value = record.value.clone();
        modifier(&mut value);

        for def in self.schema.properties() {
            if self.schema.is_key_property(&def.name)
                && value.get(&def.name) != record.value.get(&def.name)
            {
                return Err(ValidationError::KeyChanged {
                    property: def.name.clone(),
                }
                .into());
            }
        }
        let serialized = self.schema.serialize(&value)?;

        debug!(
            table = %binding.table_name,
            id = %record.id,
            version = record.version,
            "modifying entity"
        );
        let version = binding.storage.modify_entity(
            &binding.table_name,
            &record.id,
            &serialized,
            record.etag,
        )?;

        Ok(EntityRecord {
            id: record.id.clone(),
            value,
            etag: version.etag,
            version: version.version,
        })
    }

    /// Removes the entity addressed by the key properties in `keys`.
    ///
    /// Returns whether a record was removed.
    ///
    /// # Errors
    /// - `NotBound` before setup
    /// - `NotFound` when nothing was removed, unless `ignore_if_not_exists`
    pub fn remove(&self, keys: &Properties, ignore_if_not_exists: bool) -> EntityResult<bool> {
        let binding = self.binding()?;
        let id = self.schema.calculate_id(keys)?;

        debug!(table = %binding.table_name, id = %id, "removing entity");
        let removed = binding
            .storage
            .remove_entity(&binding.table_name, &id, None)?;

        if !removed && !ignore_if_not_exists {
            return Err(EntityError::NotFound {
                id,
                code: codes::NO_DATA_FOUND.to_string(),
            });
        }
        Ok(removed)
    }

    /// Removes `record` only if it is still the current version.
    ///
    /// # Errors
    /// - `NotBound` before setup
    /// - `Modified` if the record changed since it was read
    /// - `NotFound` if it is already gone
    pub fn remove_record(&self, record: &EntityRecord) -> EntityResult<()> {
        let binding = self.binding()?;

        debug!(table = %binding.table_name, id = %record.id, "removing entity record");
        let removed = binding
            .storage
            .remove_entity(&binding.table_name, &record.id, Some(record.etag))?;

        if removed {
            Ok(())
        } else {
            Err(EntityError::NotFound {
                id: record.id.clone(),
                code: codes::NO_DATA_FOUND.to_string(),
            })
        }
    }

    /// Lists entities in id order, one page at a time.
    ///
    /// With `partition` set, only entities sharing its partition key are
    /// returned; it needs just the partition key properties.
    ///
    /// # Errors
    /// - `NotBound` before setup
    /// - `Validation` if a partition key property is missing, or a stored value no longer matches the schema
    pub fn scan(&self, partition: Option<&Properties>, options: &ScanOptions) -> EntityResult<ScanPage> {
        let binding = self.binding()?;
        let prefix = partition
            .map(|keys| self.schema.partition_prefix(keys))
            .transpose()?
            .unwrap_or_default();

        debug!(
            table = %binding.table_name,
            prefix = %prefix,
            limit = options.limit,
            "scanning entities"
        );
        let rows = binding.storage.scan_entities(
            &binding.table_name,
            &prefix,
            options.continuation.as_deref(),
            options.limit,
        )?;

        let full = options.limit > 0 && rows.len() == options.limit;
        let continuation = if full { rows.last().map(|r| r.id.clone()) } else { None };
        let records = rows
            .into_iter()
            .map(|row| EntityRecord::from_row(&self.schema, row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ScanPage {
            records,
            continuation,
        })
    }
}

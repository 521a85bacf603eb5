//! # entitystore - Schema-addressed entity storage
//!
//! Typed records addressed by a partition key and a row key, persisted
//! through a pluggable storage adapter with optimistic concurrency.
//!
//! ## Core Concepts
//!
//! - **Schema**: declared properties plus the key specifications that address a record
//! - **Id**: deterministic composite of the encoded partition and row keys
//! - **Etag / version**: change markers issued on every write
//! - **Storage adapter**: the row store; in-memory or WAL-backed files
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use entitystore::{props, Entity, EntityConfig, InMemoryStorage, KeySpec, PropertyType, SetupOptions};
//!
//! let entity = Entity::configure(
//!     EntityConfig::new("taskId", KeySpec::constant("task"))
//!         .property("taskId", PropertyType::String)
//!         .property("workerType", PropertyType::String),
//! )?;
//! entity.setup(SetupOptions::new("tasks", "queue", Arc::new(InMemoryStorage::new())))?;
//!
//! let entry = props! { "taskId" => "T1", "workerType" => "w1" };
//! entity.create(&entry, false)?;
//!
//! let err = entity.create(&entry, false).unwrap_err();
//! assert_eq!(err.code(), Some("23505"));
//! # Ok::<(), entitystore::EntityError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod entity;
pub mod error;
pub mod keys;
pub mod schema;
pub mod storage;
pub mod value;

// Re-export primary types at crate root for convenience
pub use config::{EntityConfig, SetupOptions};
pub use entity::{Entity, EntityRecord, ScanOptions, ScanPage};
pub use error::{ConfigurationError, EntityError, EntityResult, ValidationError};
pub use keys::KeySpec;
pub use schema::{EntitySchema, EntitySchemaBuilder, PropertyDef};
pub use storage::{
    codes, Etag, InMemoryStorage, RowVersion, StorageAdapter, StorageError, StoredRow,
};
pub use value::{Properties, PropertyType, Value};

#[cfg(feature = "persistent")]
pub use storage::{open_storage, FileStorage, PersistentConfig};

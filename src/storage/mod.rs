//! Storage adapters for entity rows.
//!
//! [`StorageAdapter`] is the boundary the entity layer talks to. The crate
//! ships an in-memory backend and, behind the `persistent` feature, a
//! WAL-backed file backend.

mod memory;
mod rows;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryStorage;
pub use rows::{Etag, RowChange, RowVersion, StoredRow, Tables};
pub use traits::{codes, StorageAdapter, StorageError};

#[cfg(feature = "persistent")]
pub use persistent::{open_storage, FileStorage, PersistentConfig};

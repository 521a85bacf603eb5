//! Entity store.
//!
//! An [`Entity`] binds an [`crate::EntitySchema`] to a table on a storage
//! adapter and exposes create/load/modify/remove/scan with optimistic
//! concurrency.

mod record;
mod store;

pub use record::{EntityRecord, ScanOptions, ScanPage};
pub use store::Entity;

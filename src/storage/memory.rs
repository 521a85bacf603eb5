//! In-memory storage backend.
//!
//! Thread-safe implementation of [`StorageAdapter`] over [`Tables`]. It is
//! intended for embedded usage, tests, and as a reference implementation.

use std::sync::RwLock;

use crate::storage::rows::{change_version, Etag, RowVersion, StoredRow, Tables};
use crate::storage::traits::{StorageAdapter, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

/// Thread-safe in-memory row store.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    state: RwLock<Tables>,
}

impl InMemoryStorage {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows across all tables.
    pub fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("storage.len"))?;
        Ok(state.len())
    }

    /// Returns true if no row is stored.
    ///
    /// # Errors
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl StorageAdapter for InMemoryStorage {
    fn get_entity(&self, table: &str, id: &str) -> Result<Vec<StoredRow>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("storage.get_entity"))?;
        Ok(state.get(table, id))
    }

    fn create_entity(
        &self,
        table: &str,
        id: &str,
        value: &serde_json::Value,
        overwrite: bool,
    ) -> Result<RowVersion, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("storage.create_entity"))?;
        let change = state.plan_create(table, id, value, overwrite)?;
        let version = change_version(&change)
            .ok_or_else(|| StorageError::Backend("create planned a delete".to_string()))?;
        state.commit(change);
        Ok(version)
    }

    fn modify_entity(
        &self,
        table: &str,
        id: &str,
        value: &serde_json::Value,
        expected_etag: Etag,
    ) -> Result<RowVersion, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("storage.modify_entity"))?;
        let change = state.plan_modify(table, id, value, expected_etag)?;
        let version = change_version(&change)
            .ok_or_else(|| StorageError::Backend("modify planned a delete".to_string()))?;
        state.commit(change);
        Ok(version)
    }

    fn remove_entity(
        &self,
        table: &str,
        id: &str,
        expected_etag: Option<Etag>,
    ) -> Result<bool, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("storage.remove_entity"))?;
        let Some(change) = state.plan_remove(table, id, expected_etag)? else {
            return Ok(false);
        };
        state.commit(change);
        Ok(true)
    }

    fn scan_entities(
        &self,
        table: &str,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredRow>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("storage.scan_entities"))?;
        Ok(state.scan(table, prefix, after, limit))
    }
}

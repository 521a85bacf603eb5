//! Abstract storage adapter contract.
//!
//! The entity layer never touches rows directly; it issues these operations
//! against an injected adapter. Implementations own durability and conflict
//! detection:
//! - every operation is atomic with respect to the others
//! - conflicts are reported, never retried
//! - a failed operation leaves prior state untouched

use thiserror::Error;

use super::rows::{Etag, RowVersion, StoredRow};

/// Native error codes carried by storage errors.
///
/// These follow the SQLSTATE values a relational backend would report.
pub mod codes {
    /// A row with the same id already exists.
    pub const UNIQUE_VIOLATION: &str = "23505";
    /// No row with the given id.
    pub const NO_DATA_FOUND: &str = "P0002";
    /// The row's etag no longer matches the expected one.
    pub const ETAG_MISMATCH: &str = "P0004";
    /// The backend could not be reached.
    pub const CONNECTION_FAILURE: &str = "08006";
    /// Unexpected backend failure.
    pub const INTERNAL_ERROR: &str = "XX000";
    /// A stored value could not be encoded or decoded.
    pub const INVALID_TEXT_REPRESENTATION: &str = "22P02";
}

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Create without overwrite hit an existing id.
    #[error("Duplicate key: {id}")]
    UniqueViolation { id: String },

    /// Conditional operation addressed a missing id.
    #[error("Row not found: {id}")]
    NotFound { id: String },

    /// Conditional operation carried a stale etag.
    #[error("Etag mismatch for row: {id}")]
    EtagMismatch { id: String },

    /// Transport or connection failure.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Returns the native code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UniqueViolation { .. } => codes::UNIQUE_VIOLATION,
            Self::NotFound { .. } => codes::NO_DATA_FOUND,
            Self::EtagMismatch { .. } => codes::ETAG_MISMATCH,
            Self::Unavailable(_) => codes::CONNECTION_FAILURE,
            Self::Backend(_) => codes::INTERNAL_ERROR,
            Self::Serialization(_) => codes::INVALID_TEXT_REPRESENTATION,
        }
    }
}

/// Storage adapter for entity rows.
///
/// All calls are scoped to a table. Ids are opaque strings produced by the
/// identifier codec.
pub trait StorageAdapter: Send + Sync {
    /// Returns the current row for `id`: zero or one element.
    fn get_entity(&self, table: &str, id: &str) -> Result<Vec<StoredRow>, StorageError>;

    /// Inserts a row.
    ///
    /// An absent id is inserted at version 1. A present id is rejected with
    /// `UniqueViolation` unless `overwrite` is set, in which case the whole
    /// value is replaced, the version incremented and a new etag issued.
    fn create_entity(
        &self,
        table: &str,
        id: &str,
        value: &serde_json::Value,
        overwrite: bool,
    ) -> Result<RowVersion, StorageError>;

    /// Replaces the value of an existing row if its etag still matches.
    ///
    /// # Errors
    /// - `NotFound`: the row does not exist
    /// - `EtagMismatch`: the row was written since `expected_etag` was read
    fn modify_entity(
        &self,
        table: &str,
        id: &str,
        value: &serde_json::Value,
        expected_etag: Etag,
    ) -> Result<RowVersion, StorageError>;

    /// Deletes a row, returning whether one was removed.
    ///
    /// When `expected_etag` is given the delete only applies to that version;
    /// otherwise `EtagMismatch` is returned.
    fn remove_entity(
        &self,
        table: &str,
        id: &str,
        expected_etag: Option<Etag>,
    ) -> Result<bool, StorageError>;

    /// Lists rows whose id starts with `prefix` and sorts after `after`,
    /// ascending by id, at most `limit` of them.
    fn scan_entities(
        &self,
        table: &str,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredRow>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure the trait is object-safe
    fn _assert_storage_adapter_object_safe(_: &dyn StorageAdapter) {}

    #[test]
    fn test_storage_error_codes() {
        let err = StorageError::UniqueViolation {
            id: "x_y".to_string(),
        };
        assert_eq!(err.code(), "23505");
        assert!(err.to_string().contains("x_y"));

        assert_eq!(
            StorageError::NotFound { id: String::new() }.code(),
            codes::NO_DATA_FOUND
        );
        assert_eq!(
            StorageError::EtagMismatch { id: String::new() }.code(),
            codes::ETAG_MISMATCH
        );
        assert_eq!(
            StorageError::Unavailable("down".to_string()).code(),
            codes::CONNECTION_FAILURE
        );
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Backend("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}

//! Records returned by entity operations.

use crate::error::ValidationError;
use crate::schema::EntitySchema;
use crate::storage::{Etag, StoredRow};
use crate::value::{Properties, Value};

/// A stored entity with its current etag and version.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    /// Composite id derived from the partition and row keys.
    pub id: String,
    /// Typed property values.
    pub value: Properties,
    /// Etag of the stored row, compared by [`super::Entity::modify`].
    pub etag: Etag,
    /// Version of the stored row.
    pub version: u64,
}

impl EntityRecord {
    /// Decodes a stored row through the schema.
    ///
    /// # Errors
    /// Returns a `ValidationError` if the stored value does not match the schema.
    pub fn from_row(schema: &EntitySchema, row: StoredRow) -> Result<Self, ValidationError> {
        Ok(Self {
            value: schema.deserialize(&row.value)?,
            id: row.id,
            etag: row.etag,
            version: row.version,
        })
    }

    /// Value of a single property.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.value.get(name)
    }
}

/// Options for [`super::Entity::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Maximum number of records per page.
    pub limit: usize,
    /// Resume after this id (from a previous [`ScanPage::continuation`]).
    pub continuation: Option<String>,
}

impl ScanOptions {
    /// Page size used when no limit is given.
    pub const DEFAULT_LIMIT: usize = 1000;

    /// Default options: first page, [`Self::DEFAULT_LIMIT`] records.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the continuation token.
    #[must_use]
    pub fn continuation(mut self, continuation: Option<String>) -> Self {
        self.continuation = continuation;
        self
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            continuation: None,
        }
    }
}

/// One page of scan results.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage {
    /// Records in id order.
    pub records: Vec<EntityRecord>,
    /// Set when the page is full; pass it back to fetch the next page.
    pub continuation: Option<String>,
}

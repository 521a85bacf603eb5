//! Row types and the table logic shared by the storage backends.
//!
//! [`Tables`] decides the outcome of each write without mutating anything
//! ("plan"), then applies it ("commit"). Backends hold one write lock across
//! plan and commit, which makes every operation atomic; the persistent
//! backend logs the planned change between the two steps.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::traits::StorageError;

/// Opaque version token, regenerated on every successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Etag(Uuid);

impl Etag {
    /// Creates a fresh random etag.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for Etag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for Etag {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A row as stored by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    /// Composite id, unique within its table.
    pub id: String,
    /// Serialized property values.
    pub value: serde_json::Value,
    /// Changes on every successful write.
    pub etag: Etag,
    /// Starts at 1 and increases by one per write.
    pub version: u64,
}

impl StoredRow {
    /// Returns the etag/version pair of this row.
    #[must_use]
    pub fn row_version(&self) -> RowVersion {
        RowVersion {
            etag: self.etag,
            version: self.version,
        }
    }
}

/// Etag and version assigned by a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowVersion {
    /// New etag of the row.
    pub etag: Etag,
    /// New version of the row.
    pub version: u64,
}

/// A planned mutation, produced by [`Tables`] and applied by [`Tables::commit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowChange {
    /// Insert or replace a row.
    Put {
        /// Target table.
        table: String,
        /// Row as it will be stored.
        row: StoredRow,
    },
    /// Delete a row.
    Delete {
        /// Target table.
        table: String,
        /// Id of the removed row.
        id: String,
    },
}

/// In-memory row tables keyed by table name, then id.
#[derive(Debug, Default)]
pub struct Tables {
    tables: HashMap<String, BTreeMap<String, StoredRow>>,
}

impl Tables {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&self, table: &str, id: &str) -> Option<&StoredRow> {
        self.tables.get(table).and_then(|rows| rows.get(id))
    }

    /// Number of rows across all tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    /// Returns true if no table holds a row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the row with this id as a zero- or one-element vector.
    pub fn get(&self, table: &str, id: &str) -> Vec<StoredRow> {
        self.row(table, id).cloned().into_iter().collect()
    }

    /// Returns up to `limit` rows whose id starts with `prefix`, in id order,
    /// strictly after `after` when given.
    pub fn scan(&self, table: &str, prefix: &str, after: Option<&str>, limit: usize) -> Vec<StoredRow> {
        let Some(rows) = self.tables.get(table) else {
            return Vec::new();
        };
        if limit == 0 {
            return Vec::new();
        }

        let lower = match after {
            Some(after) if after >= prefix => Bound::Excluded(after.to_string()),
            _ => Bound::Included(prefix.to_string()),
        };

        rows.range((lower, Bound::Unbounded))
            .take_while(|(id, _)| id.starts_with(prefix))
            .take(limit)
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Plans a create; see [`super::StorageAdapter::create_entity`].
    pub fn plan_create(
        &self,
        table: &str,
        id: &str,
        value: &serde_json::Value,
        overwrite: bool,
    ) -> Result<RowChange, StorageError> {
        let version = match self.row(table, id) {
            None => 1,
            Some(_) if !overwrite => {
                return Err(StorageError::UniqueViolation { id: id.to_string() });
            }
            Some(existing) => next_version(existing)?,
        };
        Ok(put(table, id, value, version))
    }

    /// Plans a conditional update; see [`super::StorageAdapter::modify_entity`].
    pub fn plan_modify(
        &self,
        table: &str,
        id: &str,
        value: &serde_json::Value,
        expected_etag: Etag,
    ) -> Result<RowChange, StorageError> {
        let existing = self
            .row(table, id)
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })?;
        if existing.etag != expected_etag {
            return Err(StorageError::EtagMismatch { id: id.to_string() });
        }
        Ok(put(table, id, value, next_version(existing)?))
    }

    /// Plans a delete. Returns `None` when there is nothing to delete.
    pub fn plan_remove(
        &self,
        table: &str,
        id: &str,
        expected_etag: Option<Etag>,
    ) -> Result<Option<RowChange>, StorageError> {
        let Some(existing) = self.row(table, id) else {
            return Ok(None);
        };
        if let Some(expected) = expected_etag {
            if existing.etag != expected {
                return Err(StorageError::EtagMismatch { id: id.to_string() });
            }
        }
        Ok(Some(RowChange::Delete {
            table: table.to_string(),
            id: id.to_string(),
        }))
    }

    /// Applies a planned change.
    pub fn commit(&mut self, change: RowChange) {
        match change {
            RowChange::Put { table, row } => {
                self.tables.entry(table).or_default().insert(row.id.clone(), row);
            }
            RowChange::Delete { table, id } => {
                if let Some(rows) = self.tables.get_mut(&table) {
                    rows.remove(&id);
                    if rows.is_empty() {
                        self.tables.remove(&table);
                    }
                }
            }
        }
    }

    /// Every live row as a `Put` change, used to rewrite a log.
    pub fn snapshot(&self) -> Vec<RowChange> {
        self.tables
            .iter()
            .flat_map(|(table, rows)| {
                rows.values().map(move |row| RowChange::Put {
                    table: table.clone(),
                    row: row.clone(),
                })
            })
            .collect()
    }
}

fn next_version(existing: &StoredRow) -> Result<u64, StorageError> {
    existing.version.checked_add(1).ok_or_else(|| {
        StorageError::Backend(format!("version overflow for row: {}", existing.id))
    })
}

fn put(table: &str, id: &str, value: &serde_json::Value, version: u64) -> RowChange {
    RowChange::Put {
        table: table.to_string(),
        row: StoredRow {
            id: id.to_string(),
            value: value.clone(),
            etag: Etag::new(),
            version,
        },
    }
}

/// Version assigned by a planned change, if it writes a row.
pub(crate) fn change_version(change: &RowChange) -> Option<RowVersion> {
    match change {
        RowChange::Put { row, .. } => Some(row.row_version()),
        RowChange::Delete { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn commit_create(tables: &mut Tables, id: &str, value: serde_json::Value, overwrite: bool) -> RowVersion {
        let change = tables.plan_create("t", id, &value, overwrite).unwrap();
        let version = change_version(&change).unwrap();
        tables.commit(change);
        version
    }

    #[test]
    fn test_create_then_get() {
        let mut tables = Tables::new();
        let v = commit_create(&mut tables, "a_x", json!({"n": 1}), false);
        assert_eq!(v.version, 1);

        let rows = tables.get("t", "a_x");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].etag, v.etag);
        assert_eq!(rows[0].value, json!({"n": 1}));
        assert!(tables.get("other", "a_x").is_empty());
    }

    #[test]
    fn test_create_conflict_plans_nothing() {
        let mut tables = Tables::new();
        commit_create(&mut tables, "a_x", json!({"n": 1}), false);
        let err = tables.plan_create("t", "a_x", &json!({"n": 2}), false).unwrap_err();
        assert_eq!(err, StorageError::UniqueViolation { id: "a_x".to_string() });
        assert_eq!(tables.get("t", "a_x")[0].value, json!({"n": 1}));
    }

    #[test]
    fn test_overwrite_identical_value_bumps_version() {
        let mut tables = Tables::new();
        let first = commit_create(&mut tables, "a_x", json!({"n": 1}), false);
        let second = commit_create(&mut tables, "a_x", json!({"n": 1}), true);
        assert_eq!(second.version, first.version + 1);
        assert_ne!(second.etag, first.etag);
    }

    #[test]
    fn test_modify_checks_etag() {
        let mut tables = Tables::new();
        let first = commit_create(&mut tables, "a_x", json!({"n": 1}), false);

        let stale = Etag::new();
        assert!(matches!(
            tables.plan_modify("t", "a_x", &json!({"n": 2}), stale),
            Err(StorageError::EtagMismatch { .. })
        ));
        assert!(matches!(
            tables.plan_modify("t", "b_x", &json!({"n": 2}), first.etag),
            Err(StorageError::NotFound { .. })
        ));

        let change = tables.plan_modify("t", "a_x", &json!({"n": 2}), first.etag).unwrap();
        tables.commit(change);
        assert_eq!(tables.get("t", "a_x")[0].version, 2);
    }

    #[test]
    fn test_remove_plans() {
        let mut tables = Tables::new();
        let first = commit_create(&mut tables, "a_x", json!({}), false);

        assert!(tables.plan_remove("t", "missing", None).unwrap().is_none());
        assert!(tables.plan_remove("t", "a_x", Some(Etag::new())).is_err());

        let change = tables.plan_remove("t", "a_x", Some(first.etag)).unwrap().unwrap();
        tables.commit(change);
        assert!(tables.is_empty());
    }

    #[test]
    fn test_scan_prefix_and_pagination() {
        let mut tables = Tables::new();
        for id in ["a_1", "a_2", "a_3", "ab_1", "b_1"] {
            commit_create(&mut tables, id, json!({}), false);
        }

        let ids = |rows: Vec<StoredRow>| rows.into_iter().map(|r| r.id).collect::<Vec<_>>();

        assert_eq!(ids(tables.scan("t", "a_", None, 10)), ["a_1", "a_2", "a_3"]);
        assert_eq!(ids(tables.scan("t", "a_", None, 2)), ["a_1", "a_2"]);
        assert_eq!(ids(tables.scan("t", "a_", Some("a_2"), 10)), ["a_3"]);
        assert_eq!(tables.scan("t", "", None, 10).len(), 5);
        assert!(tables.scan("t", "a_", None, 0).is_empty());
        assert!(tables.scan("missing", "", None, 10).is_empty());
    }

    #[test]
    fn test_snapshot_rebuilds_state() {
        let mut tables = Tables::new();
        commit_create(&mut tables, "a_1", json!({"x": 1}), false);
        commit_create(&mut tables, "a_2", json!({"x": 2}), false);

        let mut rebuilt = Tables::new();
        for change in tables.snapshot() {
            rebuilt.commit(change);
        }
        assert_eq!(rebuilt.get("t", "a_2"), tables.get("t", "a_2"));
        assert_eq!(rebuilt.len(), 2);
    }
}

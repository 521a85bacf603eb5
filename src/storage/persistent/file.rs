//! File-backed storage adapter.
//!
//! Wraps:
//! - an in-memory [`Tables`] index for reads
//! - a write-ahead log that every mutation reaches before it is applied
//! - an exclusive directory lock

use std::fs;
use std::io::{ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockWriteGuard};

use tracing::{debug, info, warn};

use super::file_lock::DirectoryLock;
use super::wal::WriteAheadLog;
use super::PersistentConfig;
use crate::storage::rows::{change_version, Etag, RowChange, RowVersion, StoredRow, Tables};
use crate::storage::traits::{StorageAdapter, StorageError};

const WAL_FILE: &str = "entities.wal";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

fn io_err(context: &str, err: &std::io::Error) -> StorageError {
    StorageError::Unavailable(format!("{context}: {err}"))
}

fn append_err(err: &std::io::Error) -> StorageError {
    if err.kind() == ErrorKind::InvalidData {
        StorageError::Serialization(format!("encode log entry: {err}"))
    } else {
        io_err("append to write-ahead log", err)
    }
}

/// Durable storage adapter rooted at a directory.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    wal: WriteAheadLog,
    state: RwLock<Tables>,
    config: PersistentConfig,
    _lock: DirectoryLock,
}

impl FileStorage {
    /// Opens (or creates) the storage directory and replays its log.
    ///
    /// Replay stops at the first corrupt or truncated entry; the log is then
    /// rewritten from the recovered rows so later appends stay readable.
    ///
    /// # Errors
    /// `StorageError::Unavailable` if the directory cannot be created, is
    /// locked by another process, or the log cannot be read.
    pub fn open(dir: &Path, config: PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| io_err("create storage directory", &e))?;
        let lock = DirectoryLock::acquire(dir).map_err(|e| io_err("lock storage directory", &e))?;

        let wal_path = dir.join(WAL_FILE);
        let wal = WriteAheadLog::open(&wal_path, config.sync_on_write)
            .map_err(|e| io_err("open write-ahead log", &e))?;

        let (tables, replayed, clean) = replay(&wal).map_err(|e| io_err("replay write-ahead log", &e))?;
        info!(
            dir = %dir.display(),
            entries = replayed,
            rows = tables.len(),
            "opened file storage"
        );

        let storage = Self {
            dir: dir.to_path_buf(),
            wal,
            state: RwLock::new(tables),
            config,
            _lock: lock,
        };

        if !clean {
            let state = storage.state.write().map_err(|_| lock_err("storage.open"))?;
            storage
                .compact_locked(&state)
                .map_err(|e| io_err("rewrite write-ahead log", &e))?;
        }

        Ok(storage)
    }

    /// Directory this storage lives in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rewrites the log so it only holds the live rows.
    ///
    /// # Errors
    /// `StorageError::Unavailable` if the new log cannot be written.
    pub fn compact(&self) -> Result<(), StorageError> {
        let state = self.state.write().map_err(|_| lock_err("storage.compact"))?;
        self.compact_locked(&state)
            .map_err(|e| io_err("rewrite write-ahead log", &e))
    }

    fn compact_locked(&self, state: &Tables) -> IoResult<()> {
        let before = self.wal.size_bytes()?;
        self.wal.rewrite(&state.snapshot())?;
        info!(
            before_bytes = before,
            after_bytes = self.wal.size_bytes()?,
            rows = state.len(),
            "compacted write-ahead log"
        );
        Ok(())
    }

    /// Logs then applies a planned change while the state lock is held.
    fn apply(&self, state: &mut RwLockWriteGuard<'_, Tables>, change: RowChange) -> Result<(), StorageError> {
        let sequence = self
            .wal
            .append(&change)
            .map_err(|e| append_err(&e))?;
        debug!(sequence, "logged row change");
        state.commit(change);

        match self.wal.size_bytes() {
            Ok(size) if size > self.config.max_wal_size => {
                if let Err(e) = self.compact_locked(state) {
                    // the change is already durable; compaction retries on the next write
                    warn!(error = %e, "write-ahead log compaction failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not stat write-ahead log"),
        }
        Ok(())
    }
}

fn replay(wal: &WriteAheadLog) -> IoResult<(Tables, u64, bool)> {
    let mut tables = Tables::new();
    let mut replayed = 0u64;
    let mut iter = wal.iter()?;

    for entry in iter.by_ref() {
        match entry {
            Ok(entry) => {
                tables.commit(entry.change);
                replayed += 1;
            }
            Err(e) => {
                warn!(after_entries = replayed, error = %e, "corrupt write-ahead log entry, stopping replay");
                return Ok((tables, replayed, false));
            }
        }
    }

    // a truncated tail ends iteration early without an error
    let clean = iter.position() >= iter.file_size();
    if !clean {
        warn!(after_entries = replayed, "truncated write-ahead log tail");
    }
    Ok((tables, replayed, clean))
}

impl StorageAdapter for FileStorage {
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
        self.apply(&mut state, change)?;
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
        self.apply(&mut state, change)?;
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
        self.apply(&mut state, change)?;
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

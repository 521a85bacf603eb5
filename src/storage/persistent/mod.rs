//! Persistent storage backend.
//!
//! Durable, crash-safe row storage with:
//! - Write-Ahead Logging (WAL) of every row change
//! - File locking for single-process access
//! - CRC32 checksums for corruption detection
//! - Log compaction once the WAL outgrows its budget
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 FileStorage                  │
//! ├──────────────────────────────────────────────┤
//! │  ┌──────────────┐     ┌──────────────────┐   │
//! │  │ Tables       │ <── │ WriteAheadLog    │   │
//! │  │ (read index) │     │ (append, replay) │   │
//! │  └──────────────┘     └────────┬─────────┘   │
//! │                                ↓             │
//! │                   ┌──────────────────────┐   │
//! │                   │ DirectoryLock (flock)│   │
//! │                   └──────────────────────┘   │
//! └──────────────────────────────────────────────┘
//! ```

mod codec;
mod file;
mod file_lock;
mod wal;

pub use file::FileStorage;
pub use file_lock::DirectoryLock;
pub use wal::{WalEntry, WalIterator, WriteAheadLog};

use std::path::Path;

use crate::error::{ConfigurationError, EntityResult};

/// Configuration for persistent storage.
#[derive(Debug, Clone)]
pub struct PersistentConfig {
    /// WAL size that triggers compaction (bytes).
    pub max_wal_size: u64,
    /// Whether to fsync after every write (slower but safer).
    pub sync_on_write: bool,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            max_wal_size: 64 * 1024 * 1024, // 64 MB
            sync_on_write: true,
        }
    }
}

impl PersistentConfig {
    const MIN_WAL_SIZE: u64 = 4 * 1024; // avoids compacting on every write

    /// Checks the configuration bounds.
    ///
    /// # Errors
    /// `ConfigurationError::InvalidStorageConfig` if `max_wal_size` is below 4 KiB.
    pub fn validate(self) -> Result<Self, ConfigurationError> {
        if self.max_wal_size < Self::MIN_WAL_SIZE {
            return Err(ConfigurationError::InvalidStorageConfig {
                reason: format!(
                    "max_wal_size must be at least {} bytes (got {})",
                    Self::MIN_WAL_SIZE,
                    self.max_wal_size
                ),
            });
        }
        Ok(self)
    }
}

/// Open or create file storage in the given directory.
///
/// # Errors
/// - If the configuration is invalid
/// - If the directory cannot be created or another process holds its lock
/// - If the log cannot be read
///
/// # Example
/// ```rust,ignore
/// use std::sync::Arc;
/// use entitystore::storage::persistent::open_storage;
///
/// let storage = Arc::new(open_storage("./entities.db", None)?);
/// ```
pub fn open_storage(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> EntityResult<FileStorage> {
    let config = config.unwrap_or_default().validate()?;
    Ok(FileStorage::open(path.as_ref(), config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PersistentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_tiny_wal() {
        let err = PersistentConfig {
            max_wal_size: 10,
            sync_on_write: false,
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidStorageConfig { .. }));
    }
}

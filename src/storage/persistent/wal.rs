//! Write-ahead log of row changes.
//!
//! Every mutation is appended (and optionally fsynced) before it is applied
//! in memory; on open the log is replayed to rebuild the tables.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [ENTRY 1: codec frame of WalEntry]
//! [ENTRY 2: codec frame of WalEntry]
//! ...
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::codec;
use crate::storage::rows::RowChange;

/// A single entry in the write-ahead log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number.
    pub sequence: u64,
    /// When this entry was written.
    pub timestamp: DateTime<Utc>,
    /// The logged change.
    pub change: RowChange,
}

#[derive(Debug)]
struct WalWriter {
    file: File,
    sequence: u64,
}

/// File operations an append needs.
trait LogFile: Write {
    fn size(&self) -> IoResult<u64>;
    fn truncate(&mut self, len: u64) -> IoResult<()>;
    fn sync(&self) -> IoResult<()>;
}

impl LogFile for File {
    fn size(&self) -> IoResult<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> IoResult<()> {
        self.set_len(len)
    }

    fn sync(&self) -> IoResult<()> {
        self.sync_data()
    }
}

/// Writes one whole frame, or nothing.
///
/// On any failure the file is cut back to its length before the call, so
/// no partial or unacknowledged frame stays in the log.
fn append_frame<F: LogFile>(file: &mut F, frame: &[u8], sync: bool) -> IoResult<()> {
    let start = file.size()?;
    let written = file
        .write_all(frame)
        .and_then(|()| file.flush())
        .and_then(|()| if sync { file.sync() } else { Ok(()) });

    if let Err(err) = written {
        if let Err(rollback) = file.truncate(start) {
            return Err(IoError::new(
                err.kind(),
                format!("{err}; rollback to {start} bytes failed: {rollback}"),
            ));
        }
        return Err(err);
    }
    Ok(())
}

/// Append-only log, thread-safe via an internal mutex.
#[derive(Debug)]
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<WalWriter>,
    sync_on_write: bool,
}

fn poisoned() -> IoError {
    IoError::new(ErrorKind::Other, "write-ahead log lock poisoned")
}

fn create_empty(path: &Path, sync: bool) -> IoResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    codec::write_header(&mut file)?;
    if sync {
        file.sync_all()?;
    }
    Ok(())
}

impl WriteAheadLog {
    /// Opens the log at `path`, creating it with a header if missing or empty.
    ///
    /// The next sequence number continues after the last readable entry.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<Self> {
        let has_header = fs::metadata(path).map(|m| m.len() >= codec::HEADER_LEN).unwrap_or(false);
        if !has_header {
            create_empty(path, sync_on_write)?;
        }

        let sequence = WalIterator::new(path)?
            .map_while(Result::ok)
            .last()
            .map_or(0, |entry| entry.sequence);

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(WalWriter { file, sequence }),
            sync_on_write,
        })
    }

    fn lock(&self) -> IoResult<MutexGuard<'_, WalWriter>> {
        self.writer.lock().map_err(|_| poisoned())
    }

    /// Appends a change, returning its sequence number.
    ///
    /// A failed append leaves the file and the sequence as they were.
    /// Encoding failures are reported as `ErrorKind::InvalidData`.
    pub fn append(&self, change: &RowChange) -> IoResult<u64> {
        let mut writer = self.lock()?;
        let sequence = writer.sequence + 1;
        let encoded = codec::encode(&WalEntry {
            sequence,
            timestamp: Utc::now(),
            change: change.clone(),
        })?;

        append_frame(&mut writer.file, &encoded, self.sync_on_write)?;
        writer.sequence = sequence;
        Ok(sequence)
    }

    /// Iterates over all entries from the start of the file.
    pub fn iter(&self) -> IoResult<WalIterator> {
        WalIterator::new(&self.path)
    }

    /// Sequence number of the last appended entry.
    pub fn current_sequence(&self) -> IoResult<u64> {
        Ok(self.lock()?.sequence)
    }

    /// Size of the log file in bytes.
    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Replaces the whole log with `changes`.
    ///
    /// The new log is written to a sibling file, synced, then renamed over
    /// the old one, so a crash leaves either the old or the new log intact.
    pub fn rewrite(&self, changes: &[RowChange]) -> IoResult<()> {
        let mut writer = self.lock()?;

        let tmp_path = self.path.with_extension("compact");
        {
            let mut tmp = BufWriter::new(
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&tmp_path)?,
            );
            codec::write_header(&mut tmp)?;
            let now = Utc::now();
            for (i, change) in changes.iter().enumerate() {
                let entry = WalEntry {
                    sequence: i as u64 + 1,
                    timestamp: now,
                    change: change.clone(),
                };
                tmp.write_all(&codec::encode(&entry)?)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        writer.file = OpenOptions::new().append(true).open(&self.path)?;
        writer.sequence = changes.len() as u64;
        Ok(())
    }
}

/// Iterator over log entries.
///
/// Yields `Err` for a corrupt entry; stops silently at a truncated tail.
pub struct WalIterator {
    reader: BufReader<File>,
    position: u64,
    file_size: u64,
    failed: bool,
}

impl WalIterator {
    fn new(path: &Path) -> IoResult<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        codec::read_header(&mut reader)?;
        Ok(Self {
            reader,
            position: codec::HEADER_LEN,
            file_size,
            failed: false,
        })
    }

    /// Byte offset just past the last complete entry read.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Total size of the file being read.
    #[must_use]
    pub const fn file_size(&self) -> u64 {
        self.file_size
    }
}

impl Iterator for WalIterator {
    type Item = IoResult<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.file_size {
            return None;
        }

        let entry = match codec::decode(&mut self.reader) {
            Ok(entry) => entry,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return None,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };
        match self.reader.stream_position() {
            Ok(pos) => {
                self.position = pos;
                Some(Ok(entry))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::rows::{Etag, StoredRow};
    use tempfile::tempdir;

    fn put(id: &str) -> RowChange {
        RowChange::Put {
            table: "t".to_string(),
            row: StoredRow {
                id: id.to_string(),
                value: serde_json::json!({"id": id}),
                etag: Etag::new(),
                version: 1,
            },
        }
    }

    #[test]
    fn test_append_and_iterate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let wal = WriteAheadLog::open(&path, false).unwrap();
        wal.append(&put("a_1")).unwrap();
        wal.append(&RowChange::Delete {
            table: "t".to_string(),
            id: "a_1".to_string(),
        })
        .unwrap();
        assert_eq!(wal.current_sequence().unwrap(), 2);
        drop(wal);

        let wal = WriteAheadLog::open(&path, false).unwrap();
        assert_eq!(wal.current_sequence().unwrap(), 2);
        let entries: Vec<_> = wal.iter().unwrap().collect::<IoResult<_>>().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sequence, 1);
        assert!(matches!(entries[1].change, RowChange::Delete { .. }));
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let wal = WriteAheadLog::open(&path, true).unwrap();
        for i in 0..10 {
            wal.append(&put(&format!("a_{i}"))).unwrap();
        }
        let before = wal.size_bytes().unwrap();

        wal.rewrite(&[put("a_9")]).unwrap();
        assert!(wal.size_bytes().unwrap() < before);
        assert_eq!(wal.current_sequence().unwrap(), 1);

        wal.append(&put("a_10")).unwrap();
        let entries: Vec<_> = wal.iter().unwrap().collect::<IoResult<_>>().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].sequence, 2);
    }

    /// In-memory log file that accepts `budget` more bytes, then fails.
    struct ShortFile {
        data: Vec<u8>,
        budget: usize,
    }

    impl Write for ShortFile {
        fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
            if self.budget == 0 {
                return Err(IoError::new(ErrorKind::Other, "File too large"));
            }
            let n = buf.len().min(self.budget);
            self.data.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> IoResult<()> {
            Ok(())
        }
    }

    impl LogFile for ShortFile {
        fn size(&self) -> IoResult<u64> {
            Ok(self.data.len() as u64)
        }

        fn truncate(&mut self, len: u64) -> IoResult<()> {
            self.data.truncate(usize::try_from(len).unwrap());
            Ok(())
        }

        fn sync(&self) -> IoResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_append_frame_is_all_or_nothing() {
        let mut file = ShortFile {
            data: b"head".to_vec(),
            budget: 100,
        };
        append_frame(&mut file, b"first", false).unwrap();
        assert_eq!(file.data, b"headfirst");

        file.budget = 3;
        let err = append_frame(&mut file, b"second", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(file.data, b"headfirst");

        file.budget = 100;
        append_frame(&mut file, b"third", false).unwrap();
        assert_eq!(file.data, b"headfirstthird");
    }

    #[test]
    fn test_truncated_tail_is_not_counted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let wal = WriteAheadLog::open(&path, false).unwrap();
        wal.append(&put("a_1")).unwrap();
        let complete = wal.size_bytes().unwrap();
        wal.append(&put("a_2")).unwrap();
        drop(wal);

        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(file.metadata().unwrap().len() - 2).unwrap();
        drop(file);

        let wal = WriteAheadLog::open(&path, false).unwrap();
        let mut iter = wal.iter().unwrap();
        assert_eq!(iter.by_ref().count(), 1);
        assert_eq!(iter.position(), complete);
        assert!(iter.position() < iter.file_size());
    }
}

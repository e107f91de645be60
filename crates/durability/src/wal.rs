//! Write-ahead log: append-only record of mutations.
//!
//! Each acknowledged mutation is appended as one line of JSON, flushed, and
//! fsynced before the append returns. A write that returned before a crash
//! is guaranteed replayable; a partially written final line is discarded by
//! `replay` (tail corruption tolerance).
//!
//! The log can be disabled for bulk loading and recovery replay, during
//! which all `log_*` calls are silent no-ops.
//!
//! ## File format
//!
//! One entry per line, UTF-8 JSON:
//! `{"timestamp":"<ISO-8601>","operation":"SET"|"DELETE"|"CLEAR"|"BULK_SET","key":...,"value":...}`

use chrono::Utc;
use parking_lot::Mutex;
use ringkv_core::{Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Operation kind recorded in a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOp {
    /// Bind a key to a value
    #[serde(rename = "SET")]
    Set,
    /// Remove a key
    #[serde(rename = "DELETE")]
    Delete,
    /// Remove all keys
    #[serde(rename = "CLEAR")]
    Clear,
    /// Compound marker holding every member of a bulk update
    #[serde(rename = "BULK_SET")]
    BulkSet,
}

/// A single entry in the write-ahead log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO-8601 wall-clock timestamp of the append
    pub timestamp: String,
    /// Operation kind
    #[serde(rename = "operation")]
    pub op: LogOp,
    /// Key for SET/DELETE; absent for CLEAR and BULK_SET
    pub key: Option<String>,
    /// Value for SET; for BULK_SET, the object of all members
    pub value: Option<Value>,
}

impl LogEntry {
    fn stamped(op: LogOp, key: Option<String>, value: Option<Value>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            op,
            key,
            value,
        }
    }

    /// Entry recording `SET key = value`.
    pub fn set(key: &str, value: &Value) -> Self {
        Self::stamped(LogOp::Set, Some(key.to_string()), Some(value.clone()))
    }

    /// Entry recording `DELETE key`.
    pub fn delete(key: &str) -> Self {
        Self::stamped(LogOp::Delete, Some(key.to_string()), None)
    }

    /// Entry recording a whole-store CLEAR.
    pub fn clear() -> Self {
        Self::stamped(LogOp::Clear, None, None)
    }

    /// Compound entry recording every member of a bulk update.
    pub fn bulk(members: &BTreeMap<String, Value>) -> Self {
        Self::stamped(LogOp::BulkSet, None, Some(Value::Object(members.clone())))
    }
}

/// Append-only write-ahead log with fsync-per-entry durability.
///
/// Appends are serialized by an internal mutex. The file handle is opened
/// lazily on first append and reopened after `truncate`.
pub struct Wal {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    enabled: AtomicBool,
}

impl Wal {
    /// Create a WAL at the given path. The file is created on first append.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            writer: Mutex::new(None),
            enabled: AtomicBool::new(true),
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-enable logging after a bulk-disabled window.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Disable logging. All `log_*` calls become silent no-ops.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Whether appends are currently recorded.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Record a SET. Durable (flushed + fsynced) once this returns.
    pub fn log_set(&self, key: &str, value: &Value) -> Result<()> {
        self.append(&LogEntry::set(key, value))
    }

    /// Record a DELETE.
    pub fn log_delete(&self, key: &str) -> Result<()> {
        self.append(&LogEntry::delete(key))
    }

    /// Record a CLEAR.
    pub fn log_clear(&self) -> Result<()> {
        self.append(&LogEntry::clear())
    }

    /// Record a compound bulk update as a single durable entry.
    pub fn log_bulk(&self, members: &BTreeMap<String, Value>) -> Result<()> {
        self.append(&LogEntry::bulk(members))
    }

    fn append(&self, entry: &LogEntry) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let line = serde_json::to_string(entry)?;

        let mut writer = self.writer.lock();
        if writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            *writer = Some(BufWriter::new(file));
        }
        let out = writer.as_mut().ok_or_else(|| {
            Error::Io(std::io::Error::other("WAL writer unavailable"))
        })?;
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(())
    }

    /// Read all surviving entries in file order.
    ///
    /// Malformed lines (a torn final write, editor damage) are skipped; the
    /// log is best-effort beyond the last complete entry.
    pub fn replay(&self) -> Result<Vec<LogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(_) => debug!(wal = %self.path.display(), "skipping malformed WAL line"),
            }
        }
        Ok(entries)
    }

    /// Close the handle and remove the log file. The next append reopens it.
    pub fn truncate(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        *writer = None;
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Flush and fsync the current handle; return the entry count.
    pub fn checkpoint(&self) -> Result<usize> {
        {
            let mut writer = self.writer.lock();
            if let Some(out) = writer.as_mut() {
                out.flush()?;
                out.get_ref().sync_all()?;
            }
        }
        self.entry_count()
    }

    /// Number of lines currently in the log file.
    pub fn entry_count(&self) -> Result<usize> {
        if !self.path.exists() {
            return Ok(0);
        }
        let reader = BufReader::new(File::open(&self.path)?);
        Ok(reader.lines().count())
    }

    /// Flush and release the file handle.
    pub fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if let Some(out) = writer.as_mut() {
            out.flush()?;
        }
        *writer = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn wal_in(dir: &TempDir) -> Wal {
        Wal::open(dir.path().join("test.wal")).unwrap()
    }

    #[test]
    fn test_append_and_replay_in_order() {
        let dir = TempDir::new().unwrap();
        let wal = wal_in(&dir);
        wal.log_set("a", &Value::from(1i64)).unwrap();
        wal.log_delete("a").unwrap();
        wal.log_clear().unwrap();

        let entries = wal.replay().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].op, LogOp::Set);
        assert_eq!(entries[0].key.as_deref(), Some("a"));
        assert_eq!(entries[1].op, LogOp::Delete);
        assert_eq!(entries[2].op, LogOp::Clear);
        assert_eq!(entries[2].key, None);
    }

    #[test]
    fn test_disabled_appends_are_noops() {
        let dir = TempDir::new().unwrap();
        let wal = wal_in(&dir);
        wal.disable();
        wal.log_set("a", &Value::Null).unwrap();
        wal.log_clear().unwrap();
        assert_eq!(wal.entry_count().unwrap(), 0);

        wal.enable();
        wal.log_set("a", &Value::Null).unwrap();
        assert_eq!(wal.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_replay_skips_torn_tail() {
        let dir = TempDir::new().unwrap();
        let wal = wal_in(&dir);
        wal.log_set("a", &Value::from("x")).unwrap();
        wal.log_set("b", &Value::from("y")).unwrap();
        wal.close().unwrap();

        // Simulate a crash mid-append: partial JSON on the final line.
        let mut file = OpenOptions::new()
            .append(true)
            .open(wal.path())
            .unwrap();
        file.write_all(b"{\"timestamp\":\"2026-01-01T0").unwrap();
        file.sync_all().unwrap();

        let entries = wal.replay().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].key.as_deref(), Some("b"));
    }

    #[test]
    fn test_truncate_removes_file_and_reopens() {
        let dir = TempDir::new().unwrap();
        let wal = wal_in(&dir);
        wal.log_set("a", &Value::Null).unwrap();
        wal.truncate().unwrap();
        assert!(!wal.path().exists());
        assert_eq!(wal.entry_count().unwrap(), 0);

        wal.log_set("b", &Value::Null).unwrap();
        assert_eq!(wal.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_checkpoint_reports_count_without_truncating() {
        let dir = TempDir::new().unwrap();
        let wal = wal_in(&dir);
        wal.log_set("a", &Value::Null).unwrap();
        wal.log_set("b", &Value::Null).unwrap();
        assert_eq!(wal.checkpoint().unwrap(), 2);
        assert_eq!(wal.entry_count().unwrap(), 2);
    }

    #[test]
    fn test_bulk_entry_roundtrips_members() {
        let dir = TempDir::new().unwrap();
        let wal = wal_in(&dir);
        let members: BTreeMap<String, Value> = [
            ("k1".to_string(), Value::from(1i64)),
            ("k2".to_string(), Value::from("two")),
        ]
        .into_iter()
        .collect();
        wal.log_bulk(&members).unwrap();

        let entries = wal.replay().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].op, LogOp::BulkSet);
        assert_eq!(entries[0].value, Some(Value::Object(members)));
    }

    #[test]
    fn test_wire_field_names() {
        let entry = LogEntry::set("k", &Value::from(true));
        let line = serde_json::to_string(&entry).unwrap();
        assert!(line.contains("\"operation\":\"SET\""));
        assert!(line.contains("\"key\":\"k\""));
        assert!(line.contains("\"timestamp\""));
    }

    #[test]
    fn test_replay_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let wal = wal_in(&dir);
        assert!(wal.replay().unwrap().is_empty());
    }
}

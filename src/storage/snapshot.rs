//! On-disk snapshot formats and atomic file replacement.
//!
//! The active set and every archive are complete JSON documents. Writes go to
//! a temp file in the same directory, are fsynced, then renamed over the
//! target so a reader (or a crash) never sees half a file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::error::StoreError;
use super::models::FlowRecord;

pub const FORMAT_VERSION: u32 = 1;
const ARCHIVE_EXTENSION: &str = ".json";

/// Active set as written to disk.
#[derive(Debug, Serialize)]
pub(crate) struct ActiveEnvelope<'a> {
    pub format_version: u32,
    pub next_id: u64,
    pub records: &'a [FlowRecord],
}

/// Active set as read back from disk.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ActiveFile {
    Envelope {
        #[allow(dead_code)]
        format_version: u32,
        next_id: u64,
        records: Vec<FlowRecord>,
    },
    /// Bare array written by older capture servers (`[]` on first start).
    Legacy(Vec<FlowRecord>),
}

impl ActiveFile {
    pub fn into_parts(self) -> (Vec<FlowRecord>, Option<u64>) {
        match self {
            ActiveFile::Envelope {
                next_id, records, ..
            } => (records, Some(next_id)),
            ActiveFile::Legacy(records) => (records, None),
        }
    }
}

/// Why an archive was cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveReason {
    Rotation,
    Clear,
}

#[derive(Debug, Serialize)]
pub(crate) struct ArchiveEnvelope<'a> {
    pub format_version: u32,
    pub archived_at: DateTime<Utc>,
    pub reason: ArchiveReason,
    pub sequence: u64,
    pub record_count: usize,
    pub first_id: Option<u64>,
    pub last_id: Option<u64>,
    pub records: &'a [FlowRecord],
}

/// A closed archive loaded from disk.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveSnapshot {
    pub format_version: u32,
    pub archived_at: DateTime<Utc>,
    pub reason: ArchiveReason,
    pub sequence: u64,
    pub record_count: usize,
    pub first_id: Option<u64>,
    pub last_id: Option<u64>,
    pub records: Vec<FlowRecord>,
}

/// An archive file found in the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveInfo {
    pub file_name: String,
    #[serde(skip)]
    pub path: PathBuf,
    /// Unix milliseconds encoded in the file name.
    pub created_ms: i64,
    pub sequence: u64,
}

/// `requests_<unix-millis>_<sequence>.json`
pub fn archive_file_name(prefix: &str, created_ms: i64, sequence: u64) -> String {
    format!("{}{}_{:06}{}", prefix, created_ms, sequence, ARCHIVE_EXTENSION)
}

/// Parse an archive file name back into (millis, sequence).
///
/// Names without a sequence (`requests_<millis>.json`) are accepted with
/// sequence 0.
pub fn parse_archive_file_name(prefix: &str, file_name: &str) -> Option<(i64, u64)> {
    let stem = file_name
        .strip_prefix(prefix)?
        .strip_suffix(ARCHIVE_EXTENSION)?;

    match stem.split_once('_') {
        Some((millis, seq)) => Some((millis.parse().ok()?, seq.parse().ok()?)),
        None => Some((stem.parse().ok()?, 0)),
    }
}

/// List archives in `dir`, oldest first.
pub fn scan_archives(dir: &Path, prefix: &str) -> Result<Vec<ArchiveInfo>, StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut archives = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if let Some((created_ms, sequence)) = parse_archive_file_name(prefix, &file_name) {
            archives.push(ArchiveInfo {
                path: entry.path(),
                file_name,
                created_ms,
                sequence,
            });
        }
    }

    archives.sort_by_key(|a| (a.created_ms, a.sequence));
    Ok(archives)
}

/// Serialize `value` to `path` through a temp file and an atomic rename.
///
/// With `clobber == false` the rename fails with `AlreadyExists` instead of
/// replacing an existing file.
pub(crate) fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    clobber: bool,
) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(path, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|e| StoreError::from_json_write(path, e))?;
        writer.flush().map_err(|e| StoreError::io(path, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(path, e))?;

    let persisted = if clobber {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };
    persisted.map_err(|e| StoreError::io(path, e.error))?;

    // Make the rename itself durable; not every platform can open a directory.
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }

    Ok(())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| StoreError::from_json_read(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_name_roundtrip() {
        let name = archive_file_name("requests_", 1_767_225_600_123, 42);
        assert_eq!(name, "requests_1767225600123_000042.json");
        assert_eq!(
            parse_archive_file_name("requests_", &name),
            Some((1_767_225_600_123, 42))
        );
    }

    #[test]
    fn test_parse_legacy_and_foreign_names() {
        assert_eq!(
            parse_archive_file_name("requests_", "requests_1700000000000.json"),
            Some((1_700_000_000_000, 0))
        );
        assert_eq!(parse_archive_file_name("requests_", "request_log.json"), None);
        assert_eq!(parse_archive_file_name("requests_", "requests_abc.json"), None);
        assert_eq!(parse_archive_file_name("requests_", ".tmpXYZ"), None);
    }

    #[test]
    fn test_write_atomic_noclobber() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");

        write_json_atomic(&path, &vec![1, 2, 3], false).unwrap();
        let err = write_json_atomic(&path, &vec![4], false).unwrap_err();
        assert!(err.is_already_exists());

        write_json_atomic(&path, &vec![5], true).unwrap();
        let back: Vec<u32> = read_json(&path).unwrap();
        assert_eq!(back, vec![5]);

        // Only the target file remains; temp files are cleaned up.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "[{\"id\": 1,").unwrap();

        let err = read_json::<Vec<FlowRecord>>(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_legacy_active_file() {
        let active: ActiveFile = serde_json::from_str("[]").unwrap();
        let (records, next_id) = active.into_parts();
        assert!(records.is_empty());
        assert_eq!(next_id, None);

        let active: ActiveFile =
            serde_json::from_str(r#"{"format_version": 1, "next_id": 12, "records": []}"#).unwrap();
        assert_eq!(active.into_parts().1, Some(12));
    }
}

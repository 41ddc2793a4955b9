//! Append-only event store with size-bounded rotation.
//!
//! One writer at a time: `append`, rotation and `clear` all hold the writer
//! mutex across their read-modify-write of the active set. Readers never take
//! that mutex; they clone the `Arc` of the last published snapshot, so they
//! see either the state before an append or the state after it.

use std::fs;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::config::StoreConfig;
use crate::logging::structured::LogContext;
use crate::validation::record::{check_timestamp_order, validate_event};
use crate::{log_debug, log_error, log_info, log_warn};

use super::error::StoreError;
use super::models::{CapturedEvent, FlowRecord};
use super::snapshot::{
    archive_file_name, read_json, scan_archives, write_json_atomic, ActiveEnvelope, ActiveFile,
    ArchiveEnvelope, ArchiveInfo, ArchiveReason, ArchiveSnapshot, FORMAT_VERSION,
};

/// Read-only view of the active set, in arrival order.
pub type RecordSnapshot = Arc<Vec<FlowRecord>>;

/// Archive names tried before giving up on a colliding timestamp.
const MAX_ARCHIVE_NAME_ATTEMPTS: u32 = 16;

/// What a successful `clear` moved out of the active set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearedSet {
    pub archive: ArchiveInfo,
    pub record_count: usize,
}

/// What `append` does with an event older than the last stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimestampPolicy {
    Reject,
    RaiseToLast,
}

#[derive(Debug)]
struct WriterState {
    next_id: u64,
    next_archive_seq: u64,
}

/// Durable store for flow records.
#[derive(Debug)]
pub struct EventStore {
    config: StoreConfig,
    log_ctx: LogContext,
    writer: Mutex<WriterState>,
    snapshot: RwLock<RecordSnapshot>,
    #[cfg(test)]
    fail_active_reset: AtomicBool,
}

impl EventStore {
    /// Open (or initialise) the store under `config.data_dir`.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let log_ctx = LogContext::new(&config.store_name());
        let active_path = config.active_path();

        fs::create_dir_all(&config.data_dir).map_err(|e| StoreError::io(&config.data_dir, e))?;

        if !active_path.exists() {
            let empty = ActiveEnvelope {
                format_version: FORMAT_VERSION,
                next_id: 1,
                records: &[],
            };
            write_json_atomic(&active_path, &empty, true)?;
            log_info!(log_ctx, "STORE_INITIALIZED", path = active_path.display().to_string());
        }

        let active: ActiveFile = read_json(&active_path)?;
        let (records, stored_next_id) = active.into_parts();

        if let Some(pair) = records.windows(2).find(|w| w[0].id >= w[1].id) {
            return Err(StoreError::Inconsistent {
                path: active_path,
                reason: format!("record ids not increasing ({} then {})", pair[0].id, pair[1].id),
            });
        }

        let after_last = match records.last() {
            None => 1,
            Some(last) => last.id.checked_add(1).ok_or_else(|| StoreError::Inconsistent {
                path: active_path.clone(),
                reason: format!("record id {} leaves no room for another", last.id),
            })?,
        };
        let next_id = match stored_next_id {
            Some(stored) if stored < after_last => {
                return Err(StoreError::Inconsistent {
                    path: active_path,
                    reason: format!("next_id {} not above last record id {}", stored, after_last - 1),
                });
            }
            Some(stored) => stored,
            None => after_last,
        };

        let archives = scan_archives(&config.data_dir, &config.archive_prefix)?;
        let next_archive_seq = archives.iter().map(|a| a.sequence + 1).max().unwrap_or(0);

        log_info!(
            log_ctx,
            "STORE_OPENED",
            records = records.len(),
            next_id = next_id,
            archives = archives.len(),
            threshold = config.rotation_threshold,
        );

        Ok(Self {
            config,
            log_ctx,
            writer: Mutex::new(WriterState {
                next_id,
                next_archive_seq,
            }),
            snapshot: RwLock::new(Arc::new(records)),
            #[cfg(test)]
            fail_active_reset: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current active set. Archives are not included.
    pub fn read_all(&self) -> RecordSnapshot {
        Arc::clone(&self.snapshot.read())
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate, number and durably append one event.
    ///
    /// Returns the stored record. On error nothing was persisted and the
    /// active set is unchanged. An event stamped earlier than the last record
    /// in the active set is refused with `TimestampRegressed`. A rotation
    /// failure after a successful write does not fail the append; the record
    /// is already durable and rotation is retried on the next append.
    pub fn append(&self, event: CapturedEvent) -> Result<FlowRecord, StoreError> {
        self.append_with(event, TimestampPolicy::Reject)
    }

    /// Like [`append`](Self::append), for events stamped with a local receive
    /// time: a timestamp older than the last record is raised to it instead
    /// of refused.
    pub fn append_received(&self, event: CapturedEvent) -> Result<FlowRecord, StoreError> {
        self.append_with(event, TimestampPolicy::RaiseToLast)
    }

    fn append_with(&self, mut event: CapturedEvent, policy: TimestampPolicy) -> Result<FlowRecord, StoreError> {
        if let Err(err) = validate_event(&event) {
            log_warn!(
                self.log_ctx,
                "RECORD_REJECTED",
                source_ip = event.source_ip.to_string(),
                reason = err.to_string(),
            );
            return Err(err.into());
        }

        let mut state = self.writer.lock();
        let current = self.read_all();

        let last = current.last().map(|r| r.timestamp);
        match (policy, last) {
            (TimestampPolicy::RaiseToLast, Some(last)) if event.timestamp < last => {
                event.timestamp = last;
            }
            _ => {
                if let Err(err) = check_timestamp_order(last, event.timestamp) {
                    log_warn!(
                        self.log_ctx,
                        "RECORD_REJECTED",
                        source_ip = event.source_ip.to_string(),
                        reason = err.to_string(),
                    );
                    return Err(err.into());
                }
            }
        }

        let next_id = state.next_id.checked_add(1).ok_or_else(|| StoreError::Inconsistent {
            path: self.config.active_path(),
            reason: "record ids exhausted".to_string(),
        })?;

        let record = FlowRecord {
            id: state.next_id,
            event,
        };

        let mut records = Vec::with_capacity(current.len() + 1);
        records.extend(current.iter().cloned());
        records.push(record.clone());

        if let Err(err) = self.persist_active(next_id, &records) {
            log_error!(
                self.log_ctx,
                "APPEND_FAILED",
                id = record.id,
                error = err.to_string(),
            );
            return Err(err);
        }

        state.next_id = next_id;
        let records = Arc::new(records);
        *self.snapshot.write() = Arc::clone(&records);

        log_debug!(
            self.log_ctx,
            "RECORD_APPENDED",
            id = record.id,
            active = records.len(),
        );

        if records.len() > self.config.rotation_threshold {
            if let Err(err) = self.archive_locked(&mut state, &records, ArchiveReason::Rotation) {
                log_error!(
                    self.log_ctx,
                    "ROTATION_FAILED",
                    active = records.len(),
                    error = err.to_string(),
                );
            }
        }

        Ok(record)
    }

    /// Rotate the active set into an archive if it is over the threshold.
    pub fn rotate_if_needed(&self) -> Result<Option<ArchiveInfo>, StoreError> {
        let mut state = self.writer.lock();
        let current = self.read_all();
        if current.len() <= self.config.rotation_threshold {
            return Ok(None);
        }
        self.archive_locked(&mut state, &current, ArchiveReason::Rotation)
            .map(Some)
    }

    /// Archive a non-empty active set and reset it. Clearing an empty store
    /// is a no-op and returns `Ok(None)`.
    pub fn clear(&self) -> Result<Option<ClearedSet>, StoreError> {
        let mut state = self.writer.lock();
        let current = self.read_all();
        if current.is_empty() {
            log_debug!(self.log_ctx, "CLEAR_SKIPPED", reason = "empty");
            return Ok(None);
        }
        let archive = self.archive_locked(&mut state, &current, ArchiveReason::Clear)?;
        Ok(Some(ClearedSet {
            archive,
            record_count: current.len(),
        }))
    }

    /// Archives in the data directory, oldest first.
    pub fn list_archives(&self) -> Result<Vec<ArchiveInfo>, StoreError> {
        scan_archives(&self.config.data_dir, &self.config.archive_prefix)
    }

    pub fn read_archive(&self, info: &ArchiveInfo) -> Result<ArchiveSnapshot, StoreError> {
        read_json(&info.path)
    }

    fn persist_active(&self, next_id: u64, records: &[FlowRecord]) -> Result<(), StoreError> {
        let envelope = ActiveEnvelope {
            format_version: FORMAT_VERSION,
            next_id,
            records,
        };
        write_json_atomic(&self.config.active_path(), &envelope, true)
    }

    /// Persist an empty active set.
    fn reset_active(&self, next_id: u64) -> Result<(), StoreError> {
        #[cfg(test)]
        {
            if self.fail_active_reset.load(Ordering::SeqCst) {
                return Err(StoreError::io(
                    &self.config.active_path(),
                    std::io::Error::new(std::io::ErrorKind::Other, "active reset disabled"),
                ));
            }
        }
        self.persist_active(next_id, &[])
    }

    /// Write `records` to a fresh archive, then empty the active set.
    /// Caller holds the writer lock.
    fn archive_locked(
        &self,
        state: &mut WriterState,
        records: &[FlowRecord],
        reason: ArchiveReason,
    ) -> Result<ArchiveInfo, StoreError> {
        let archived_at = Utc::now();
        let created_ms = archived_at.timestamp_millis();

        let mut attempts = 0;
        let info = loop {
            let sequence = state.next_archive_seq;
            state.next_archive_seq += 1;

            let file_name = archive_file_name(&self.config.archive_prefix, created_ms, sequence);
            let path = self.config.archive_path(&file_name);
            let envelope = ArchiveEnvelope {
                format_version: FORMAT_VERSION,
                archived_at,
                reason,
                sequence,
                record_count: records.len(),
                first_id: records.first().map(|r| r.id),
                last_id: records.last().map(|r| r.id),
                records,
            };

            match write_json_atomic(&path, &envelope, false) {
                Ok(()) => {
                    break ArchiveInfo {
                        file_name,
                        path,
                        created_ms,
                        sequence,
                    }
                }
                Err(err) if err.is_already_exists() && attempts < MAX_ARCHIVE_NAME_ATTEMPTS => {
                    attempts += 1;
                    log_warn!(self.log_ctx, "ARCHIVE_NAME_TAKEN", file = file_name);
                }
                Err(err) => return Err(err),
            }
        };

        if let Err(err) = self.reset_active(state.next_id) {
            // The records are still in the active file; drop the archive so
            // they are not archived twice on the next attempt.
            if let Err(cleanup) = fs::remove_file(&info.path) {
                log_error!(
                    self.log_ctx,
                    "ARCHIVE_CLEANUP_FAILED",
                    file = info.file_name,
                    error = cleanup.to_string(),
                );
            }
            return Err(err);
        }

        *self.snapshot.write() = Arc::new(Vec::new());

        log_info!(
            self.log_ctx,
            "STORE_ARCHIVED",
            reason = reason,
            file = info.file_name,
            records = records.len(),
        );

        Ok(info)
    }
}

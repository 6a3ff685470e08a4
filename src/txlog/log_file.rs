//! The active transaction log
//!
//! One segment at a time receives appends. Appends and rotations hold the
//! same mutex, so a batch never straddles a segment boundary. The write
//! offset and rotation threshold are mirrored in atomics for the lock-free
//! pre-check; the authoritative check reads them again under the lock.
//!
//! Appends require a healthy database. A failed fsync, or a failed cut-off
//! of a torn batch, marks the database unhealthy: the file may then hold
//! bytes the in-memory offsets do not account for.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};

use super::errors::{TxLogError, TxLogResult};
use super::reader::scan_segment;
use super::record::LogEntry;
use super::segment::{create_segment, list_segment_versions, segment_path, SegmentHeader};
use crate::crash_point::{maybe_crash, points};
use crate::health::DatabaseHealth;
use crate::observability::{log_event_with_fields, Event};

struct ActiveSegment {
    version: u64,
    path: PathBuf,
    file: File,
    size: u64,
    last_tx_id: u64,
}

/// Segmented, append-only transaction log.
pub struct TransactionLogFile {
    dir: PathBuf,
    active: Mutex<ActiveSegment>,
    current_size: AtomicU64,
    rotation_threshold: AtomicU64,
    health: Arc<DatabaseHealth>,
}

/// Result of one rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotatedSegment {
    pub old_version: u64,
    pub new_version: u64,
    /// Last transaction id in the old segment
    pub last_tx_id: u64,
}

impl TransactionLogFile {
    /// Open the log in `dir`, creating the directory and segment 0 on first
    /// use. The highest segment is scanned in full; corruption is fatal.
    pub fn open(
        dir: impl AsRef<Path>,
        rotation_threshold: u64,
        health: Arc<DatabaseHealth>,
    ) -> TxLogResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            TxLogError::append_failed(
                format!("failed to create log directory: {}", dir.display()),
                e,
            )
        })?;

        let active = match list_segment_versions(&dir)?.last() {
            None => {
                let header = SegmentHeader {
                    log_version: 0,
                    previous_last_tx_id: 0,
                };
                let file = create_segment(&dir, header)?;
                log_event_with_fields(Event::LogSegmentCreated, &[("version", "0")]);
                ActiveSegment {
                    version: 0,
                    path: segment_path(&dir, 0),
                    file,
                    size: super::SEGMENT_HEADER_SIZE as u64,
                    last_tx_id: 0,
                }
            }
            Some(&version) => {
                let path = segment_path(&dir, version);
                let summary = scan_segment(&path).map_err(|e| {
                    log_event_with_fields(
                        Event::LogCorruption,
                        &[("path", &path.display().to_string()), ("reason", &e.to_string())],
                    );
                    e
                })?;
                if summary.header.log_version != version {
                    return Err(TxLogError::corruption(format!(
                        "segment {} declares version {}",
                        path.display(),
                        summary.header.log_version
                    )));
                }
                let file = OpenOptions::new().append(true).open(&path).map_err(|e| {
                    TxLogError::append_failed(
                        format!("failed to open log segment: {}", path.display()),
                        e,
                    )
                })?;
                ActiveSegment {
                    version,
                    path,
                    file,
                    size: summary.end_offset,
                    last_tx_id: summary.last_tx_id,
                }
            }
        };

        log_event_with_fields(
            Event::LogOpened,
            &[
                ("dir", &dir.display().to_string()),
                ("last_tx_id", &active.last_tx_id.to_string()),
                ("version", &active.version.to_string()),
            ],
        );

        Ok(Self {
            dir,
            current_size: AtomicU64::new(active.size),
            active: Mutex::new(active),
            rotation_threshold: AtomicU64::new(rotation_threshold),
            health,
        })
    }

    /// Health shared with the apply path
    pub fn health(&self) -> &Arc<DatabaseHealth> {
        &self.health
    }

    /// Directory holding the segments
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lock-free check whether the active segment has reached the threshold.
    ///
    /// May be stale; callers that act on it must re-check under the lock.
    pub fn rotation_needed(&self) -> bool {
        self.current_size.load(Ordering::Acquire) >= self.rotation_threshold.load(Ordering::Acquire)
    }

    pub fn rotation_threshold(&self) -> u64 {
        self.rotation_threshold.load(Ordering::Acquire)
    }

    /// Change the size at which the active segment is rotated.
    pub fn set_rotation_threshold(&self, bytes: u64) {
        self.rotation_threshold.store(bytes, Ordering::Release);
    }

    /// Write offset of the active segment
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Acquire)
    }

    /// Mark the database unhealthy after a failure that leaves the segment
    /// tail unknown. Every later append and rotation is refused.
    fn fail_durability(&self, err: TxLogError) -> TxLogError {
        self.health.panic(err.to_string());
        err
    }

    /// Take the append/rotation lock.
    pub fn lock(&self) -> TxLogResult<LockedLog<'_>> {
        let active = self.active.lock().map_err(|_| TxLogError::lock_poisoned())?;
        Ok(LockedLog { log: self, active })
    }
}

/// Exclusive access to the active segment.
pub struct LockedLog<'a> {
    log: &'a TransactionLogFile,
    active: MutexGuard<'a, ActiveSegment>,
}

impl LockedLog<'_> {
    /// Authoritative rotation check under the lock
    pub fn rotation_needed(&self) -> bool {
        self.active.size >= self.log.rotation_threshold()
    }

    pub fn version(&self) -> u64 {
        self.active.version
    }

    pub fn last_tx_id(&self) -> u64 {
        self.active.last_tx_id
    }

    pub fn size(&self) -> u64 {
        self.active.size
    }

    /// Append a batch as one write followed by one fsync.
    ///
    /// Each entry pairs the consensus index of its command with the encoded
    /// transaction. Returns the ids assigned, in entry order, once the batch
    /// is durable. Refused outright on an unhealthy database.
    pub fn append(&mut self, entries: &[(i64, Bytes)]) -> TxLogResult<Vec<u64>> {
        self.log
            .health
            .assert_healthy()
            .map_err(TxLogError::unhealthy)?;

        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let first_id = self.active.last_tx_id + 1;
        let mut buf = BytesMut::new();
        let mut ids = Vec::with_capacity(entries.len());
        for (tx_id, (command_index, payload)) in (first_id..).zip(entries) {
            LogEntry::new(tx_id, *command_index, payload.clone()).write_to(&mut buf);
            ids.push(tx_id);
        }

        maybe_crash(points::TXLOG_BEFORE_APPEND);

        let active = &mut *self.active;
        if let Err(e) = active.file.write_all(&buf) {
            // Drop whatever part of the batch reached the file.
            if let Err(truncate) = active.file.set_len(active.size) {
                let err = TxLogError::truncate_failed(
                    format!(
                        "failed to cut segment {} back to {} bytes after a failed write",
                        active.version, active.size
                    ),
                    truncate,
                );
                return Err(self.log.fail_durability(err));
            }
            return Err(TxLogError::append_failed(
                format!(
                    "failed to append {} entries at tx {} to segment {}",
                    entries.len(),
                    first_id,
                    active.version
                ),
                e,
            ));
        }

        maybe_crash(points::TXLOG_BEFORE_FSYNC);

        if let Err(e) = active.file.sync_all() {
            let err = TxLogError::fsync_failed(
                format!("fsync failed after append at tx {}", first_id),
                e,
            );
            return Err(self.log.fail_durability(err));
        }

        maybe_crash(points::TXLOG_AFTER_APPEND);

        active.size += buf.len() as u64;
        active.last_tx_id += entries.len() as u64;
        self.log.current_size.store(active.size, Ordering::Release);
        Ok(ids)
    }

    /// Close the active segment and start the next version.
    ///
    /// The old segment is synced first and never written again.
    pub fn rotate(&mut self) -> TxLogResult<RotatedSegment> {
        let active = &mut *self.active;
        active.file.sync_all().map_err(|e| {
            TxLogError::fsync_failed(
                format!("failed to fsync segment before rotation: {}", active.path.display()),
                e,
            )
        })?;

        maybe_crash(points::ROTATION_BEFORE_SEGMENT_CREATE);

        let new_version = active.version + 1;
        let header = SegmentHeader {
            log_version: new_version,
            previous_last_tx_id: active.last_tx_id,
        };
        let file = create_segment(&self.log.dir, header)?;

        maybe_crash(points::ROTATION_AFTER_SEGMENT_CREATE);

        let rotated = RotatedSegment {
            old_version: active.version,
            new_version,
            last_tx_id: active.last_tx_id,
        };

        active.version = new_version;
        active.path = segment_path(&self.log.dir, new_version);
        active.file = file;
        active.size = super::SEGMENT_HEADER_SIZE as u64;
        self.log.current_size.store(active.size, Ordering::Release);

        log_event_with_fields(
            Event::LogSegmentCreated,
            &[
                ("previous_last_tx_id", &rotated.last_tx_id.to_string()),
                ("version", &new_version.to_string()),
            ],
        );
        Ok(rotated)
    }
}

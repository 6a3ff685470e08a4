//! Log rotation coordinator
//!
//! Rotation takes the same lock as appends. Callers may race (a batch
//! commit and an administrative rotation), so the size check is done once
//! lock-free and again under the lock. No rotation runs on an unhealthy
//! database; health is the one the log file itself checks before appends.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::errors::{TxLogError, TxLogResult};
use super::log_file::{LockedLog, TransactionLogFile};
use crate::observability::{log_event_with_fields, Event, Logger, MetricsRegistry, Timer};

/// What a finished rotation reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RotationEvent {
    pub old_version: u64,
    pub new_version: u64,
    /// Last transaction id written to the old segment
    pub last_tx_id: u64,
    /// Time spent rotating
    pub rotation_millis: u64,
    /// Time since the previous rotation finished, or since startup
    pub millis_since_last_rotation: u64,
}

/// Sink for rotation start and finish events
pub trait RotationMonitor: Send + Sync {
    fn started(&self, version: u64, last_tx_id: u64);
    fn finished(&self, event: &RotationEvent);
}

/// Reports rotations to the structured log and the metrics registry.
pub struct LoggingRotationMonitor {
    metrics: Arc<MetricsRegistry>,
}

impl LoggingRotationMonitor {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self { metrics }
    }
}

impl RotationMonitor for LoggingRotationMonitor {
    fn started(&self, version: u64, last_tx_id: u64) {
        log_event_with_fields(
            Event::LogRotationBegin,
            &[
                ("last_tx_id", &last_tx_id.to_string()),
                ("version", &version.to_string()),
            ],
        );
    }

    fn finished(&self, event: &RotationEvent) {
        self.metrics.increment_log_rotations();
        log_event_with_fields(
            Event::LogRotationComplete,
            &[
                ("last_tx_id", &event.last_tx_id.to_string()),
                (
                    "millis_since_last_rotation",
                    &event.millis_since_last_rotation.to_string(),
                ),
                ("new_version", &event.new_version.to_string()),
                ("old_version", &event.old_version.to_string()),
                ("rotation_millis", &event.rotation_millis.to_string()),
            ],
        );
    }
}

/// Trace of one append through the log: what rotation, if any, it caused.
#[derive(Debug, Default, Clone)]
pub struct LogAppendEvent {
    pub rotation: Option<RotationEvent>,
}

impl LogAppendEvent {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Guards the active segment against unsafe rotation.
pub struct LogRotation {
    log_file: Arc<TransactionLogFile>,
    monitor: Arc<dyn RotationMonitor>,
    last_rotation_completed_at: AtomicI64,
}

impl LogRotation {
    pub fn new(log_file: Arc<TransactionLogFile>, monitor: Arc<dyn RotationMonitor>) -> Self {
        Self {
            log_file,
            monitor,
            last_rotation_completed_at: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn log_file(&self) -> &Arc<TransactionLogFile> {
        &self.log_file
    }

    /// Rotate if the active segment has reached its threshold.
    ///
    /// Takes the log lock only when the lock-free check says a rotation may
    /// be due. Returns whether this call rotated.
    pub fn rotate_log_if_needed(&self, event: &mut LogAppendEvent) -> TxLogResult<bool> {
        if !self.log_file.rotation_needed() {
            return Ok(false);
        }
        let mut locked = self.log_file.lock()?;
        self.batched_rotate_log_if_needed(&mut locked, event)
    }

    /// Rotation check for a caller already holding the log lock, such as
    /// a batch about to append.
    pub fn batched_rotate_log_if_needed(
        &self,
        locked: &mut LockedLog<'_>,
        event: &mut LogAppendEvent,
    ) -> TxLogResult<bool> {
        if !locked.rotation_needed() {
            return Ok(false);
        }
        self.do_rotate(locked, event)?;
        Ok(true)
    }

    /// Rotate regardless of the active segment's size.
    pub fn rotate_log_file(&self, event: &mut LogAppendEvent) -> TxLogResult<RotationEvent> {
        let mut locked = self.log_file.lock()?;
        self.do_rotate(&mut locked, event)
    }

    fn do_rotate(
        &self,
        locked: &mut LockedLog<'_>,
        event: &mut LogAppendEvent,
    ) -> TxLogResult<RotationEvent> {
        if let Err(cause) = self.log_file.health().assert_healthy() {
            log_event_with_fields(
                Event::LogRotationRefused,
                &[
                    ("cause", cause.cause.as_str()),
                    ("version", &locked.version().to_string()),
                ],
            );
            return Err(TxLogError::rotation_refused(cause));
        }

        let timer = Timer::new();
        self.monitor.started(locked.version(), locked.last_tx_id());

        let rotated = match locked.rotate() {
            Ok(rotated) => rotated,
            Err(e) => {
                Logger::error(
                    "TXLOG_ROTATION_FAILED",
                    &[("error", &e.to_string()), ("version", &locked.version().to_string())],
                );
                return Err(e);
            }
        };

        let now = Utc::now().timestamp_millis();
        let previous = self.last_rotation_completed_at.swap(now, Ordering::AcqRel);
        let rotation_event = RotationEvent {
            old_version: rotated.old_version,
            new_version: rotated.new_version,
            last_tx_id: rotated.last_tx_id,
            rotation_millis: timer.elapsed_millis(),
            millis_since_last_rotation: u64::try_from(now - previous).unwrap_or(0),
        };
        self.monitor.finished(&rotation_event);
        event.rotation = Some(rotation_event);
        Ok(rotation_event)
    }
}

//! Downstream commit pipeline
//!
//! A commit process takes a batch of admitted transactions and makes them
//! durable, returning one transaction id per entry in batch order. Each
//! log entry records the consensus index of its command next to the
//! transaction id, so recovery never has to look inside the payload.

use std::sync::Arc;

use bytes::Bytes;

use super::errors::{CommitError, CommitResult};
use crate::crash_point::{maybe_crash, points};
use crate::observability::{Logger, MetricsRegistry};
use crate::transaction::{codec, TransactionRepresentation};
use crate::txlog::{LogAppendEvent, LogRotation};

/// An admitted transaction and the consensus index it was delivered at
#[derive(Debug, Clone)]
pub struct TransactionToApply {
    pub command_index: i64,
    pub tx: TransactionRepresentation,
}

/// Commits batches of transactions durably.
pub trait TransactionCommitProcess: Send {
    /// Commit the whole batch as one unit, returning the durable
    /// transaction id of each entry in order.
    fn commit(&mut self, batch: &[TransactionToApply]) -> CommitResult<Vec<u64>>;
}

/// Applies committed transactions to the local store.
///
/// How commands change the store is outside this crate.
pub trait TransactionApplier: Send {
    fn apply(&mut self, tx_id: u64, tx: &TransactionRepresentation) -> CommitResult<()>;
}

/// Commit process backed by the transaction log.
///
/// Per batch: encode every transaction, take the log lock, rotate if the
/// active segment is full, append all entries with one fsync, release the
/// lock, then hand each transaction to the applier in order.
pub struct LogCommitProcess {
    rotation: Arc<LogRotation>,
    applier: Box<dyn TransactionApplier>,
    metrics: Arc<MetricsRegistry>,
}

impl LogCommitProcess {
    pub fn new(
        rotation: Arc<LogRotation>,
        applier: Box<dyn TransactionApplier>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            rotation,
            applier,
            metrics,
        }
    }

    fn append(&self, entries: &[(i64, Bytes)]) -> CommitResult<Vec<u64>> {
        let mut event = LogAppendEvent::new();
        let mut locked = self.rotation.log_file().lock()?;
        self.rotation
            .batched_rotate_log_if_needed(&mut locked, &mut event)?;
        Ok(locked.append(entries)?)
    }
}

impl TransactionCommitProcess for LogCommitProcess {
    fn commit(&mut self, batch: &[TransactionToApply]) -> CommitResult<Vec<u64>> {
        let entries = batch
            .iter()
            .map(|t| codec::encode(&t.tx).map(|payload| (t.command_index, payload)))
            .collect::<Result<Vec<(i64, Bytes)>, _>>()?;
        let bytes: usize = entries.iter().map(|(_, payload)| payload.len()).sum();

        let tx_ids = self.append(&entries)?;
        if tx_ids.len() != batch.len() {
            return Err(CommitError::BatchSizeMismatch {
                expected: batch.len(),
                actual: tx_ids.len(),
            });
        }
        self.metrics.add_log_bytes(bytes as u64);

        maybe_crash(points::COMMIT_BEFORE_STORE_APPLY);

        for (tx_id, t) in tx_ids.iter().zip(batch) {
            if let Err(e) = self.applier.apply(*tx_id, &t.tx) {
                Logger::error(
                    "STORE_APPLY_FAILED",
                    &[("error", &e.to_string()), ("tx_id", &tx_id.to_string())],
                );
                return Err(e);
            }
        }
        Ok(tx_ids)
    }
}

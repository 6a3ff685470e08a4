//! Commit batch queue
//!
//! Transactions accumulate in arrival order. When the batch reaches its
//! maximum size, or on an explicit flush, the whole batch goes through one
//! `commit` call; completion hooks then fire in the original order. A batch
//! is all-or-nothing: if the commit fails, every hook in it sees the error.

use std::mem;

use super::errors::{CommitError, CommitResult};
use super::process::{TransactionCommitProcess, TransactionToApply};
use crate::transaction::TransactionRepresentation;

/// Runs once the containing batch has committed or failed.
pub type CompletionHook = Box<dyn FnOnce(Result<u64, &CommitError>) + Send>;

struct PendingTransaction {
    tx: TransactionToApply,
    on_commit: CompletionHook,
}

/// A transaction that became durable in a flushed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedTransaction {
    pub command_index: i64,
    pub tx_id: u64,
}

/// Bounded batch of pending transactions bound to one commit process.
pub struct CommitBatchQueue {
    max_batch_size: usize,
    batch: Vec<PendingTransaction>,
    commit_process: Box<dyn TransactionCommitProcess>,
}

impl CommitBatchQueue {
    /// `max_batch_size` of 0 is treated as 1.
    pub fn new(commit_process: Box<dyn TransactionCommitProcess>, max_batch_size: usize) -> Self {
        let max_batch_size = max_batch_size.max(1);
        Self {
            max_batch_size,
            batch: Vec::with_capacity(max_batch_size),
            commit_process,
        }
    }

    /// Add a transaction, committing the batch if it is now full.
    ///
    /// Returns what was committed, empty if the batch is still filling.
    pub fn queue(
        &mut self,
        tx: TransactionRepresentation,
        command_index: i64,
        on_commit: CompletionHook,
    ) -> CommitResult<Vec<CommittedTransaction>> {
        self.batch.push(PendingTransaction {
            tx: TransactionToApply { command_index, tx },
            on_commit,
        });
        if self.batch.len() >= self.max_batch_size {
            self.flush()
        } else {
            Ok(Vec::new())
        }
    }

    /// Commit whatever is pending now.
    pub fn flush(&mut self) -> CommitResult<Vec<CommittedTransaction>> {
        if self.batch.is_empty() {
            return Ok(Vec::new());
        }

        let pending = mem::replace(&mut self.batch, Vec::with_capacity(self.max_batch_size));
        let (txs, hooks): (Vec<_>, Vec<_>) =
            pending.into_iter().map(|p| (p.tx, p.on_commit)).unzip();

        let result = self
            .commit_process
            .commit(&txs)
            .and_then(|tx_ids| {
                if tx_ids.len() == txs.len() {
                    Ok(tx_ids)
                } else {
                    Err(CommitError::BatchSizeMismatch {
                        expected: txs.len(),
                        actual: tx_ids.len(),
                    })
                }
            });

        match result {
            Ok(tx_ids) => Ok(txs
                .iter()
                .zip(hooks)
                .zip(tx_ids)
                .map(|((tx, on_commit), tx_id)| {
                    on_commit(Ok(tx_id));
                    CommittedTransaction {
                        command_index: tx.command_index,
                        tx_id,
                    }
                })
                .collect()),
            Err(e) => {
                for on_commit in hooks {
                    on_commit(Err(&e));
                }
                Err(e)
            }
        }
    }

    /// Fail every pending transaction without committing it.
    pub fn abort(&mut self, reason: &str) {
        let error = CommitError::Aborted {
            reason: reason.to_string(),
        };
        for pending in self.batch.drain(..) {
            (pending.on_commit)(Err(&error));
        }
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

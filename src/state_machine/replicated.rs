//! Replicated transaction state machine
//!
//! Applies the consensus-ordered transaction stream exactly once in effect:
//! redelivered indices are skipped, stale lock sessions are fenced, and
//! admitted transactions are batched into the commit pipeline. Any other
//! failure is terminal.
//!
//! All mutating operations hold one monitor. Result callbacks run while it
//! is held and must not call back into the machine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::errors::StateMachineError;
use super::outcome::{ResultCallback, TxFailure, TxOutcome};
use crate::commit::{
    CommitBatchQueue, CommitError, CommittedTransaction, CompletionHook, TransactionCommitProcess,
};
use crate::health::DatabaseHealth;
use crate::locking::{LockTokenProvider, NO_LOCK_SESSION_ID};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::transaction::{codec, log_index, ReplicatedTransaction};

/// What a redelivered command index gets back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateDeliveryPolicy {
    /// Drop the callback without invoking it
    #[default]
    Ignore,
    /// Flush pending work, then report `TxOutcome::AlreadyApplied`
    AcknowledgeApplied,
}

/// Tunables of the apply path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplySettings {
    pub max_batch_size: usize,
    pub duplicate_delivery: DuplicateDeliveryPolicy,
    /// How many (command index, tx id) pairs are kept for acknowledging
    /// redeliveries
    pub recent_commit_window: usize,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            max_batch_size: 64,
            duplicate_delivery: DuplicateDeliveryPolicy::Ignore,
            recent_commit_window: 1024,
        }
    }
}

/// Lifecycle state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMachineStatus {
    Uninstalled,
    Installed,
    Panicked,
}

/// Sliding window of the most recent commits, ascending by index.
struct RecentCommits {
    capacity: usize,
    entries: VecDeque<CommittedTransaction>,
}

impl RecentCommits {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(4096)),
        }
    }

    fn record(&mut self, committed: Vec<CommittedTransaction>) {
        for entry in committed {
            if self.entries.len() == self.capacity {
                self.entries.pop_front();
            }
            if self.capacity > 0 {
                self.entries.push_back(entry);
            }
        }
    }

    fn lookup(&self, command_index: i64) -> Option<u64> {
        self.entries
            .binary_search_by_key(&command_index, |c| c.command_index)
            .ok()
            .map(|position| self.entries[position].tx_id)
    }
}

struct Installed {
    last_applied_index: i64,
    queue: CommitBatchQueue,
    recent: RecentCommits,
}

enum Lifecycle {
    Uninstalled,
    Installed(Installed),
    Panicked { reason: String },
}

/// Orchestrates decode, fencing, batching and the applied watermark.
pub struct ReplicatedTransactionStateMachine {
    monitor: Mutex<Lifecycle>,
    lock_tokens: Arc<dyn LockTokenProvider>,
    health: Arc<DatabaseHealth>,
    metrics: Arc<MetricsRegistry>,
    settings: ApplySettings,
}

impl ReplicatedTransactionStateMachine {
    pub fn new(
        lock_tokens: Arc<dyn LockTokenProvider>,
        health: Arc<DatabaseHealth>,
        metrics: Arc<MetricsRegistry>,
        settings: ApplySettings,
    ) -> Self {
        Self {
            monitor: Mutex::new(Lifecycle::Uninstalled),
            lock_tokens,
            health,
            metrics,
            settings,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Lifecycle>, StateMachineError> {
        // A poisoned monitor means a callback or commit panicked mid-apply.
        self.monitor.lock().map_err(|_| StateMachineError::Panicked {
            reason: "state machine monitor poisoned".to_string(),
        })
    }

    /// Move to the terminal state, failing anything still queued.
    fn panic(&self, lifecycle: &mut Lifecycle, error: StateMachineError) -> StateMachineError {
        let reason = error.to_string();
        if let Lifecycle::Installed(installed) = lifecycle {
            installed.queue.abort(&reason);
        }
        *lifecycle = Lifecycle::Panicked {
            reason: reason.clone(),
        };

        self.metrics.increment_panics();
        log_event_with_fields(Event::StateMachinePanic, &[("reason", &reason)]);
        self.health.panic(reason);
        error
    }

    /// Bind to a commit process after recovery determined the durable
    /// watermark.
    ///
    /// Re-installing flushes the previous queue first. A panicked machine
    /// cannot be re-installed.
    pub fn install_commit_process(
        &self,
        commit_process: Box<dyn TransactionCommitProcess>,
        recovered_index: i64,
    ) -> Result<(), StateMachineError> {
        let mut lifecycle = self.lock()?;
        match &mut *lifecycle {
            Lifecycle::Panicked { reason } => {
                return Err(StateMachineError::Panicked {
                    reason: reason.clone(),
                })
            }
            Lifecycle::Installed(installed) => match installed.queue.flush() {
                Ok(committed) => self.record_committed(installed, committed),
                Err(source) => {
                    return Err(self.panic(&mut lifecycle, StateMachineError::Commit { source }))
                }
            },
            Lifecycle::Uninstalled => {}
        }

        *lifecycle = Lifecycle::Installed(Installed {
            last_applied_index: recovered_index,
            queue: CommitBatchQueue::new(commit_process, self.settings.max_batch_size),
            recent: RecentCommits::new(self.settings.recent_commit_window),
        });

        log_event_with_fields(
            Event::CommitProcessInstalled,
            &[
                ("last_applied_index", &recovered_index.to_string()),
                ("max_batch_size", &self.settings.max_batch_size.to_string()),
            ],
        );
        Ok(())
    }

    /// Apply one delivered entry.
    ///
    /// Called by the single apply thread in non-decreasing index order;
    /// redelivery of applied indices is tolerated. A fenced transaction is
    /// reported through `callback` and is not an error. Queued transactions
    /// are committed before a fenced result is reported, so callbacks fire
    /// in index order. On a panicked machine the callback receives
    /// `TxFailure::Panicked`.
    pub fn apply_command(
        &self,
        replicated: &ReplicatedTransaction,
        command_index: i64,
        callback: ResultCallback,
    ) -> Result<(), StateMachineError> {
        let mut lifecycle = self.lock()?;
        let installed = match &mut *lifecycle {
            Lifecycle::Uninstalled => return Err(StateMachineError::Uninstalled),
            Lifecycle::Panicked { reason } => {
                callback(Err(TxFailure::Panicked {
                    reason: reason.clone(),
                }));
                return Err(StateMachineError::Panicked {
                    reason: reason.clone(),
                });
            }
            Lifecycle::Installed(installed) => installed,
        };

        if command_index <= installed.last_applied_index {
            self.metrics.increment_duplicates_skipped();
            log_event_with_fields(
                Event::DuplicateCommandSkipped,
                &[
                    ("command_index", &command_index.to_string()),
                    ("last_applied_index", &installed.last_applied_index.to_string()),
                ],
            );
            return match self.settings.duplicate_delivery {
                DuplicateDeliveryPolicy::Ignore => Ok(()),
                DuplicateDeliveryPolicy::AcknowledgeApplied => {
                    match installed.queue.flush() {
                        Ok(committed) => installed.recent.record(committed),
                        Err(source) => {
                            return Err(
                                self.panic(&mut lifecycle, StateMachineError::Commit { source })
                            )
                        }
                    }
                    let tx_id = installed.recent.lookup(command_index);
                    callback(Ok(TxOutcome::AlreadyApplied {
                        command_index,
                        tx_id,
                    }));
                    Ok(())
                }
            };
        }

        let fallback_header = log_index::encode(command_index);
        let tx = match codec::decode(replicated.payload(), &fallback_header) {
            Ok(tx) => tx,
            Err(source) => {
                let error = self.panic(
                    &mut lifecycle,
                    StateMachineError::Decode {
                        command_index,
                        source,
                    },
                );
                callback(Err(TxFailure::Panicked {
                    reason: error.to_string(),
                }));
                return Err(error);
            }
        };

        let current = self.lock_tokens.current_token_id();
        if tx.lock_session_id != NO_LOCK_SESSION_ID && tx.lock_session_id != current {
            match installed.queue.flush() {
                Ok(committed) => self.record_committed(installed, committed),
                Err(source) => {
                    let error = self.panic(&mut lifecycle, StateMachineError::Commit { source });
                    callback(Err(TxFailure::Panicked {
                        reason: error.to_string(),
                    }));
                    return Err(error);
                }
            }

            // Fenced entries count as applied; they will never be retried.
            installed.last_applied_index = command_index;
            self.metrics.increment_lock_session_rejections();
            log_event_with_fields(
                Event::LockSessionExpired,
                &[
                    ("command_index", &command_index.to_string()),
                    ("current_session", &current.to_string()),
                    ("transaction_session", &tx.lock_session_id.to_string()),
                ],
            );
            callback(Err(TxFailure::LockSessionExpired {
                current,
                transaction: tx.lock_session_id,
            }));
            return Ok(());
        }

        installed.last_applied_index = command_index;
        self.metrics.increment_commands_applied();

        let on_commit: CompletionHook = Box::new(move |result: Result<u64, &CommitError>| {
            callback(match result {
                Ok(tx_id) => Ok(TxOutcome::Committed { tx_id }),
                Err(e) => Err(TxFailure::Panicked {
                    reason: e.to_string(),
                }),
            })
        });

        match installed.queue.queue(tx, command_index, on_commit) {
            Ok(committed) => {
                self.record_committed(installed, committed);
                Ok(())
            }
            Err(source) => Err(self.panic(&mut lifecycle, StateMachineError::Commit { source })),
        }
    }

    fn record_committed(&self, installed: &mut Installed, committed: Vec<CommittedTransaction>) {
        if committed.is_empty() {
            return;
        }
        self.metrics.record_batch_committed(committed.len() as u64);
        log_event_with_fields(
            Event::BatchCommitted,
            &[
                ("first_tx_id", &committed[0].tx_id.to_string()),
                ("last_applied_index", &installed.last_applied_index.to_string()),
                ("size", &committed.len().to_string()),
            ],
        );
        installed.recent.record(committed);
    }

    /// Commit everything queued so far.
    ///
    /// After this returns, every transaction admitted before the call is
    /// durable and its callback has run.
    pub fn ensured_applied(&self) -> Result<(), StateMachineError> {
        let mut lifecycle = self.lock()?;
        let installed = match &mut *lifecycle {
            Lifecycle::Uninstalled => return Err(StateMachineError::Uninstalled),
            Lifecycle::Panicked { reason } => {
                return Err(StateMachineError::Panicked {
                    reason: reason.clone(),
                })
            }
            Lifecycle::Installed(installed) => installed,
        };

        match installed.queue.flush() {
            Ok(committed) => {
                self.record_committed(installed, committed);
                Ok(())
            }
            Err(source) => {
                log_event_with_fields(Event::BatchCommitFailed, &[("error", &source.to_string())]);
                Err(self.panic(&mut lifecycle, StateMachineError::Commit { source }))
            }
        }
    }

    /// Alias of `ensured_applied`
    pub fn flush(&self) -> Result<(), StateMachineError> {
        self.ensured_applied()
    }

    /// The applied watermark
    pub fn last_applied_index(&self) -> Result<i64, StateMachineError> {
        match &*self.lock()? {
            Lifecycle::Uninstalled => Err(StateMachineError::Uninstalled),
            Lifecycle::Panicked { reason } => Err(StateMachineError::Panicked {
                reason: reason.clone(),
            }),
            Lifecycle::Installed(installed) => Ok(installed.last_applied_index),
        }
    }

    /// Transactions admitted but not yet committed
    pub fn pending(&self) -> usize {
        match self.lock().as_deref() {
            Ok(Lifecycle::Installed(installed)) => installed.queue.len(),
            _ => 0,
        }
    }

    pub fn status(&self) -> StateMachineStatus {
        match self.lock().as_deref() {
            Ok(Lifecycle::Uninstalled) => StateMachineStatus::Uninstalled,
            Ok(Lifecycle::Installed(_)) => StateMachineStatus::Installed,
            Ok(Lifecycle::Panicked { .. }) | Err(_) => StateMachineStatus::Panicked,
        }
    }
}

//! Per-transaction results reported to the ordering layer

use std::sync::mpsc::{self, Receiver};

use thiserror::Error;

/// A transaction that was accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    /// Committed in this delivery with the given durable id
    Committed { tx_id: u64 },
    /// A redelivery of an index that was already applied. `tx_id` is known
    /// only while the index is within the recent-commit window.
    AlreadyApplied {
        command_index: i64,
        tx_id: Option<u64>,
    },
}

/// A transaction that was not committed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxFailure {
    #[error(
        "lock session expired: transaction holds session {transaction}, current session is {current}"
    )]
    LockSessionExpired { current: i32, transaction: i32 },

    #[error("replicated transaction state machine panicked, restart required: {reason}")]
    Panicked { reason: String },
}

pub type TxResult = Result<TxOutcome, TxFailure>;

/// Receives the result of one replicated transaction. Runs at most once.
pub type ResultCallback = Box<dyn FnOnce(TxResult) + Send>;

/// A callback that forwards its result to a channel.
pub fn callback_channel() -> (ResultCallback, Receiver<TxResult>) {
    let (sender, receiver) = mpsc::channel();
    let callback: ResultCallback = Box::new(move |result| {
        // The receiver may be gone; nobody is waiting then.
        let _ = sender.send(result);
    });
    (callback, receiver)
}

use thiserror::Error;

use crate::commit::CommitError;
use crate::transaction::DecodeError;

/// Errors returned by the replicated transaction state machine.
///
/// Everything but `Uninstalled` leaves the machine panicked.
#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("replicated transaction state machine has no commit process installed")]
    Uninstalled,

    #[error("replicated transaction state machine panicked, restart required: {reason}")]
    Panicked { reason: String },

    #[error("failed to decode replicated transaction at index {command_index}, restart required: {source}")]
    Decode {
        command_index: i64,
        #[source]
        source: DecodeError,
    },

    #[error("failed to commit replicated transactions, restart required: {source}")]
    Commit {
        #[source]
        source: CommitError,
    },
}

impl StateMachineError {
    /// Whether the machine is now terminal
    pub fn is_panic(&self) -> bool {
        !matches!(self, StateMachineError::Uninstalled)
    }
}

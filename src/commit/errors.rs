use thiserror::Error;

use crate::transaction::EncodeError;
use crate::txlog::TxLogError;

/// Failure of the downstream commit pipeline
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("transaction log failure: {0}")]
    Log(#[from] TxLogError),

    #[error("failed to encode transaction for the log: {0}")]
    Encode(#[from] EncodeError),

    #[error("failed to apply transaction {tx_id} to the store: {reason}")]
    Apply { tx_id: u64, reason: String },

    #[error("commit process returned {actual} transaction ids for a batch of {expected}")]
    BatchSizeMismatch { expected: usize, actual: usize },

    #[error("batch abandoned: {reason}")]
    Aborted { reason: String },
}

/// Result type for commit operations
pub type CommitResult<T> = Result<T, CommitError>;

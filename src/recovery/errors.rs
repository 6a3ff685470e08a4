use thiserror::Error;

use crate::txlog::TxLogError;

/// Errors raised while scanning the transaction log at startup.
///
/// All of them are fatal: the node must not serve with a log it cannot read.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Log(#[from] TxLogError),

    #[error("segment {version} follows segment {previous}, versions must be consecutive")]
    SegmentGap { previous: u64, version: u64 },

    #[error("segment {version} header names version {header_version}")]
    VersionMismatch { version: u64, header_version: u64 },

    #[error(
        "segment {version} starts after tx {recorded}, but the previous segment ends at tx {actual}"
    )]
    ChainBroken {
        version: u64,
        recorded: u64,
        actual: u64,
    },
}

pub type RecoveryResult<T> = Result<T, RecoveryError>;

//! Transaction log errors
//!
//! - TXLOG_APPEND_FAILED (ERROR)
//! - TXLOG_FSYNC_FAILED (FATAL)
//! - TXLOG_CORRUPTION (FATAL)
//! - TXLOG_ROTATION_REFUSED (FATAL)
//! - TXLOG_LOCK_POISONED (FATAL)
//! - TXLOG_DATABASE_UNHEALTHY (FATAL)
//! - TXLOG_TRUNCATE_FAILED (FATAL)

use std::fmt;
use std::io;

use crate::health::HealthError;

/// Severity of a transaction log error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, log stays usable
    Error,
    /// Log must not be written again in this process
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Transaction log error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxLogErrorCode {
    /// Write or open failed
    AppendFailed,
    /// fsync failed; durability of earlier writes is unknown
    FsyncFailed,
    /// Checksum, framing or id sequence mismatch
    Corruption,
    /// Rotation attempted while the database is unhealthy
    RotationRefused,
    /// A writer panicked while holding the log lock
    LockPoisoned,
    /// Append attempted while the database is unhealthy
    DatabaseUnhealthy,
    /// A partial batch could not be cut off after a failed write
    TruncateFailed,
}

impl TxLogErrorCode {
    /// Stable string form of the code
    pub fn code(&self) -> &'static str {
        match self {
            TxLogErrorCode::AppendFailed => "TXLOG_APPEND_FAILED",
            TxLogErrorCode::FsyncFailed => "TXLOG_FSYNC_FAILED",
            TxLogErrorCode::Corruption => "TXLOG_CORRUPTION",
            TxLogErrorCode::RotationRefused => "TXLOG_ROTATION_REFUSED",
            TxLogErrorCode::LockPoisoned => "TXLOG_LOCK_POISONED",
            TxLogErrorCode::DatabaseUnhealthy => "TXLOG_DATABASE_UNHEALTHY",
            TxLogErrorCode::TruncateFailed => "TXLOG_TRUNCATE_FAILED",
        }
    }

    /// Severity of the code
    pub fn severity(&self) -> Severity {
        match self {
            TxLogErrorCode::AppendFailed => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for TxLogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Transaction log error with context
#[derive(Debug)]
pub struct TxLogError {
    code: TxLogErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl TxLogError {
    fn new(code: TxLogErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// A write, open or create failed
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(TxLogErrorCode::AppendFailed, message)
        }
    }

    /// An fsync failed
    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(TxLogErrorCode::FsyncFailed, message)
        }
    }

    /// Corrupt log content
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(TxLogErrorCode::Corruption, message)
    }

    /// Corrupt log content at a byte offset of a segment
    pub fn corruption_at_offset(version: u64, offset: u64, reason: impl Into<String>) -> Self {
        Self {
            details: Some(format!("segment: {}, byte_offset: {}", version, offset)),
            ..Self::new(TxLogErrorCode::Corruption, reason)
        }
    }

    /// Rotation refused because of a prior failure
    pub fn rotation_refused(cause: HealthError) -> Self {
        Self {
            details: Some(cause.cause),
            ..Self::new(
                TxLogErrorCode::RotationRefused,
                "refusing to rotate log, database is not healthy",
            )
        }
    }

    /// Append refused because of a prior failure
    pub fn unhealthy(cause: HealthError) -> Self {
        Self {
            details: Some(cause.cause),
            ..Self::new(
                TxLogErrorCode::DatabaseUnhealthy,
                "refusing to append to log, database is not healthy",
            )
        }
    }

    /// Truncating a torn batch failed; the segment tail is unknown
    pub fn truncate_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(TxLogErrorCode::TruncateFailed, message)
        }
    }

    /// The log lock was poisoned
    pub fn lock_poisoned() -> Self {
        Self::new(
            TxLogErrorCode::LockPoisoned,
            "transaction log lock poisoned by a panicked writer",
        )
    }

    pub fn code(&self) -> TxLogErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Whether the log must be considered unusable for this process
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for TxLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for TxLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for transaction log operations
pub type TxLogResult<T> = Result<T, TxLogError>;

//! Transaction encoding and decoding errors
//!
//! A malformed payload taken from an agreed-upon log entry means the
//! replicated history itself is damaged. These errors are never retried;
//! the state machine turns them into a panic.

use thiserror::Error;

/// Malformed wire bytes for a replicated transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A fixed or length-prefixed field would read past the buffer end
    #[error("truncated transaction payload: field `{field}` needs {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// A length field holds a negative value
    #[error("negative length {value} in field `{field}`")]
    NegativeLength { field: &'static str, value: i32 },

    /// The command stream ended without its terminator
    #[error("command stream ended without terminator after {commands_read} commands")]
    UnterminatedCommandStream { commands_read: usize },

    /// A command carries an unknown discriminant
    #[error("unknown command tag {0}")]
    UnknownCommandTag(u8),

    /// A token command carries an unknown token kind
    #[error("unknown token kind {0}")]
    UnknownTokenKind(u8),

    /// A string field is not valid UTF-8
    #[error("invalid UTF-8 in field `{field}`")]
    InvalidUtf8 { field: &'static str },

    /// Bytes follow the command stream terminator
    #[error("{0} trailing bytes after command stream terminator")]
    TrailingBytes(usize),
}

/// A transaction that cannot be represented on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// A variable-length field is longer than an i32 length prefix can hold
    #[error("field `{field}` is {len} bytes long, the wire limit is {}", i32::MAX)]
    LengthOverflow { field: &'static str, len: usize },
}

/// A log-index header shorter than the 8 bytes it must hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid log index header: expected at least 8 bytes, got {actual}")]
pub struct InvalidHeaderError {
    /// Number of header bytes supplied
    pub actual: usize,
}

//! Transaction representations and their replication encodings
//!
//! - `TransactionRepresentation`: commands plus metadata, as built locally
//! - `ReplicatedTransaction`: the immutable wire bytes of the above
//! - `codec`: byte-exact encode/decode with header substitution
//! - `log_index`: consensus log index as an 8-byte header

pub mod codec;
mod errors;
pub mod log_index;
mod representation;

pub use errors::{DecodeError, EncodeError, InvalidHeaderError};
pub use representation::{ReplicatedTransaction, TransactionRepresentation};

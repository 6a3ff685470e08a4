//! Consensus log index carried as a transaction header
//!
//! A replicated transaction that arrives without a header of its own gets
//! the index of the log entry that delivered it, so the durable log alone is
//! enough to say which consensus position a local transaction came from.

use super::errors::InvalidHeaderError;

/// Encoded size of a log index header
pub const LOG_INDEX_HEADER_SIZE: usize = 8;

/// Encode a log index as 8 big-endian bytes.
pub fn encode(index: i64) -> [u8; LOG_INDEX_HEADER_SIZE] {
    index.to_be_bytes()
}

/// Decode a log index from the first 8 bytes of a header.
pub fn decode(header: &[u8]) -> Result<i64, InvalidHeaderError> {
    let bytes: [u8; LOG_INDEX_HEADER_SIZE] = header
        .get(..LOG_INDEX_HEADER_SIZE)
        .and_then(|prefix| prefix.try_into().ok())
        .ok_or(InvalidHeaderError {
            actual: header.len(),
        })?;
    Ok(i64::from_be_bytes(bytes))
}

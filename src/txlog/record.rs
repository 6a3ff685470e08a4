//! Log entry framing
//!
//! Format, all integers little-endian:
//! - Record Length (u32), total including itself and the checksum
//! - Transaction Id (u64)
//! - Command Index (i64), consensus index the transaction was delivered at
//! - Payload (wire-encoded committed transaction)
//! - Checksum (u32), CRC32 over everything before it

use std::io;

use bytes::{BufMut, Bytes, BytesMut};

use super::checksum::{compute_checksum, verify_checksum};

/// Bytes of framing around a payload
pub const ENTRY_OVERHEAD: usize = 4 + 8 + 8 + 4;

/// One committed transaction in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Durable transaction id assigned by the log
    pub tx_id: u64,
    /// Consensus log index of the command that carried the transaction
    pub command_index: i64,
    /// Wire encoding of the committed transaction
    pub payload: Bytes,
}

impl LogEntry {
    pub fn new(tx_id: u64, command_index: i64, payload: Bytes) -> Self {
        Self {
            tx_id,
            command_index,
            payload,
        }
    }

    /// Framed size of this entry
    pub fn encoded_len(&self) -> usize {
        ENTRY_OVERHEAD + self.payload.len()
    }

    /// Append the framed entry to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.reserve(self.encoded_len());
        buf.put_u32_le(self.encoded_len() as u32);
        buf.put_u64_le(self.tx_id);
        buf.put_i64_le(self.command_index);
        buf.put_slice(&self.payload);
        let checksum = compute_checksum(&buf[start..]);
        buf.put_u32_le(checksum);
    }

    /// Parse one framed entry from the front of `data`, verifying its
    /// checksum. Returns the entry and the number of bytes consumed.
    pub fn deserialize(data: &[u8]) -> io::Result<(Self, usize)> {
        if data.len() < ENTRY_OVERHEAD {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("entry too short: {} bytes", data.len()),
            ));
        }

        let record_length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_length < ENTRY_OVERHEAD {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid entry length: {}", record_length),
            ));
        }
        if data.len() < record_length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "entry truncated: expected {} bytes, got {}",
                    record_length,
                    data.len()
                ),
            ));
        }

        let checksum_offset = record_length - 4;
        let mut stored = [0u8; 4];
        stored.copy_from_slice(&data[checksum_offset..record_length]);
        let stored = u32::from_le_bytes(stored);
        if !verify_checksum(&data[..checksum_offset], stored) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "checksum mismatch: computed {:08x}, stored {:08x}",
                    compute_checksum(&data[..checksum_offset]),
                    stored
                ),
            ));
        }

        let mut tx_id = [0u8; 8];
        tx_id.copy_from_slice(&data[4..12]);
        let mut command_index = [0u8; 8];
        command_index.copy_from_slice(&data[12..20]);
        let entry = Self {
            tx_id: u64::from_le_bytes(tx_id),
            command_index: i64::from_le_bytes(command_index),
            payload: Bytes::copy_from_slice(&data[20..checksum_offset]),
        };
        Ok((entry, record_length))
    }
}

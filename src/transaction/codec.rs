//! Transaction wire codec
//!
//! Layout, all integers big-endian:
//!
//! | Offset | Field                           | Size |
//! |--------|---------------------------------|------|
//! | 0      | author_id                       | 4    |
//! | 4      | origin_id                       | 4    |
//! | 8      | latest_committed_tx_when_started| 8    |
//! | 16     | time_started                    | 8    |
//! | 24     | time_committed                  | 8    |
//! | 32     | lock_session_id                 | 4    |
//! | 36     | header_length (N)               | 4    |
//! | 40     | header                          | N    |
//! | 40+N   | command stream                  | var  |
//!
//! The encoded buffer holds exactly the bytes written; nothing follows the
//! command stream terminator.

use bytes::{BufMut, Bytes, BytesMut};

use super::errors::{DecodeError, EncodeError};
use super::representation::TransactionRepresentation;
use crate::command::codec::{put_len, read_bytes, read_i32, read_i64, read_len};
use crate::command::{read_command_stream, write_command_stream};

/// Size of the fixed metadata prefix, up to and including `header_length`
pub const FIXED_METADATA_SIZE: usize = 40;

const INITIAL_CAPACITY: usize = 256;

/// Encode a transaction for replication.
///
/// Fails only if a variable-length field exceeds its i32 length prefix.
pub fn encode(tx: &TransactionRepresentation) -> Result<Bytes, EncodeError> {
    let mut buf = BytesMut::with_capacity(INITIAL_CAPACITY.max(
        FIXED_METADATA_SIZE + tx.additional_header.len() + 1,
    ));

    buf.put_i32(tx.author_id);
    buf.put_i32(tx.origin_id);
    buf.put_i64(tx.latest_committed_tx_when_started);
    buf.put_i64(tx.time_started);
    buf.put_i64(tx.time_committed);
    buf.put_i32(tx.lock_session_id);
    put_len(&mut buf, tx.additional_header.len(), "header")?;
    buf.put_slice(&tx.additional_header);

    write_command_stream(&mut buf, &tx.commands)?;

    // freeze() keeps only the written length; spare capacity is not carried.
    Ok(buf.freeze())
}

/// Decode a transaction.
///
/// If the embedded header is empty, the decoded transaction takes
/// `fallback_header` instead.
pub fn decode(bytes: &[u8], fallback_header: &[u8]) -> Result<TransactionRepresentation, DecodeError> {
    let mut buf = bytes;

    let author_id = read_i32(&mut buf, "author_id")?;
    let origin_id = read_i32(&mut buf, "origin_id")?;
    let latest_committed_tx_when_started = read_i64(&mut buf, "latest_committed_tx_when_started")?;
    let time_started = read_i64(&mut buf, "time_started")?;
    let time_committed = read_i64(&mut buf, "time_committed")?;
    let lock_session_id = read_i32(&mut buf, "lock_session_id")?;
    let header_length = read_len(&mut buf, "header_length")?;
    let additional_header = if header_length == 0 {
        fallback_header.to_vec()
    } else {
        read_bytes(&mut buf, header_length, "header")?
    };

    let commands = read_command_stream(&mut buf)?;
    if !buf.is_empty() {
        return Err(DecodeError::TrailingBytes(buf.len()));
    }

    Ok(TransactionRepresentation {
        commands,
        author_id,
        origin_id,
        latest_committed_tx_when_started,
        time_started,
        time_committed,
        lock_session_id,
        additional_header,
    })
}

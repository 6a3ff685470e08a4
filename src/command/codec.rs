//! Command stream encoding
//!
//! Layout, all integers big-endian:
//! - each command: tag (u8) followed by its fixed fields, then any
//!   length-prefixed (i32) variable fields
//! - end of stream: a single `COMMAND_STREAM_TERMINATOR` byte
//!
//! Variable-length fields are limited to `i32::MAX` bytes by their length
//! prefix; the writer refuses anything longer.
//!
//! The reader dispatches on the tag. Running out of bytes before the
//! terminator is a decode error, never an implicit end of stream.

use bytes::{Buf, BufMut, BytesMut};

use super::{StorageCommand, TokenKind};
use crate::transaction::{DecodeError, EncodeError};

/// Reserved tag marking the end of a command stream
pub const COMMAND_STREAM_TERMINATOR: u8 = 0;

/// Writes every command followed by the terminator.
pub fn write_command_stream(
    buf: &mut BytesMut,
    commands: &[StorageCommand],
) -> Result<(), EncodeError> {
    for command in commands {
        write_command(buf, command)?;
    }
    buf.put_u8(COMMAND_STREAM_TERMINATOR);
    Ok(())
}

fn write_command(buf: &mut BytesMut, command: &StorageCommand) -> Result<(), EncodeError> {
    buf.put_u8(command.tag());
    match command {
        StorageCommand::Node {
            id,
            in_use,
            first_relationship,
            first_property,
            labels,
        } => {
            buf.put_i64(*id);
            buf.put_u8(u8::from(*in_use));
            buf.put_i64(*first_relationship);
            buf.put_i64(*first_property);
            put_len(buf, labels.len(), "node.labels")?;
            for label in labels {
                buf.put_i32(*label);
            }
        }
        StorageCommand::Relationship {
            id,
            in_use,
            type_id,
            start_node,
            end_node,
        } => {
            buf.put_i64(*id);
            buf.put_u8(u8::from(*in_use));
            buf.put_i32(*type_id);
            buf.put_i64(*start_node);
            buf.put_i64(*end_node);
        }
        StorageCommand::Property {
            id,
            in_use,
            owner,
            key_id,
            value,
        } => {
            buf.put_i64(*id);
            buf.put_u8(u8::from(*in_use));
            buf.put_i64(*owner);
            buf.put_i32(*key_id);
            put_len(buf, value.len(), "property.value")?;
            buf.put_slice(value);
        }
        StorageCommand::Token { kind, id, name } => {
            buf.put_u8(kind.as_u8());
            buf.put_i32(*id);
            put_len(buf, name.len(), "token.name")?;
            buf.put_slice(name.as_bytes());
        }
    }
    Ok(())
}

/// Writes an i32 length prefix. Nothing is written if `len` does not fit.
pub(crate) fn put_len(
    buf: &mut BytesMut,
    len: usize,
    field: &'static str,
) -> Result<(), EncodeError> {
    let prefix = i32::try_from(len).map_err(|_| EncodeError::LengthOverflow { field, len })?;
    buf.put_i32(prefix);
    Ok(())
}

/// Reads commands until the terminator is observed.
pub fn read_command_stream(buf: &mut &[u8]) -> Result<Vec<StorageCommand>, DecodeError> {
    let mut commands = Vec::new();
    loop {
        if !buf.has_remaining() {
            return Err(DecodeError::UnterminatedCommandStream {
                commands_read: commands.len(),
            });
        }
        let tag = buf.get_u8();
        if tag == COMMAND_STREAM_TERMINATOR {
            return Ok(commands);
        }
        commands.push(read_command(tag, buf)?);
    }
}

fn read_command(tag: u8, buf: &mut &[u8]) -> Result<StorageCommand, DecodeError> {
    match tag {
        StorageCommand::TAG_NODE => {
            let id = read_i64(buf, "node.id")?;
            let in_use = read_bool(buf, "node.in_use")?;
            let first_relationship = read_i64(buf, "node.first_relationship")?;
            let first_property = read_i64(buf, "node.first_property")?;
            let count = read_len(buf, "node.label_count")?;
            ensure(buf, count.saturating_mul(4), "node.labels")?;
            let labels = (0..count).map(|_| buf.get_i32()).collect();
            Ok(StorageCommand::Node {
                id,
                in_use,
                first_relationship,
                first_property,
                labels,
            })
        }
        StorageCommand::TAG_RELATIONSHIP => Ok(StorageCommand::Relationship {
            id: read_i64(buf, "relationship.id")?,
            in_use: read_bool(buf, "relationship.in_use")?,
            type_id: read_i32(buf, "relationship.type_id")?,
            start_node: read_i64(buf, "relationship.start_node")?,
            end_node: read_i64(buf, "relationship.end_node")?,
        }),
        StorageCommand::TAG_PROPERTY => {
            let id = read_i64(buf, "property.id")?;
            let in_use = read_bool(buf, "property.in_use")?;
            let owner = read_i64(buf, "property.owner")?;
            let key_id = read_i32(buf, "property.key_id")?;
            let len = read_len(buf, "property.value_length")?;
            let value = read_bytes(buf, len, "property.value")?;
            Ok(StorageCommand::Property {
                id,
                in_use,
                owner,
                key_id,
                value,
            })
        }
        StorageCommand::TAG_TOKEN => {
            let kind_byte = read_u8(buf, "token.kind")?;
            let kind =
                TokenKind::from_u8(kind_byte).ok_or(DecodeError::UnknownTokenKind(kind_byte))?;
            let id = read_i32(buf, "token.id")?;
            let len = read_len(buf, "token.name_length")?;
            let name = String::from_utf8(read_bytes(buf, len, "token.name")?)
                .map_err(|_| DecodeError::InvalidUtf8 { field: "token.name" })?;
            Ok(StorageCommand::Token { kind, id, name })
        }
        other => Err(DecodeError::UnknownCommandTag(other)),
    }
}

// ── read helpers, shared with the transaction codec ──────────────────────

pub(crate) fn ensure(buf: &&[u8], needed: usize, field: &'static str) -> Result<(), DecodeError> {
    if buf.remaining() < needed {
        return Err(DecodeError::Truncated {
            field,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

pub(crate) fn read_u8(buf: &mut &[u8], field: &'static str) -> Result<u8, DecodeError> {
    ensure(buf, 1, field)?;
    Ok(buf.get_u8())
}

fn read_bool(buf: &mut &[u8], field: &'static str) -> Result<bool, DecodeError> {
    Ok(read_u8(buf, field)? != 0)
}

pub(crate) fn read_i32(buf: &mut &[u8], field: &'static str) -> Result<i32, DecodeError> {
    ensure(buf, 4, field)?;
    Ok(buf.get_i32())
}

pub(crate) fn read_i64(buf: &mut &[u8], field: &'static str) -> Result<i64, DecodeError> {
    ensure(buf, 8, field)?;
    Ok(buf.get_i64())
}

pub(crate) fn read_len(buf: &mut &[u8], field: &'static str) -> Result<usize, DecodeError> {
    let value = read_i32(buf, field)?;
    usize::try_from(value).map_err(|_| DecodeError::NegativeLength { field, value })
}

pub(crate) fn read_bytes(
    buf: &mut &[u8],
    len: usize,
    field: &'static str,
) -> Result<Vec<u8>, DecodeError> {
    ensure(buf, len, field)?;
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}

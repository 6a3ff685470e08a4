//! Storage commands carried inside a replicated transaction
//!
//! A transaction is an ordered list of storage commands. Each command is a
//! self-describing tagged variant; on the wire the list is written as a
//! command stream that ends at a reserved terminator tag.
//!
//! How the store applies a command is not this crate's concern. Commands are
//! carried, ordered, and handed to a `TransactionApplier` untouched.

pub(crate) mod codec;

pub use codec::{read_command_stream, write_command_stream, COMMAND_STREAM_TERMINATOR};

/// Kind of token created by a `StorageCommand::Token` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenKind {
    /// Node label token
    Label = 1,
    /// Relationship type token
    RelationshipType = 2,
    /// Property key token
    PropertyKey = 3,
}

impl TokenKind {
    /// Convert from u8, returns None for invalid values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(TokenKind::Label),
            2 => Some(TokenKind::RelationshipType),
            3 => Some(TokenKind::PropertyKey),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A single storage-level change.
///
/// Records always carry the full post-change state of the record they touch,
/// never a delta, so that applying a command twice yields the same record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCommand {
    /// Node record change
    Node {
        id: i64,
        in_use: bool,
        first_relationship: i64,
        first_property: i64,
        labels: Vec<i32>,
    },
    /// Relationship record change
    Relationship {
        id: i64,
        in_use: bool,
        type_id: i32,
        start_node: i64,
        end_node: i64,
    },
    /// Property record change; `value` is the encoded property block
    Property {
        id: i64,
        in_use: bool,
        owner: i64,
        key_id: i32,
        value: Vec<u8>,
    },
    /// Creation of a named token
    Token {
        kind: TokenKind,
        id: i32,
        name: String,
    },
}

impl StorageCommand {
    pub(crate) const TAG_NODE: u8 = 1;
    pub(crate) const TAG_RELATIONSHIP: u8 = 2;
    pub(crate) const TAG_PROPERTY: u8 = 3;
    pub(crate) const TAG_TOKEN: u8 = 4;

    /// Wire discriminant for this command
    pub fn tag(&self) -> u8 {
        match self {
            StorageCommand::Node { .. } => Self::TAG_NODE,
            StorageCommand::Relationship { .. } => Self::TAG_RELATIONSHIP,
            StorageCommand::Property { .. } => Self::TAG_PROPERTY,
            StorageCommand::Token { .. } => Self::TAG_TOKEN,
        }
    }

    /// Shorthand for a live node with no chains and the given labels
    pub fn node(id: i64, labels: Vec<i32>) -> Self {
        StorageCommand::Node {
            id,
            in_use: true,
            first_relationship: -1,
            first_property: -1,
            labels,
        }
    }

    /// Shorthand for a live relationship
    pub fn relationship(id: i64, type_id: i32, start_node: i64, end_node: i64) -> Self {
        StorageCommand::Relationship {
            id,
            in_use: true,
            type_id,
            start_node,
            end_node,
        }
    }
}

//! Local and replicated transaction representations

use bytes::Bytes;
use chrono::Utc;

use super::errors::EncodeError;
use crate::command::StorageCommand;
use crate::locking::NO_LOCK_SESSION_ID;

/// A transaction as produced by the local write path: an ordered list of
/// storage commands plus the metadata needed to commit it anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRepresentation {
    /// Storage commands, in application order
    pub commands: Vec<StorageCommand>,
    /// Id of the member that authored the transaction
    pub author_id: i32,
    /// Id of the member the transaction originated on
    pub origin_id: i32,
    /// Last committed transaction id seen when the transaction started
    pub latest_committed_tx_when_started: i64,
    /// Start time, epoch millis
    pub time_started: i64,
    /// Commit time, epoch millis
    pub time_committed: i64,
    /// Lock session the transaction acquired its locks under
    pub lock_session_id: i32,
    /// Opaque header; empty when the writer supplied none
    pub additional_header: Vec<u8>,
}

impl TransactionRepresentation {
    /// Create a transaction with no header, no lock session, and the
    /// current wall clock as both start and commit time.
    pub fn new(commands: Vec<StorageCommand>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            commands,
            author_id: 0,
            origin_id: 0,
            latest_committed_tx_when_started: 0,
            time_started: now,
            time_committed: now,
            lock_session_id: NO_LOCK_SESSION_ID,
            additional_header: Vec::new(),
        }
    }

    /// Set the lock session id
    pub fn with_lock_session(mut self, lock_session_id: i32) -> Self {
        self.lock_session_id = lock_session_id;
        self
    }

    /// Set author and origin ids
    pub fn with_author(mut self, author_id: i32, origin_id: i32) -> Self {
        self.author_id = author_id;
        self.origin_id = origin_id;
        self
    }

    /// Set the additional header
    pub fn with_additional_header(mut self, header: impl Into<Vec<u8>>) -> Self {
        self.additional_header = header.into();
        self
    }

    /// Set the last committed transaction id observed at start
    pub fn with_latest_committed_tx(mut self, tx_id: i64) -> Self {
        self.latest_committed_tx_when_started = tx_id;
        self
    }

    /// Number of commands
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

/// The wire form of a `TransactionRepresentation` as it travels through the
/// ordering layer. Immutable; cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicatedTransaction {
    payload: Bytes,
}

impl ReplicatedTransaction {
    /// Encode a local transaction for replication
    pub fn from_transaction(tx: &TransactionRepresentation) -> Result<Self, EncodeError> {
        Ok(Self {
            payload: super::codec::encode(tx)?,
        })
    }

    /// Wrap bytes received from the ordering layer
    pub fn from_bytes(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Encoded payload
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_has_no_lock_session_and_no_header() {
        let tx = TransactionRepresentation::new(vec![]);
        assert_eq!(tx.lock_session_id, NO_LOCK_SESSION_ID);
        assert!(tx.additional_header.is_empty());
        assert_eq!(tx.time_started, tx.time_committed);
    }

    #[test]
    fn test_builder_sets_fields() {
        let tx = TransactionRepresentation::new(vec![StorageCommand::node(1, vec![])])
            .with_author(7, 2)
            .with_lock_session(3)
            .with_latest_committed_tx(41)
            .with_additional_header(vec![1, 2]);
        assert_eq!(tx.author_id, 7);
        assert_eq!(tx.origin_id, 2);
        assert_eq!(tx.lock_session_id, 3);
        assert_eq!(tx.latest_committed_tx_when_started, 41);
        assert_eq!(tx.additional_header, vec![1, 2]);
        assert_eq!(tx.command_count(), 1);
    }

    #[test]
    fn test_replicated_transaction_shares_payload() {
        let tx = TransactionRepresentation::new(vec![]);
        let replicated = ReplicatedTransaction::from_transaction(&tx).unwrap();
        let copy = replicated.clone();
        assert_eq!(replicated.payload().as_ptr(), copy.payload().as_ptr());
        assert!(!replicated.is_empty());
    }
}

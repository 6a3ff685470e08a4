//! Replicated apply tests against a real on-disk log
//!
//! - Redelivered indices never reach the store twice
//! - The watermark follows the last applied index
//! - Stale lock sessions are fenced, the sentinel never is
//! - A restarted node resumes from the index recorded in the log

use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use txreplica::command::StorageCommand;
use txreplica::commit::{CommitResult, LogCommitProcess, TransactionApplier};
use txreplica::health::DatabaseHealth;
use txreplica::locking::{LockToken, ReplicatedLockTokenState, NO_LOCK_SESSION_ID};
use txreplica::observability::MetricsRegistry;
use txreplica::recovery::scan_log;
use txreplica::state_machine::{
    callback_channel, ApplySettings, DuplicateDeliveryPolicy, ReplicatedTransactionStateMachine,
    TxFailure, TxOutcome,
};
use txreplica::transaction::{log_index, ReplicatedTransaction, TransactionRepresentation};
use txreplica::txlog::{LogRotation, LoggingRotationMonitor, TransactionLogFile};

// =============================================================================
// Test Utilities
// =============================================================================

type Applied = Arc<Mutex<Vec<(u64, TransactionRepresentation)>>>;

struct RecordingStore {
    applied: Applied,
}

impl TransactionApplier for RecordingStore {
    fn apply(&mut self, tx_id: u64, tx: &TransactionRepresentation) -> CommitResult<()> {
        self.applied.lock().unwrap().push((tx_id, tx.clone()));
        Ok(())
    }
}

struct Node {
    machine: ReplicatedTransactionStateMachine,
    applied: Applied,
    metrics: Arc<MetricsRegistry>,
}

fn start_node(dir: &TempDir, current_token: i32, settings: ApplySettings) -> Node {
    let metrics = Arc::new(MetricsRegistry::new());
    let health = Arc::new(DatabaseHealth::new());
    let log_dir = dir.path().join("txlog");

    let recovered = scan_log(&log_dir).unwrap();
    let log_file =
        Arc::new(TransactionLogFile::open(&log_dir, 1 << 20, Arc::clone(&health)).unwrap());
    let rotation = Arc::new(LogRotation::new(
        log_file,
        Arc::new(LoggingRotationMonitor::new(Arc::clone(&metrics))),
    ));

    let applied: Applied = Arc::new(Mutex::new(Vec::new()));
    let process = LogCommitProcess::new(
        rotation,
        Box::new(RecordingStore {
            applied: Arc::clone(&applied),
        }),
        Arc::clone(&metrics),
    );

    let tokens = Arc::new(ReplicatedLockTokenState::with_token(
        LockToken::new(current_token, "leader"),
        0,
    ));
    let machine =
        ReplicatedTransactionStateMachine::new(tokens, health, Arc::clone(&metrics), settings);
    machine
        .install_commit_process(Box::new(process), recovered.recovered_index())
        .unwrap();

    Node {
        machine,
        applied,
        metrics,
    }
}

fn replicated(session: i32, node_id: i64) -> ReplicatedTransaction {
    let tx = TransactionRepresentation::new(vec![StorageCommand::node(node_id, vec![1])])
        .with_author(7, 0)
        .with_lock_session(session);
    ReplicatedTransaction::from_transaction(&tx).unwrap()
}

fn settings(policy: DuplicateDeliveryPolicy) -> ApplySettings {
    ApplySettings {
        max_batch_size: 4,
        duplicate_delivery: policy,
        ..ApplySettings::default()
    }
}

// =============================================================================
// Idempotence and ordering
// =============================================================================

#[test]
fn test_redelivered_index_is_applied_once() {
    let dir = TempDir::new().unwrap();
    let node = start_node(&dir, 3, settings(DuplicateDeliveryPolicy::Ignore));
    let tx = replicated(3, 1);

    let (first, first_rx) = callback_channel();
    node.machine.apply_command(&tx, 10, first).unwrap();
    node.machine.ensured_applied().unwrap();
    assert!(matches!(
        first_rx.recv().unwrap(),
        Ok(TxOutcome::Committed { .. })
    ));

    let (again, again_rx) = callback_channel();
    node.machine.apply_command(&tx, 10, again).unwrap();
    node.machine.ensured_applied().unwrap();

    // Ignored duplicates drop their callback.
    assert!(again_rx.recv().is_err());
    assert_eq!(node.applied.lock().unwrap().len(), 1);
    assert_eq!(node.machine.last_applied_index().unwrap(), 10);
    assert_eq!(node.metrics.snapshot().duplicates_skipped, 1);
}

#[test]
fn test_watermark_tracks_latest_index_and_ignores_lower() {
    let dir = TempDir::new().unwrap();
    let node = start_node(&dir, 3, settings(DuplicateDeliveryPolicy::Ignore));

    for index in [1, 2, 5, 9] {
        let (callback, _rx) = callback_channel();
        node.machine
            .apply_command(&replicated(3, index), index, callback)
            .unwrap();
        assert_eq!(node.machine.last_applied_index().unwrap(), index);
    }

    let (late, _rx) = callback_channel();
    node.machine.apply_command(&replicated(3, 99), 4, late).unwrap();
    node.machine.ensured_applied().unwrap();

    assert_eq!(node.machine.last_applied_index().unwrap(), 9);
    let applied = node.applied.lock().unwrap();
    let ids: Vec<u64> = applied.iter().map(|(tx_id, _)| *tx_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(
        applied.last().unwrap().1.additional_header,
        log_index::encode(9).to_vec()
    );
}

// =============================================================================
// Fencing
// =============================================================================

#[test]
fn test_lock_session_fencing() {
    let dir = TempDir::new().unwrap();
    let node = start_node(&dir, 3, settings(DuplicateDeliveryPolicy::Ignore));

    let (stale, stale_rx) = callback_channel();
    node.machine.apply_command(&replicated(5, 1), 1, stale).unwrap();
    assert_eq!(
        stale_rx.recv().unwrap(),
        Err(TxFailure::LockSessionExpired {
            current: 3,
            transaction: 5
        })
    );
    // Fenced entries still move the watermark.
    assert_eq!(node.machine.last_applied_index().unwrap(), 1);

    let (current, current_rx) = callback_channel();
    node.machine.apply_command(&replicated(3, 2), 2, current).unwrap();
    let (sentinel, sentinel_rx) = callback_channel();
    node.machine
        .apply_command(&replicated(NO_LOCK_SESSION_ID, 3), 3, sentinel)
        .unwrap();
    node.machine.ensured_applied().unwrap();

    assert_eq!(current_rx.recv().unwrap(), Ok(TxOutcome::Committed { tx_id: 1 }));
    assert_eq!(sentinel_rx.recv().unwrap(), Ok(TxOutcome::Committed { tx_id: 2 }));
    assert_eq!(node.applied.lock().unwrap().len(), 2);
    assert_eq!(node.metrics.snapshot().lock_session_rejections, 1);
}

// =============================================================================
// End to end
// =============================================================================

#[test]
fn test_apply_at_index_42_then_redeliver() {
    let dir = TempDir::new().unwrap();
    let node = start_node(&dir, 3, settings(DuplicateDeliveryPolicy::Ignore));
    let tx = TransactionRepresentation::new(vec![
        StorageCommand::node(1, vec![2]),
        StorageCommand::node(2, vec![]),
    ])
    .with_author(7, 0)
    .with_lock_session(3);
    let payload = ReplicatedTransaction::from_transaction(&tx).unwrap();

    let (callback, rx) = callback_channel();
    node.machine.apply_command(&payload, 42, callback).unwrap();
    node.machine.ensured_applied().unwrap();

    let tx_id = match rx.recv().unwrap() {
        Ok(TxOutcome::Committed { tx_id }) => tx_id,
        other => panic!("expected commit, got {:?}", other),
    };
    assert!(tx_id >= 1);

    {
        let applied = node.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        let (_, stored) = &applied[0];
        assert_eq!(log_index::decode(&stored.additional_header).unwrap(), 42);
        assert_eq!(stored.lock_session_id, 3);
        assert_eq!(stored.commands, tx.commands);
    }

    for index in [42, 41, 0] {
        let (callback, _rx) = callback_channel();
        node.machine.apply_command(&payload, index, callback).unwrap();
    }
    node.machine.ensured_applied().unwrap();
    assert_eq!(node.applied.lock().unwrap().len(), 1);
    assert_eq!(node.machine.last_applied_index().unwrap(), 42);
}

#[test]
fn test_restart_resumes_from_logged_index() {
    let dir = TempDir::new().unwrap();
    {
        let node = start_node(&dir, 3, settings(DuplicateDeliveryPolicy::Ignore));
        for index in 100..106 {
            let (callback, _rx) = callback_channel();
            node.machine
                .apply_command(&replicated(3, index), index, callback)
                .unwrap();
        }
        node.machine.ensured_applied().unwrap();
    }

    let node = start_node(&dir, 3, settings(DuplicateDeliveryPolicy::Ignore));
    assert_eq!(node.machine.last_applied_index().unwrap(), 105);

    // The consensus layer replays its tail after restart.
    for index in 103..108 {
        let (callback, _rx) = callback_channel();
        node.machine
            .apply_command(&replicated(3, index), index, callback)
            .unwrap();
    }
    node.machine.ensured_applied().unwrap();

    let applied = node.applied.lock().unwrap();
    let ids: Vec<u64> = applied.iter().map(|(tx_id, _)| *tx_id).collect();
    assert_eq!(ids, vec![7, 8]);
}

#[test]
fn test_restart_with_custom_header_resumes_from_command_index() {
    let dir = TempDir::new().unwrap();
    {
        let node = start_node(&dir, 3, settings(DuplicateDeliveryPolicy::Ignore));
        let tx = TransactionRepresentation::new(vec![StorageCommand::node(1, vec![])])
            .with_lock_session(3)
            .with_additional_header(b"user-meta-header".to_vec());
        let payload = ReplicatedTransaction::from_transaction(&tx).unwrap();

        let (callback, rx) = callback_channel();
        node.machine.apply_command(&payload, 5, callback).unwrap();
        node.machine.ensured_applied().unwrap();
        assert_eq!(rx.recv().unwrap(), Ok(TxOutcome::Committed { tx_id: 1 }));
        assert_eq!(
            node.applied.lock().unwrap()[0].1.additional_header,
            b"user-meta-header".to_vec()
        );
    }

    assert_eq!(scan_log(&dir.path().join("txlog")).unwrap().recovered_index(), 5);

    let node = start_node(&dir, 3, settings(DuplicateDeliveryPolicy::Ignore));
    assert_eq!(node.machine.last_applied_index().unwrap(), 5);

    let (callback, rx) = callback_channel();
    node.machine.apply_command(&replicated(3, 2), 6, callback).unwrap();
    node.machine.ensured_applied().unwrap();
    assert_eq!(rx.recv().unwrap(), Ok(TxOutcome::Committed { tx_id: 2 }));
}

// =============================================================================
// Duplicate delivery policies
// =============================================================================

#[test]
fn test_acknowledge_applied_reports_original_tx_id() {
    let dir = TempDir::new().unwrap();
    let node = start_node(&dir, 3, settings(DuplicateDeliveryPolicy::AcknowledgeApplied));

    let (callback, rx) = callback_channel();
    node.machine.apply_command(&replicated(3, 1), 7, callback).unwrap();

    // Still pending in the batch queue; the duplicate forces it out.
    let (duplicate, duplicate_rx) = callback_channel();
    node.machine.apply_command(&replicated(3, 1), 7, duplicate).unwrap();

    assert_eq!(rx.recv().unwrap(), Ok(TxOutcome::Committed { tx_id: 1 }));
    assert_eq!(
        duplicate_rx.recv().unwrap(),
        Ok(TxOutcome::AlreadyApplied {
            command_index: 7,
            tx_id: Some(1)
        })
    );
    assert_eq!(node.applied.lock().unwrap().len(), 1);
}

#[test]
fn test_acknowledge_applied_for_fenced_index_has_no_tx_id() {
    let dir = TempDir::new().unwrap();
    let node = start_node(&dir, 3, settings(DuplicateDeliveryPolicy::AcknowledgeApplied));

    let (callback, _rx) = callback_channel();
    node.machine.apply_command(&replicated(9, 1), 4, callback).unwrap();

    let (duplicate, duplicate_rx) = callback_channel();
    node.machine.apply_command(&replicated(9, 1), 4, duplicate).unwrap();
    assert_eq!(
        duplicate_rx.recv().unwrap(),
        Ok(TxOutcome::AlreadyApplied {
            command_index: 4,
            tx_id: None
        })
    );
}

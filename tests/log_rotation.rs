//! Log rotation tests
//!
//! - Concurrent rotation requests produce exactly one new segment
//! - Rotation never runs on an unhealthy database
//! - Batches keep appending across rotations without losing ids

use std::sync::{Arc, Barrier};
use std::thread;

use bytes::Bytes;
use tempfile::TempDir;
use txreplica::health::DatabaseHealth;
use txreplica::observability::MetricsRegistry;
use txreplica::txlog::{
    list_segment_versions, scan_segment, segment_path, LogAppendEvent, LogRotation,
    LoggingRotationMonitor, TransactionLogFile, TxLogErrorCode,
};

const THRESHOLD: u64 = 128;

fn rotation_in(dir: &TempDir) -> (Arc<LogRotation>, Arc<DatabaseHealth>, Arc<MetricsRegistry>) {
    let metrics = Arc::new(MetricsRegistry::new());
    let health = Arc::new(DatabaseHealth::new());
    let log_file =
        Arc::new(TransactionLogFile::open(dir.path(), THRESHOLD, Arc::clone(&health)).unwrap());
    let rotation = Arc::new(LogRotation::new(
        log_file,
        Arc::new(LoggingRotationMonitor::new(Arc::clone(&metrics))),
    ));
    (rotation, health, metrics)
}

fn fill_past_threshold(rotation: &LogRotation) {
    let payload = Bytes::from(vec![0xAB; THRESHOLD as usize]);
    rotation.log_file().lock().unwrap().append(&[(1, payload)]).unwrap();
    assert!(rotation.log_file().rotation_needed());
}

#[test]
fn test_concurrent_rotation_happens_once() {
    let dir = TempDir::new().unwrap();
    let (rotation, _health, metrics) = rotation_in(&dir);
    fill_past_threshold(&rotation);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let rotation = Arc::clone(&rotation);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut event = LogAppendEvent::new();
                barrier.wait();
                rotation.rotate_log_if_needed(&mut event).unwrap()
            })
        })
        .collect();

    let rotated: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(rotated.iter().filter(|r| **r).count(), 1);

    assert_eq!(list_segment_versions(dir.path()).unwrap(), vec![0, 1]);
    assert_eq!(rotation.log_file().lock().unwrap().version(), 1);
    assert!(!rotation.log_file().rotation_needed());
    assert_eq!(metrics.snapshot().log_rotations, 1);
}

#[test]
fn test_unhealthy_database_refuses_rotation() {
    let dir = TempDir::new().unwrap();
    let (rotation, health, metrics) = rotation_in(&dir);
    fill_past_threshold(&rotation);
    health.panic("store apply failed");

    let mut event = LogAppendEvent::new();
    let err = rotation.rotate_log_if_needed(&mut event).unwrap_err();
    assert_eq!(err.code(), TxLogErrorCode::RotationRefused);
    assert!(event.rotation.is_none());

    let err = rotation.rotate_log_file(&mut event).unwrap_err();
    assert_eq!(err.code(), TxLogErrorCode::RotationRefused);

    assert_eq!(list_segment_versions(dir.path()).unwrap(), vec![0]);
    assert_eq!(metrics.snapshot().log_rotations, 0);
}

#[test]
fn test_appends_continue_across_rotations() {
    let dir = TempDir::new().unwrap();
    let (rotation, _health, _metrics) = rotation_in(&dir);
    let payload = Bytes::from(vec![1u8; 40]);

    let mut ids = Vec::new();
    for round in 0..6 {
        let mut event = LogAppendEvent::new();
        let mut locked = rotation.log_file().lock().unwrap();
        rotation
            .batched_rotate_log_if_needed(&mut locked, &mut event)
            .unwrap();
        let entries = [(2 * round, payload.clone()), (2 * round + 1, payload.clone())];
        ids.extend(locked.append(&entries).unwrap());
    }
    assert_eq!(ids, (1..=12).collect::<Vec<u64>>());

    let versions = list_segment_versions(dir.path()).unwrap();
    assert!(versions.len() > 1);
    assert_eq!(versions, (0..versions.len() as u64).collect::<Vec<u64>>());

    let mut previous_last = 0;
    let mut entries = 0;
    for version in versions {
        let summary = scan_segment(&segment_path(dir.path(), version)).unwrap();
        assert_eq!(summary.header.previous_last_tx_id, previous_last);
        previous_last = summary.last_tx_id;
        entries += summary.entries;
    }
    assert_eq!(entries, 12);
    assert_eq!(previous_last, 12);
}

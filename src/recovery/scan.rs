//! Startup scan of the segmented transaction log
//!
//! Every segment is read front to back with checksums verified. The scan
//! halts on the first inconsistency; it never truncates or repairs. The
//! watermark comes from the command index framed with each entry; the
//! transaction payload and its user header are never interpreted here.

use std::path::Path;

use serde::Serialize;

use crate::observability::{ObservationScope, Timer};
use crate::txlog::{list_segment_versions, scan_segment, segment_path};

use super::errors::{RecoveryError, RecoveryResult};

/// What the log says about the state that was durably committed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveredLogState {
    /// Segment versions found, ascending
    pub segment_versions: Vec<u64>,
    /// Entries across all segments
    pub entries: u64,
    /// Id of the last durable transaction, 0 for an empty log
    pub last_tx_id: u64,
    /// Consensus index of the last durable transaction
    pub last_applied_index: Option<i64>,
}

impl RecoveredLogState {
    /// Index to hand to the state machine on install. -1 when nothing was applied.
    pub fn recovered_index(&self) -> i64 {
        self.last_applied_index.unwrap_or(-1)
    }

    /// Version new appends would go to, if any segment exists
    pub fn active_version(&self) -> Option<u64> {
        self.segment_versions.last().copied()
    }
}

/// Reads the whole log under `dir`.
///
/// A missing or empty directory is an empty log, not an error.
pub fn scan_log(dir: &Path) -> RecoveryResult<RecoveredLogState> {
    let dir_display = dir.display().to_string();
    let scope = ObservationScope::with_fields("TXLOG_RECOVERY", &[("dir", &dir_display)]);
    let timer = Timer::new();

    match scan_segments(dir) {
        Ok(state) => {
            let entries = state.entries.to_string();
            let last_tx_id = state.last_tx_id.to_string();
            let index = state.recovered_index().to_string();
            let segments = state.segment_versions.len().to_string();
            scope.complete_with_fields(&[
                ("segments", &segments),
                ("entries", &entries),
                ("last_tx_id", &last_tx_id),
                ("last_applied_index", &index),
                ("duration_ms", &timer.elapsed_ms()),
            ]);
            Ok(state)
        }
        Err(err) => {
            scope.fail_fatal(&err.to_string());
            Err(err)
        }
    }
}

fn scan_segments(dir: &Path) -> RecoveryResult<RecoveredLogState> {
    let versions = list_segment_versions(dir)?;
    let mut state = RecoveredLogState {
        segment_versions: versions.clone(),
        ..RecoveredLogState::default()
    };

    let mut previous: Option<(u64, u64)> = None;

    for version in versions {
        let summary = scan_segment(&segment_path(dir, version))?;
        let header = summary.header;

        if header.log_version != version {
            return Err(RecoveryError::VersionMismatch {
                version,
                header_version: header.log_version,
            });
        }

        // Pruned history may leave the first surviving segment above 0; after
        // that, segments chain without gaps.
        if let Some((previous_version, previous_last_tx)) = previous {
            if version != previous_version + 1 {
                return Err(RecoveryError::SegmentGap {
                    previous: previous_version,
                    version,
                });
            }
            if header.previous_last_tx_id != previous_last_tx {
                return Err(RecoveryError::ChainBroken {
                    version,
                    recorded: header.previous_last_tx_id,
                    actual: previous_last_tx,
                });
            }
        }

        state.entries += summary.entries;
        state.last_tx_id = summary.last_tx_id;
        // An empty trailing segment keeps the index of the one before it.
        if let Some(entry) = summary.last_entry {
            state.last_applied_index = Some(entry.command_index);
        }
        previous = Some((version, summary.last_tx_id));
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::DatabaseHealth;
    use crate::transaction::{codec, TransactionRepresentation};
    use crate::txlog::{SegmentHeader, TransactionLogFile, TxLogResult, SEGMENT_HEADER_SIZE};
    use bytes::Bytes;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open(dir: &Path) -> TxLogResult<TransactionLogFile> {
        TransactionLogFile::open(dir, 1 << 20, Arc::new(DatabaseHealth::new()))
    }

    fn logged(index: i64) -> (i64, Bytes) {
        let tx = TransactionRepresentation::new(Vec::new()).with_lock_session(2);
        (index, codec::encode(&tx).unwrap())
    }

    #[test]
    fn test_missing_directory_is_empty_log() {
        let temp = TempDir::new().unwrap();
        let state = scan_log(&temp.path().join("absent")).unwrap();
        assert!(state.segment_versions.is_empty());
        assert_eq!(state.recovered_index(), -1);
        assert_eq!(state.active_version(), None);
    }

    #[test]
    fn test_fresh_log_has_no_index() {
        let temp = TempDir::new().unwrap();
        open(temp.path()).unwrap();

        let state = scan_log(temp.path()).unwrap();
        assert_eq!(state.segment_versions, vec![0]);
        assert_eq!(state.entries, 0);
        assert_eq!(state.last_applied_index, None);
    }

    #[test]
    fn test_index_comes_from_last_entry_across_segments() {
        let temp = TempDir::new().unwrap();
        let log = open(temp.path()).unwrap();
        {
            let mut locked = log.lock().unwrap();
            locked.append(&[logged(10), logged(11)]).unwrap();
            locked.rotate().unwrap();
            locked.append(&[logged(12)]).unwrap();
            // An empty trailing segment must not hide the index.
            locked.rotate().unwrap();
        }

        let state = scan_log(temp.path()).unwrap();
        assert_eq!(state.segment_versions, vec![0, 1, 2]);
        assert_eq!(state.entries, 3);
        assert_eq!(state.last_tx_id, 3);
        assert_eq!(state.recovered_index(), 12);
    }

    #[test]
    fn test_gap_between_segments_is_fatal() {
        let temp = TempDir::new().unwrap();
        let log = open(temp.path()).unwrap();
        {
            let mut locked = log.lock().unwrap();
            locked.rotate().unwrap();
            locked.rotate().unwrap();
        }
        fs::remove_file(segment_path(temp.path(), 1)).unwrap();

        let err = scan_log(temp.path()).unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::SegmentGap {
                previous: 0,
                version: 2
            }
        ));
    }

    #[test]
    fn test_broken_chain_is_fatal() {
        let temp = TempDir::new().unwrap();
        let log = open(temp.path()).unwrap();
        {
            let mut locked = log.lock().unwrap();
            locked.append(&[logged(1)]).unwrap();
            locked.rotate().unwrap();
        }

        let forged = SegmentHeader {
            log_version: 1,
            previous_last_tx_id: 7,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .open(segment_path(temp.path(), 1))
            .unwrap();
        file.write_all(&forged.encode()).unwrap();
        assert_eq!(forged.encode().len(), SEGMENT_HEADER_SIZE);

        let err = scan_log(temp.path()).unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::ChainBroken {
                version: 1,
                recorded: 7,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_custom_header_does_not_affect_index() {
        let temp = TempDir::new().unwrap();
        let log = open(temp.path()).unwrap();
        let tx = TransactionRepresentation::new(Vec::new())
            .with_additional_header(b"user-meta-header".to_vec());
        log.lock()
            .unwrap()
            .append(&[(5, codec::encode(&tx).unwrap())])
            .unwrap();

        let state = scan_log(temp.path()).unwrap();
        assert_eq!(state.recovered_index(), 5);
    }
}

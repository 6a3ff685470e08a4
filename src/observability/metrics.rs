//! Counters for the apply pipeline and the transaction log
//!
//! Counters only, monotonic, reset only on process start. Increments use
//! Relaxed ordering; exact cross-counter consistency is not required.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Registry of operational counters
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    commands_applied: AtomicU64,
    duplicates_skipped: AtomicU64,
    lock_session_rejections: AtomicU64,
    batches_committed: AtomicU64,
    transactions_committed: AtomicU64,
    log_bytes_written: AtomicU64,
    log_rotations: AtomicU64,
    panics: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// A command was admitted to the batch queue
    pub fn increment_commands_applied(&self) {
        self.commands_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// A redelivered command index was skipped
    pub fn increment_duplicates_skipped(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// A transaction failed lock session fencing
    pub fn increment_lock_session_rejections(&self) {
        self.lock_session_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// A batch of `transactions` was committed
    pub fn record_batch_committed(&self, transactions: u64) {
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
        self.transactions_committed
            .fetch_add(transactions, Ordering::Relaxed);
    }

    /// Bytes appended to the transaction log
    pub fn add_log_bytes(&self, bytes: u64) {
        self.log_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// A log segment rotation completed
    pub fn increment_log_rotations(&self) {
        self.log_rotations.fetch_add(1, Ordering::Relaxed);
    }

    /// The state machine panicked
    pub fn increment_panics(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    /// All counters as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::json!(self.snapshot()).to_string()
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_applied: self.commands_applied.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            lock_session_rejections: self.lock_session_rejections.load(Ordering::Relaxed),
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            log_bytes_written: self.log_bytes_written.load(Ordering::Relaxed),
            log_rotations: self.log_rotations.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub commands_applied: u64,
    pub duplicates_skipped: u64,
    pub lock_session_rejections: u64,
    pub batches_committed: u64,
    pub transactions_committed: u64,
    pub log_bytes_written: u64,
    pub log_rotations: u64,
    pub panics: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let snapshot = MetricsRegistry::new().snapshot();
        assert_eq!(snapshot.commands_applied, 0);
        assert_eq!(snapshot.log_rotations, 0);
        assert_eq!(snapshot.panics, 0);
    }

    #[test]
    fn test_batch_counts_transactions() {
        let registry = MetricsRegistry::new();
        registry.record_batch_committed(3);
        registry.record_batch_committed(1);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.batches_committed, 2);
        assert_eq!(snapshot.transactions_committed, 4);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.add_log_bytes(1234);
        registry.increment_duplicates_skipped();

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["log_bytes_written"], 1234);
        assert_eq!(parsed["duplicates_skipped"], 1);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        reg.increment_commands_applied();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().commands_applied, 800);
    }
}

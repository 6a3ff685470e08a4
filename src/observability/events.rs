//! Observable events of the replication apply pipeline
//!
//! Events are explicit and typed. Each has a stable upper-snake name that
//! is what appears in the `event` field of a log line.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration loaded
    ConfigLoaded,
    /// Commit process bound to the state machine
    CommitProcessInstalled,

    // Apply path
    /// Redelivered command index skipped
    DuplicateCommandSkipped,
    /// Transaction rejected by lock session fencing
    LockSessionExpired,
    /// Batch durably committed
    BatchCommitted,
    /// Batch commit failed
    BatchCommitFailed,
    /// State machine entered its terminal state (FATAL)
    StateMachinePanic,
    /// Database marked unhealthy (FATAL)
    DatabasePanic,

    // Transaction log
    /// Log opened for appending
    LogOpened,
    /// New log segment created
    LogSegmentCreated,
    /// Rotation started
    LogRotationBegin,
    /// Rotation finished
    LogRotationComplete,
    /// Rotation refused because the database is unhealthy
    LogRotationRefused,
    /// Log corruption detected (FATAL)
    LogCorruption,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::CommitProcessInstalled => "COMMIT_PROCESS_INSTALLED",

            Event::DuplicateCommandSkipped => "DUPLICATE_COMMAND_SKIPPED",
            Event::LockSessionExpired => "LOCK_SESSION_EXPIRED",
            Event::BatchCommitted => "BATCH_COMMITTED",
            Event::BatchCommitFailed => "BATCH_COMMIT_FAILED",
            Event::StateMachinePanic => "STATE_MACHINE_PANIC",
            Event::DatabasePanic => "DATABASE_PANIC",

            Event::LogOpened => "TXLOG_OPENED",
            Event::LogSegmentCreated => "TXLOG_SEGMENT_CREATED",
            Event::LogRotationBegin => "TXLOG_ROTATION_BEGIN",
            Event::LogRotationComplete => "TXLOG_ROTATION_COMPLETE",
            Event::LogRotationRefused => "TXLOG_ROTATION_REFUSED",
            Event::LogCorruption => "TXLOG_CORRUPTION",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Event::StateMachinePanic
                | Event::DatabasePanic
                | Event::LogCorruption
        )
    }

    /// Returns true if this event reports a failure that is not fatal
    pub fn is_failure(&self) -> bool {
        matches!(self, Event::BatchCommitFailed | Event::LogRotationRefused)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::ConfigLoaded,
            Event::CommitProcessInstalled,
            Event::DuplicateCommandSkipped,
            Event::LockSessionExpired,
            Event::BatchCommitted,
            Event::BatchCommitFailed,
            Event::StateMachinePanic,
            Event::DatabasePanic,
            Event::LogOpened,
            Event::LogSegmentCreated,
            Event::LogRotationBegin,
            Event::LogRotationComplete,
            Event::LogRotationRefused,
            Event::LogCorruption,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_fatal_events() {
        assert!(Event::StateMachinePanic.is_fatal());
        assert!(Event::LogCorruption.is_fatal());
        assert!(!Event::LockSessionExpired.is_fatal());
        assert!(!Event::LogRotationRefused.is_fatal());
        assert!(Event::LogRotationRefused.is_failure());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(
            format!("{}", Event::LogRotationComplete),
            "TXLOG_ROTATION_COMPLETE"
        );
    }
}

//! Engine health
//!
//! Once any component hits an unrecoverable failure it marks the database
//! unhealthy. Every later durability operation checks health first and
//! refuses to run; there is no way back to healthy short of a restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use crate::observability::{log_event_with_fields, Event};

/// Raised when an operation requires a healthy database
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("database is not healthy, restart required: {cause}")]
pub struct HealthError {
    /// The failure that made the database unhealthy
    pub cause: String,
}

/// Process-wide health flag shared by the apply and durability paths.
#[derive(Debug)]
pub struct DatabaseHealth {
    healthy: AtomicBool,
    cause: Mutex<Option<String>>,
}

impl DatabaseHealth {
    /// A healthy database
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            cause: Mutex::new(None),
        }
    }

    /// Mark the database unhealthy. The first cause is kept.
    pub fn panic(&self, cause: impl Into<String>) {
        let cause = cause.into();
        let mut slot = self.cause.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            log_event_with_fields(Event::DatabasePanic, &[("cause", cause.as_str())]);
            *slot = Some(cause);
        }
        self.healthy.store(false, Ordering::SeqCst);
    }

    /// Whether no unrecoverable failure has been recorded
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Fail if the database is unhealthy
    pub fn assert_healthy(&self) -> Result<(), HealthError> {
        if self.is_healthy() {
            return Ok(());
        }
        Err(HealthError {
            cause: self
                .cause()
                .unwrap_or_else(|| "unknown failure".to_string()),
        })
    }

    /// The recorded failure, if any
    pub fn cause(&self) -> Option<String> {
        self.cause
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for DatabaseHealth {
    fn default() -> Self {
        Self::new()
    }
}

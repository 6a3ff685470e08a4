//! Crash point injection for durability testing
//!
//! When `TXREPLICA_CRASH_POINT` names a point that execution reaches, the
//! process terminates via `std::process::abort()`: no cleanup, no unwinding.
//!
//! ```bash
//! TXREPLICA_CRASH_POINT=txlog_before_fsync txreplica rotate --config cfg.json
//! ```

use std::sync::OnceLock;

const CRASH_POINT_ENV: &str = "TXREPLICA_CRASH_POINT";

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn configured_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var(CRASH_POINT_ENV).ok())
        .as_deref()
}

/// Returns true if the crash point environment variable names `name`.
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    configured_point() == Some(name)
}

/// Abort the process if the named crash point is enabled.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // Transaction log append
    pub const TXLOG_BEFORE_APPEND: &str = "txlog_before_append";
    pub const TXLOG_BEFORE_FSYNC: &str = "txlog_before_fsync";
    pub const TXLOG_AFTER_APPEND: &str = "txlog_after_append";

    // Segment rotation
    pub const ROTATION_BEFORE_SEGMENT_CREATE: &str = "rotation_before_segment_create";
    pub const ROTATION_AFTER_SEGMENT_CREATE: &str = "rotation_after_segment_create";

    // Commit pipeline
    pub const COMMIT_BEFORE_STORE_APPLY: &str = "commit_before_store_apply";

    /// Get all crash point names
    pub fn all() -> &'static [&'static str] {
        &[
            TXLOG_BEFORE_APPEND,
            TXLOG_BEFORE_FSYNC,
            TXLOG_AFTER_APPEND,
            ROTATION_BEFORE_SEGMENT_CREATE,
            ROTATION_AFTER_SEGMENT_CREATE,
            COMMIT_BEFORE_STORE_APPLY,
        ]
    }
}

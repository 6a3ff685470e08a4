//! Startup recovery of the apply watermark
//!
//! The durable log is the only record of what was applied. On startup it is
//! scanned in version order and the consensus index of the last durable
//! transaction becomes the state machine's starting watermark.
//!
//! Corruption, a missing segment, or a broken header chain halts startup.

mod errors;
mod scan;

pub use errors::{RecoveryError, RecoveryResult};
pub use scan::{scan_log, RecoveredLogState};

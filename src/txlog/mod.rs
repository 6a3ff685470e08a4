//! Durable segmented transaction log
//!
//! - Append-only; a batch is one write plus one fsync
//! - Transaction ids are assigned here, contiguous from 1
//! - Segments rotate at a size threshold under the append lock
//! - Corruption halts; there is no repair

mod checksum;
mod errors;
mod log_file;
mod reader;
mod record;
mod rotation;
mod segment;

pub use errors::{Severity, TxLogError, TxLogErrorCode, TxLogResult};
pub use log_file::{LockedLog, RotatedSegment, TransactionLogFile};
pub use reader::{scan_segment, SegmentReader, SegmentSummary};
pub use record::{LogEntry, ENTRY_OVERHEAD};
pub use rotation::{
    LogAppendEvent, LogRotation, LoggingRotationMonitor, RotationEvent, RotationMonitor,
};
pub use segment::{
    list_segment_versions, parse_segment_version, segment_file_name, segment_path,
    SegmentHeader, SEGMENT_HEADER_SIZE,
};

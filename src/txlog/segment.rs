//! Log segment files
//!
//! Segments live in one directory as `txlog.<version>`. Each begins with a
//! fixed header (little-endian):
//!
//! | Offset | Field                    | Size |
//! |--------|--------------------------|------|
//! | 0      | magic `TXLG`             | 4    |
//! | 4      | format version           | 1    |
//! | 5      | log version              | 8    |
//! | 13     | previous last tx id      | 8    |
//! | 21     | CRC32 of bytes 0..21     | 4    |

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::checksum::{compute_checksum, verify_checksum};
use super::errors::{TxLogError, TxLogResult};

/// Size of the segment header
pub const SEGMENT_HEADER_SIZE: usize = 25;

const MAGIC: &[u8; 4] = b"TXLG";
const FORMAT_VERSION: u8 = 1;
const FILE_PREFIX: &str = "txlog.";

/// Segment header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Version of this segment; one higher than the segment before it
    pub log_version: u64,
    /// Last transaction id written before this segment began, 0 if none
    pub previous_last_tx_id: u64,
}

impl SegmentHeader {
    pub fn encode(&self) -> [u8; SEGMENT_HEADER_SIZE] {
        let mut header = [0u8; SEGMENT_HEADER_SIZE];
        header[0..4].copy_from_slice(MAGIC);
        header[4] = FORMAT_VERSION;
        header[5..13].copy_from_slice(&self.log_version.to_le_bytes());
        header[13..21].copy_from_slice(&self.previous_last_tx_id.to_le_bytes());
        let checksum = compute_checksum(&header[..21]);
        header[21..25].copy_from_slice(&checksum.to_le_bytes());
        header
    }

    pub fn decode(bytes: &[u8]) -> TxLogResult<Self> {
        if bytes.len() < SEGMENT_HEADER_SIZE {
            return Err(TxLogError::corruption(format!(
                "segment header truncated: {} of {} bytes",
                bytes.len(),
                SEGMENT_HEADER_SIZE
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(TxLogError::corruption("segment header has wrong magic"));
        }
        if bytes[4] != FORMAT_VERSION {
            return Err(TxLogError::corruption(format!(
                "unsupported segment format version {}",
                bytes[4]
            )));
        }

        let read_u64 = |range: std::ops::Range<usize>| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[range]);
            u64::from_le_bytes(raw)
        };
        let mut stored = [0u8; 4];
        stored.copy_from_slice(&bytes[21..25]);
        if !verify_checksum(&bytes[..21], u32::from_le_bytes(stored)) {
            return Err(TxLogError::corruption("segment header checksum mismatch"));
        }

        Ok(Self {
            log_version: read_u64(5..13),
            previous_last_tx_id: read_u64(13..21),
        })
    }
}

/// File name of a segment version
pub fn segment_file_name(version: u64) -> String {
    format!("{}{}", FILE_PREFIX, version)
}

/// Path of a segment version inside `dir`
pub fn segment_path(dir: &Path, version: u64) -> PathBuf {
    dir.join(segment_file_name(version))
}

/// Version encoded in a segment file name, if it is one
pub fn parse_segment_version(file_name: &str) -> Option<u64> {
    file_name.strip_prefix(FILE_PREFIX)?.parse().ok()
}

/// All segment versions in `dir`, ascending. A missing directory has none.
pub fn list_segment_versions(dir: &Path) -> TxLogResult<Vec<u64>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(TxLogError::append_failed(
                format!("failed to list log directory: {}", dir.display()),
                e,
            ))
        }
    };

    let mut versions = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            TxLogError::append_failed(
                format!("failed to list log directory: {}", dir.display()),
                e,
            )
        })?;
        if let Some(version) = entry.file_name().to_str().and_then(parse_segment_version) {
            versions.push(version);
        }
    }
    versions.sort_unstable();
    Ok(versions)
}

/// Create a new segment holding only its header, durable on return.
///
/// Fails if the segment already exists.
pub fn create_segment(dir: &Path, header: SegmentHeader) -> TxLogResult<File> {
    let path = segment_path(dir, header.log_version);
    let mut file = OpenOptions::new()
        .create_new(true)
        .append(true)
        .open(&path)
        .map_err(|e| {
            TxLogError::append_failed(
                format!("failed to create log segment: {}", path.display()),
                e,
            )
        })?;

    file.write_all(&header.encode()).map_err(|e| {
        TxLogError::append_failed(
            format!("failed to write segment header: {}", path.display()),
            e,
        )
    })?;
    file.sync_all().map_err(|e| {
        TxLogError::fsync_failed(format!("failed to fsync new segment: {}", path.display()), e)
    })?;
    sync_dir(dir)?;

    Ok(file)
}

/// fsync a directory so entry creation is durable
pub fn sync_dir(dir: &Path) -> TxLogResult<()> {
    let handle = File::open(dir).map_err(|e| {
        TxLogError::append_failed(
            format!("failed to open log directory for fsync: {}", dir.display()),
            e,
        )
    })?;
    handle.sync_all().map_err(|e| {
        TxLogError::fsync_failed(format!("failed to fsync log directory: {}", dir.display()), e)
    })
}

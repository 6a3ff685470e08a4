//! Sequential segment reader with strict corruption detection
//!
//! Any checksum mismatch, torn entry or gap in transaction ids is
//! corruption. There is no skipping and no repair.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::errors::{TxLogError, TxLogResult};
use super::record::{LogEntry, ENTRY_OVERHEAD};
use super::segment::{SegmentHeader, SEGMENT_HEADER_SIZE};

/// Reads the entries of one segment in order.
pub struct SegmentReader {
    header: SegmentHeader,
    reader: BufReader<File>,
    offset: u64,
    file_size: u64,
    last_tx_id: u64,
}

impl SegmentReader {
    /// Open a segment and validate its header.
    pub fn open(path: &Path) -> TxLogResult<Self> {
        let file = File::open(path).map_err(|e| {
            TxLogError::corruption(format!(
                "failed to open log segment {}: {}",
                path.display(),
                e
            ))
        })?;
        let file_size = file
            .metadata()
            .map_err(|e| {
                TxLogError::corruption(format!("failed to read segment metadata: {}", e))
            })?
            .len();

        let mut reader = BufReader::new(file);
        let mut raw = [0u8; SEGMENT_HEADER_SIZE];
        reader.read_exact(&mut raw).map_err(|e| {
            TxLogError::corruption(format!(
                "failed to read segment header of {}: {}",
                path.display(),
                e
            ))
        })?;
        let header = SegmentHeader::decode(&raw)?;

        Ok(Self {
            header,
            reader,
            offset: SEGMENT_HEADER_SIZE as u64,
            file_size,
            last_tx_id: header.previous_last_tx_id,
        })
    }

    pub fn header(&self) -> SegmentHeader {
        self.header
    }

    /// Offset just past the last entry read
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Id of the last entry read, or the header's previous last id
    pub fn last_tx_id(&self) -> u64 {
        self.last_tx_id
    }

    fn corruption(&self, reason: impl Into<String>) -> TxLogError {
        TxLogError::corruption_at_offset(self.header.log_version, self.offset, reason)
    }

    /// Read the next entry.
    ///
    /// `Ok(None)` at a clean end of segment.
    pub fn read_next(&mut self) -> TxLogResult<Option<LogEntry>> {
        if self.offset >= self.file_size {
            return Ok(None);
        }

        let remaining = self.file_size - self.offset;
        if remaining < ENTRY_OVERHEAD as u64 {
            return Err(self.corruption(format!(
                "torn entry: {} bytes remaining, minimum entry size is {}",
                remaining, ENTRY_OVERHEAD
            )));
        }

        let mut len_buf = [0u8; 4];
        self.reader
            .read_exact(&mut len_buf)
            .map_err(|e| self.corruption(format!("failed to read entry length: {}", e)))?;
        let entry_length = u64::from(u32::from_le_bytes(len_buf));
        if entry_length < ENTRY_OVERHEAD as u64 || entry_length > remaining {
            return Err(self.corruption(format!(
                "invalid entry length {} with {} bytes remaining",
                entry_length, remaining
            )));
        }

        let mut entry_buf = vec![0u8; entry_length as usize];
        entry_buf[0..4].copy_from_slice(&len_buf);
        self.reader
            .read_exact(&mut entry_buf[4..])
            .map_err(|e| self.corruption(format!("failed to read entry body: {}", e)))?;

        let (entry, consumed) =
            LogEntry::deserialize(&entry_buf).map_err(|e| self.corruption(e.to_string()))?;

        if entry.tx_id != self.last_tx_id + 1 {
            return Err(self.corruption(format!(
                "non-contiguous transaction id: expected {}, got {}",
                self.last_tx_id + 1,
                entry.tx_id
            )));
        }

        self.offset += consumed as u64;
        self.last_tx_id = entry.tx_id;
        Ok(Some(entry))
    }

    /// Read all remaining entries.
    pub fn read_all(&mut self) -> TxLogResult<Vec<LogEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_next()? {
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Summary of a fully validated segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSummary {
    pub header: SegmentHeader,
    pub entries: u64,
    pub last_tx_id: u64,
    pub last_entry: Option<LogEntry>,
    pub end_offset: u64,
}

/// Validate a whole segment, keeping only its last entry.
pub fn scan_segment(path: &Path) -> TxLogResult<SegmentSummary> {
    let mut reader = SegmentReader::open(path)?;
    let mut entries = 0u64;
    let mut last_entry = None;
    while let Some(entry) = reader.read_next()? {
        entries += 1;
        last_entry = Some(entry);
    }
    Ok(SegmentSummary {
        header: reader.header(),
        entries,
        last_tx_id: reader.last_tx_id(),
        last_entry,
        end_offset: reader.offset(),
    })
}

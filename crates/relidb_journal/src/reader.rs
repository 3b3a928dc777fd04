//! Segment scanning and committed-record reads.

use crate::error::JournalResult;
use crate::record::{decode_frame, Frame, JournalRecord};
use std::fs;
use std::path::Path;

/// Result of scanning a segment buffer.
pub(crate) struct Scan {
    /// Committed records, in order. Commit markers are consumed.
    pub(crate) records: Vec<JournalRecord>,
    /// Byte length of the segment prefix covered by commit markers.
    pub(crate) committed_len: u64,
}

/// Scans `buf`, collecting records covered by commit markers.
///
/// The scan stops at the first incomplete or malformed frame, and at a
/// commit marker whose count does not match the staged run; everything
/// after the stop point is an unmarked tail.
pub(crate) fn scan_segment(buf: &[u8]) -> Scan {
    let mut records = Vec::new();
    let mut pending = Vec::new();
    let mut pos = 0usize;
    let mut committed_len = 0u64;

    loop {
        match decode_frame(&buf[pos..]) {
            Ok(Frame::Complete(record, used)) => {
                pos += used;
                match record {
                    JournalRecord::Commit { records: count } => {
                        if count as usize != pending.len() {
                            break;
                        }
                        records.append(&mut pending);
                        committed_len = pos as u64;
                    }
                    staged => pending.push(staged),
                }
            }
            Ok(Frame::Incomplete) | Err(_) => break,
        }
    }

    Scan {
        records,
        committed_len,
    }
}

/// Reads the committed records of the segment at `path`.
///
/// Records staged without a commit marker are skipped, as are malformed
/// tails.
///
/// # Errors
///
/// Returns an error if the segment cannot be read.
pub fn read_committed(path: &Path) -> JournalResult<Vec<JournalRecord>> {
    let buf = fs::read(path)?;
    Ok(scan_segment(&buf).records)
}

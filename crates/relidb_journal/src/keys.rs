//! Log key composition and parsing.
//!
//! Mirrored mutations are named `bucket "::" key`, where the bucket part
//! is the slash-joined bucket path (e.g. `relationships/users/user_1`).

use crate::error::{JournalError, JournalResult};

const DELIMITER: &[u8] = b"::";

/// Composes a full log key from a bucket label and an inner key.
#[must_use]
pub fn log_key(bucket: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bucket.len() + DELIMITER.len() + key.len());
    out.extend_from_slice(bucket);
    out.extend_from_slice(DELIMITER);
    out.extend_from_slice(key);
    out
}

/// Splits a full log key into its bucket label and inner key.
///
/// # Errors
///
/// Returns [`JournalError::InvalidLogKey`] unless the key contains exactly
/// one `::` delimiter.
pub fn parse_log_key(log_key: &[u8]) -> JournalResult<(&[u8], &[u8])> {
    let first = find_delimiter(log_key, 0).ok_or(JournalError::InvalidLogKey)?;
    if find_delimiter(log_key, first + DELIMITER.len()).is_some() {
        return Err(JournalError::InvalidLogKey);
    }
    Ok((&log_key[..first], &log_key[first + DELIMITER.len()..]))
}

fn find_delimiter(buf: &[u8], from: usize) -> Option<usize> {
    if from > buf.len() {
        return None;
    }
    buf[from..]
        .windows(DELIMITER.len())
        .position(|w| w == DELIMITER)
        .map(|pos| pos + from)
}

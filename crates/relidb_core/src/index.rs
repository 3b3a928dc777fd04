//! Fixed-width entry ID codec.
//!
//! Entry IDs are monotonically allocated `u64` indexes rendered as
//! zero-padded ASCII decimal. The width is fixed at store creation, which
//! makes lexicographic key order equal numeric order.

use crate::error::{Error, Result};

/// Default ID column width.
pub const DEFAULT_INDEX_LENGTH: usize = 8;

/// Encodes `index` as zero-padded decimal of exactly `width` characters.
///
/// # Errors
///
/// Returns [`Error::IndexOverflow`] if the index does not fit the width.
pub(crate) fn encode_index(index: u64, width: usize) -> Result<Vec<u8>> {
    let id = format!("{index:0width$}");
    if id.len() > width {
        return Err(Error::IndexOverflow);
    }
    Ok(id.into_bytes())
}

/// Parses an encoded entry ID back into its index.
pub(crate) fn parse_index(id: &[u8]) -> Result<u64> {
    std::str::from_utf8(id)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::codec("invalid entry id"))
}

//! Error types for journal operations.

use std::io;
use thiserror::Error;

/// Result type for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Errors that can occur in journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A segment contains a malformed record.
    #[error("journal corrupted: {0}")]
    Corrupted(String),

    /// A log key does not contain exactly one `::` delimiter.
    #[error("invalid log key, expecting a single :: delimiter")]
    InvalidLogKey,
}

impl JournalError {
    /// Creates a corruption error.
    pub(crate) fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}

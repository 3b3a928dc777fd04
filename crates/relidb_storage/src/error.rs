//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A write targeted a bucket that does not exist.
    #[error("bucket not found: {path}")]
    BucketNotFound {
        /// Slash-joined path of the missing bucket.
        path: String,
    },

    /// Another process holds the backend lock.
    #[error("backend locked: another process has exclusive access")]
    Locked,

    /// The snapshot file is corrupted or has an incompatible format.
    #[error("snapshot corrupted: {0}")]
    Corrupted(String),
}

impl StorageError {
    /// Creates a bucket-not-found error from a bucket path.
    pub(crate) fn bucket_not_found(path: &[&[u8]]) -> Self {
        let parts: Vec<String> = path
            .iter()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect();
        Self::BucketNotFound {
            path: parts.join("/"),
        }
    }

    /// Creates a corruption error.
    pub(crate) fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}

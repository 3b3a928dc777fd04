//! Error types for the relidb engine.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in engine operations.
///
/// Sentinel variants are compared by shape (`matches!`); the engine
/// returns them verbatim and without side effects.
#[derive(Debug, Error)]
pub enum Error {
    /// The store has not been properly initialized.
    #[error("store has not been properly initialized")]
    NotInitialized,

    /// The named relationship was not declared at store creation.
    #[error("relationship was not found")]
    RelationshipNotFound,

    /// No lookup exists for the given lookup key.
    #[error("lookup was not found")]
    LookupNotFound,

    /// No entry exists for the given ID.
    #[error("entry was not found")]
    EntryNotFound,

    /// A cursor has reached the end of entries.
    #[error("end of entries")]
    EndOfEntries,

    /// The record's relationship count does not match the declared
    /// relationship names.
    #[error("invalid number of relationships")]
    InvalidNumberOfRelationships,

    /// A payload does not match the registered record type.
    ///
    /// Reserved for [`crate::Encoder`] implementations that tag and
    /// validate their payloads.
    #[error("invalid type encountered, please check encoders")]
    InvalidType,

    /// A container does not match the registered record type.
    ///
    /// Reserved for [`crate::Encoder`] implementations; the generic API
    /// cannot produce it.
    #[error("invalid entries, collection of entries expected")]
    InvalidEntries,

    /// A filter has an empty relationship name, or a filter set was
    /// required but empty.
    #[error("invalid relationship filters, cannot be empty")]
    EmptyFilters,

    /// The primary (first non-inverse) filter does not exist because every
    /// filter is an inverse comparison.
    #[error("invalid primary filter, cannot be an inverse comparison")]
    InversePrimaryFilter,

    /// The transaction's context was cancelled.
    #[error("context cancelled")]
    ContextCancelled,

    /// The transaction's context deadline or touch window elapsed.
    #[error("transaction timed out")]
    TransactionTimedOut,

    /// The store is already closed.
    #[error("store is closed")]
    Closed,

    /// A freshly allocated entry index does not fit the configured ID
    /// width.
    #[error("entry index exceeds the configured id width")]
    IndexOverflow,

    /// A write operation was attempted in a read-only transaction.
    #[error("write operation in a read-only transaction")]
    ReadOnlyTransaction,

    /// Store options failed validation.
    #[error("invalid options: {message}")]
    InvalidOptions {
        /// Description of the invalid option.
        message: String,
    },

    /// A batch was aborted by an infrastructure failure.
    #[error("batch aborted: {message}")]
    BatchAborted {
        /// Description of the failure.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] relidb_storage::StorageError),

    /// Change-log error.
    #[error("journal error: {0}")]
    Journal(#[from] relidb_journal::JournalError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoder error.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },
}

impl Error {
    /// Creates an invalid-options error.
    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: message.into(),
        }
    }

    /// Creates a batch-aborted error.
    pub(crate) fn batch_aborted(message: impl Into<String>) -> Self {
        Self::BatchAborted {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl std::fmt::Display) -> Self {
        Self::Codec {
            message: message.to_string(),
        }
    }
}

//! # relidb journal
//!
//! Append-only change-log sink for relidb.
//!
//! Every mutation the engine performs is mirrored here as a `Write` or
//! `Delete` record named by its log key (`bucket "::" key`). Records are
//! buffered per transaction and land on disk through a two-phase
//! discipline:
//!
//! 1. **stage** - the buffered records are appended and flushed, without a
//!    commit marker
//! 2. **commit** - after the data store commits, a `Commit` marker is
//!    appended and flushed
//!
//! A batch with no marker never happened: recovery truncates unmarked
//! tails at open, and readers skip them. Segments rotate at a size
//! threshold; sealed segments are handed to the [`Exporter`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod journal;
mod keys;
mod reader;
mod record;

pub use error::{JournalError, JournalResult};
pub use journal::{Exporter, Journal, JournalOptions, Staged, Writer};
pub use keys::{log_key, parse_log_key};
pub use reader::read_committed;
pub use record::{JournalRecord, JOURNAL_MAGIC, JOURNAL_VERSION};

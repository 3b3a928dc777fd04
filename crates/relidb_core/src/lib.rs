//! # relidb core
//!
//! An embedded, single-process, transactional document store with
//! secondary indexes ("relationships"), auxiliary lookup sets,
//! cursor-based iteration, batched write coalescing, and an append-only
//! change log mirroring every mutation.
//!
//! Records implement [`Entry`]: they carry an engine-assigned ID and
//! advertise one relationship slot per relationship name declared at
//! store creation. The engine maintains the inverse mapping from
//! (relationship, relationship ID) to the entries carrying that ID, and
//! keeps it consistent across insert, edit, and remove.
//!
//! ## Example
//!
//! ```rust,ignore
//! use relidb_core::{Context, Entry, Filter, Options, Relationships, Step, Store};
//!
//! let store: Store<Contact> =
//!     Store::open("contacts", "./data", &["users", "groups", "tags"], Options::default())?;
//!
//! let id = store.insert(&contact)?;
//!
//! // All entries in group_1 that are not tagged "archived":
//! store.for_each(
//!     "",
//!     &[
//!         Filter::new("groups", "group_1"),
//!         Filter::inverse("tags", "archived"),
//!     ],
//!     |id, contact| {
//!         println!("{id}: {contact:?}");
//!         Ok(Step::Continue)
//!     },
//! )?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batcher;
mod context;
mod cursor;
mod encoder;
mod entry;
mod error;
mod filter;
mod index;
mod options;
mod store;
mod transaction;

pub use context::{CancelHandle, Context};
pub use cursor::{Cursor, Step};
pub use encoder::{Encoder, JsonEncoder};
pub use entry::{Entry, Relationships};
pub use error::{Error, Result};
pub use filter::Filter;
pub use index::DEFAULT_INDEX_LENGTH;
pub use options::{FileInitializer, Initializer, MemoryInitializer, Options};
pub use store::Store;
pub use transaction::Transaction;

pub use relidb_journal::Exporter;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Store lifecycle and public operations.

use crate::batcher::Batcher;
use crate::context::Context;
use crate::cursor::{Cursor, Step};
use crate::encoder::Encoder;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::options::Options;
use crate::transaction::Transaction;
use parking_lot::Mutex;
use relidb_journal::{Journal, JournalOptions};
use relidb_storage::Backend;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Top-level bucket holding entry payloads.
pub(crate) const ENTRIES: &[u8] = b"entries";
/// Top-level bucket holding relationship index leaves.
pub(crate) const RELATIONSHIPS: &[u8] = b"relationships";
/// Top-level bucket holding user-maintained lookup sets.
pub(crate) const LOOKUPS: &[u8] = b"lookups";

/// State shared between the store handle, its transactions, and the batch
/// worker.
pub(crate) struct Shared<T: Entry> {
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) journal: Journal,
    pub(crate) relationships: Vec<String>,
    pub(crate) index_length: usize,
    pub(crate) encoder: Arc<dyn Encoder<T>>,
    /// Serializes the whole write path (backend transaction plus journal
    /// stage/commit) so journal batches never interleave.
    pub(crate) write_lock: Mutex<()>,
}

impl<T: Entry> Shared<T> {
    pub(crate) fn relationship_declared(&self, name: &str) -> bool {
        self.relationships.iter().any(|declared| declared == name)
    }

    /// Runs `f` in a write transaction under the two-phase data+journal
    /// commit discipline.
    pub(crate) fn run_write<F, R>(&self, ctx: &Context, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_, T>) -> Result<R>,
    {
        ctx.check()?;
        let _guard = self.write_lock.lock();
        let tx = self.backend.begin_write()?;
        let mut txn = Transaction::write(self, ctx.clone(), tx);

        match f(&mut txn) {
            Ok(out) => {
                let Some((tx, log)) = txn.finish_write() else {
                    return Err(Error::ReadOnlyTransaction);
                };
                let staged = self.journal.stage(log)?;
                match tx.commit() {
                    Ok(()) => {
                        staged.commit()?;
                        Ok(out)
                    }
                    Err(err) => {
                        if let Err(discard_err) = staged.discard() {
                            warn!(%discard_err, "failed to discard staged journal records");
                        }
                        Err(err.into())
                    }
                }
            }
            Err(err) => {
                if let Some((tx, _log)) = txn.finish_write() {
                    tx.rollback();
                }
                Err(err)
            }
        }
    }

    /// Runs `f` in a read transaction over a snapshot.
    pub(crate) fn run_read<F, R>(&self, ctx: &Context, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_, T>) -> Result<R>,
    {
        ctx.check()?;
        let tx = self.backend.begin_read()?;
        let mut txn = Transaction::read(self, ctx.clone(), tx);
        f(&mut txn)
    }
}

/// An embedded transactional document store with relationship indexes.
///
/// A store owns one key-value backend file (`<dir>/<name>.bdb`), the
/// change-log segments for `<name>` under `<dir>`, and a batch worker that
/// coalesces concurrent [`Store::batch`] calls into single backend
/// transactions.
///
/// # Example
///
/// ```rust,ignore
/// let store: Store<Contact> =
///     Store::open("contacts", "./data", &["users", "groups"], Options::default())?;
///
/// let id = store.insert(&contact)?;
/// let found = store.get(&id)?;
///
/// let mut related = Vec::new();
/// store.get_by_relationship("users", "user_1", &mut related)?;
///
/// store.close()?;
/// ```
pub struct Store<T: Entry> {
    shared: Arc<Shared<T>>,
    batcher: Mutex<Option<Batcher<T>>>,
    closed: AtomicBool,
}

impl<T: Entry> Store<T> {
    /// Opens the store `name` under `dir` with the declared relationship
    /// names.
    ///
    /// Creates the backend file, the top-level buckets, and one nested
    /// bucket per relationship, opens the change log, and starts the
    /// batch worker.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidNumberOfRelationships`] if the record type's
    /// relationship slots do not match `relationships`;
    /// [`Error::InvalidOptions`] for invalid options or an ID width that
    /// contradicts existing on-disk entries.
    pub fn open(
        name: &str,
        dir: impl AsRef<Path>,
        relationships: &[&str],
        opts: Options<T>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        opts.validate()?;

        let example = T::default();
        if example.relationships().len() != relationships.len() {
            return Err(Error::InvalidNumberOfRelationships);
        }

        fs::create_dir_all(dir)?;
        let backend = opts
            .initializer
            .open(&dir.join(format!("{name}.bdb")))?;

        {
            let mut tx = backend.begin_write()?;
            tx.create_bucket(&[ENTRIES])?;
            tx.create_bucket(&[RELATIONSHIPS])?;
            tx.create_bucket(&[LOOKUPS])?;
            for relationship in relationships {
                tx.create_bucket(&[RELATIONSHIPS, relationship.as_bytes()])?;
            }
            tx.commit()?;
        }

        // The ID width is fixed by whatever is already on disk.
        {
            let tx = backend.begin_read()?;
            if let Some((last_id, _)) = tx.last(&[ENTRIES])? {
                if last_id.len() != opts.index_length {
                    return Err(Error::invalid_options(
                        "index_length does not match existing entries",
                    ));
                }
            }
        }

        let journal = Journal::open(
            dir,
            name,
            JournalOptions {
                max_segment_size: opts.max_segment_size,
                exporter: opts.exporter.clone(),
            },
        )?;

        let shared = Arc::new(Shared {
            backend,
            journal,
            relationships: relationships.iter().map(ToString::to_string).collect(),
            index_length: opts.index_length,
            encoder: Arc::clone(&opts.encoder),
            write_lock: Mutex::new(()),
        });
        let batcher = Batcher::start(Arc::clone(&shared))?;

        debug!(store = name, "store opened");
        Ok(Self {
            shared,
            batcher: Mutex::new(Some(batcher)),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    /// Executes `f` in a read/write transaction under `ctx`.
    ///
    /// On `Ok` the backend transaction and the change-log batch commit as
    /// a unit; on `Err` both roll back.
    pub fn transaction<F, R>(&self, ctx: &Context, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_, T>) -> Result<R>,
    {
        self.ensure_open()?;
        self.shared.run_write(ctx, f)
    }

    /// Executes `f` in a read-only transaction under `ctx`.
    pub fn read_transaction<F, R>(&self, ctx: &Context, f: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_, T>) -> Result<R>,
    {
        self.ensure_open()?;
        self.shared.run_read(ctx, f)
    }

    /// Executes `f` as part of a coalesced write batch.
    ///
    /// Blocks until the batch containing `f` commits (or `f`'s failure
    /// rolls it back). Writes from one batch become visible atomically.
    pub fn batch<F>(&self, ctx: &Context, f: F) -> Result<()>
    where
        F: FnMut(&mut Transaction<'_, T>) -> Result<()> + Send + 'static,
    {
        self.ensure_open()?;
        let reply = {
            let guard = self.batcher.lock();
            let batcher = guard.as_ref().ok_or(Error::Closed)?;
            batcher.append(ctx.clone(), Box::new(f))?
        };
        reply.recv().map_err(|_| Error::Closed)?
    }

    /// Inserts a new entry, returning its assigned ID.
    pub fn insert(&self, val: &T) -> Result<String> {
        self.transaction(&Context::background(), |txn| txn.insert(val))
    }

    /// Reports whether an entry exists for `id`.
    pub fn exists(&self, id: &str) -> Result<bool> {
        self.read_transaction(&Context::background(), |txn| txn.exists(id))
    }

    /// Gets the entry stored under `id`.
    pub fn get(&self, id: &str) -> Result<T> {
        self.read_transaction(&Context::background(), |txn| txn.get(id))
    }

    /// Replaces the entry under `id` with `val`.
    pub fn edit(&self, id: &str, val: &T) -> Result<()> {
        self.transaction(&Context::background(), |txn| txn.edit(id, val))
    }

    /// Removes the entry under `id`.
    pub fn remove(&self, id: &str) -> Result<()> {
        self.transaction(&Context::background(), |txn| txn.remove(id))
    }

    /// Appends every entry related to `relationship_id` to `out`.
    pub fn get_by_relationship(
        &self,
        relationship: &str,
        relationship_id: &str,
        out: &mut Vec<T>,
    ) -> Result<()> {
        self.read_transaction(&Context::background(), |txn| {
            txn.get_by_relationship(relationship, relationship_id, out)
        })
    }

    /// Gets the first entry related to `relationship_id`.
    pub fn get_first_by_relationship(
        &self,
        relationship: &str,
        relationship_id: &str,
    ) -> Result<T> {
        self.read_transaction(&Context::background(), |txn| {
            txn.get_first_by_relationship(relationship, relationship_id)
        })
    }

    /// Gets the last entry related to `relationship_id`.
    pub fn get_last_by_relationship(
        &self,
        relationship: &str,
        relationship_id: &str,
    ) -> Result<T> {
        self.read_transaction(&Context::background(), |txn| {
            txn.get_last_by_relationship(relationship, relationship_id)
        })
    }

    /// Iterates entries from `seek_id` in ascending ID order.
    pub fn for_each<F>(&self, seek_id: &str, filters: &[Filter], mut f: F) -> Result<()>
    where
        F: FnMut(&str, T) -> Result<Step>,
    {
        self.read_transaction(&Context::background(), |txn| {
            txn.for_each(seek_id, filters, &mut f)
        })
    }

    /// Iterates entry IDs from `seek_id` in ascending order.
    pub fn for_each_id<F>(&self, seek_id: &str, filters: &[Filter], mut f: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<Step>,
    {
        self.read_transaction(&Context::background(), |txn| {
            txn.for_each_id(seek_id, filters, &mut f)
        })
    }

    /// Collects up to `limit` filtered entries starting at `seek_id`.
    pub fn get_filtered(
        &self,
        seek_id: &str,
        limit: usize,
        filters: &[Filter],
    ) -> Result<(Vec<T>, Option<String>)> {
        self.read_transaction(&Context::background(), |txn| {
            txn.get_filtered(seek_id, limit, filters)
        })
    }

    /// Runs `f` with a cursor over the entries matching `filters`.
    pub fn cursor<F>(&self, filters: &[Filter], f: F) -> Result<()>
    where
        F: FnOnce(&mut Cursor<'_, '_, T>) -> Result<()>,
    {
        self.read_transaction(&Context::background(), |txn| {
            let mut cursor = txn.cursor(filters)?;
            f(&mut cursor)
        })
    }

    /// Runs `f` with a cursor over the entries related to
    /// `relationship_id` under `relationship`.
    pub fn cursor_relationship<F>(
        &self,
        relationship: &str,
        relationship_id: &str,
        f: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Cursor<'_, '_, T>) -> Result<()>,
    {
        self.read_transaction(&Context::background(), |txn| {
            let mut cursor = txn.cursor_relationship(relationship, relationship_id)?;
            f(&mut cursor)
        })
    }

    /// Adds `key` to the lookup set under `lookup` / `lookup_id`.
    pub fn set_lookup(&self, lookup: &str, lookup_id: &str, key: &str) -> Result<()> {
        self.transaction(&Context::background(), |txn| {
            txn.set_lookup(lookup, lookup_id, key)
        })
    }

    /// Returns the keys in the lookup set under `lookup` / `lookup_id`.
    pub fn get_lookup(&self, lookup: &str, lookup_id: &str) -> Result<Vec<String>> {
        self.read_transaction(&Context::background(), |txn| {
            txn.get_lookup(lookup, lookup_id)
        })
    }

    /// Removes `key` from the lookup set under `lookup` / `lookup_id`.
    pub fn remove_lookup(&self, lookup: &str, lookup_id: &str, key: &str) -> Result<()> {
        self.transaction(&Context::background(), |txn| {
            txn.remove_lookup(lookup, lookup_id, key)
        })
    }

    /// Closes the store: stops the batch worker and flushes the backend
    /// and the change log.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] if the store was already closed.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        if let Some(batcher) = self.batcher.lock().take() {
            batcher.shutdown();
        }
        self.shared.backend.flush()?;
        self.shared.journal.close()?;
        debug!("store closed");
        Ok(())
    }
}

impl<T: Entry> Drop for Store<T> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

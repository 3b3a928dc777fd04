//! Storage backend trait definitions.

use crate::error::StorageResult;

/// An owned key/value pair returned by navigation calls.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// A bucketed key-value backend for relidb.
///
/// Backends provide ordered maps ("buckets") that nest arbitrarily and are
/// addressed by path. The engine owns all record formats - backends store
/// opaque bytes.
///
/// # Invariants
///
/// - `begin_read` returns a consistent snapshot of the last committed state
/// - `begin_write` blocks until the single writer slot is free; the write
///   transaction observes its own uncommitted writes
/// - Keys within a bucket are ordered by unsigned byte comparison
/// - A committed write transaction is visible, in full, to every snapshot
///   taken afterwards; an uncommitted one is visible to no snapshot
///
/// # Implementors
///
/// - [`super::MemoryBackend`] - For testing and ephemeral stores
/// - [`super::FileBackend`] - For persistent storage
pub trait Backend: Send + Sync {
    /// Begins a read transaction over a snapshot of committed state.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot produce a snapshot.
    fn begin_read(&self) -> StorageResult<Box<dyn ReadTx>>;

    /// Begins a write transaction, blocking until the writer slot is free.
    ///
    /// Dropping the returned transaction without calling
    /// [`WriteTx::commit`] rolls it back.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a write transaction.
    fn begin_write(&self) -> StorageResult<Box<dyn WriteTx>>;

    /// Flushes any buffered state to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()>;
}

/// Read operations over a consistent snapshot.
///
/// All navigation calls treat a missing bucket as empty: they return
/// `Ok(None)` (or an empty collection) rather than an error. This lets the
/// engine iterate secondary-index buckets that may not have been created
/// yet without a separate existence probe.
pub trait ReadTx: Send {
    /// Returns the value stored under `key` in the bucket at `bucket`.
    fn get(&self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Returns the first (smallest-key) pair in the bucket.
    fn first(&self, bucket: &[&[u8]]) -> StorageResult<Option<KeyValue>>;

    /// Returns the last (largest-key) pair in the bucket.
    fn last(&self, bucket: &[&[u8]]) -> StorageResult<Option<KeyValue>>;

    /// Returns the first pair whose key is greater than or equal to `key`.
    fn seek(&self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<Option<KeyValue>>;

    /// Returns the first pair whose key is strictly greater than `key`.
    fn next_after(&self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<Option<KeyValue>>;

    /// Returns the last pair whose key is strictly less than `key`.
    fn prev_before(&self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<Option<KeyValue>>;

    /// Reports whether the bucket at `bucket` exists.
    fn bucket_exists(&self, bucket: &[&[u8]]) -> StorageResult<bool>;

    /// Returns the names of the child buckets nested under `bucket`.
    fn child_buckets(&self, bucket: &[&[u8]]) -> StorageResult<Vec<Vec<u8>>>;

    /// Returns the number of keys stored directly in the bucket.
    fn key_count(&self, bucket: &[&[u8]]) -> StorageResult<usize>;
}

/// Write operations on top of [`ReadTx`].
///
/// A write transaction mutates a private copy of the tree; nothing is
/// visible to readers until [`WriteTx::commit`] returns.
pub trait WriteTx: ReadTx {
    /// Creates the bucket at `bucket`, including any missing parents.
    ///
    /// Creating a bucket that already exists is a no-op.
    fn create_bucket(&mut self, bucket: &[&[u8]]) -> StorageResult<()>;

    /// Stores `value` under `key` in the bucket at `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::BucketNotFound`] if the bucket does
    /// not exist.
    fn put(&mut self, bucket: &[&[u8]], key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Removes `key` from the bucket at `bucket`.
    ///
    /// Deleting a missing key (or a key in a missing bucket) is a no-op.
    fn delete(&mut self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<()>;

    /// Removes the bucket at `bucket` and everything nested under it.
    ///
    /// Deleting a missing bucket is a no-op.
    fn delete_bucket(&mut self, bucket: &[&[u8]]) -> StorageResult<()>;

    /// Returns this transaction as a read view.
    ///
    /// Reads through the returned view observe the transaction's own
    /// uncommitted writes.
    fn as_read(&self) -> &dyn ReadTx;

    /// Commits the transaction, making its writes visible atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to persist the new state; in
    /// that case no writes become visible.
    fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discards the transaction's writes.
    fn rollback(self: Box<Self>);
}

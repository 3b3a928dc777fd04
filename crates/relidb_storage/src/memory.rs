//! In-memory reference backend.

use crate::backend::{Backend, KeyValue, ReadTx, WriteTx};
use crate::error::{StorageError, StorageResult};
use crate::tree::Node;
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;

/// Persistence hook invoked with the new root before a commit is published.
pub(crate) type PersistFn = dyn Fn(&Node) -> StorageResult<()> + Send + Sync;

/// Single writer slot. Writers block here until the previous write
/// transaction commits, rolls back, or is dropped.
#[derive(Default)]
struct WriteSlot {
    busy: Mutex<bool>,
    cv: Condvar,
}

impl WriteSlot {
    fn acquire(&self) {
        let mut busy = self.busy.lock();
        while *busy {
            self.cv.wait(&mut busy);
        }
        *busy = true;
    }

    fn release(&self) {
        *self.busy.lock() = false;
        self.cv.notify_one();
    }
}

/// Shared tree state behind both reference backends.
///
/// Readers clone the current root `Arc` (a zero-copy snapshot). The writer
/// copies the tree, mutates its private copy, and swaps the root on commit.
/// Copy-on-write at tree granularity keeps the contract honest; engines
/// with page-level sharing satisfy the same trait.
pub(crate) struct TreeStore {
    root: RwLock<Arc<Node>>,
    slot: WriteSlot,
    persist: Option<Box<PersistFn>>,
}

impl TreeStore {
    pub(crate) fn new(initial: Node, persist: Option<Box<PersistFn>>) -> Arc<Self> {
        Arc::new(Self {
            root: RwLock::new(Arc::new(initial)),
            slot: WriteSlot::default(),
            persist,
        })
    }

    pub(crate) fn begin_read(&self) -> SnapshotTx {
        SnapshotTx {
            root: Arc::clone(&self.root.read()),
        }
    }

    pub(crate) fn begin_write(store: &Arc<Self>) -> WriteBatchTx {
        store.slot.acquire();
        let root = (**store.root.read()).clone();
        WriteBatchTx {
            store: Arc::clone(store),
            root,
        }
    }
}

/// A read transaction over an immutable snapshot.
pub(crate) struct SnapshotTx {
    root: Arc<Node>,
}

/// A write transaction over a private copy of the tree.
pub(crate) struct WriteBatchTx {
    store: Arc<TreeStore>,
    root: Node,
}

impl Drop for WriteBatchTx {
    fn drop(&mut self) {
        self.store.slot.release();
    }
}

fn read_get(root: &Node, bucket: &[&[u8]], key: &[u8]) -> Option<Vec<u8>> {
    root.descend(bucket)?.values.get(key).cloned()
}

impl ReadTx for SnapshotTx {
    fn get(&self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(read_get(&self.root, bucket, key))
    }

    fn first(&self, bucket: &[&[u8]]) -> StorageResult<Option<KeyValue>> {
        Ok(self.root.descend(bucket).and_then(Node::first_pair))
    }

    fn last(&self, bucket: &[&[u8]]) -> StorageResult<Option<KeyValue>> {
        Ok(self.root.descend(bucket).and_then(Node::last_pair))
    }

    fn seek(&self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<Option<KeyValue>> {
        Ok(self.root.descend(bucket).and_then(|b| b.at_or_after(key)))
    }

    fn next_after(&self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<Option<KeyValue>> {
        Ok(self.root.descend(bucket).and_then(|b| b.after(key)))
    }

    fn prev_before(&self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<Option<KeyValue>> {
        Ok(self.root.descend(bucket).and_then(|b| b.before(key)))
    }

    fn bucket_exists(&self, bucket: &[&[u8]]) -> StorageResult<bool> {
        Ok(self.root.descend(bucket).is_some())
    }

    fn child_buckets(&self, bucket: &[&[u8]]) -> StorageResult<Vec<Vec<u8>>> {
        Ok(self
            .root
            .descend(bucket)
            .map(|b| b.buckets.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn key_count(&self, bucket: &[&[u8]]) -> StorageResult<usize> {
        Ok(self.root.descend(bucket).map_or(0, |b| b.values.len()))
    }
}

impl ReadTx for WriteBatchTx {
    fn get(&self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(read_get(&self.root, bucket, key))
    }

    fn first(&self, bucket: &[&[u8]]) -> StorageResult<Option<KeyValue>> {
        Ok(self.root.descend(bucket).and_then(Node::first_pair))
    }

    fn last(&self, bucket: &[&[u8]]) -> StorageResult<Option<KeyValue>> {
        Ok(self.root.descend(bucket).and_then(Node::last_pair))
    }

    fn seek(&self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<Option<KeyValue>> {
        Ok(self.root.descend(bucket).and_then(|b| b.at_or_after(key)))
    }

    fn next_after(&self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<Option<KeyValue>> {
        Ok(self.root.descend(bucket).and_then(|b| b.after(key)))
    }

    fn prev_before(&self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<Option<KeyValue>> {
        Ok(self.root.descend(bucket).and_then(|b| b.before(key)))
    }

    fn bucket_exists(&self, bucket: &[&[u8]]) -> StorageResult<bool> {
        Ok(self.root.descend(bucket).is_some())
    }

    fn child_buckets(&self, bucket: &[&[u8]]) -> StorageResult<Vec<Vec<u8>>> {
        Ok(self
            .root
            .descend(bucket)
            .map(|b| b.buckets.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn key_count(&self, bucket: &[&[u8]]) -> StorageResult<usize> {
        Ok(self.root.descend(bucket).map_or(0, |b| b.values.len()))
    }
}

impl WriteTx for WriteBatchTx {
    fn create_bucket(&mut self, bucket: &[&[u8]]) -> StorageResult<()> {
        self.root.ensure(bucket);
        Ok(())
    }

    fn put(&mut self, bucket: &[&[u8]], key: &[u8], value: &[u8]) -> StorageResult<()> {
        let node = self
            .root
            .descend_mut(bucket)
            .ok_or_else(|| StorageError::bucket_not_found(bucket))?;
        node.values.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, bucket: &[&[u8]], key: &[u8]) -> StorageResult<()> {
        if let Some(node) = self.root.descend_mut(bucket) {
            node.values.remove(key);
        }
        Ok(())
    }

    fn delete_bucket(&mut self, bucket: &[&[u8]]) -> StorageResult<()> {
        self.root.remove_bucket(bucket);
        Ok(())
    }

    fn as_read(&self) -> &dyn ReadTx {
        self
    }

    fn commit(mut self: Box<Self>) -> StorageResult<()> {
        let root = std::mem::take(&mut self.root);
        if let Some(persist) = &self.store.persist {
            persist(&root)?;
        }
        *self.store.root.write() = Arc::new(root);
        Ok(())
    }

    fn rollback(self: Box<Self>) {}
}

/// An in-memory backend.
///
/// Suitable for unit tests and ephemeral stores. Data is lost when the
/// backend is dropped.
pub struct MemoryBackend {
    store: Arc<TreeStore>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: TreeStore::new(Node::default(), None),
        }
    }
}

impl Backend for MemoryBackend {
    fn begin_read(&self) -> StorageResult<Box<dyn ReadTx>> {
        Ok(Box::new(self.store.begin_read()))
    }

    fn begin_write(&self) -> StorageResult<Box<dyn WriteTx>> {
        Ok(Box::new(TreeStore::begin_write(&self.store)))
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const B: &[&[u8]] = &[b"bucket"];

    #[test]
    fn write_then_read() {
        let backend = MemoryBackend::new();

        let mut tx = backend.begin_write().unwrap();
        tx.create_bucket(B).unwrap();
        tx.put(B, b"k", b"v").unwrap();
        tx.commit().unwrap();

        let tx = backend.begin_read().unwrap();
        assert_eq!(tx.get(B, b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn writer_sees_own_writes() {
        let backend = MemoryBackend::new();

        let mut tx = backend.begin_write().unwrap();
        tx.create_bucket(B).unwrap();
        tx.put(B, b"k", b"v").unwrap();
        assert_eq!(tx.get(B, b"k").unwrap(), Some(b"v".to_vec()));
        tx.rollback();
    }

    #[test]
    fn rollback_discards_writes() {
        let backend = MemoryBackend::new();

        let mut tx = backend.begin_write().unwrap();
        tx.create_bucket(B).unwrap();
        tx.put(B, b"k", b"v").unwrap();
        tx.rollback();

        let tx = backend.begin_read().unwrap();
        assert_eq!(tx.get(B, b"k").unwrap(), None);
        assert!(!tx.bucket_exists(B).unwrap());
    }

    #[test]
    fn snapshot_does_not_see_later_commits() {
        let backend = MemoryBackend::new();

        let mut tx = backend.begin_write().unwrap();
        tx.create_bucket(B).unwrap();
        tx.put(B, b"k", b"old").unwrap();
        tx.commit().unwrap();

        let snapshot = backend.begin_read().unwrap();

        let mut tx = backend.begin_write().unwrap();
        tx.put(B, b"k", b"new").unwrap();
        tx.commit().unwrap();

        assert_eq!(snapshot.get(B, b"k").unwrap(), Some(b"old".to_vec()));
        let fresh = backend.begin_read().unwrap();
        assert_eq!(fresh.get(B, b"k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn put_requires_bucket() {
        let backend = MemoryBackend::new();
        let mut tx = backend.begin_write().unwrap();
        let err = tx.put(B, b"k", b"v").unwrap_err();
        assert!(matches!(err, StorageError::BucketNotFound { .. }));
        tx.rollback();
    }

    #[test]
    fn dropping_write_tx_releases_writer_slot() {
        let backend = MemoryBackend::new();
        {
            let mut tx = backend.begin_write().unwrap();
            tx.create_bucket(B).unwrap();
            // dropped without commit
        }
        let mut tx = backend.begin_write().unwrap();
        tx.create_bucket(B).unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn navigation_over_missing_bucket_is_empty() {
        let backend = MemoryBackend::new();
        let tx = backend.begin_read().unwrap();
        assert!(tx.first(B).unwrap().is_none());
        assert!(tx.seek(B, b"x").unwrap().is_none());
        assert_eq!(tx.key_count(B).unwrap(), 0);
        assert!(tx.child_buckets(B).unwrap().is_empty());
    }
}

//! Snapshot-persistent file backend.

use crate::backend::{Backend, ReadTx, WriteTx};
use crate::error::{StorageError, StorageResult};
use crate::memory::TreeStore;
use crate::tree::Node;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Magic bytes identifying a snapshot file.
const SNAPSHOT_MAGIC: [u8; 4] = *b"RLKV";

/// Current snapshot format version.
const SNAPSHOT_VERSION: u16 = 1;

/// A file-backed backend.
///
/// The whole tree is serialized to disk on every commit: the new snapshot
/// is written to a temporary file, synced, and renamed over the previous
/// one, so a crash mid-commit leaves the prior snapshot intact. An `fs2`
/// advisory lock on a sibling `.lock` file guards against a second process
/// opening the same backend.
pub struct FileBackend {
    store: Arc<TreeStore>,
    /// Lock file handle, held for the backend's lifetime.
    _lock: File,
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend").finish_non_exhaustive()
    }
}

impl FileBackend {
    /// Opens or creates the backend at `path`, creating parent directories
    /// as needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the lock,
    /// [`StorageError::Corrupted`] if an existing snapshot fails to parse,
    /// or an I/O error.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = lock_path_for(path);
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        if lock.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let initial = if path.exists() {
            decode_snapshot(&fs::read(path)?)?
        } else {
            Node::default()
        };

        let target = path.to_path_buf();
        let persist: Box<crate::memory::PersistFn> =
            Box::new(move |node: &Node| save_snapshot(&target, node));

        Ok(Self {
            store: TreeStore::new(initial, Some(persist)),
            _lock: lock,
        })
    }
}

impl Backend for FileBackend {
    fn begin_read(&self) -> StorageResult<Box<dyn ReadTx>> {
        Ok(Box::new(self.store.begin_read()))
    }

    fn begin_write(&self) -> StorageResult<Box<dyn WriteTx>> {
        Ok(Box::new(TreeStore::begin_write(&self.store)))
    }

    fn flush(&self) -> StorageResult<()> {
        // Every commit rewrites and syncs the snapshot.
        Ok(())
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}

fn save_snapshot(path: &Path, node: &Node) -> StorageResult<()> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&SNAPSHOT_MAGIC);
    buf.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    encode_node(node, &mut buf);

    let mut tmp_os = path.as_os_str().to_owned();
    tmp_os.push(".tmp");
    let tmp = PathBuf::from(tmp_os);

    let mut file = File::create(&tmp)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn encode_node(node: &Node, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(node.values.len() as u32).to_le_bytes());
    for (key, value) in &node.values {
        encode_bytes(key, buf);
        encode_bytes(value, buf);
    }
    buf.extend_from_slice(&(node.buckets.len() as u32).to_le_bytes());
    for (name, child) in &node.buckets {
        encode_bytes(name, buf);
        encode_node(child, buf);
    }
}

fn encode_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn decode_snapshot(buf: &[u8]) -> StorageResult<Node> {
    let mut reader = SnapshotReader { buf, pos: 0 };
    let magic = reader.take(4)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(StorageError::corrupted("bad snapshot magic"));
    }
    let version_bytes = reader.take(2)?;
    let version = u16::from_le_bytes([version_bytes[0], version_bytes[1]]);
    if version != SNAPSHOT_VERSION {
        return Err(StorageError::corrupted(format!(
            "unsupported snapshot version {version}"
        )));
    }
    let node = reader.read_node()?;
    if reader.pos != buf.len() {
        return Err(StorageError::corrupted("trailing bytes after snapshot"));
    }
    Ok(node)
}

struct SnapshotReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl SnapshotReader<'_> {
    fn take(&mut self, len: usize) -> StorageResult<&[u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| StorageError::corrupted("snapshot truncated"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> StorageResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_bytes(&mut self) -> StorageResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn read_node(&mut self) -> StorageResult<Node> {
        let mut node = Node::default();
        let value_count = self.read_u32()?;
        for _ in 0..value_count {
            let key = self.read_bytes()?;
            let value = self.read_bytes()?;
            node.values.insert(key, value);
        }
        let bucket_count = self.read_u32()?;
        for _ in 0..bucket_count {
            let name = self.read_bytes()?;
            let child = self.read_node()?;
            node.buckets.insert(name, child);
        }
        Ok(node)
    }
}

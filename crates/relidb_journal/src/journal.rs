//! Journal handle, per-transaction writer, and staged commits.

use crate::error::JournalResult;
use crate::reader::scan_segment;
use crate::record::JournalRecord;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Segment file extension.
const SEGMENT_EXT: &str = "jrnl";

/// Consumer for sealed journal segments.
///
/// Invoked after a segment rotates out of the active position. The
/// exporter owns the sealed file from that point (upload, archive, ship to
/// a replica); the journal never reopens it for writing.
pub trait Exporter: Send + Sync {
    /// Exports the sealed segment at `segment`.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment cannot be consumed; the error
    /// propagates to the commit that triggered the rotation.
    fn export(&self, name: &str, segment: &Path) -> JournalResult<()>;
}

/// Journal configuration.
#[derive(Clone)]
pub struct JournalOptions {
    /// Size threshold after which the active segment is sealed.
    pub max_segment_size: u64,
    /// Consumer for sealed segments.
    pub exporter: Option<Arc<dyn Exporter>>,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            max_segment_size: 8 * 1024 * 1024, // 8 MiB
            exporter: None,
        }
    }
}

/// Buffers one transaction's change-log records in program order.
///
/// Nothing touches disk until the writer is staged through
/// [`Journal::stage`].
#[derive(Debug, Default)]
pub struct Writer {
    records: Vec<JournalRecord>,
}

impl Writer {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a write of `payload` under the full log key `key`.
    pub fn write(&mut self, key: Vec<u8>, payload: Vec<u8>) {
        self.records.push(JournalRecord::Write { key, payload });
    }

    /// Records a deletion of the full log key `key`.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.records.push(JournalRecord::Delete { key });
    }

    /// Returns the number of buffered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

struct ActiveSegment {
    file: File,
    path: PathBuf,
    seq: u32,
    len: u64,
}

/// The append-only change-log sink for one store.
///
/// Records are staged (appended + flushed, no marker) and become durable
/// facts only when the following commit marker lands. Recovery at open
/// truncates any unmarked tail, so a crash between stage and commit leaves
/// no trace.
pub struct Journal {
    name: String,
    dir: PathBuf,
    opts: JournalOptions,
    inner: Mutex<ActiveSegment>,
}

impl Journal {
    /// Opens the journal for `name` under `dir`, recovering the active
    /// segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or segment files cannot be
    /// accessed.
    pub fn open(dir: &Path, name: &str, opts: JournalOptions) -> JournalResult<Self> {
        fs::create_dir_all(dir)?;

        let seq = Self::segment_paths(dir, name)?
            .last()
            .and_then(|p| parse_segment_seq(p, name))
            .unwrap_or(1);
        let path = segment_path(dir, name, seq);

        let committed_len = if path.exists() {
            scan_segment(&fs::read(&path)?).committed_len
        } else {
            0
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let disk_len = file.metadata()?.len();
        if disk_len > committed_len {
            warn!(
                segment = %path.display(),
                dropped = disk_len - committed_len,
                "truncating unmarked journal tail"
            );
            file.set_len(committed_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            opts,
            inner: Mutex::new(ActiveSegment {
                file,
                path,
                seq,
                len: committed_len,
            }),
        })
    }

    /// Returns a fresh per-transaction writer.
    #[must_use]
    pub fn begin(&self) -> Writer {
        Writer::new()
    }

    /// Appends the writer's records to the active segment and flushes
    /// them, without a commit marker.
    ///
    /// The returned [`Staged`] must be resolved: [`Staged::commit`] after
    /// the data store commits, [`Staged::discard`] otherwise. Dropping it
    /// discards best-effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be encoded or written.
    pub fn stage(&self, writer: Writer) -> JournalResult<Staged<'_>> {
        let count = writer.records.len() as u32;
        if count == 0 {
            return Ok(Staged {
                journal: self,
                base_len: 0,
                count: 0,
                resolved: true,
            });
        }

        let mut buf = Vec::new();
        for record in &writer.records {
            buf.extend_from_slice(&record.encode_frame()?);
        }

        let mut inner = self.inner.lock();
        let base_len = inner.len;
        inner.file.seek(SeekFrom::Start(base_len))?;
        inner.file.write_all(&buf)?;
        inner.file.sync_data()?;
        inner.len = base_len + buf.len() as u64;

        Ok(Staged {
            journal: self,
            base_len,
            count,
            resolved: false,
        })
    }

    /// Syncs the active segment to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn flush(&self) -> JournalResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }

    /// Flushes and releases the journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> JournalResult<()> {
        self.flush()
    }

    /// Returns the path of the active segment.
    #[must_use]
    pub fn active_segment(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    /// Lists the segment files for `name` under `dir`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn segment_paths(dir: &Path, name: &str) -> JournalResult<Vec<PathBuf>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut found: Vec<(u32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if let Some(seq) = parse_segment_seq(&path, name) {
                found.push((seq, path));
            }
        }
        found.sort_by_key(|(seq, _)| *seq);
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    fn rotate(&self, inner: &mut ActiveSegment) -> JournalResult<()> {
        inner.file.sync_all()?;
        let sealed = inner.path.clone();

        let seq = inner.seq + 1;
        let path = segment_path(&self.dir, &self.name, seq);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        debug!(sealed = %sealed.display(), next = %path.display(), "rotating journal segment");
        *inner = ActiveSegment {
            file,
            path,
            seq,
            len: 0,
        };

        if let Some(exporter) = &self.opts.exporter {
            exporter.export(&self.name, &sealed)?;
        }
        Ok(())
    }

    fn truncate_to(&self, base_len: u64) -> JournalResult<()> {
        let mut inner = self.inner.lock();
        inner.file.set_len(base_len)?;
        inner.file.sync_data()?;
        inner.len = base_len;
        Ok(())
    }
}

/// A staged batch awaiting its commit marker.
pub struct Staged<'a> {
    journal: &'a Journal,
    base_len: u64,
    count: u32,
    resolved: bool,
}

impl Staged<'_> {
    /// Appends the commit marker, sealing the staged records.
    ///
    /// Rotates the segment afterwards if it crossed the size threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written; the staged
    /// records then remain an unmarked tail and are dropped at next open.
    pub fn commit(mut self) -> JournalResult<()> {
        self.resolved = true;
        if self.count == 0 {
            return Ok(());
        }

        let frame = JournalRecord::Commit {
            records: self.count,
        }
        .encode_frame()?;

        let mut inner = self.journal.inner.lock();
        let at = inner.len;
        inner.file.seek(SeekFrom::Start(at))?;
        inner.file.write_all(&frame)?;
        inner.file.sync_data()?;
        inner.len = at + frame.len() as u64;

        if inner.len >= self.journal.opts.max_segment_size {
            self.journal.rotate(&mut inner)?;
        }
        Ok(())
    }

    /// Truncates the staged records away.
    ///
    /// # Errors
    ///
    /// Returns an error if the truncation fails; recovery at next open
    /// drops the unmarked tail regardless.
    pub fn discard(mut self) -> JournalResult<()> {
        self.resolved = true;
        if self.count == 0 {
            return Ok(());
        }
        self.journal.truncate_to(self.base_len)
    }
}

impl Drop for Staged<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.count > 0 {
            if let Err(err) = self.journal.truncate_to(self.base_len) {
                warn!(%err, "failed to discard staged journal records");
            }
        }
    }
}

fn segment_path(dir: &Path, name: &str, seq: u32) -> PathBuf {
    dir.join(format!("{name}.{seq:06}.{SEGMENT_EXT}"))
}

fn parse_segment_seq(path: &Path, name: &str) -> Option<u32> {
    let file_name = path.file_name()?.to_str()?;
    let middle = file_name
        .strip_prefix(name)?
        .strip_prefix('.')?
        .strip_suffix(SEGMENT_EXT)?
        .strip_suffix('.')?;
    if middle.len() != 6 {
        return None;
    }
    middle.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::log_key;
    use crate::reader::read_committed;
    use tempfile::tempdir;

    fn staged_records(journal: &Journal, n: u8) -> Staged<'_> {
        let mut writer = journal.begin();
        for i in 0..n {
            writer.write(log_key(b"entries", format!("0000000{i}").as_bytes()), vec![i]);
        }
        journal.stage(writer).unwrap()
    }

    #[test]
    fn commit_makes_records_readable() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path(), "test", JournalOptions::default()).unwrap();

        staged_records(&journal, 2).commit().unwrap();

        let records = read_committed(&journal.active_segment()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn discard_leaves_nothing() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path(), "test", JournalOptions::default()).unwrap();

        staged_records(&journal, 2).discard().unwrap();
        staged_records(&journal, 1).commit().unwrap();

        let records = read_committed(&journal.active_segment()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn drop_discards_staged_records() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path(), "test", JournalOptions::default()).unwrap();

        drop(staged_records(&journal, 3));

        let records = read_committed(&journal.active_segment()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn empty_writer_stages_nothing() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path(), "test", JournalOptions::default()).unwrap();

        journal.stage(journal.begin()).unwrap().commit().unwrap();

        assert!(read_committed(&journal.active_segment()).unwrap().is_empty());
        assert_eq!(fs::metadata(journal.active_segment()).unwrap().len(), 0);
    }

    #[test]
    fn reopen_truncates_unmarked_tail() {
        let dir = tempdir().unwrap();
        let path;
        {
            let journal = Journal::open(dir.path(), "test", JournalOptions::default()).unwrap();
            staged_records(&journal, 1).commit().unwrap();
            // Simulate a crash between stage and commit.
            std::mem::forget(staged_records(&journal, 2));
            path = journal.active_segment();
        }

        let journal = Journal::open(dir.path(), "test", JournalOptions::default()).unwrap();
        assert_eq!(read_committed(&path).unwrap().len(), 1);
        staged_records(&journal, 1).commit().unwrap();
        assert_eq!(read_committed(&path).unwrap().len(), 2);
    }

    struct CollectingExporter(Mutex<Vec<PathBuf>>);

    impl Exporter for CollectingExporter {
        fn export(&self, _name: &str, segment: &Path) -> JournalResult<()> {
            self.0.lock().push(segment.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn rotation_hands_sealed_segment_to_exporter() {
        let dir = tempdir().unwrap();
        let exporter = Arc::new(CollectingExporter(Mutex::new(Vec::new())));
        let opts = JournalOptions {
            max_segment_size: 1, // rotate after every commit
            exporter: Some(Arc::clone(&exporter) as Arc<dyn Exporter>),
        };
        let journal = Journal::open(dir.path(), "test", opts).unwrap();

        let first = journal.active_segment();
        staged_records(&journal, 1).commit().unwrap();

        let sealed = exporter.0.lock().clone();
        assert_eq!(sealed, vec![first.clone()]);
        assert_ne!(journal.active_segment(), first);
        assert_eq!(Journal::segment_paths(dir.path(), "test").unwrap().len(), 2);
    }

    #[test]
    fn reopen_continues_highest_segment() {
        let dir = tempdir().unwrap();
        {
            let opts = JournalOptions {
                max_segment_size: 1,
                exporter: None,
            };
            let journal = Journal::open(dir.path(), "test", opts).unwrap();
            staged_records(&journal, 1).commit().unwrap();
        }

        let journal = Journal::open(dir.path(), "test", JournalOptions::default()).unwrap();
        assert!(journal
            .active_segment()
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .contains("000002"));
    }
}

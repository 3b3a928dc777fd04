//! Store configuration.

use crate::encoder::{Encoder, JsonEncoder};
use crate::error::{Error, Result};
use crate::index::DEFAULT_INDEX_LENGTH;
use relidb_journal::{Exporter, JournalOptions};
use relidb_storage::{Backend, FileBackend, MemoryBackend, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Opens the key-value backend for a store file.
pub trait Initializer: Send + Sync {
    /// Opens the backend at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened.
    fn open(&self, path: &Path) -> StorageResult<Box<dyn Backend>>;
}

/// The default initializer: a [`FileBackend`] at the store file.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileInitializer;

impl Initializer for FileInitializer {
    fn open(&self, path: &Path) -> StorageResult<Box<dyn Backend>> {
        Ok(Box::new(FileBackend::open(path)?))
    }
}

/// An initializer producing ephemeral in-memory backends.
///
/// The store file path is ignored; data is lost on close. The journal
/// still lands on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryInitializer;

impl Initializer for MemoryInitializer {
    fn open(&self, _path: &Path) -> StorageResult<Box<dyn Backend>> {
        Ok(Box::new(MemoryBackend::new()))
    }
}

/// Configuration for opening a store.
pub struct Options<T> {
    /// ID column width. Fixed once the store has on-disk artifacts.
    pub index_length: usize,

    /// Record encoder.
    pub encoder: Arc<dyn Encoder<T>>,

    /// Backend opener.
    pub initializer: Arc<dyn Initializer>,

    /// Consumer for sealed change-log segments.
    pub exporter: Option<Arc<dyn Exporter>>,

    /// Change-log segment size threshold.
    pub max_segment_size: u64,
}

impl<T> Clone for Options<T> {
    fn clone(&self) -> Self {
        Self {
            index_length: self.index_length,
            encoder: Arc::clone(&self.encoder),
            initializer: Arc::clone(&self.initializer),
            exporter: self.exporter.clone(),
            max_segment_size: self.max_segment_size,
        }
    }
}

impl<T> Default for Options<T>
where
    T: Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self {
            index_length: DEFAULT_INDEX_LENGTH,
            encoder: Arc::new(JsonEncoder),
            initializer: Arc::new(FileInitializer),
            exporter: None,
            max_segment_size: JournalOptions::default().max_segment_size,
        }
    }
}

impl<T> Options<T> {
    /// Sets the ID column width.
    #[must_use]
    pub fn index_length(mut self, width: usize) -> Self {
        self.index_length = width;
        self
    }

    /// Sets the record encoder.
    #[must_use]
    pub fn encoder(mut self, encoder: Arc<dyn Encoder<T>>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Sets the backend opener.
    #[must_use]
    pub fn initializer(mut self, initializer: Arc<dyn Initializer>) -> Self {
        self.initializer = initializer;
        self
    }

    /// Sets the sealed-segment consumer.
    #[must_use]
    pub fn exporter(mut self, exporter: Arc<dyn Exporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Sets the change-log segment size threshold.
    #[must_use]
    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.index_length < 1 {
            return Err(Error::invalid_options("index_length must be at least 1"));
        }
        // u64::MAX has 20 digits; 19 keeps every width-sized value valid.
        if self.index_length > 19 {
            return Err(Error::invalid_options("index_length must be at most 19"));
        }
        Ok(())
    }
}

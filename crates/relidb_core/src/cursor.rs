//! Cursors over entries and relationship sets.

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::filter::{select_primary, Filter};
use crate::store::{ENTRIES, RELATIONSHIPS};
use crate::transaction::{utf8_key, Transaction};
use relidb_storage::ReadTx;

/// Iteration control returned by `for_each` callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep iterating.
    Continue,
    /// Stop iterating; the iteration returns `Ok(())`.
    Stop,
}

/// Walks entry IDs in key order, applying secondary filters.
///
/// The walk source is either the entries bucket or the primary filter's
/// relationship set; in both cases the keys produced are entry IDs in
/// ascending order.
pub(crate) enum Walker {
    Entries,
    Relationship {
        relationship: String,
        relationship_id: String,
        secondary: Vec<Filter>,
    },
}

impl Walker {
    /// Builds a walker for a non-empty filter set.
    pub(crate) fn with_filters(declared: &[String], filters: &[Filter]) -> Result<Self> {
        let primary = select_primary(filters)?;
        for filter in filters {
            if !declared.iter().any(|name| name == filter.relationship()) {
                return Err(Error::RelationshipNotFound);
            }
        }
        let secondary = filters
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != primary)
            .map(|(_, f)| f.clone())
            .collect();
        Ok(Self::Relationship {
            relationship: filters[primary].relationship().to_string(),
            relationship_id: filters[primary].id().to_string(),
            secondary,
        })
    }

    fn raw_first(&self, view: &dyn ReadTx) -> Result<Option<Vec<u8>>> {
        let pair = match self {
            Self::Entries => view.first(&[ENTRIES])?,
            Self::Relationship {
                relationship,
                relationship_id,
                ..
            } => view.first(&[
                RELATIONSHIPS,
                relationship.as_bytes(),
                relationship_id.as_bytes(),
            ])?,
        };
        Ok(pair.map(|(key, _)| key))
    }

    fn raw_last(&self, view: &dyn ReadTx) -> Result<Option<Vec<u8>>> {
        let pair = match self {
            Self::Entries => view.last(&[ENTRIES])?,
            Self::Relationship {
                relationship,
                relationship_id,
                ..
            } => view.last(&[
                RELATIONSHIPS,
                relationship.as_bytes(),
                relationship_id.as_bytes(),
            ])?,
        };
        Ok(pair.map(|(key, _)| key))
    }

    fn raw_seek(&self, view: &dyn ReadTx, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let pair = match self {
            Self::Entries => view.seek(&[ENTRIES], key)?,
            Self::Relationship {
                relationship,
                relationship_id,
                ..
            } => view.seek(
                &[
                    RELATIONSHIPS,
                    relationship.as_bytes(),
                    relationship_id.as_bytes(),
                ],
                key,
            )?,
        };
        Ok(pair.map(|(key, _)| key))
    }

    fn raw_next(&self, view: &dyn ReadTx, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let pair = match self {
            Self::Entries => view.next_after(&[ENTRIES], key)?,
            Self::Relationship {
                relationship,
                relationship_id,
                ..
            } => view.next_after(
                &[
                    RELATIONSHIPS,
                    relationship.as_bytes(),
                    relationship_id.as_bytes(),
                ],
                key,
            )?,
        };
        Ok(pair.map(|(key, _)| key))
    }

    fn raw_prev(&self, view: &dyn ReadTx, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let pair = match self {
            Self::Entries => view.prev_before(&[ENTRIES], key)?,
            Self::Relationship {
                relationship,
                relationship_id,
                ..
            } => view.prev_before(
                &[
                    RELATIONSHIPS,
                    relationship.as_bytes(),
                    relationship_id.as_bytes(),
                ],
                key,
            )?,
        };
        Ok(pair.map(|(key, _)| key))
    }

    /// Applies the secondary filters to a candidate entry ID.
    fn passes(&self, view: &dyn ReadTx, entry_id: &[u8]) -> Result<bool> {
        let Self::Relationship { secondary, .. } = self else {
            return Ok(true);
        };
        for filter in secondary {
            let bucket: [&[u8]; 3] = [
                RELATIONSHIPS,
                filter.relationship().as_bytes(),
                filter.id().as_bytes(),
            ];
            let present = view.get(&bucket, entry_id)?.is_some();
            if present == filter.is_inverse() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn skip_forward(&self, view: &dyn ReadTx, mut key: Option<Vec<u8>>) -> Result<Option<Vec<u8>>> {
        while let Some(candidate) = key {
            if self.passes(view, &candidate)? {
                return Ok(Some(candidate));
            }
            key = self.raw_next(view, &candidate)?;
        }
        Ok(None)
    }

    fn skip_backward(&self, view: &dyn ReadTx, mut key: Option<Vec<u8>>) -> Result<Option<Vec<u8>>> {
        while let Some(candidate) = key {
            if self.passes(view, &candidate)? {
                return Ok(Some(candidate));
            }
            key = self.raw_prev(view, &candidate)?;
        }
        Ok(None)
    }

    /// First matching entry ID.
    pub(crate) fn first(&self, view: &dyn ReadTx) -> Result<Option<Vec<u8>>> {
        let key = self.raw_first(view)?;
        self.skip_forward(view, key)
    }

    /// Last matching entry ID.
    pub(crate) fn last(&self, view: &dyn ReadTx) -> Result<Option<Vec<u8>>> {
        let key = self.raw_last(view)?;
        self.skip_backward(view, key)
    }

    /// First matching entry ID at or after `key`.
    pub(crate) fn seek(&self, view: &dyn ReadTx, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = self.raw_seek(view, key)?;
        self.skip_forward(view, key)
    }

    /// First matching entry ID after `key`.
    pub(crate) fn next(&self, view: &dyn ReadTx, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = self.raw_next(view, key)?;
        self.skip_forward(view, key)
    }

    /// Last matching entry ID before `key`.
    pub(crate) fn prev(&self, view: &dyn ReadTx, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = self.raw_prev(view, key)?;
        self.skip_backward(view, key)
    }
}

/// A cursor over the entries matching a filter set.
///
/// Produced inside a transaction by [`Transaction::cursor`] and invalid
/// once that transaction ends. Exhaustion surfaces as
/// [`Error::EndOfEntries`]; the cursor keeps its position, so a
/// subsequent [`Cursor::prev`] steps back from the last match.
pub struct Cursor<'c, 'a, T: Entry> {
    txn: &'c Transaction<'a, T>,
    walker: Walker,
    pos: Option<Vec<u8>>,
}

impl<'c, 'a, T: Entry> Cursor<'c, 'a, T> {
    pub(crate) fn new(txn: &'c Transaction<'a, T>, filters: &[Filter]) -> Result<Self> {
        let walker = if filters.is_empty() {
            Walker::Entries
        } else {
            Walker::with_filters(&txn.shared().relationships, filters)?
        };
        Ok(Self {
            txn,
            walker,
            pos: None,
        })
    }

    fn resolve(&mut self, key: Option<Vec<u8>>) -> Result<T> {
        match key {
            Some(key) => {
                let val = self.txn.get(utf8_key(&key)?)?;
                self.pos = Some(key);
                Ok(val)
            }
            None => Err(Error::EndOfEntries),
        }
    }

    /// Moves to the first matching entry.
    pub fn first(&mut self) -> Result<T> {
        self.txn.context().check()?;
        let key = self.walker.first(self.txn.view())?;
        self.resolve(key)
    }

    /// Moves to the last matching entry.
    pub fn last(&mut self) -> Result<T> {
        self.txn.context().check()?;
        let key = self.walker.last(self.txn.view())?;
        self.resolve(key)
    }

    /// Moves to the first matching entry with ID >= `id`.
    ///
    /// Seeking an empty string positions at the beginning.
    pub fn seek(&mut self, id: &str) -> Result<T> {
        self.txn.context().check()?;
        let key = self.walker.seek(self.txn.view(), id.as_bytes())?;
        self.resolve(key)
    }

    /// Moves to the next matching entry.
    ///
    /// On a fresh cursor this is equivalent to [`Cursor::first`].
    pub fn next(&mut self) -> Result<T> {
        self.txn.context().check()?;
        let key = match self.pos.clone() {
            Some(pos) => self.walker.next(self.txn.view(), &pos)?,
            None => self.walker.first(self.txn.view())?,
        };
        self.resolve(key)
    }

    /// Moves to the previous matching entry.
    ///
    /// On a fresh cursor this is equivalent to [`Cursor::last`].
    pub fn prev(&mut self) -> Result<T> {
        self.txn.context().check()?;
        let key = match self.pos.clone() {
            Some(pos) => self.walker.prev(self.txn.view(), &pos)?,
            None => self.walker.last(self.txn.view())?,
        };
        self.resolve(key)
    }
}

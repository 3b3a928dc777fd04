//! The transaction object.
//!
//! A `Transaction` borrows one backend transaction (and, for writes, one
//! change-log writer) for the duration of a user closure. Every mutation
//! routes through the relationship index maintenance and is mirrored to
//! the change log in program order.

use crate::context::Context;
use crate::cursor::{Cursor, Step, Walker};
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::index::{encode_index, parse_index};
use crate::store::{Shared, ENTRIES, LOOKUPS, RELATIONSHIPS};
use relidb_journal::{log_key, Writer};
use relidb_storage::{ReadTx, WriteTx};
use std::collections::BTreeSet;

/// Joins a bucket path into the label used in log keys.
pub(crate) fn bucket_label(path: &[&[u8]]) -> Vec<u8> {
    let mut label = Vec::new();
    for (i, part) in path.iter().enumerate() {
        if i > 0 {
            label.push(b'/');
        }
        label.extend_from_slice(part);
    }
    label
}

/// Decodes a stored key as UTF-8.
pub(crate) fn utf8_key(key: &[u8]) -> Result<&str> {
    std::str::from_utf8(key).map_err(|_| Error::codec("non-utf8 key"))
}

enum TxInner {
    Read(Box<dyn ReadTx>),
    Write {
        tx: Box<dyn WriteTx>,
        log: Writer,
        next_index: Option<u64>,
    },
}

/// A transaction over the store.
///
/// Produced by [`crate::Store::transaction`],
/// [`crate::Store::read_transaction`], and [`crate::Store::batch`]; valid
/// only inside the closure it is handed to.
pub struct Transaction<'a, T: Entry> {
    shared: &'a Shared<T>,
    ctx: Context,
    inner: TxInner,
}

impl<'a, T: Entry> Transaction<'a, T> {
    pub(crate) fn read(shared: &'a Shared<T>, ctx: Context, tx: Box<dyn ReadTx>) -> Self {
        Self {
            shared,
            ctx,
            inner: TxInner::Read(tx),
        }
    }

    pub(crate) fn write(shared: &'a Shared<T>, ctx: Context, tx: Box<dyn WriteTx>) -> Self {
        Self {
            shared,
            ctx,
            inner: TxInner::Write {
                tx,
                log: Writer::new(),
                next_index: None,
            },
        }
    }

    pub(crate) fn set_context(&mut self, ctx: Context) {
        self.ctx = ctx;
    }

    pub(crate) fn context(&self) -> &Context {
        &self.ctx
    }

    pub(crate) fn shared(&self) -> &'a Shared<T> {
        self.shared
    }

    /// Tears the transaction down into its backend half and its log
    /// buffer. `None` for read transactions.
    pub(crate) fn finish_write(self) -> Option<(Box<dyn WriteTx>, Writer)> {
        match self.inner {
            TxInner::Read(_) => None,
            TxInner::Write { tx, log, .. } => Some((tx, log)),
        }
    }

    pub(crate) fn view(&self) -> &dyn ReadTx {
        match &self.inner {
            TxInner::Read(tx) => tx.as_ref(),
            TxInner::Write { tx, .. } => tx.as_read(),
        }
    }

    fn write_parts(&mut self) -> Result<(&mut Box<dyn WriteTx>, &mut Writer, &mut Option<u64>)> {
        match &mut self.inner {
            TxInner::Read(_) => Err(Error::ReadOnlyTransaction),
            TxInner::Write {
                tx,
                log,
                next_index,
            } => Ok((tx, log, next_index)),
        }
    }

    /// Inserts a new entry and its relationship leaves, returning the
    /// assigned ID.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidNumberOfRelationships`] if the record's slots do
    /// not match the declared relationships; [`Error::IndexOverflow`] if
    /// the next index no longer fits the configured ID width.
    pub fn insert(&mut self, val: &T) -> Result<String> {
        self.ctx.check()?;
        let shared = self.shared;

        let rels = val.relationships();
        if rels.len() != shared.relationships.len() {
            return Err(Error::InvalidNumberOfRelationships);
        }
        let payload = shared.encoder.marshal(val)?;

        let (tx, log, next_index) = self.write_parts()?;
        let index = match *next_index {
            Some(index) => index,
            None => match tx.last(&[ENTRIES])? {
                Some((last_id, _)) => parse_index(&last_id)? + 1,
                None => 0,
            },
        };
        let id = encode_index(index, shared.index_length)?;

        tx.put(&[ENTRIES], &id, &payload)?;
        log.write(log_key(ENTRIES, &id), payload);

        for (slot, name) in shared.relationships.iter().enumerate() {
            let ids: BTreeSet<&str> = rels.slot(slot).iter().map(String::as_str).collect();
            for rid in ids {
                let bucket: [&[u8]; 3] = [RELATIONSHIPS, name.as_bytes(), rid.as_bytes()];
                tx.create_bucket(&bucket)?;
                tx.put(&bucket, &id, &[])?;
                log.write(log_key(&bucket_label(&bucket), &id), Vec::new());
            }
        }

        *next_index = Some(index + 1);
        self.ctx.touch();
        utf8_key(&id).map(str::to_string)
    }

    /// Reports whether an entry exists for `id`.
    pub fn exists(&self, id: &str) -> Result<bool> {
        self.ctx.check()?;
        let found = self.view().get(&[ENTRIES], id.as_bytes())?.is_some();
        self.ctx.touch();
        Ok(found)
    }

    /// Gets the entry stored under `id`.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if no entry exists for `id`.
    pub fn get(&self, id: &str) -> Result<T> {
        self.ctx.check()?;
        let bytes = self
            .view()
            .get(&[ENTRIES], id.as_bytes())?
            .ok_or(Error::EntryNotFound)?;
        let mut val = self.shared.encoder.unmarshal(&bytes)?;
        val.set_id(id.to_string());
        self.ctx.touch();
        Ok(val)
    }

    /// Replaces the entry under `id` with `val`, reconciling its
    /// relationship leaves.
    ///
    /// For each slot the old and new ID sets are diffed: removed IDs lose
    /// their leaf, added IDs gain one, unchanged IDs are untouched.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if no entry exists for `id`.
    pub fn edit(&mut self, id: &str, val: &T) -> Result<()> {
        self.ctx.check()?;
        let shared = self.shared;

        let current_bytes = self
            .view()
            .get(&[ENTRIES], id.as_bytes())?
            .ok_or(Error::EntryNotFound)?;
        let current: T = shared.encoder.unmarshal(&current_bytes)?;

        let old = current.relationships();
        let new = val.relationships();
        if old.len() != shared.relationships.len() || new.len() != shared.relationships.len() {
            return Err(Error::InvalidNumberOfRelationships);
        }
        let payload = shared.encoder.marshal(val)?;
        let id_bytes = id.as_bytes();

        let (tx, log, _) = self.write_parts()?;
        for (slot, name) in shared.relationships.iter().enumerate() {
            let old_ids: BTreeSet<&str> = old.slot(slot).iter().map(String::as_str).collect();
            let new_ids: BTreeSet<&str> = new.slot(slot).iter().map(String::as_str).collect();

            for rid in old_ids.difference(&new_ids) {
                let bucket: [&[u8]; 3] = [RELATIONSHIPS, name.as_bytes(), rid.as_bytes()];
                tx.delete(&bucket, id_bytes)?;
                log.delete(log_key(&bucket_label(&bucket), id_bytes));
            }
            for rid in new_ids.difference(&old_ids) {
                let bucket: [&[u8]; 3] = [RELATIONSHIPS, name.as_bytes(), rid.as_bytes()];
                tx.create_bucket(&bucket)?;
                tx.put(&bucket, id_bytes, &[])?;
                log.write(log_key(&bucket_label(&bucket), id_bytes), Vec::new());
            }
        }

        tx.put(&[ENTRIES], id_bytes, &payload)?;
        log.write(log_key(ENTRIES, id_bytes), payload);
        self.ctx.touch();
        Ok(())
    }

    /// Removes the entry under `id` and all of its relationship leaves.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if no entry exists for `id`.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.ctx.check()?;
        let shared = self.shared;

        let current_bytes = self
            .view()
            .get(&[ENTRIES], id.as_bytes())?
            .ok_or(Error::EntryNotFound)?;
        let current: T = shared.encoder.unmarshal(&current_bytes)?;
        let rels = current.relationships();
        let id_bytes = id.as_bytes();

        let (tx, log, _) = self.write_parts()?;
        for (slot, name) in shared.relationships.iter().enumerate() {
            let ids: BTreeSet<&str> = rels.slot(slot).iter().map(String::as_str).collect();
            for rid in ids {
                let bucket: [&[u8]; 3] = [RELATIONSHIPS, name.as_bytes(), rid.as_bytes()];
                tx.delete(&bucket, id_bytes)?;
                log.delete(log_key(&bucket_label(&bucket), id_bytes));
            }
        }

        tx.delete(&[ENTRIES], id_bytes)?;
        log.delete(log_key(ENTRIES, id_bytes));
        self.ctx.touch();
        Ok(())
    }

    /// Appends every entry related to `relationship_id` under
    /// `relationship` to `out`, in ascending ID order.
    ///
    /// # Errors
    ///
    /// [`Error::RelationshipNotFound`] if `relationship` was not declared
    /// at store creation.
    pub fn get_by_relationship(
        &self,
        relationship: &str,
        relationship_id: &str,
        out: &mut Vec<T>,
    ) -> Result<()> {
        self.ctx.check()?;
        if !self.shared.relationship_declared(relationship) {
            return Err(Error::RelationshipNotFound);
        }
        let bucket: [&[u8]; 3] = [
            RELATIONSHIPS,
            relationship.as_bytes(),
            relationship_id.as_bytes(),
        ];

        let mut pair = self.view().first(&bucket)?;
        while let Some((entry_id, _)) = pair {
            out.push(self.get(utf8_key(&entry_id)?)?);
            pair = self.view().next_after(&bucket, &entry_id)?;
        }
        Ok(())
    }

    /// Gets the first (lowest-ID) entry related to `relationship_id`.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if the relationship has no members.
    pub fn get_first_by_relationship(&self, relationship: &str, relationship_id: &str) -> Result<T> {
        self.ctx.check()?;
        if !self.shared.relationship_declared(relationship) {
            return Err(Error::RelationshipNotFound);
        }
        let bucket: [&[u8]; 3] = [
            RELATIONSHIPS,
            relationship.as_bytes(),
            relationship_id.as_bytes(),
        ];
        match self.view().first(&bucket)? {
            Some((entry_id, _)) => self.get(utf8_key(&entry_id)?),
            None => Err(Error::EntryNotFound),
        }
    }

    /// Gets the last (highest-ID) entry related to `relationship_id`.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if the relationship has no members.
    pub fn get_last_by_relationship(&self, relationship: &str, relationship_id: &str) -> Result<T> {
        self.ctx.check()?;
        if !self.shared.relationship_declared(relationship) {
            return Err(Error::RelationshipNotFound);
        }
        let bucket: [&[u8]; 3] = [
            RELATIONSHIPS,
            relationship.as_bytes(),
            relationship_id.as_bytes(),
        ];
        match self.view().last(&bucket)? {
            Some((entry_id, _)) => self.get(utf8_key(&entry_id)?),
            None => Err(Error::EntryNotFound),
        }
    }

    /// Iterates entries from `seek_id` in ascending ID order.
    ///
    /// With no filters this is a linear scan of the entries bucket. With
    /// filters, the first non-inverse filter's relationship set drives the
    /// scan and the remaining filters are applied as membership probes.
    /// Returning [`Step::Stop`] ends the iteration with `Ok(())`.
    pub fn for_each<F>(&self, seek_id: &str, filters: &[Filter], mut f: F) -> Result<()>
    where
        F: FnMut(&str, T) -> Result<Step>,
    {
        self.ctx.check()?;
        if filters.is_empty() {
            let mut pair = self.view().seek(&[ENTRIES], seek_id.as_bytes())?;
            while let Some((key, payload)) = pair {
                self.ctx.check()?;
                let id = utf8_key(&key)?;
                let mut val = self.shared.encoder.unmarshal(&payload)?;
                val.set_id(id.to_string());
                self.ctx.touch();
                if matches!(f(id, val)?, Step::Stop) {
                    return Ok(());
                }
                pair = self.view().next_after(&[ENTRIES], &key)?;
            }
            return Ok(());
        }

        let walker = Walker::with_filters(&self.shared.relationships, filters)?;
        let mut key = walker.seek(self.view(), seek_id.as_bytes())?;
        while let Some(entry_id) = key {
            let id = utf8_key(&entry_id)?;
            let val = self.get(id)?;
            if matches!(f(id, val)?, Step::Stop) {
                return Ok(());
            }
            key = walker.next(self.view(), &entry_id)?;
        }
        Ok(())
    }

    /// Iterates entry IDs from `seek_id` in ascending order.
    ///
    /// Same semantics as [`Transaction::for_each`] but without loading or
    /// decoding the entries.
    pub fn for_each_id<F>(&self, seek_id: &str, filters: &[Filter], mut f: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<Step>,
    {
        self.ctx.check()?;
        if filters.is_empty() {
            let mut pair = self.view().seek(&[ENTRIES], seek_id.as_bytes())?;
            while let Some((key, _)) = pair {
                self.ctx.check()?;
                self.ctx.touch();
                if matches!(f(utf8_key(&key)?)?, Step::Stop) {
                    return Ok(());
                }
                pair = self.view().next_after(&[ENTRIES], &key)?;
            }
            return Ok(());
        }

        let walker = Walker::with_filters(&self.shared.relationships, filters)?;
        let mut key = walker.seek(self.view(), seek_id.as_bytes())?;
        while let Some(entry_id) = key {
            self.ctx.check()?;
            self.ctx.touch();
            if matches!(f(utf8_key(&entry_id)?)?, Step::Stop) {
                return Ok(());
            }
            key = walker.next(self.view(), &entry_id)?;
        }
        Ok(())
    }

    /// Collects up to `limit` filtered entries starting at `seek_id`.
    ///
    /// Returns the entries and the last visited ID, usable as the next
    /// page's seek position. A `limit` of 0 means unbounded.
    pub fn get_filtered(
        &self,
        seek_id: &str,
        limit: usize,
        filters: &[Filter],
    ) -> Result<(Vec<T>, Option<String>)> {
        let mut out = Vec::new();
        let mut last = None;
        self.for_each(seek_id, filters, |id, val| {
            out.push(val);
            last = Some(id.to_string());
            if limit > 0 && out.len() >= limit {
                Ok(Step::Stop)
            } else {
                Ok(Step::Continue)
            }
        })?;
        Ok((out, last))
    }

    /// Returns a cursor over the entries matching `filters`.
    ///
    /// With no filters the cursor walks the entries bucket; otherwise it
    /// walks the primary filter's relationship set with the remaining
    /// filters applied transparently.
    pub fn cursor<'c>(&'c self, filters: &[Filter]) -> Result<Cursor<'c, 'a, T>> {
        Cursor::new(self, filters)
    }

    /// Returns a cursor over the entries related to `relationship_id`
    /// under `relationship`.
    pub fn cursor_relationship<'c>(
        &'c self,
        relationship: &str,
        relationship_id: &str,
    ) -> Result<Cursor<'c, 'a, T>> {
        Cursor::new(self, &[Filter::new(relationship, relationship_id)])
    }

    /// Adds `key` to the lookup set under `lookup` / `lookup_id`.
    pub fn set_lookup(&mut self, lookup: &str, lookup_id: &str, key: &str) -> Result<()> {
        self.ctx.check()?;
        let bucket: [&[u8]; 3] = [LOOKUPS, lookup.as_bytes(), lookup_id.as_bytes()];
        let (tx, log, _) = self.write_parts()?;
        tx.create_bucket(&bucket)?;
        tx.put(&bucket, key.as_bytes(), &[])?;
        log.write(log_key(&bucket_label(&bucket), key.as_bytes()), Vec::new());
        self.ctx.touch();
        Ok(())
    }

    /// Returns the keys in the lookup set under `lookup` / `lookup_id`,
    /// in ascending key order.
    ///
    /// # Errors
    ///
    /// [`Error::LookupNotFound`] if the lookup was never written.
    pub fn get_lookup(&self, lookup: &str, lookup_id: &str) -> Result<Vec<String>> {
        self.ctx.check()?;
        let bucket: [&[u8]; 3] = [LOOKUPS, lookup.as_bytes(), lookup_id.as_bytes()];
        if !self.view().bucket_exists(&bucket)? {
            return Err(Error::LookupNotFound);
        }

        let mut keys = Vec::new();
        let mut pair = self.view().first(&bucket)?;
        while let Some((key, _)) = pair {
            keys.push(utf8_key(&key)?.to_string());
            pair = self.view().next_after(&bucket, &key)?;
        }
        self.ctx.touch();
        Ok(keys)
    }

    /// Removes `key` from the lookup set under `lookup` / `lookup_id`.
    pub fn remove_lookup(&mut self, lookup: &str, lookup_id: &str, key: &str) -> Result<()> {
        self.ctx.check()?;
        let bucket: [&[u8]; 3] = [LOOKUPS, lookup.as_bytes(), lookup_id.as_bytes()];
        let (tx, log, _) = self.write_parts()?;
        tx.delete(&bucket, key.as_bytes())?;
        log.delete(log_key(&bucket_label(&bucket), key.as_bytes()));
        self.ctx.touch();
        Ok(())
    }
}

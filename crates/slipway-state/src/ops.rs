//! Generic operation-record storage.
//!
//! An [`OperationDescriptor`] binds one record kind to its primary table, its
//! group index, and a retention limit. Every entity store (deployments,
//! builds, releases, jobs) is a thin instantiation of this one abstraction:
//! the descriptor owns all storage mechanics (transactional upsert, index
//! maintenance, reference resolution, retention pruning), so the entity
//! layer only contributes table names and validation.
//!
//! All mutations happen inside a single redb write transaction: record
//! upsert, index entries, and the prune pass commit together or not at all.
//! Readers run in snapshot-isolated read transactions and can never observe
//! a partially-updated index.

use std::marker::PhantomData;

use redb::{Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use slipway_core::{Build, Deployment, Job, OperationRef, Release};

use crate::error::{map_err, StateError, StateResult};
use crate::tables::{group_range, index_key, SEQUENCES};

/// A record kind the generic store can persist.
///
/// `id` is the primary key; `group_key` is the secondary index key under
/// which the record is enumerated and retention-counted (the owning
/// application, for every current kind).
pub trait OperationRecord: Clone + Serialize + DeserializeOwned {
    fn id(&self) -> &str;
    fn group_key(&self) -> &str;
}

impl OperationRecord for Deployment {
    fn id(&self) -> &str {
        &self.id
    }
    fn group_key(&self) -> &str {
        &self.application
    }
}

impl OperationRecord for Build {
    fn id(&self) -> &str {
        &self.id
    }
    fn group_key(&self) -> &str {
        &self.application
    }
}

impl OperationRecord for Release {
    fn id(&self) -> &str {
        &self.id
    }
    fn group_key(&self) -> &str {
        &self.application
    }
}

impl OperationRecord for Job {
    fn id(&self) -> &str {
        &self.id
    }
    fn group_key(&self) -> &str {
        &self.application
    }
}

/// Storage envelope wrapped around every record.
///
/// `seq` is the insertion sequence (drives recency ordering and the index
/// key); `indexed` marks whether the record participates in the group index
/// and retention accounting. The record itself is stored untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope<T> {
    seq: u64,
    indexed: bool,
    record: T,
}

fn decode<T: OperationRecord>(bytes: &[u8]) -> StateResult<Envelope<T>> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Per-kind binding of primary table, group index, and retention policy.
///
/// A retention limit of 0 means unbounded history for that kind.
#[derive(Clone)]
pub struct OperationDescriptor<T> {
    kind: &'static str,
    table: TableDefinition<'static, &'static str, &'static [u8]>,
    index: TableDefinition<'static, &'static str, &'static str>,
    retention: u64,
    _record: PhantomData<fn() -> T>,
}

impl<T: OperationRecord> OperationDescriptor<T> {
    pub const fn new(
        kind: &'static str,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        index: TableDefinition<'static, &'static str, &'static str>,
        retention: u64,
    ) -> Self {
        Self {
            kind,
            table,
            index,
            retention,
            _record: PhantomData,
        }
    }

    /// Create this kind's tables if absent. Called once at store open so
    /// read transactions never race table creation.
    pub(crate) fn ensure(&self, txn: &WriteTransaction) -> StateResult<()> {
        txn.open_table(self.table).map_err(map_err!(Table))?;
        txn.open_table(self.index).map_err(map_err!(Table))?;
        Ok(())
    }

    /// Insert or replace a record by id inside one write transaction.
    ///
    /// With `index` set the record joins the group index (becoming visible
    /// to `list` and `Latest` resolution) and the touched group is pruned
    /// back to the retention limit before commit. With `index` unset the
    /// record is retrievable by id only and never counts toward retention.
    ///
    /// A replacing put takes a fresh sequence, so the record becomes its
    /// group's most recent entry and keeps exactly one index entry.
    pub fn put(&self, db: &Database, index: bool, record: &T) -> StateResult<()> {
        let id = record.id();
        if id.is_empty() {
            return Err(StateError::Validation(format!("{} id is required", self.kind)));
        }
        let group = record.group_key().to_string();

        let txn = db.begin_write().map_err(map_err!(Transaction))?;
        let seq = self.next_seq(&txn)?;
        {
            let mut primary = txn.open_table(self.table).map_err(map_err!(Table))?;
            let prev = match primary.get(id).map_err(map_err!(Read))? {
                Some(guard) => Some(decode::<T>(guard.value())?),
                None => None,
            };
            let value = serde_json::to_vec(&Envelope {
                seq,
                indexed: index,
                record: record.clone(),
            })
            .map_err(map_err!(Serialize))?;
            primary
                .insert(id, value.as_slice())
                .map_err(map_err!(Write))?;

            let mut idx = txn.open_table(self.index).map_err(map_err!(Table))?;
            if let Some(prev) = &prev {
                if prev.indexed {
                    idx.remove(index_key(prev.record.group_key(), prev.seq).as_str())
                        .map_err(map_err!(Write))?;
                }
            }
            if index {
                idx.insert(index_key(&group, seq).as_str(), id)
                    .map_err(map_err!(Write))?;
            }
        }
        let pruned = if index && self.retention > 0 {
            self.prune_old(&txn, &group, self.retention)?
        } else {
            0
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = self.kind, id, indexed = index, pruned, "record stored");
        Ok(())
    }

    /// Resolve a reference and fetch the record in one snapshot transaction.
    pub fn get(&self, db: &Database, reference: &OperationRef) -> StateResult<T> {
        let txn = db.begin_read().map_err(map_err!(Transaction))?;
        let id = self.resolve(&txn, reference)?;
        let table = txn.open_table(self.table).map_err(map_err!(Table))?;
        let guard = table
            .get(id.as_str())
            .map_err(map_err!(Read))?
            .ok_or_else(|| StateError::NotFound(format!("{} {id}", self.kind)))?;
        Ok(decode::<T>(guard.value())?.record)
    }

    /// Resolve a reference to a concrete record id.
    ///
    /// An id reference passes through unchanged (existence is checked by the
    /// subsequent fetch). A `Latest` reference is a reverse scan over the
    /// group index; an empty group is not-found.
    pub fn resolve(&self, txn: &ReadTransaction, reference: &OperationRef) -> StateResult<String> {
        match reference {
            OperationRef::Id { id } => Ok(id.clone()),
            OperationRef::Latest { application } => {
                let idx = txn.open_table(self.index).map_err(map_err!(Table))?;
                let (start, end) = group_range(application);
                let mut range = idx
                    .range(start.as_str()..end.as_str())
                    .map_err(map_err!(Read))?;
                match range.next_back() {
                    Some(entry) => {
                        let (_, value) = entry.map_err(map_err!(Read))?;
                        Ok(value.value().to_string())
                    }
                    None => Err(StateError::NotFound(format!(
                        "no {} for application {application}",
                        self.kind
                    ))),
                }
            }
        }
    }

    /// All indexed records in a group, newest first.
    ///
    /// Records written with `index=false` have no index entry and are
    /// excluded. An index entry with no backing record means the index and
    /// primary table have diverged, which a committed write cannot produce.
    pub fn list(&self, db: &Database, group: &str) -> StateResult<Vec<T>> {
        let txn = db.begin_read().map_err(map_err!(Transaction))?;
        let idx = txn.open_table(self.index).map_err(map_err!(Table))?;
        let primary = txn.open_table(self.table).map_err(map_err!(Table))?;
        let (start, end) = group_range(group);
        let mut records = Vec::new();
        for entry in idx
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
            .rev()
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let id = value.value();
            let guard = primary.get(id).map_err(map_err!(Read))?.ok_or_else(|| {
                StateError::Invariant(format!("index entry for {} {id} has no record", self.kind))
            })?;
            records.push(decode::<T>(guard.value())?.record);
        }
        Ok(records)
    }

    /// Remove a record and its index entry atomically. Idempotent: deleting
    /// an absent id succeeds with no state change.
    pub fn delete(&self, db: &Database, id: &str) -> StateResult<()> {
        let txn = db.begin_write().map_err(map_err!(Transaction))?;
        let removed = {
            let mut primary = txn.open_table(self.table).map_err(map_err!(Table))?;
            match primary.remove(id).map_err(map_err!(Write))? {
                Some(guard) => Some(decode::<T>(guard.value())?),
                None => None,
            }
        };
        if let Some(env) = &removed {
            if env.indexed {
                let mut idx = txn.open_table(self.index).map_err(map_err!(Table))?;
                idx.remove(index_key(env.record.group_key(), env.seq).as_str())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(kind = self.kind, id, existed = removed.is_some(), "record deleted");
        Ok(())
    }

    /// Delete the oldest records of a group down to `max`, inside the
    /// caller's transaction. Returns the number deleted; a group already
    /// within budget is a no-op. Only indexed records are enumerated, so
    /// non-indexed records are never prune victims.
    pub fn prune_old(&self, txn: &WriteTransaction, group: &str, max: u64) -> StateResult<usize> {
        let mut idx = txn.open_table(self.index).map_err(map_err!(Table))?;
        let entries: Vec<(String, String)> = {
            let (start, end) = group_range(group);
            let mut entries = Vec::new();
            for entry in idx
                .range(start.as_str()..end.as_str())
                .map_err(map_err!(Read))?
            {
                let (key, value) = entry.map_err(map_err!(Read))?;
                entries.push((key.value().to_string(), value.value().to_string()));
            }
            entries
        };
        if entries.len() as u64 <= max {
            return Ok(0);
        }
        let excess = entries.len() - max as usize;

        let mut primary = txn.open_table(self.table).map_err(map_err!(Table))?;
        for (key, id) in entries.iter().take(excess) {
            idx.remove(key.as_str()).map_err(map_err!(Write))?;
            primary.remove(id.as_str()).map_err(map_err!(Write))?;
        }
        debug!(kind = self.kind, group, deleted = excess, "pruned old records");
        Ok(excess)
    }

    /// Number of indexed records currently in a group, derived from the
    /// index itself rather than a live counter.
    pub fn indexed_len(&self, db: &Database, group: &str) -> StateResult<usize> {
        let txn = db.begin_read().map_err(map_err!(Transaction))?;
        let idx = txn.open_table(self.index).map_err(map_err!(Table))?;
        let (start, end) = group_range(group);
        let mut count = 0;
        for entry in idx
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
        {
            entry.map_err(map_err!(Read))?;
            count += 1;
        }
        Ok(count)
    }

    /// Allocate the next insertion sequence for this kind.
    fn next_seq(&self, txn: &WriteTransaction) -> StateResult<u64> {
        let mut seqs = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        let next = match seqs.get(self.kind).map_err(map_err!(Read))? {
            Some(guard) => guard.value() + 1,
            None => 1,
        };
        seqs.insert(self.kind, next).map_err(map_err!(Write))?;
        Ok(next)
    }
}

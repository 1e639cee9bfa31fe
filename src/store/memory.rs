//! In-memory store
//!
//! HashMap of values plus ordered member sets, wrapped in one RwLock.
//!
//! ## Concurrency
//! - Reads (GET, MGET, SSCAN) share the read lock
//! - Writes and whole batches hold the write lock, so a batch is applied
//!   without interleaving and rolled back in place if a precondition fails
//!
//! ## Scan cursor
//! The cursor is the offset of the next member in the set's sorted order.
//! Members added or removed between scan steps may shift that offset, so a
//! scan racing with writers can miss or repeat members.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

use super::{Batch, BatchOp, BatchOutcome, KvStore, SetScan, SCAN_START};
use crate::context::Context;
use crate::error::Result;

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Vec<u8>>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// Inverse of one applied batch op
enum Undo {
    Value { key: String, prev: Option<Vec<u8>> },
    Member { set: String, member: String, was_present: bool },
}

impl Inner {
    fn add_member(&mut self, set: &str, member: &str) -> bool {
        self.sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string())
    }

    fn remove_member(&mut self, set: &str, member: &str) -> bool {
        let Some(members) = self.sets.get_mut(set) else {
            return false;
        };
        let removed = members.remove(member);
        if members.is_empty() {
            self.sets.remove(set);
        }
        removed
    }

    /// Apply one op, recording its inverse. Returns false if the
    /// precondition fails, in which case nothing was changed.
    fn apply(&mut self, op: &BatchOp, undo: &mut Vec<Undo>) -> bool {
        match op {
            BatchOp::SetNx { key, value } => {
                if self.values.contains_key(key) {
                    return false;
                }
                self.values.insert(key.clone(), value.clone());
                undo.push(Undo::Value { key: key.clone(), prev: None });
            }
            BatchOp::SetXx { key, value } => {
                let Some(slot) = self.values.get_mut(key) else {
                    return false;
                };
                let prev = std::mem::replace(slot, value.clone());
                undo.push(Undo::Value { key: key.clone(), prev: Some(prev) });
            }
            BatchOp::Del { key } => {
                let Some(prev) = self.values.remove(key) else {
                    return false;
                };
                undo.push(Undo::Value { key: key.clone(), prev: Some(prev) });
            }
            BatchOp::SAdd { set, member } => {
                let added = self.add_member(set, member);
                undo.push(Undo::Member {
                    set: set.clone(),
                    member: member.clone(),
                    was_present: !added,
                });
            }
            BatchOp::SRem { set, member } => {
                let removed = self.remove_member(set, member);
                undo.push(Undo::Member {
                    set: set.clone(),
                    member: member.clone(),
                    was_present: removed,
                });
            }
        }
        true
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Value { key, prev: Some(value) } => {
                    self.values.insert(key, value);
                }
                Undo::Value { key, prev: None } => {
                    self.values.remove(&key);
                }
                Undo::Member { set, member, was_present: true } => {
                    self.add_member(&set, &member);
                }
                Undo::Member { set, member, was_present: false } => {
                    self.remove_member(&set, &member);
                }
            }
        }
    }
}

/// Concurrency-safe in-process key-value store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values (set members not included)
    pub fn key_count(&self) -> usize {
        self.inner.read().values.len()
    }

    /// All members of `set`, sorted
    pub fn members(&self, set: &str) -> Vec<String> {
        self.inner
            .read()
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, ctx: &Context, key: &str) -> Result<Option<Vec<u8>>> {
        ctx.check()?;
        Ok(self.inner.read().values.get(key).cloned())
    }

    fn set_nx(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<bool> {
        ctx.check()?;
        let mut inner = self.inner.write();
        if inner.values.contains_key(key) {
            return Ok(false);
        }
        inner.values.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn set_xx(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<bool> {
        ctx.check()?;
        match self.inner.write().values.get_mut(key) {
            Some(slot) => {
                *slot = value.to_vec();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn del(&self, ctx: &Context, key: &str) -> Result<bool> {
        ctx.check()?;
        Ok(self.inner.write().values.remove(key).is_some())
    }

    fn sadd(&self, ctx: &Context, set: &str, member: &str) -> Result<bool> {
        ctx.check()?;
        Ok(self.inner.write().add_member(set, member))
    }

    fn srem(&self, ctx: &Context, set: &str, member: &str) -> Result<bool> {
        ctx.check()?;
        Ok(self.inner.write().remove_member(set, member))
    }

    fn sscan(&self, ctx: &Context, set: &str, cursor: u64, count: usize) -> Result<SetScan> {
        ctx.check()?;
        let inner = self.inner.read();
        let Some(members) = inner.sets.get(set) else {
            return Ok(SetScan { members: Vec::new(), cursor: SCAN_START });
        };

        let offset = usize::try_from(cursor).unwrap_or(usize::MAX);
        let page: Vec<String> = members
            .iter()
            .skip(offset)
            .take(count.max(1))
            .cloned()
            .collect();

        let next = offset.saturating_add(page.len());
        let cursor = if page.is_empty() || next >= members.len() {
            SCAN_START
        } else {
            next as u64
        };

        Ok(SetScan { members: page, cursor })
    }

    fn mget(&self, ctx: &Context, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        ctx.check()?;
        let inner = self.inner.read();
        Ok(keys.iter().map(|key| inner.values.get(key).cloned()).collect())
    }

    fn exec(&self, ctx: &Context, batch: &Batch) -> Result<BatchOutcome> {
        ctx.check()?;
        let mut inner = self.inner.write();
        let mut undo = Vec::with_capacity(batch.len());

        for (index, op) in batch.ops().iter().enumerate() {
            if !inner.apply(op, &mut undo) {
                inner.rollback(undo);
                tracing::debug!(index, op = op.name(), "batch aborted, precondition failed");
                return Ok(BatchOutcome::Aborted { index });
            }
        }

        tracing::trace!(ops = batch.len(), "batch committed");
        Ok(BatchOutcome::Committed)
    }

    fn ping(&self, ctx: &Context) -> Result<()> {
        ctx.check()
    }
}

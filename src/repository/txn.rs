//! Transactional writer
//!
//! Queues mutations client-side and sends them to the store as one atomic
//! batch on commit. Nothing reaches the store before `commit`; `discard`
//! (or dropping the transaction) throws the queued ops away.

use crate::context::Context;
use crate::error::Result;
use crate::store::{Batch, BatchOp, BatchOutcome, KvStore};

/// A pending atomic batch against one store
#[must_use = "a transaction does nothing until it is committed"]
pub struct Transaction<'a, S: KvStore + ?Sized> {
    store: &'a S,
    batch: Batch,
}

impl<'a, S: KvStore + ?Sized> Transaction<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            batch: Batch::new(),
        }
    }

    /// Create `key` only if it is absent
    pub fn set_nx(&mut self, key: &str, value: Vec<u8>) -> &mut Self {
        self.push(BatchOp::SetNx {
            key: key.to_string(),
            value,
        })
    }

    /// Overwrite `key` only if it exists
    pub fn set_xx(&mut self, key: &str, value: Vec<u8>) -> &mut Self {
        self.push(BatchOp::SetXx {
            key: key.to_string(),
            value,
        })
    }

    /// Delete `key`, which must exist
    pub fn del(&mut self, key: &str) -> &mut Self {
        self.push(BatchOp::Del { key: key.to_string() })
    }

    pub fn sadd(&mut self, set: &str, member: &str) -> &mut Self {
        self.push(BatchOp::SAdd {
            set: set.to_string(),
            member: member.to_string(),
        })
    }

    pub fn srem(&mut self, set: &str, member: &str) -> &mut Self {
        self.push(BatchOp::SRem {
            set: set.to_string(),
            member: member.to_string(),
        })
    }

    fn push(&mut self, op: BatchOp) -> &mut Self {
        self.batch.push(op);
        self
    }

    /// Ops queued so far
    pub fn ops(&self) -> &[BatchOp] {
        self.batch.ops()
    }

    /// Send the batch in one round trip
    ///
    /// An empty transaction commits without contacting the store.
    pub fn commit(self, ctx: &Context) -> Result<BatchOutcome> {
        if self.batch.is_empty() {
            return Ok(BatchOutcome::Committed);
        }
        self.store.exec(ctx, &self.batch)
    }

    /// Drop every queued op without touching the store
    pub fn discard(self) {
        tracing::trace!(ops = self.batch.len(), "transaction discarded");
    }
}

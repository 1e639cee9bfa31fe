//! Store Module
//!
//! The key-value store contract the repository is written against.
//!
//! ## Primitives
//! - `GET` / `MGET`: read one or many values
//! - `SETNX` / `SETXX`: conditional writes (create-if-absent / set-if-exists)
//! - `DEL`: remove a value
//! - `SADD` / `SREM` / `SSCAN`: set membership and cursor scan
//! - `EXEC`: apply a [`Batch`] atomically
//!
//! ## Implementations
//! - [`MemoryStore`]: in-process store guarded by a `RwLock`
//! - [`RemoteStore`]: TCP client for an orderkv server

mod batch;
mod memory;
mod remote;

use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;

pub use batch::{Batch, BatchOp, BatchOutcome};
pub use memory::MemoryStore;
pub use remote::RemoteStore;

/// Cursor value that starts a set scan, and that a scan returns once the
/// whole set has been visited
pub const SCAN_START: u64 = 0;

/// One step of a set scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetScan {
    /// Members visited by this step
    pub members: Vec<String>,

    /// Cursor for the next step, [`SCAN_START`] when the scan is complete
    pub cursor: u64,
}

/// A key-value store client
///
/// Implementations must be safe to share between threads. Every call takes
/// the caller's [`Context`] and fails with `Cancelled` / `DeadlineExceeded`
/// once it is cancelled or expired.
pub trait KvStore: Send + Sync {
    /// Value at `key`, if any
    fn get(&self, ctx: &Context, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set `key` only if it is absent. Returns whether the value was written.
    fn set_nx(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<bool>;

    /// Set `key` only if it exists. Returns whether the value was written.
    fn set_xx(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<bool>;

    /// Delete `key`. Returns whether it existed.
    fn del(&self, ctx: &Context, key: &str) -> Result<bool>;

    /// Add `member` to `set`. Returns whether it was newly added.
    fn sadd(&self, ctx: &Context, set: &str, member: &str) -> Result<bool>;

    /// Remove `member` from `set`. Returns whether it was present.
    fn srem(&self, ctx: &Context, set: &str, member: &str) -> Result<bool>;

    /// Visit up to `count` members of `set` starting at `cursor`
    fn sscan(&self, ctx: &Context, set: &str, cursor: u64, count: usize) -> Result<SetScan>;

    /// Values of `keys`, in the same order, `None` for absent keys
    fn mget(&self, ctx: &Context, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Apply `batch` atomically: every op takes effect or none does
    fn exec(&self, ctx: &Context, batch: &Batch) -> Result<BatchOutcome>;

    /// Health check
    fn ping(&self, ctx: &Context) -> Result<()>;
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, ctx: &Context, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(ctx, key)
    }

    fn set_nx(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<bool> {
        (**self).set_nx(ctx, key, value)
    }

    fn set_xx(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<bool> {
        (**self).set_xx(ctx, key, value)
    }

    fn del(&self, ctx: &Context, key: &str) -> Result<bool> {
        (**self).del(ctx, key)
    }

    fn sadd(&self, ctx: &Context, set: &str, member: &str) -> Result<bool> {
        (**self).sadd(ctx, set, member)
    }

    fn srem(&self, ctx: &Context, set: &str, member: &str) -> Result<bool> {
        (**self).srem(ctx, set, member)
    }

    fn sscan(&self, ctx: &Context, set: &str, cursor: u64, count: usize) -> Result<SetScan> {
        (**self).sscan(ctx, set, cursor, count)
    }

    fn mget(&self, ctx: &Context, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        (**self).mget(ctx, keys)
    }

    fn exec(&self, ctx: &Context, batch: &Batch) -> Result<BatchOutcome> {
        (**self).exec(ctx, batch)
    }

    fn ping(&self, ctx: &Context) -> Result<()> {
        (**self).ping(ctx)
    }
}

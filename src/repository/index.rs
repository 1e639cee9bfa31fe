//! Membership index
//!
//! The secondary structure listing the key of every stored order, so the
//! orders can be enumerated page by page. Index writes go through the same
//! [`Transaction`] as the primary record, which keeps the two in step.

use std::fmt;
use std::str::FromStr;

use super::Transaction;
use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::store::{KvStore, SCAN_START};

/// Opaque resume position of an index scan
///
/// `Cursor::start()` requests the first page. A finished scan is reported
/// as `None` in [`ScanPage::next`], never as a cursor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor(u64);

impl Cursor {
    /// Position of the first page
    pub fn start() -> Self {
        Cursor(SCAN_START)
    }

    pub fn is_start(&self) -> bool {
        self.0 == SCAN_START
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cursor {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(Cursor)
    }
}

/// One page of index keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<String>,

    /// Where to resume, `None` once the whole index has been visited
    pub next: Option<Cursor>,
}

/// Enumeration index over the keys of stored records
///
/// `add` and `remove` only queue ops on the caller's transaction; they take
/// effect when it commits. `scan` reads the index directly.
pub trait MembershipIndex: Send + Sync {
    fn add<S: KvStore + ?Sized>(&self, txn: &mut Transaction<'_, S>, key: &str);

    fn remove<S: KvStore + ?Sized>(&self, txn: &mut Transaction<'_, S>, key: &str);

    /// Up to `size` keys starting at `cursor`
    fn scan<S: KvStore + ?Sized>(
        &self,
        store: &S,
        ctx: &Context,
        cursor: Cursor,
        size: usize,
    ) -> Result<ScanPage>;
}

/// Membership index stored as one store-side set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetIndex {
    set: String,
}

impl SetIndex {
    pub fn new(set: impl Into<String>) -> Self {
        Self { set: set.into() }
    }

    /// Store key of the backing set
    pub fn set_key(&self) -> &str {
        &self.set
    }
}

impl Default for SetIndex {
    fn default() -> Self {
        Self::new("orders")
    }
}

impl MembershipIndex for SetIndex {
    fn add<S: KvStore + ?Sized>(&self, txn: &mut Transaction<'_, S>, key: &str) {
        txn.sadd(&self.set, key);
    }

    fn remove<S: KvStore + ?Sized>(&self, txn: &mut Transaction<'_, S>, key: &str) {
        txn.srem(&self.set, key);
    }

    fn scan<S: KvStore + ?Sized>(
        &self,
        store: &S,
        ctx: &Context,
        cursor: Cursor,
        size: usize,
    ) -> Result<ScanPage> {
        if size == 0 {
            return Err(StoreError::Protocol("scan size must be positive".to_string()));
        }

        let step = store.sscan(ctx, &self.set, cursor.0, size)?;
        let next = (step.cursor != SCAN_START).then_some(Cursor(step.cursor));

        Ok(ScanPage {
            keys: step.members,
            next,
        })
    }
}

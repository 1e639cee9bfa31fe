//! Repository Module
//!
//! Order persistence over a `KvStore`.
//!
//! ## Components
//! - `txn`: atomic batches with explicit commit/discard
//! - `index`: membership index and cursor scan
//! - `order`: the public repository operations

mod txn;
mod index;
mod order;

pub use txn::Transaction;
pub use index::{Cursor, MembershipIndex, ScanPage, SetIndex};
pub use order::{FindAllPage, FindResult, OrderRepository};

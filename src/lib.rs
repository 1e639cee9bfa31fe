//! # orderkv
//!
//! Order persistence over a key-value store with:
//! - Atomic create/delete of a record together with its index entry
//! - Conditional update of existing records only
//! - Cursor-based, bounded pagination over a membership index
//! - A TCP store server and a pooled client for remote use
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    OrderRepository                           │
//! │   insert · find_by_id · update · delete_by_id · find_all     │
//! └──────┬───────────────────┬──────────────────────┬───────────┘
//!        │                   │                      │
//!        ▼                   ▼                      ▼
//!  ┌───────────┐     ┌──────────────┐      ┌────────────────┐
//!  │ KeyCodec  │     │ Transaction  │      │ MembershipIndex│
//!  │ Serializer│     │ (atomic EXEC)│      │ (cursor scan)  │
//!  └───────────┘     └──────┬───────┘      └───────┬────────┘
//!                           │                      │
//!                           ▼                      ▼
//!                   ┌─────────────────────────────────────┐
//!                   │         KvStore (trait)              │
//!                   │   MemoryStore  |  RemoteStore ──TCP──┼──▶ Server
//!                   └─────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod context;

pub mod model;
pub mod key;
pub mod serializer;
pub mod store;
pub mod repository;
pub mod network;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, RepoError, RepoOp, RepoResult, Result, StoreError};
pub use config::Config;
pub use context::Context;
pub use model::{LineItem, Order, OrderId};
pub use repository::{Cursor, FindAllPage, FindResult, OrderRepository};
pub use store::{KvStore, MemoryStore, RemoteStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of orderkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

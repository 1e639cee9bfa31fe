//! Atomic batch definitions
//!
//! A batch is an ordered list of mutations applied as one unit. Conditional
//! ops carry a precondition; the first failing precondition aborts the
//! whole batch and nothing in it takes effect.

use serde::{Deserialize, Serialize};

/// A mutation inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    /// Set a value; precondition: key absent
    SetNx { key: String, value: Vec<u8> },

    /// Set a value; precondition: key present
    SetXx { key: String, value: Vec<u8> },

    /// Delete a value; precondition: key present
    Del { key: String },

    /// Add a set member (unconditional)
    SAdd { set: String, member: String },

    /// Remove a set member (unconditional)
    SRem { set: String, member: String },
}

impl BatchOp {
    /// Short command name for logs
    pub fn name(&self) -> &'static str {
        match self {
            BatchOp::SetNx { .. } => "SETNX",
            BatchOp::SetXx { .. } => "SETXX",
            BatchOp::Del { .. } => "DEL",
            BatchOp::SAdd { .. } => "SADD",
            BatchOp::SRem { .. } => "SREM",
        }
    }
}

/// Ordered group of ops executed atomically by `KvStore::exec`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: BatchOp) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<Vec<BatchOp>> for Batch {
    fn from(ops: Vec<BatchOp>) -> Self {
        Self { ops }
    }
}

/// Result of executing a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOutcome {
    /// Every op was applied
    Committed,

    /// The op at `index` failed its precondition; nothing was applied
    Aborted { index: usize },
}

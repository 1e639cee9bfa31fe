//! Key codec
//!
//! Maps an order id to its primary record key: `{prefix}:{order_id}`.
//! The prefix never contains `:` (enforced by `Config::validate`), and the
//! decimal rendering of a `u64` is unique, so the mapping is injective.

use crate::model::OrderId;

/// Builds primary record keys for one key space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: String,
}

impl KeyCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Store key of the order with `id`
    pub fn key(&self, id: OrderId) -> String {
        format!("{}:{}", self.prefix, id)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new("order")
    }
}

//! Order model
//!
//! Passive records persisted by the repository. Field names on the wire
//! follow the stored JSON layout (`order_id`, `cust_id`, `line_items`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-assigned primary key of an order
pub type OrderId = u64;

/// An order and its line items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,

    /// External customer identifier, not validated here
    #[serde(rename = "cust_id")]
    pub customer_id: Uuid,

    pub line_items: Vec<LineItem>,

    pub created_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One line of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_id: Uuid,
    pub quantity: u64,
    /// Smallest currency unit
    pub price: u64,
}

impl Order {
    /// An order with no line items and no timestamps
    pub fn new(order_id: OrderId, customer_id: Uuid) -> Self {
        Self {
            order_id,
            customer_id,
            line_items: Vec::new(),
            created_at: None,
            shipped_at: None,
            completed_at: None,
        }
    }

    pub fn with_item(mut self, item: LineItem) -> Self {
        self.line_items.push(item);
        self
    }
}

impl LineItem {
    pub fn new(item_id: Uuid, quantity: u64, price: u64) -> Self {
        Self {
            item_id,
            quantity,
            price,
        }
    }
}

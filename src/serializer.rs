//! Entity serializer
//!
//! Orders are stored as JSON documents.

use crate::model::Order;

/// Encode an order to its stored JSON bytes
pub fn encode_order(order: &Order) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(order)
}

/// Decode an order from stored JSON bytes
pub fn decode_order(bytes: &[u8]) -> serde_json::Result<Order> {
    serde_json::from_slice(bytes)
}

//! Response definitions
//!
//! Represents responses to store clients.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::store::BatchOutcome;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    Error = 0x01,
}

/// Typed result of a successful command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// GET
    Value(Option<Vec<u8>>),

    /// SETNX, SETXX, DEL, SADD, SREM
    Flag(bool),

    /// SSCAN
    Scan { members: Vec<String>, cursor: u64 },

    /// MGET
    Values(Vec<Option<Vec<u8>>>),

    /// EXEC
    Batch(BatchOutcome),

    /// PING
    Pong,
}

/// A response to send to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// bincode-encoded `Reply` for OK, UTF-8 message for ERROR
    pub payload: Vec<u8>,
}

impl Response {
    /// Create an OK response carrying `reply`
    pub fn ok(reply: &Reply) -> Result<Self> {
        Ok(Self {
            status: Status::Ok,
            payload: super::codec::encode_payload(reply)?,
        })
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: message.as_bytes().to_vec(),
        }
    }

    /// Turn the response back into a reply, or the server's error
    pub fn into_reply(self) -> Result<Reply> {
        match self.status {
            Status::Ok => super::codec::decode_payload(&self.payload),
            Status::Error => Err(StoreError::Server(
                String::from_utf8_lossy(&self.payload).into_owned(),
            )),
        }
    }
}

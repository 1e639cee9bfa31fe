//! Protocol Module
//!
//! Defines the wire protocol between `RemoteStore` and the orderkv server.
//!
//! ## Protocol Format (V1 - Framed bincode)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: GET     0x02: SETNX   0x03: SETXX   0x04: DEL
//! - 0x05: SADD    0x06: SREM    0x07: SSCAN   0x08: MGET
//! - 0x09: EXEC    0x0A: PING
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK    (payload: bincode `Reply`)
//! - 0x01: ERROR (payload: UTF-8 message)

mod command;
mod response;
mod codec;

pub use command::{Command, CommandType};
pub use response::{Reply, Response, Status};
pub use codec::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};

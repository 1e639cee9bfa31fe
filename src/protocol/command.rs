//! Command definitions
//!
//! Represents requests from store clients.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::Batch;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Get = 0x01,
    SetNx = 0x02,
    SetXx = 0x03,
    Del = 0x04,
    SAdd = 0x05,
    SRem = 0x06,
    SScan = 0x07,
    MGet = 0x08,
    Exec = 0x09,
    Ping = 0x0A,
}

impl TryFrom<u8> for CommandType {
    type Error = StoreError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        let cmd_type = match byte {
            0x01 => CommandType::Get,
            0x02 => CommandType::SetNx,
            0x03 => CommandType::SetXx,
            0x04 => CommandType::Del,
            0x05 => CommandType::SAdd,
            0x06 => CommandType::SRem,
            0x07 => CommandType::SScan,
            0x08 => CommandType::MGet,
            0x09 => CommandType::Exec,
            0x0A => CommandType::Ping,
            _ => {
                return Err(StoreError::Protocol(format!(
                    "Unknown command type: 0x{:02x}",
                    byte
                )))
            }
        };
        Ok(cmd_type)
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Get a value by key
    Get { key: String },

    /// Set a value if the key is absent
    SetNx { key: String, value: Vec<u8> },

    /// Set a value if the key exists
    SetXx { key: String, value: Vec<u8> },

    /// Delete a key
    Del { key: String },

    /// Add a member to a set
    SAdd { set: String, member: String },

    /// Remove a member from a set
    SRem { set: String, member: String },

    /// Scan a set from a cursor
    SScan { set: String, cursor: u64, count: u32 },

    /// Get many values
    MGet { keys: Vec<String> },

    /// Execute a batch atomically
    Exec { batch: Batch },

    /// Ping (health check)
    Ping,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::SetNx { .. } => CommandType::SetNx,
            Command::SetXx { .. } => CommandType::SetXx,
            Command::Del { .. } => CommandType::Del,
            Command::SAdd { .. } => CommandType::SAdd,
            Command::SRem { .. } => CommandType::SRem,
            Command::SScan { .. } => CommandType::SScan,
            Command::MGet { .. } => CommandType::MGet,
            Command::Exec { .. } => CommandType::Exec,
            Command::Ping => CommandType::Ping,
        }
    }
}

//! Error types for orderkv
//!
//! Two layers:
//! - [`StoreError`]: failures of the key-value store or the transport to it
//! - [`RepoError`]: the repository taxonomy handed to callers, each variant
//!   annotated with the operation that failed

use std::fmt;

use thiserror::Error;

use crate::model::OrderId;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Result type alias for repository operations
pub type RepoResult<T> = std::result::Result<T, RepoError>;

/// Errors raised by a key-value store or its transport
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Wire Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The server executed the command and reported a failure
    #[error("Server error: {0}")]
    Server(String),

    // -------------------------------------------------------------------------
    // Call Context Errors
    // -------------------------------------------------------------------------
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Repository operation a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoOp {
    Insert,
    FindById,
    Update,
    DeleteById,
    FindAll,
}

impl fmt::Display for RepoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepoOp::Insert => "insert",
            RepoOp::FindById => "find_by_id",
            RepoOp::Update => "update",
            RepoOp::DeleteById => "delete_by_id",
            RepoOp::FindAll => "find_all",
        };
        f.write_str(name)
    }
}

/// Flat classification of a [`RepoError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotExist,
    AlreadyExists,
    EncodeFailure,
    DecodeFailure,
    TransportFailure,
}

/// Errors returned by the order repository
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{op}: order {id} does not exist")]
    NotExist { op: RepoOp, id: OrderId },

    #[error("{op}: order {id} already exists")]
    AlreadyExists { op: RepoOp, id: OrderId },

    #[error("{op}: failed to encode order: {source}")]
    Encode {
        op: RepoOp,
        #[source]
        source: serde_json::Error,
    },

    #[error("{op}: failed to decode order at {key}: {source}")]
    Decode {
        op: RepoOp,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{op}: store failure: {source}")]
    Transport {
        op: RepoOp,
        #[source]
        source: StoreError,
    },
}

impl RepoError {
    /// The taxonomy bucket of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepoError::NotExist { .. } => ErrorKind::NotExist,
            RepoError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            RepoError::Encode { .. } => ErrorKind::EncodeFailure,
            RepoError::Decode { .. } => ErrorKind::DecodeFailure,
            RepoError::Transport { .. } => ErrorKind::TransportFailure,
        }
    }

    /// The operation that failed
    pub fn op(&self) -> RepoOp {
        match self {
            RepoError::NotExist { op, .. }
            | RepoError::AlreadyExists { op, .. }
            | RepoError::Encode { op, .. }
            | RepoError::Decode { op, .. }
            | RepoError::Transport { op, .. } => *op,
        }
    }

    pub(crate) fn transport(op: RepoOp) -> impl FnOnce(StoreError) -> RepoError {
        move |source| RepoError::Transport { op, source }
    }
}

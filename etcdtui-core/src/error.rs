use thiserror::Error;

use crate::session::Mode;

/// Failures reported by a [`KvStore`](crate::store::KvStore) implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Backend(String),
}

/// The store call an [`AppError::StoreOperationFailed`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    Put,
    Delete,
    List,
    Watch,
    Count,
    Status,
    Connect,
}

impl StoreOp {
    pub fn label(&self) -> &'static str {
        match self {
            StoreOp::Get => "get",
            StoreOp::Put => "put",
            StoreOp::Delete => "delete",
            StoreOp::List => "list",
            StoreOp::Watch => "watch",
            StoreOp::Count => "count",
            StoreOp::Status => "status",
            StoreOp::Connect => "connect",
        }
    }
}

/// Everything an operator command can fail with.
///
/// Each variant renders as a single terse status line.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("not connected to etcd")]
    NotConnected,

    #[error("{} failed: {reason}", op.label())]
    StoreOperationFailed { op: StoreOp, reason: String },

    #[error("invalid input: {0}")]
    ValidationFailed(String),

    #[error("rename incomplete: deleted {old} but failed to write {new} ({reason}); both keys are now absent")]
    PartialRename {
        old: String,
        new: String,
        reason: String,
    },

    #[error("watch on {key} interrupted: {reason}")]
    WatchInterrupted { key: String, reason: String },

    #[error("no key selected")]
    NoSelection,

    #[error("{} is already open", active.label())]
    AlreadyActive { active: Mode },
}

impl AppError {
    pub fn store(op: StoreOp, err: StoreError) -> Self {
        AppError::StoreOperationFailed {
            op,
            reason: err.to_string(),
        }
    }
}

//! Service Layer Error Types
//!
//! Errors returned to callers of the node, query and transfer services. The
//! variants fall into three categories a caller can tell apart: the data is
//! wrong (validation), the store state changed (domain outcomes), or the
//! network failed (transport).

use crate::models::NodeError;
use crate::schema::SchemaError;
use crate::transport::{StoreError, TransportError};
use crate::validation::{join_messages, LinkageViolation, Violation};
use std::path::PathBuf;
use thiserror::Error;

fn summarize(violations: &[Violation], linkages: &[LinkageViolation]) -> String {
    match (violations.is_empty(), linkages.is_empty()) {
        (false, true) => join_messages(violations),
        (true, false) => join_messages(linkages),
        _ => format!("{}; {}", join_messages(violations), join_messages(linkages)),
    }
}

/// Service operation errors
#[derive(Error, Debug)]
pub enum NodeServiceError {
    /// Local checks failed; nothing was sent to the store
    #[error("Schema violation on {node_type}: {}", summarize(.violations, .linkages))]
    SchemaViolation {
        node_type: String,
        violations: Vec<Violation>,
        linkages: Vec<LinkageViolation>,
    },

    /// Linkage targets resolved to missing nodes or disallowed types
    #[error("Linkage violation on {node_type}: {}", join_messages(.violations))]
    LinkageViolation {
        node_type: String,
        violations: Vec<LinkageViolation>,
    },

    /// The store holds a newer version; reload and retry
    #[error("Node {id} is stale: saved with version {expected}, store has {}", .actual.map(|v| v.to_string()).unwrap_or_else(|| "a newer version".to_string()))]
    StaleNode {
        id: String,
        expected: u64,
        actual: Option<u64>,
    },

    #[error("Node not found: {id}")]
    NotFound { id: String },

    #[error("Store rejected the node (HTTP {status}): {message}")]
    StoreRejected { status: u16, message: String },

    /// The write may or may not have been applied; `load` to reconcile
    #[error("Outcome of {operation} on {} is unknown: {reason}", .id.as_deref().unwrap_or("new node"))]
    AmbiguousWriteOutcome {
        operation: &'static str,
        id: Option<String>,
        reason: String,
    },

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The entity cannot be used for this operation in its current state
    #[error("Invalid node state: {reason}")]
    InvalidState { reason: String },

    #[error("Unknown node type: {name}")]
    UnknownNodeType { name: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl NodeServiceError {
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    pub fn unknown_node_type(name: impl Into<String>) -> Self {
        Self::UnknownNodeType { name: name.into() }
    }

    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// A transport failure that might succeed if the caller tries again
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_transient())
    }

    /// The store's state differs from what the caller assumed
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::StaleNode { .. }
                | Self::NotFound { .. }
                | Self::StoreRejected { .. }
                | Self::AmbiguousWriteOutcome { .. }
        )
    }

    /// The caller's data does not satisfy the schema
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::SchemaViolation { .. } | Self::LinkageViolation { .. } | Self::UnknownNodeType { .. }
        )
    }
}

impl From<StoreError> for NodeServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => Self::NotFound { id },
            StoreError::VersionConflict {
                id,
                expected,
                actual,
            } => Self::StaleNode {
                id,
                expected,
                actual,
            },
            StoreError::Rejected { status, message } => Self::StoreRejected { status, message },
            StoreError::AmbiguousWrite {
                operation,
                id,
                reason,
            } => Self::AmbiguousWriteOutcome {
                operation,
                id,
                reason,
            },
            StoreError::Transport(err) => Self::Transport(err),
        }
    }
}

impl From<SchemaError> for NodeServiceError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::UnknownNodeType(name) => Self::UnknownNodeType { name },
            other => Self::Serialization(other.to_string()),
        }
    }
}

impl From<NodeError> for NodeServiceError {
    fn from(err: NodeError) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// File transfer failures; never retried automatically
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Failed to start transfer tool '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// The tool ran and reported failure; `diagnostic` is its own output
    #[error("Transfer tool exited with {}: {diagnostic}", .status.map(|c| format!("status {c}")).unwrap_or_else(|| "a signal".to_string()))]
    ToolFailed {
        status: Option<i32>,
        diagnostic: String,
    },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Neither a local digest nor the tool's report covers the algorithm
    #[error("Cannot verify {algorithm} checksum of {path:?}")]
    Unverifiable { algorithm: String, path: PathBuf },

    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Local file {path:?}: {reason}")]
    LocalFile { path: PathBuf, reason: String },

    #[error("Invalid transfer request: {0}")]
    InvalidRequest(String),
}

impl TransferError {
    pub fn local_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::LocalFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}

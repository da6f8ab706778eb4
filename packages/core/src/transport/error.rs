//! Transport Error Types
//!
//! `TransportError` covers failures of the channel itself. `StoreError` adds
//! the outcomes the store reports about a well-formed request.

use thiserror::Error;

/// Failures talking to the store
#[derive(Error, Debug)]
pub enum TransportError {
    /// The connection could not be established; nothing was sent
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Store refused the credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("Store returned HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Failed to decode store response: {0}")]
    Decode(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid session configuration: {0}")]
    Config(String),
}

impl TransportError {
    pub fn connect(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connect {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether repeating the request could succeed
    ///
    /// Callers must still only repeat requests that are safe to repeat.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::Timeout { .. } => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());

        if err.is_connect() {
            Self::Connect {
                url,
                reason: err.to_string(),
            }
        } else if err.is_timeout() {
            Self::Timeout { url }
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Outcomes of store operations other than success
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Node not found: {id}")]
    NotFound { id: String },

    /// The optimistic concurrency check failed
    #[error("Version conflict on node {id}: expected version {expected}")]
    VersionConflict {
        id: String,
        expected: u64,
        actual: Option<u64>,
    },

    /// The store refused the document itself
    #[error("Store rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// A write was dispatched but its outcome is unknown
    #[error("Outcome of {operation} on {} is unknown: {reason}", .id.as_deref().unwrap_or("new node"))]
    AmbiguousWrite {
        operation: &'static str,
        id: Option<String>,
        reason: String,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn version_conflict(id: impl Into<String>, expected: u64, actual: Option<u64>) -> Self {
        Self::VersionConflict {
            id: id.into(),
            expected,
            actual,
        }
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    pub fn ambiguous(
        operation: &'static str,
        id: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Self::AmbiguousWrite {
            operation,
            id: id.map(str::to_string),
            reason: reason.into(),
        }
    }
}

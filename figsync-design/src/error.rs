//! Error types for figsync-design.

use std::path::PathBuf;

use thiserror::Error;

use figsync_core::{DocumentId, NodeId, Transient};

/// Failures fetching a design document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The token was rejected (HTTP 401/403).
    #[error("design API rejected the token (HTTP {status})")]
    Unauthorized { status: u16 },

    /// The document does not exist or is not visible to the token.
    #[error("design document '{document}' not found")]
    NotFound { document: DocumentId },

    /// Rate limiting, 5xx, timeouts, connection failures.
    #[error("design API unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    /// A success response whose body is not a design document.
    #[error("malformed design API response: {reason}")]
    MalformedResponse { reason: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Reading a local design document failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Transient for FetchError {
    fn is_transient(&self) -> bool {
        matches!(self, FetchError::UpstreamUnavailable { .. })
    }
}

/// Structurally invalid design input, always naming the offending node.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("node id '{node_id}' appears more than once in the document")]
    DuplicateNodeId { node_id: NodeId },

    #[error("node '{node_id}' is nested deeper than {max_depth} levels")]
    TooDeep { node_id: NodeId, max_depth: usize },

    /// Canonical encoding of the intermediate tree failed.
    #[error("failed to encode intermediate tree: {0}")]
    Encode(#[from] serde_json::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.into(),
        source,
    }
}

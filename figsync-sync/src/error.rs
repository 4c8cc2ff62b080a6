//! Error types for figsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use figsync_core::{ConfigError, Transient};
use figsync_design::{FetchError, GenerationError};
use figsync_renderer::RenderError;

/// Failures reported by a version-control host.
#[derive(Debug, Error)]
pub enum HostError {
    /// Rate limiting, 5xx, timeouts, connection failures.
    #[error("host unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("permission denied by host: {message}")]
    PermissionDenied { message: String },

    #[error("not found on host: {what}")]
    NotFound { what: String },

    /// The object or ref already exists.
    #[error("conflict on host: {what}")]
    Conflict { what: String },

    /// Any other refusal.
    #[error("host rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl Transient for HostError {
    fn is_transient(&self) -> bool {
        matches!(self, HostError::Unavailable { .. })
    }
}

/// Failures building the commit and branch for a file set.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The base branch is missing, or vanished while the branch was built.
    #[error("base branch '{branch}' moved: {detail}")]
    BaseBranchMoved { branch: String, detail: String },

    /// A blob, tree or commit write failed after the retry budget.
    #[error("failed to write {object}: {source}")]
    ObjectWriteFailed {
        object: String,
        #[source]
        source: HostError,
    },

    /// The generated branch name is already taken by another ref.
    #[error("branch '{branch}' already exists")]
    BranchNameCollision { branch: String },

    /// A read (head, tree listing) failed after the retry budget.
    #[error("host {operation} failed: {source}")]
    Host {
        operation: &'static str,
        #[source]
        source: HostError,
    },
}

/// Failures opening or updating the change request.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("host unavailable while publishing: {source}")]
    HostUnavailable {
        #[source]
        source: HostError,
    },

    #[error("host denied the change request: {message}")]
    PermissionDenied { message: String },

    #[error("host rejected the change request: {source}")]
    Rejected {
        #[source]
        source: HostError,
    },
}

impl From<HostError> for PublishError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Unavailable { .. } => PublishError::HostUnavailable { source: err },
            HostError::PermissionDenied { message } => PublishError::PermissionDenied { message },
            other => PublishError::Rejected { source: other },
        }
    }
}

/// Failures reading or writing the last-published snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot store JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything `synchronize` can fail with.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetching the design document failed: {0}")]
    UpstreamFetch(#[from] FetchError),

    #[error("design document is structurally invalid: {0}")]
    Generation(#[from] GenerationError),

    #[error("code generation failed: {0}")]
    Render(#[from] RenderError),

    #[error("building the snapshot failed: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("publishing the change request failed: {0}")]
    Publish(#[from] PublishError),

    #[error("host client error: {0}")]
    Host(#[from] HostError),

    #[error("snapshot store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

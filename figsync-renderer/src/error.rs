//! Error types for figsync-renderer.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from generating files.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error, naming the template where Tera does.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// JSON serialization error (tera context or manifest).
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while loading user templates.
    #[error("template io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    /// The configured output prefix cannot be used as a repository path.
    #[error("invalid target prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: &'static str },

    /// Two generated files mapped to the same path.
    #[error("generated path '{0}' was produced twice")]
    PathCollision(String),
}

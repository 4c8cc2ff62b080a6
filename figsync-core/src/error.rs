//! Error types for figsync-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::DocumentId;

/// All errors that can arise from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.figsync/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}; run `figsync init` first")]
    NotFound { path: PathBuf },

    /// No token in the config file and none in the environment.
    #[error("no {what} token configured; set {env} or add it to the config file")]
    MissingToken { what: &'static str, env: &'static str },

    /// A document id that has no `documents[]` entry.
    #[error("document '{0}' is not configured")]
    UnknownDocument(DocumentId),

    /// A configured value failed validation.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

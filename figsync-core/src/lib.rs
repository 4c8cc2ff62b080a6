//! figsync core library: domain types, configuration, retry policy, errors.
//!
//! - [`types`]: design document, intermediate tree, generated file set
//! - [`config`]: `~/.figsync/config.yaml` load / save / init
//! - [`retry`]: bounded exponential backoff shared by every network client
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::{ConcurrencyPolicy, Config, DocumentConfig, PublishConfig};
pub use error::ConfigError;
pub use retry::{retry, RetryPolicy, Transient};
pub use types::{
    DesignDocument, DesignNode, DocumentId, DocumentMetadata, GeneratedFileSet, IntermediateTree,
    IrKind, IrNode, NodeId, NodeKind, Screen, TreeHash,
};

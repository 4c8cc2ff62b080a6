//! Version-control host capability.
//!
//! [`VcsHost`] is the narrow set of git-data and change-request operations
//! the builder and publisher need. Object ids are opaque strings chosen by
//! the host. Implementations:
//!
//! - [`GitHubHost`]: REST v3 git-data and pulls APIs
//! - [`MemoryHost`]: in-memory, content-addressed, counts every write

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HostError;

pub mod github;
pub mod memory;

pub use github::GitHubHost;
pub use memory::{HostOp, MemoryHost};

/// One blob in a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub sha: String,
}

/// One change layered onto a base tree. `sha: None` deletes the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeChange {
    pub path: String,
    pub sha: Option<String>,
}

/// An existing change request on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequestRef {
    pub number: u64,
    pub url: String,
    pub head: String,
    pub base: String,
    pub title: String,
}

/// Content of a change request to open or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChangeRequest {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait VcsHost: Send + Sync {
    async fn default_branch(&self) -> Result<String, HostError>;

    /// Live head commit of `branch`, `None` if the branch does not exist.
    async fn branch_head(&self, branch: &str) -> Result<Option<String>, HostError>;

    /// Root tree of a commit.
    async fn commit_tree(&self, commit: &str) -> Result<String, HostError>;

    /// Every blob reachable from `tree`, with full paths.
    async fn read_tree(&self, tree: &str) -> Result<Vec<TreeEntry>, HostError>;

    /// Store UTF-8 content; returns the blob id. Idempotent.
    async fn create_blob(&self, content: &str) -> Result<String, HostError>;

    /// New tree equal to `base_tree` with `changes` applied.
    async fn create_tree(&self, base_tree: &str, changes: &[TreeChange])
        -> Result<String, HostError>;

    /// Commit with exactly one parent.
    async fn create_commit(&self, message: &str, tree: &str, parent: &str)
        -> Result<String, HostError>;

    /// Create a new ref. An existing ref is `HostError::Conflict`, never moved.
    async fn create_branch(&self, branch: &str, commit: &str) -> Result<(), HostError>;

    async fn delete_branch(&self, branch: &str) -> Result<(), HostError>;

    /// Most recent open request whose head starts with `head_prefix`.
    async fn find_open_change_request(
        &self,
        head_prefix: &str,
        base: &str,
    ) -> Result<Option<ChangeRequestRef>, HostError>;

    async fn open_change_request(
        &self,
        request: &NewChangeRequest,
    ) -> Result<ChangeRequestRef, HostError>;

    /// Point `existing` at the new head and content, leaving one open request.
    async fn update_change_request(
        &self,
        existing: &ChangeRequestRef,
        request: &NewChangeRequest,
    ) -> Result<ChangeRequestRef, HostError>;
}

//! Version-control snapshot builder.
//!
//! Turns a [`GeneratedFileSet`] into host objects: blobs, one tree layered
//! on the live base tree, one single-parent commit, and a fresh branch.
//!
//! ## Race points
//!
//! Two steps observe state other writers can change: resolving the base
//! head, and creating the branch ref. The builder never caches the base
//! head, and it only ever creates refs. Every build gets its own branch
//! name (timestamp, tree hash and a random suffix), and an existing ref is
//! never updated or force-pushed. Concurrent builds for the same document
//! therefore end up on independent branches instead of overwriting each
//! other. After the branch exists the base head is read again; movement is
//! reported as [`BaseMoved`] and left for review, a vanished base branch
//! is an error.
//!
//! Blobs, trees and commits are unreachable until the ref exists, so a
//! build abandoned at any earlier step leaves nothing visible behind.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;

use figsync_core::{retry, DocumentId, GeneratedFileSet, PublishConfig, RetryPolicy};

use crate::diff::SnapshotDelta;
use crate::error::{HostError, SnapshotError};
use crate::host::{TreeChange, VcsHost};
use crate::snapshot_store::PublishedSnapshot;

/// Everything one build needs.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub document: &'a DocumentId,
    pub base_branch: &'a str,
    pub files: &'a GeneratedFileSet,
    pub delta: &'a SnapshotDelta,
    pub previous: Option<&'a PublishedSnapshot>,
    pub message: &'a str,
}

/// The base branch advanced while the build was running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaseMoved {
    pub from: String,
    pub to: String,
}

/// Objects written for one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VcObjectGraph {
    /// Blob id per generated path.
    pub blobs: BTreeMap<String, String>,
    pub tree: String,
    pub commit: String,
    /// The base head the commit was built on.
    pub parent: String,
    pub branch: String,
    pub base_moved: Option<BaseMoved>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built(VcObjectGraph),
    /// The base tree already holds every generated file and no removed
    /// path; nothing was committed.
    AlreadyOnBase {
        base_head: String,
        blobs: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    branch_prefix: String,
    retry: RetryPolicy,
    blob_parallelism: usize,
}

/// `<prefix>/<doc-slug>/`, the namespace every branch for `document` lives in.
pub fn branch_namespace(prefix: &str, document: &DocumentId) -> String {
    format!("{}/{}/", prefix.trim_end_matches('/'), document_slug(document))
}

fn document_slug(document: &DocumentId) -> String {
    let mut slug = String::new();
    for c in document.0.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "document".to_string()
    } else {
        slug.to_string()
    }
}

impl SnapshotBuilder {
    pub fn new(config: &PublishConfig) -> Self {
        Self {
            branch_prefix: config.branch_prefix.clone(),
            retry: config.retry.clone(),
            blob_parallelism: config.blob_parallelism.max(1),
        }
    }

    /// A fresh branch name; never reused across builds.
    pub fn branch_name(&self, document: &DocumentId, files: &GeneratedFileSet) -> String {
        let random = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}{}-{}-{}",
            branch_namespace(&self.branch_prefix, document),
            Utc::now().format("%Y%m%dT%H%M%SZ"),
            files.provenance.short(8),
            &random[..6]
        )
    }

    pub async fn build(
        &self,
        host: &dyn VcsHost,
        request: BuildRequest<'_>,
    ) -> Result<BuildOutcome, SnapshotError> {
        let base_branch = request.base_branch;

        // 1. live base head
        let base_head = self.base_head(host, base_branch).await?;
        tracing::debug!(document = %request.document, branch = base_branch, head = %base_head, "resolved base head");

        // 2. base tree listing
        let base_tree = retry(&self.retry, "commit_tree", || host.commit_tree(&base_head))
            .await
            .map_err(|source| SnapshotError::Host {
                operation: "commit_tree",
                source,
            })?;
        let base_entries: HashMap<String, String> =
            retry(&self.retry, "read_tree", || host.read_tree(&base_tree))
                .await
                .map_err(|source| SnapshotError::Host {
                    operation: "read_tree",
                    source,
                })?
                .into_iter()
                .map(|e| (e.path, e.sha))
                .collect();

        // 3. blobs
        let blobs = self.write_blobs(host, &request, &base_entries).await?;

        // 4. tree overrides and deletions against the base
        let mut changes: Vec<TreeChange> = blobs
            .iter()
            .filter(|(path, sha)| base_entries.get(*path) != Some(*sha))
            .map(|(path, sha)| TreeChange {
                path: path.clone(),
                sha: Some(sha.clone()),
            })
            .collect();
        changes.extend(
            request
                .delta
                .removed
                .iter()
                .filter(|path| base_entries.contains_key(*path))
                .map(|path| TreeChange {
                    path: path.clone(),
                    sha: None,
                }),
        );
        if changes.is_empty() {
            tracing::info!(document = %request.document, branch = base_branch, "base branch already carries the generated files");
            return Ok(BuildOutcome::AlreadyOnBase { base_head, blobs });
        }

        let tree = retry(&self.retry, "create_tree", || {
            host.create_tree(&base_tree, &changes)
        })
        .await
        .map_err(|source| write_failed("tree", source))?;
        tracing::debug!(%tree, changes = changes.len(), "wrote tree");

        // 5. commit with exactly one parent
        let commit = retry(&self.retry, "create_commit", || {
            host.create_commit(request.message, &tree, &base_head)
        })
        .await
        .map_err(|source| write_failed("commit", source))?;
        tracing::debug!(%commit, parent = %base_head, "wrote commit");

        // 6. fresh branch
        let branch = self.branch_name(request.document, request.files);
        self.create_branch(host, &branch, &commit).await?;
        tracing::info!(document = %request.document, %branch, %commit, "created branch");

        // 7. re-check the base
        let base_moved = match retry(&self.retry, "branch_head", || host.branch_head(base_branch)).await {
            Ok(Some(now)) if now == base_head => None,
            Ok(Some(now)) => {
                tracing::warn!(
                    document = %request.document,
                    branch = base_branch,
                    from = %base_head,
                    to = %now,
                    "publish conflict: base branch moved during build"
                );
                Some(BaseMoved {
                    from: base_head.clone(),
                    to: now,
                })
            }
            Ok(None) => {
                delete_best_effort(host, &branch).await;
                return Err(SnapshotError::BaseBranchMoved {
                    branch: base_branch.to_string(),
                    detail: "branch was deleted during the build".to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(branch = base_branch, error = %e, "could not re-read base head");
                None
            }
        };

        Ok(BuildOutcome::Built(VcObjectGraph {
            blobs,
            tree,
            commit,
            parent: base_head,
            branch,
            base_moved,
        }))
    }

    async fn base_head(&self, host: &dyn VcsHost, branch: &str) -> Result<String, SnapshotError> {
        retry(&self.retry, "branch_head", || host.branch_head(branch))
            .await
            .map_err(|source| SnapshotError::Host {
                operation: "branch_head",
                source,
            })?
            .ok_or_else(|| SnapshotError::BaseBranchMoved {
                branch: branch.to_string(),
                detail: "branch does not exist".to_string(),
            })
    }

    /// Blob id for every generated path. Unchanged paths reuse the recorded
    /// id when the base tree already points at it; everything else is
    /// written, with bounded parallelism.
    async fn write_blobs(
        &self,
        host: &dyn VcsHost,
        request: &BuildRequest<'_>,
        base_entries: &HashMap<String, String>,
    ) -> Result<BTreeMap<String, String>, SnapshotError> {
        let mut blobs = BTreeMap::new();
        let mut pending: Vec<(&str, &str)> = Vec::new();
        for (path, content) in &request.files.files {
            let recorded = request
                .previous
                .filter(|_| request.delta.is_unchanged(path))
                .and_then(|p| p.blobs.get(path));
            match recorded {
                Some(sha) if base_entries.get(path) == Some(sha) => {
                    blobs.insert(path.clone(), sha.clone());
                }
                _ => pending.push((path.as_str(), content.as_str())),
            }
        }

        let reused = blobs.len();
        let written: Vec<(String, String)> = stream::iter(pending.into_iter().map(
            |(path, content)| async move {
                let sha = retry(&self.retry, "create_blob", || host.create_blob(content))
                    .await
                    .map_err(|source| write_failed(format!("blob for {path}"), source))?;
                tracing::debug!(path, blob = %sha, "wrote blob");
                Ok::<_, SnapshotError>((path.to_string(), sha))
            },
        ))
        .buffer_unordered(self.blob_parallelism)
        .try_collect()
        .await?;

        tracing::debug!(reused, written = written.len(), "blobs ready");
        blobs.extend(written);
        Ok(blobs)
    }

    /// Create `branch`, treating a conflict that already points at our
    /// commit as success (an earlier attempt landed but its response was lost).
    async fn create_branch(
        &self,
        host: &dyn VcsHost,
        branch: &str,
        commit: &str,
    ) -> Result<(), SnapshotError> {
        match retry(&self.retry, "create_branch", || host.create_branch(branch, commit)).await {
            Ok(()) => Ok(()),
            Err(HostError::Conflict { .. }) => match host.branch_head(branch).await {
                Ok(Some(head)) if head == commit => Ok(()),
                _ => Err(SnapshotError::BranchNameCollision {
                    branch: branch.to_string(),
                }),
            },
            Err(source) => Err(write_failed(format!("branch {branch}"), source)),
        }
    }
}

fn write_failed(object: impl Into<String>, source: HostError) -> SnapshotError {
    SnapshotError::ObjectWriteFailed {
        object: object.into(),
        source,
    }
}

/// Delete a branch this run created. Failures are logged, never returned.
pub(crate) async fn delete_best_effort(host: &dyn VcsHost, branch: &str) {
    match host.delete_branch(branch).await {
        Ok(()) => tracing::info!(%branch, "deleted branch"),
        Err(e) => tracing::warn!(%branch, error = %e, "failed to delete branch"),
    }
}

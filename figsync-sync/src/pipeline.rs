//! The `synchronize` entry point.
//!
//! fetch → normalize → generate → diff → build → publish → record.
//! Nothing touches the host until the design document has been fetched,
//! normalized and rendered, and an unchanged file set never reaches it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;

use figsync_core::{
    retry, ConcurrencyPolicy, Config, ConfigError, DocumentConfig, DocumentId, GeneratedFileSet,
    PublishConfig,
};
use figsync_design::{normalize, DesignClient, DesignSource};
use figsync_renderer::{GenerationPolicy, OutputPrefix, TemplatePolicy};

use crate::builder::{delete_best_effort, BaseMoved, BuildOutcome, BuildRequest, SnapshotBuilder};
use crate::diff::{compute_delta, render_unified, FileDiff, SnapshotDelta};
use crate::error::{SnapshotError, SyncError};
use crate::host::{GitHubHost, VcsHost};
use crate::publish::{title, ChangePublisher, ChangeRequest, PublishRequest};
use crate::snapshot_store::{
    ChangeRequestRecord, FileSnapshotStore, PublishedSnapshot, SnapshotStore,
};

/// A generated file set compared against the last publish. Computing one
/// makes no host calls.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub document: DocumentId,
    pub document_name: String,
    pub files: GeneratedFileSet,
    pub delta: SnapshotDelta,
    pub previous: Option<PublishedSnapshot>,
}

impl SyncPlan {
    pub fn diffs(&self) -> Vec<FileDiff> {
        render_unified(&self.files, self.previous.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOpReason {
    /// Identical to the last published snapshot.
    Unchanged,
    /// The base branch already carries exactly these files.
    AlreadyOnBase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoOpReport {
    pub document: DocumentId,
    pub reason: NoOpReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub document: DocumentId,
    pub branch: String,
    pub base_branch: String,
    pub commit: String,
    pub parent: String,
    pub delta: SnapshotDelta,
    pub change_request: ChangeRequest,
    /// Set when the base branch advanced during the build.
    pub base_moved: Option<BaseMoved>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Published(PublishReport),
    NoOp(NoOpReport),
}

pub struct Synchronizer {
    design: Arc<dyn DesignSource>,
    host: Arc<dyn VcsHost>,
    store: Arc<dyn SnapshotStore>,
    policy: Arc<dyn GenerationPolicy>,
    documents: HashMap<DocumentId, DocumentConfig>,
    concurrency: ConcurrencyPolicy,
    builder: SnapshotBuilder,
    publisher: ChangePublisher,
    retry: figsync_core::RetryPolicy,
    locks: Mutex<HashMap<DocumentId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Synchronizer {
    pub fn new(
        design: Arc<dyn DesignSource>,
        host: Arc<dyn VcsHost>,
        store: Arc<dyn SnapshotStore>,
        policy: Arc<dyn GenerationPolicy>,
        publish: &PublishConfig,
    ) -> Self {
        Self {
            design,
            host,
            store,
            policy,
            documents: HashMap::new(),
            concurrency: publish.concurrency,
            builder: SnapshotBuilder::new(publish),
            publisher: ChangePublisher::new(publish),
            retry: publish.retry.clone(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_document(mut self, document: DocumentConfig) -> Self {
        self.documents.insert(document.id.clone(), document);
        self
    }

    pub fn with_documents(self, documents: impl IntoIterator<Item = DocumentConfig>) -> Self {
        documents.into_iter().fold(self, Self::with_document)
    }

    /// Wire the HTTP design client, GitHub host, file snapshot store and
    /// template policy from configuration.
    pub fn from_config(config: &Config, home: &Path) -> Result<Self, SyncError> {
        config.validate()?;
        let timeout = config.publish.timeout();
        let design = DesignClient::new(
            &config.design.api_base,
            config.design_token()?,
            timeout,
            config.publish.retry.clone(),
        )?;
        let host = GitHubHost::new(
            &config.host.api_base,
            &config.host.owner,
            &config.host.repo,
            config.host_token()?,
            timeout,
        )?;
        let policy = TemplatePolicy::new(config.templates_dir.as_deref())?;
        Ok(Self::new(
            Arc::new(design),
            Arc::new(host),
            Arc::new(FileSnapshotStore::new(home)),
            Arc::new(policy),
            &config.publish,
        )
        .with_documents(config.documents.iter().cloned()))
    }

    fn document(&self, id: &DocumentId) -> Result<&DocumentConfig, SyncError> {
        self.documents
            .get(id)
            .ok_or_else(|| ConfigError::UnknownDocument(id.clone()).into())
    }

    fn lock_for(&self, id: &DocumentId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(id.clone()).or_default().clone()
    }

    /// Fetch, normalize, generate and diff without touching the host.
    pub async fn plan(&self, id: &DocumentId) -> Result<SyncPlan, SyncError> {
        let doc = self.document(id)?;
        let prefix = OutputPrefix::parse(&doc.target_prefix)?;

        let document = self.design.fetch(id).await?;
        let tree = normalize(&document)?;
        tracing::info!(document = %id, screens = tree.screens.len(), hash = tree.hash.short(12), "normalized design document");

        let files = self.policy.generate(&tree, &prefix)?;
        tracing::info!(document = %id, files = files.len(), "generated files");

        let previous = self.store.get(id)?;
        let delta = compute_delta(&files, previous.as_ref());
        tracing::info!(document = %id, delta = %delta.summary(), "computed delta");

        Ok(SyncPlan {
            document: id.clone(),
            document_name: tree.document_name,
            files,
            delta,
            previous,
        })
    }

    /// Run the whole pipeline for one configured document.
    pub async fn synchronize(&self, id: &DocumentId) -> Result<SyncOutcome, SyncError> {
        // Unknown ids fail before a guard is allocated for them.
        self.document(id)?;
        let lock = match self.concurrency {
            ConcurrencyPolicy::Serialize => Some(self.lock_for(id)),
            ConcurrencyPolicy::Race => None,
        };
        let _guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        tracing::info!(document = %id, "sync started");
        let plan = self.plan(id).await?;
        if plan.delta.is_no_op() {
            tracing::info!(document = %id, "no changes since last publish");
            return Ok(SyncOutcome::NoOp(NoOpReport {
                document: id.clone(),
                reason: NoOpReason::Unchanged,
            }));
        }

        let base_branch = self.base_branch(id).await?;
        let host = self.host.as_ref();
        let message = title(&plan.document_name, &plan.delta);
        let outcome = self
            .builder
            .build(
                host,
                BuildRequest {
                    document: id,
                    base_branch: &base_branch,
                    files: &plan.files,
                    delta: &plan.delta,
                    previous: plan.previous.as_ref(),
                    message: &message,
                },
            )
            .await?;

        let graph = match outcome {
            BuildOutcome::AlreadyOnBase { base_head, blobs } => {
                self.store.put(&PublishedSnapshot {
                    document: id.clone(),
                    files: plan.files,
                    blobs,
                    branch: base_branch.clone(),
                    base_branch,
                    change_request: None,
                    published_at: Utc::now(),
                })?;
                tracing::info!(document = %id, head = %base_head, "base already up to date; recorded snapshot");
                return Ok(SyncOutcome::NoOp(NoOpReport {
                    document: id.clone(),
                    reason: NoOpReason::AlreadyOnBase,
                }));
            }
            BuildOutcome::Built(graph) => graph,
        };

        let published = self
            .publisher
            .publish(
                host,
                PublishRequest {
                    document: id,
                    document_name: &plan.document_name,
                    graph: &graph,
                    base_branch: &base_branch,
                    delta: &plan.delta,
                    provenance: &plan.files.provenance,
                },
            )
            .await;
        let change_request = match published {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(document = %id, branch = %graph.branch, error = %e, "publish failed; removing branch");
                delete_best_effort(host, &graph.branch).await;
                return Err(e.into());
            }
        };

        self.store.put(&PublishedSnapshot {
            document: id.clone(),
            files: plan.files,
            blobs: graph.blobs.clone(),
            branch: graph.branch.clone(),
            base_branch: base_branch.clone(),
            change_request: Some(ChangeRequestRecord {
                number: change_request.number,
                url: change_request.url.clone(),
            }),
            published_at: Utc::now(),
        })?;

        tracing::info!(
            document = %id,
            branch = %graph.branch,
            request = change_request.number,
            "sync complete"
        );
        Ok(SyncOutcome::Published(PublishReport {
            document: id.clone(),
            branch: graph.branch,
            base_branch,
            commit: graph.commit,
            parent: graph.parent,
            delta: plan.delta,
            change_request,
            base_moved: graph.base_moved,
        }))
    }

    /// Configured base branch, else the host default.
    async fn base_branch(&self, id: &DocumentId) -> Result<String, SyncError> {
        if let Some(branch) = &self.document(id)?.base_branch {
            return Ok(branch.clone());
        }
        let host = self.host.as_ref();
        retry(&self.retry, "default_branch", || host.default_branch())
            .await
            .map_err(|source| {
                SnapshotError::Host {
                    operation: "default_branch",
                    source,
                }
                .into()
            })
    }
}

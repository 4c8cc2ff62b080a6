//! Change publisher: opens or updates the change request for a built branch.
//!
//! Titles and bodies are a pure function of the delta so reruns produce the
//! same text. At most one open request exists per document: an open request
//! whose head lives in the document's branch namespace is updated instead
//! of opening another.

use serde::Serialize;

use figsync_core::{retry, DocumentId, PublishConfig, RetryPolicy, TreeHash};

use crate::builder::{branch_namespace, VcObjectGraph};
use crate::diff::SnapshotDelta;
use crate::error::{HostError, PublishError};
use crate::host::{ChangeRequestRef, NewChangeRequest, VcsHost};

/// The request the publish ended on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRequest {
    pub number: u64,
    pub url: String,
    pub branch: String,
    pub base_branch: String,
    pub title: String,
    pub body: String,
    /// Number of the open request this publish updated or superseded.
    pub superseded: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    pub document: &'a DocumentId,
    pub document_name: &'a str,
    pub graph: &'a VcObjectGraph,
    pub base_branch: &'a str,
    pub delta: &'a SnapshotDelta,
    pub provenance: &'a TreeHash,
}

/// `Sync design "<name>": N added, M modified, K removed`
pub fn title(document_name: &str, delta: &SnapshotDelta) -> String {
    format!("Sync design \"{document_name}\": {}", delta.summary())
}

/// Markdown body listing every changed path by kind, then the provenance.
pub fn body(
    document: &DocumentId,
    document_name: &str,
    delta: &SnapshotDelta,
    provenance: &TreeHash,
) -> String {
    let mut out = format!(
        "Generated by figsync from design document \"{document_name}\" (`{document}`).\n"
    );
    for (heading, paths) in [
        ("Added", &delta.added),
        ("Modified", &delta.modified),
        ("Removed", &delta.removed),
    ] {
        if paths.is_empty() {
            continue;
        }
        out.push_str(&format!("\n### {heading}\n\n"));
        for path in paths {
            out.push_str(&format!("- `{path}`\n"));
        }
    }
    if delta.unchanged > 0 {
        out.push_str(&format!("\n{} file(s) unchanged.\n", delta.unchanged));
    }
    out.push_str(&format!("\nProvenance: `{provenance}`\n"));
    out
}

#[derive(Debug, Clone)]
pub struct ChangePublisher {
    branch_prefix: String,
    retry: RetryPolicy,
}

impl ChangePublisher {
    pub fn new(config: &PublishConfig) -> Self {
        Self {
            branch_prefix: config.branch_prefix.clone(),
            retry: config.retry.clone(),
        }
    }

    pub async fn publish(
        &self,
        host: &dyn VcsHost,
        request: PublishRequest<'_>,
    ) -> Result<ChangeRequest, PublishError> {
        let namespace = branch_namespace(&self.branch_prefix, request.document);
        let content = NewChangeRequest {
            head: request.graph.branch.clone(),
            base: request.base_branch.to_string(),
            title: title(request.document_name, request.delta),
            body: body(
                request.document,
                request.document_name,
                request.delta,
                request.provenance,
            ),
        };

        let existing = retry(&self.retry, "find_open_change_request", || {
            host.find_open_change_request(&namespace, request.base_branch)
        })
        .await?;

        let (published, superseded) = match existing {
            Some(existing) => {
                tracing::info!(
                    document = %request.document,
                    request = existing.number,
                    branch = %content.head,
                    "updating open change request"
                );
                let updated = retry(&self.retry, "update_change_request", || {
                    host.update_change_request(&existing, &content)
                })
                .await?;
                (updated, Some(existing.number))
            }
            None => (self.open(host, &content).await?, None),
        };

        tracing::info!(
            document = %request.document,
            request = published.number,
            url = %published.url,
            "change request published"
        );
        Ok(ChangeRequest {
            number: published.number,
            url: published.url,
            branch: content.head,
            base_branch: content.base,
            title: content.title,
            body: content.body,
            superseded,
        })
    }

    /// Open a request. A conflict after a retried attempt means an earlier
    /// attempt landed; that request is returned.
    async fn open(
        &self,
        host: &dyn VcsHost,
        content: &NewChangeRequest,
    ) -> Result<ChangeRequestRef, PublishError> {
        match retry(&self.retry, "open_change_request", || {
            host.open_change_request(content)
        })
        .await
        {
            Ok(opened) => Ok(opened),
            Err(HostError::Conflict { what }) => {
                let found = host
                    .find_open_change_request(&content.head, &content.base)
                    .await?;
                found
                    .filter(|r| r.head == content.head)
                    .ok_or_else(|| PublishError::from(HostError::Conflict { what }))
            }
            Err(e) => Err(e.into()),
        }
    }
}

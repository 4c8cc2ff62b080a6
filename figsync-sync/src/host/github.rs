//! GitHub REST v3 implementation of [`VcsHost`].
//!
//! Uses the git-data endpoints (blobs, trees, commits, refs) so no working
//! copy is ever checked out, and the pulls endpoints for change requests.
//! Each call is a single attempt; callers wrap them in the retry budget.
//!
//! A pull request's head branch cannot be changed after creation, so
//! [`VcsHost::update_change_request`] opens a replacement request that
//! names the one it supersedes, closes the old one and deletes its branch.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::HostError;
use crate::host::{ChangeRequestRef, NewChangeRequest, TreeChange, TreeEntry, VcsHost};

const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone)]
pub struct GitHubHost {
    http: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    token: String,
}

// -- wire types ---------------------------------------------------------------

#[derive(Deserialize)]
struct Repository {
    default_branch: String,
}

#[derive(Deserialize)]
struct Sha {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: Sha,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: Sha,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Serialize)]
struct NewTreeItem<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    /// `null` deletes the path from the base tree.
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct BranchRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Deserialize)]
struct Pull {
    number: u64,
    html_url: String,
    title: String,
    head: BranchRef,
    base: BranchRef,
}

impl From<Pull> for ChangeRequestRef {
    fn from(pull: Pull) -> Self {
        ChangeRequestRef {
            number: pull.number,
            url: pull.html_url,
            head: pull.head.name,
            base: pull.base.name,
            title: pull.title,
        }
    }
}

/// Error body. Validation failures carry the useful text in `errors`,
/// e.g. a duplicate pull request is `"Validation Failed"` with
/// `errors[0].message = "A pull request already exists for ..."`.
#[derive(Deserialize)]
struct ApiMessage {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl ApiMessage {
    fn already_exists(&self) -> bool {
        self.message.contains("already exists")
            || self.errors.iter().any(|e| {
                e.code.as_deref() == Some("already_exists")
                    || e.message.as_deref().is_some_and(|m| m.contains("already exists"))
            })
    }

    fn describe(&self) -> String {
        let details: Vec<&str> = self
            .errors
            .iter()
            .filter_map(|e| e.message.as_deref())
            .collect();
        if details.is_empty() {
            self.message.clone()
        } else {
            format!("{}: {}", self.message, details.join("; "))
        }
    }
}

// -- client -------------------------------------------------------------------

impl GitHubHost {
    pub fn new(
        api_base: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, HostError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("figsync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| HostError::Client(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}{}", self.api_base, self.owner, self.repo, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, HostError> {
        let response = request.send().await.map_err(unavailable)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let rate_limited = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");
        let body = response
            .text()
            .await
            .ok()
            .and_then(|text| serde_json::from_str::<ApiMessage>(&text).ok());
        let already_exists = body.as_ref().is_some_and(ApiMessage::already_exists);
        let message = body
            .map(|m| m.describe())
            .unwrap_or_else(|| status.to_string());
        tracing::debug!(status = status.as_u16(), what, %message, "host request failed");

        Err(match status {
            StatusCode::FORBIDDEN if rate_limited => HostError::Unavailable {
                reason: format!("rate limited: {message}"),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                HostError::PermissionDenied { message }
            }
            StatusCode::NOT_FOUND => HostError::NotFound {
                what: what.to_string(),
            },
            StatusCode::CONFLICT => HostError::Conflict {
                what: format!("{what}: {message}"),
            },
            StatusCode::UNPROCESSABLE_ENTITY if already_exists => {
                HostError::Conflict {
                    what: format!("{what}: {message}"),
                }
            }
            StatusCode::TOO_MANY_REQUESTS => HostError::Unavailable {
                reason: format!("rate limited (HTTP 429): {message}"),
            },
            s if s.is_server_error() => HostError::Unavailable {
                reason: format!("HTTP {}: {message}", s.as_u16()),
            },
            s => HostError::Rejected {
                status: s.as_u16(),
                message,
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, HostError> {
        let response = self.send(request, what).await?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(unavailable)?;
        serde_json::from_str(&text).map_err(|e| HostError::Rejected {
            status,
            message: format!("unexpected response for {what}: {e}"),
        })
    }

    async fn close_pull(&self, number: u64) -> Result<(), HostError> {
        let request = self
            .request(reqwest::Method::PATCH, &format!("/pulls/{number}"))
            .json(&json!({ "state": "closed" }));
        self.send(request, &format!("pull request #{number}")).await?;
        Ok(())
    }
}

#[async_trait]
impl VcsHost for GitHubHost {
    async fn default_branch(&self) -> Result<String, HostError> {
        let request = self.request(reqwest::Method::GET, "");
        let repo: Repository = self
            .send_json(request, &format!("repository {}/{}", self.owner, self.repo))
            .await?;
        Ok(repo.default_branch)
    }

    async fn branch_head(&self, branch: &str) -> Result<Option<String>, HostError> {
        let request = self.request(reqwest::Method::GET, &format!("/git/ref/heads/{branch}"));
        match self
            .send_json::<RefResponse>(request, &format!("branch {branch}"))
            .await
        {
            Ok(r) => Ok(Some(r.object.sha)),
            Err(HostError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn commit_tree(&self, commit: &str) -> Result<String, HostError> {
        let request = self.request(reqwest::Method::GET, &format!("/git/commits/{commit}"));
        let c: CommitResponse = self.send_json(request, &format!("commit {commit}")).await?;
        Ok(c.tree.sha)
    }

    async fn read_tree(&self, tree: &str) -> Result<Vec<TreeEntry>, HostError> {
        let request = self
            .request(reqwest::Method::GET, &format!("/git/trees/{tree}"))
            .query(&[("recursive", "1")]);
        let listing: TreeResponse = self.send_json(request, &format!("tree {tree}")).await?;
        if listing.truncated {
            tracing::warn!(%tree, "tree listing truncated by host; unchanged-path detection may be incomplete");
        }
        Ok(listing
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| TreeEntry {
                path: item.path,
                sha: item.sha,
            })
            .collect())
    }

    async fn create_blob(&self, content: &str) -> Result<String, HostError> {
        let request = self
            .request(reqwest::Method::POST, "/git/blobs")
            .json(&json!({ "content": content, "encoding": "utf-8" }));
        let blob: Sha = self.send_json(request, "blob").await?;
        Ok(blob.sha)
    }

    async fn create_tree(
        &self,
        base_tree: &str,
        changes: &[TreeChange],
    ) -> Result<String, HostError> {
        let items: Vec<NewTreeItem<'_>> = changes
            .iter()
            .map(|c| NewTreeItem {
                path: &c.path,
                mode: "100644",
                kind: "blob",
                sha: c.sha.as_deref(),
            })
            .collect();
        let request = self
            .request(reqwest::Method::POST, "/git/trees")
            .json(&json!({ "base_tree": base_tree, "tree": items }));
        let tree: Sha = self.send_json(request, "tree").await?;
        Ok(tree.sha)
    }

    async fn create_commit(
        &self,
        message: &str,
        tree: &str,
        parent: &str,
    ) -> Result<String, HostError> {
        let request = self
            .request(reqwest::Method::POST, "/git/commits")
            .json(&json!({ "message": message, "tree": tree, "parents": [parent] }));
        let commit: Sha = self.send_json(request, "commit").await?;
        Ok(commit.sha)
    }

    async fn create_branch(&self, branch: &str, commit: &str) -> Result<(), HostError> {
        let request = self
            .request(reqwest::Method::POST, "/git/refs")
            .json(&json!({ "ref": format!("refs/heads/{branch}"), "sha": commit }));
        self.send(request, &format!("reference refs/heads/{branch}"))
            .await?;
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), HostError> {
        let request = self.request(reqwest::Method::DELETE, &format!("/git/refs/heads/{branch}"));
        self.send(request, &format!("branch {branch}")).await?;
        Ok(())
    }

    async fn find_open_change_request(
        &self,
        head_prefix: &str,
        base: &str,
    ) -> Result<Option<ChangeRequestRef>, HostError> {
        let request = self
            .request(reqwest::Method::GET, "/pulls")
            .query(&[("state", "open"), ("base", base), ("per_page", "100")]);
        let pulls: Vec<Pull> = self.send_json(request, "pull requests").await?;
        Ok(pulls
            .into_iter()
            .filter(|p| p.head.name.starts_with(head_prefix))
            .max_by_key(|p| p.number)
            .map(ChangeRequestRef::from))
    }

    async fn open_change_request(
        &self,
        request: &NewChangeRequest,
    ) -> Result<ChangeRequestRef, HostError> {
        let http = self.request(reqwest::Method::POST, "/pulls").json(&json!({
            "title": request.title,
            "head": request.head,
            "base": request.base,
            "body": request.body,
        }));
        let pull: Pull = self.send_json(http, "pull request").await?;
        Ok(pull.into())
    }

    async fn update_change_request(
        &self,
        existing: &ChangeRequestRef,
        request: &NewChangeRequest,
    ) -> Result<ChangeRequestRef, HostError> {
        let replacement = NewChangeRequest {
            body: format!("{}\n\nSupersedes #{}.", request.body.trim_end(), existing.number),
            ..request.clone()
        };
        let opened = self.open_change_request(&replacement).await?;
        if let Err(e) = self.close_pull(existing.number).await {
            tracing::warn!(
                superseded = existing.number,
                replacement = opened.number,
                error = %e,
                "could not close superseded pull request"
            );
            return Ok(opened);
        }
        // The closed request's branch has no further use.
        if existing.head != opened.head {
            if let Err(e) = self.delete_branch(&existing.head).await {
                tracing::warn!(
                    branch = %existing.head,
                    superseded = existing.number,
                    error = %e,
                    "could not delete superseded branch"
                );
            }
        }
        Ok(opened)
    }
}

fn unavailable(err: reqwest::Error) -> HostError {
    HostError::Unavailable {
        reason: err.to_string(),
    }
}

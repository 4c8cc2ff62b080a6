//! In-memory [`VcsHost`] for tests and dry experiments.
//!
//! Objects are content-addressed with SHA-256 so identical writes return
//! identical ids, as on a real git host. Every operation yields to the
//! scheduler before touching state, which lets concurrent pipeline runs
//! interleave at each host call.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::HostError;
use crate::host::{ChangeRequestRef, NewChangeRequest, TreeChange, TreeEntry, VcsHost};

/// Host operations, for fault injection and scripted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    DefaultBranch,
    BranchHead,
    CommitTree,
    ReadTree,
    CreateBlob,
    CreateTree,
    CreateCommit,
    CreateBranch,
    DeleteBranch,
    FindChangeRequest,
    OpenChangeRequest,
    UpdateChangeRequest,
}

impl HostOp {
    fn is_write(self) -> bool {
        matches!(
            self,
            HostOp::CreateBlob
                | HostOp::CreateTree
                | HostOp::CreateCommit
                | HostOp::CreateBranch
                | HostOp::DeleteBranch
                | HostOp::OpenChangeRequest
                | HostOp::UpdateChangeRequest
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub tree: String,
    pub parents: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRequest {
    pub request: ChangeRequestRef,
    pub body: String,
    pub open: bool,
}

#[derive(Debug, Clone)]
enum Fault {
    Deny,
    Unavailable { remaining: usize },
}

/// Something another actor does to the repository after an operation.
#[derive(Debug, Clone)]
enum Event {
    Push {
        branch: String,
        files: Vec<(String, Option<String>)>,
    },
    RemoveBranch(String),
}

#[derive(Debug, Default)]
struct State {
    default_branch: String,
    blobs: HashMap<String, String>,
    trees: HashMap<String, BTreeMap<String, String>>,
    commits: HashMap<String, CommitRecord>,
    refs: BTreeMap<String, String>,
    requests: Vec<StoredRequest>,
    faults: HashMap<HostOp, Fault>,
    events: Vec<(HostOp, Event)>,
    calls: usize,
    writes: usize,
}

#[derive(Debug)]
pub struct MemoryHost {
    state: Mutex<State>,
}

fn digest(kind: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    for part in parts {
        hasher.update([0u8]);
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

impl State {
    fn put_blob(&mut self, content: &str) -> String {
        let id = digest("blob", &[content]);
        self.blobs.entry(id.clone()).or_insert_with(|| content.to_string());
        id
    }

    fn put_tree(&mut self, entries: BTreeMap<String, String>) -> String {
        let flat: Vec<String> = entries.iter().map(|(p, s)| format!("{p}\t{s}")).collect();
        let refs: Vec<&str> = flat.iter().map(String::as_str).collect();
        let id = digest("tree", &refs);
        self.trees.entry(id.clone()).or_insert(entries);
        id
    }

    fn put_commit(&mut self, tree: &str, parents: Vec<String>, message: &str) -> String {
        let mut parts = vec![tree];
        parts.extend(parents.iter().map(String::as_str));
        parts.push(message);
        let id = digest("commit", &parts);
        self.commits.entry(id.clone()).or_insert_with(|| CommitRecord {
            tree: tree.to_string(),
            parents,
            message: message.to_string(),
        });
        id
    }

    /// Apply a direct push on `branch` (or create it from nothing).
    fn push(&mut self, branch: &str, files: &[(String, Option<String>)], message: &str) -> String {
        let parent = self.refs.get(branch).cloned();
        let mut entries = parent
            .as_ref()
            .and_then(|c| self.commits.get(c))
            .and_then(|c| self.trees.get(&c.tree))
            .cloned()
            .unwrap_or_default();
        for (path, content) in files {
            match content {
                Some(content) => {
                    let blob = self.put_blob(content);
                    entries.insert(path.clone(), blob);
                }
                None => {
                    entries.remove(path);
                }
            }
        }
        let tree = self.put_tree(entries);
        let commit = self.put_commit(&tree, parent.into_iter().collect(), message);
        self.refs.insert(branch.to_string(), commit.clone());
        commit
    }

    fn enter(&mut self, op: HostOp) -> Result<(), HostError> {
        self.calls += 1;
        if op.is_write() {
            self.writes += 1;
        }
        match self.faults.get_mut(&op) {
            Some(Fault::Deny) => Err(HostError::PermissionDenied {
                message: format!("{op:?} denied"),
            }),
            Some(Fault::Unavailable { remaining }) if *remaining > 0 => {
                *remaining -= 1;
                Err(HostError::Unavailable {
                    reason: format!("{op:?} temporarily unavailable"),
                })
            }
            _ => Ok(()),
        }
    }

    fn after(&mut self, op: HostOp) {
        let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|(o, _)| *o == op);
        self.events = rest;
        for (_, event) in due {
            match event {
                Event::Push { branch, files } => {
                    self.push(&branch, &files, "concurrent push");
                }
                Event::RemoveBranch(branch) => {
                    self.refs.remove(&branch);
                }
            }
        }
    }
}

impl MemoryHost {
    /// A repository whose default branch holds one empty commit.
    pub fn new(default_branch: &str) -> Self {
        Self::with_files(default_branch, &[])
    }

    /// A repository whose default branch holds one commit with `files`.
    pub fn with_files(default_branch: &str, files: &[(&str, &str)]) -> Self {
        let mut state = State {
            default_branch: default_branch.to_string(),
            ..State::default()
        };
        let files: Vec<(String, Option<String>)> = files
            .iter()
            .map(|(p, c)| (p.to_string(), Some(c.to_string())))
            .collect();
        state.push(default_branch, &files, "initial commit");
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    // -- fault injection ----------------------------------------------------

    /// Every call of `op` fails with `PermissionDenied`.
    pub fn deny(&self, op: HostOp) {
        self.lock().faults.insert(op, Fault::Deny);
    }

    /// The next `times` calls of `op` fail with `Unavailable`.
    pub fn flake(&self, op: HostOp, times: usize) {
        self.lock()
            .faults
            .insert(op, Fault::Unavailable { remaining: times });
    }

    /// After the next `op`, someone else pushes `files` to `branch`.
    pub fn push_after(&self, op: HostOp, branch: &str, files: &[(&str, Option<&str>)]) {
        let files = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.map(str::to_string)))
            .collect();
        self.lock().events.push((
            op,
            Event::Push {
                branch: branch.to_string(),
                files,
            },
        ));
    }

    /// After the next `op`, someone else deletes `branch`.
    pub fn remove_branch_after(&self, op: HostOp, branch: &str) {
        self.lock()
            .events
            .push((op, Event::RemoveBranch(branch.to_string())));
    }

    // -- direct manipulation (not counted) -------------------------------------

    /// Push a commit to `branch` as another actor would. `None` deletes.
    pub fn push(&self, branch: &str, files: &[(&str, Option<&str>)]) -> String {
        let files: Vec<(String, Option<String>)> = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.map(str::to_string)))
            .collect();
        self.lock().push(branch, &files, "external push")
    }

    // -- inspection -----------------------------------------------------------

    pub fn head(&self, branch: &str) -> Option<String> {
        self.lock().refs.get(branch).cloned()
    }

    pub fn branches(&self) -> Vec<String> {
        self.lock().refs.keys().cloned().collect()
    }

    pub fn commit(&self, id: &str) -> Option<CommitRecord> {
        self.lock().commits.get(id).cloned()
    }

    /// Path → content at `commit`.
    pub fn files_at(&self, commit: &str) -> BTreeMap<String, String> {
        let state = self.lock();
        let Some(tree) = state
            .commits
            .get(commit)
            .and_then(|c| state.trees.get(&c.tree))
        else {
            return BTreeMap::new();
        };
        tree.iter()
            .filter_map(|(path, blob)| {
                state
                    .blobs
                    .get(blob)
                    .map(|content| (path.clone(), content.clone()))
            })
            .collect()
    }

    /// Path → blob id at `commit`.
    pub fn tree_at(&self, commit: &str) -> BTreeMap<String, String> {
        let state = self.lock();
        state
            .commits
            .get(commit)
            .and_then(|c| state.trees.get(&c.tree))
            .cloned()
            .unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<StoredRequest> {
        self.lock().requests.clone()
    }

    pub fn open_requests(&self) -> Vec<StoredRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.open)
            .cloned()
            .collect()
    }

    /// Calls of any operation, including failed ones.
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    /// Calls of mutating operations, including failed ones.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }
}

#[async_trait]
impl VcsHost for MemoryHost {
    async fn default_branch(&self) -> Result<String, HostError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.enter(HostOp::DefaultBranch)?;
        Ok(state.default_branch.clone())
    }

    async fn branch_head(&self, branch: &str) -> Result<Option<String>, HostError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.enter(HostOp::BranchHead)?;
        let head = state.refs.get(branch).cloned();
        state.after(HostOp::BranchHead);
        Ok(head)
    }

    async fn commit_tree(&self, commit: &str) -> Result<String, HostError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.enter(HostOp::CommitTree)?;
        state
            .commits
            .get(commit)
            .map(|c| c.tree.clone())
            .ok_or_else(|| HostError::NotFound {
                what: format!("commit {commit}"),
            })
    }

    async fn read_tree(&self, tree: &str) -> Result<Vec<TreeEntry>, HostError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.enter(HostOp::ReadTree)?;
        let entries = state.trees.get(tree).ok_or_else(|| HostError::NotFound {
            what: format!("tree {tree}"),
        })?;
        Ok(entries
            .iter()
            .map(|(path, sha)| TreeEntry {
                path: path.clone(),
                sha: sha.clone(),
            })
            .collect())
    }

    async fn create_blob(&self, content: &str) -> Result<String, HostError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.enter(HostOp::CreateBlob)?;
        Ok(state.put_blob(content))
    }

    async fn create_tree(
        &self,
        base_tree: &str,
        changes: &[TreeChange],
    ) -> Result<String, HostError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.enter(HostOp::CreateTree)?;
        let mut entries = state
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| HostError::NotFound {
                what: format!("tree {base_tree}"),
            })?;
        for change in changes {
            match &change.sha {
                Some(sha) => {
                    if !state.blobs.contains_key(sha) {
                        return Err(HostError::Rejected {
                            status: 422,
                            message: format!("blob {sha} does not exist"),
                        });
                    }
                    entries.insert(change.path.clone(), sha.clone());
                }
                None => {
                    if entries.remove(&change.path).is_none() {
                        return Err(HostError::Rejected {
                            status: 422,
                            message: format!("cannot delete missing path {}", change.path),
                        });
                    }
                }
            }
        }
        let id = state.put_tree(entries);
        state.after(HostOp::CreateTree);
        Ok(id)
    }

    async fn create_commit(
        &self,
        message: &str,
        tree: &str,
        parent: &str,
    ) -> Result<String, HostError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.enter(HostOp::CreateCommit)?;
        if !state.trees.contains_key(tree) {
            return Err(HostError::NotFound {
                what: format!("tree {tree}"),
            });
        }
        if !state.commits.contains_key(parent) {
            return Err(HostError::NotFound {
                what: format!("commit {parent}"),
            });
        }
        let id = state.put_commit(tree, vec![parent.to_string()], message);
        state.after(HostOp::CreateCommit);
        Ok(id)
    }

    async fn create_branch(&self, branch: &str, commit: &str) -> Result<(), HostError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.enter(HostOp::CreateBranch)?;
        if state.refs.contains_key(branch) {
            return Err(HostError::Conflict {
                what: format!("reference refs/heads/{branch} already exists"),
            });
        }
        if !state.commits.contains_key(commit) {
            return Err(HostError::NotFound {
                what: format!("commit {commit}"),
            });
        }
        state.refs.insert(branch.to_string(), commit.to_string());
        state.after(HostOp::CreateBranch);
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), HostError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.enter(HostOp::DeleteBranch)?;
        state
            .refs
            .remove(branch)
            .map(|_| ())
            .ok_or_else(|| HostError::NotFound {
                what: format!("branch {branch}"),
            })
    }

    async fn find_open_change_request(
        &self,
        head_prefix: &str,
        base: &str,
    ) -> Result<Option<ChangeRequestRef>, HostError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.enter(HostOp::FindChangeRequest)?;
        Ok(state
            .requests
            .iter()
            .filter(|r| r.open && r.request.base == base && r.request.head.starts_with(head_prefix))
            .max_by_key(|r| r.request.number)
            .map(|r| r.request.clone()))
    }

    async fn open_change_request(
        &self,
        request: &NewChangeRequest,
    ) -> Result<ChangeRequestRef, HostError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.enter(HostOp::OpenChangeRequest)?;
        if !state.refs.contains_key(&request.head) {
            return Err(HostError::Rejected {
                status: 422,
                message: format!("head branch {} does not exist", request.head),
            });
        }
        if state
            .requests
            .iter()
            .any(|r| r.open && r.request.head == request.head)
        {
            return Err(HostError::Conflict {
                what: format!("a request for {} already exists", request.head),
            });
        }
        let number = state.requests.len() as u64 + 1;
        let opened = ChangeRequestRef {
            number,
            url: format!("memory://requests/{number}"),
            head: request.head.clone(),
            base: request.base.clone(),
            title: request.title.clone(),
        };
        state.requests.push(StoredRequest {
            request: opened.clone(),
            body: request.body.clone(),
            open: true,
        });
        Ok(opened)
    }

    async fn update_change_request(
        &self,
        existing: &ChangeRequestRef,
        request: &NewChangeRequest,
    ) -> Result<ChangeRequestRef, HostError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.enter(HostOp::UpdateChangeRequest)?;
        if !state.refs.contains_key(&request.head) {
            return Err(HostError::Rejected {
                status: 422,
                message: format!("head branch {} does not exist", request.head),
            });
        }
        let stored = state
            .requests
            .iter_mut()
            .find(|r| r.open && r.request.number == existing.number)
            .ok_or_else(|| HostError::NotFound {
                what: format!("open request #{}", existing.number),
            })?;
        stored.request.head = request.head.clone();
        stored.request.base = request.base.clone();
        stored.request.title = request.title.clone();
        stored.body = request.body.clone();
        Ok(stored.request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_blobs_share_an_id() {
        let host = MemoryHost::new("main");
        let a = host.create_blob("same").await.unwrap();
        let b = host.create_blob("same").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(host.write_count(), 2);
    }

    #[tokio::test]
    async fn existing_ref_is_a_conflict() {
        let host = MemoryHost::new("main");
        let head = host.head("main").unwrap();
        let err = host.create_branch("main", &head).await.unwrap_err();
        assert!(matches!(err, HostError::Conflict { .. }));
        assert_eq!(host.head("main").unwrap(), head);
    }

    #[tokio::test]
    async fn tree_changes_layer_on_base() {
        let host = MemoryHost::with_files("main", &[("README.md", "hi"), ("old.ts", "x")]);
        let head = host.head("main").unwrap();
        let base_tree = host.commit_tree(&head).await.unwrap();
        let blob = host.create_blob("new").await.unwrap();
        let tree = host
            .create_tree(
                &base_tree,
                &[
                    TreeChange { path: "new.ts".into(), sha: Some(blob) },
                    TreeChange { path: "old.ts".into(), sha: None },
                ],
            )
            .await
            .unwrap();
        let commit = host.create_commit("msg", &tree, &head).await.unwrap();
        let files = host.files_at(&commit);
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["README.md", "new.ts"]);
        assert_eq!(host.commit(&commit).unwrap().parents, vec![head]);
    }

    #[tokio::test]
    async fn faults_are_injected() {
        let host = MemoryHost::new("main");
        host.flake(HostOp::CreateBlob, 1);
        assert!(matches!(
            host.create_blob("x").await,
            Err(HostError::Unavailable { .. })
        ));
        assert!(host.create_blob("x").await.is_ok());
        host.deny(HostOp::OpenChangeRequest);
        let req = NewChangeRequest {
            head: "main".into(),
            base: "main".into(),
            title: "t".into(),
            body: "b".into(),
        };
        assert!(matches!(
            host.open_change_request(&req).await,
            Err(HostError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn scripted_push_moves_branch() {
        let host = MemoryHost::new("main");
        let before = host.head("main").unwrap();
        host.push_after(HostOp::BranchHead, "main", &[("x.ts", Some("x"))]);
        let seen = host.branch_head("main").await.unwrap().unwrap();
        assert_eq!(seen, before);
        assert_ne!(host.head("main").unwrap(), before);
    }
}

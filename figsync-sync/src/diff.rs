//! Snapshot diff engine.
//!
//! [`compute_delta`] decides whether anything needs publishing;
//! [`render_unified`] backs `figsync diff` and dry runs.

use serde::{Deserialize, Serialize};
use similar::TextDiff;

use figsync_core::GeneratedFileSet;

use crate::snapshot_store::PublishedSnapshot;

/// Per-path comparison of a fresh file set against the last publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDelta {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: usize,
}

impl SnapshotDelta {
    /// Nothing added, modified or removed.
    pub fn is_no_op(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// `N added, M modified, K removed`
    pub fn summary(&self) -> String {
        format!(
            "{} added, {} modified, {} removed",
            self.added.len(),
            self.modified.len(),
            self.removed.len()
        )
    }

    pub fn is_unchanged(&self, path: &str) -> bool {
        !self.added.iter().any(|p| p == path) && !self.modified.iter().any(|p| p == path)
    }
}

/// Compare `files` against the previous publish. Absent previous → all added.
///
/// Paths come out sorted because both sides are path-ordered maps.
pub fn compute_delta(
    files: &GeneratedFileSet,
    previous: Option<&PublishedSnapshot>,
) -> SnapshotDelta {
    let mut delta = SnapshotDelta::default();
    let Some(previous) = previous else {
        delta.added = files.paths().map(str::to_owned).collect();
        return delta;
    };

    for (path, content) in &files.files {
        match previous.files.get(path) {
            None => delta.added.push(path.clone()),
            Some(old) if old == content => delta.unchanged += 1,
            Some(_) => delta.modified.push(path.clone()),
        }
    }
    delta.removed = previous
        .files
        .paths()
        .filter(|p| files.get(p).is_none())
        .map(str::to_owned)
        .collect();
    delta
}

/// A single file's unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub unified_diff: String,
}

/// Unified diffs for every added, modified or removed path.
pub fn render_unified(
    files: &GeneratedFileSet,
    previous: Option<&PublishedSnapshot>,
) -> Vec<FileDiff> {
    let delta = compute_delta(files, previous);
    let old = |path: &str| {
        previous
            .and_then(|p| p.files.get(path))
            .unwrap_or_default()
            .to_string()
    };

    let mut diffs = Vec::new();
    for path in delta.added.iter().chain(&delta.modified).chain(&delta.removed) {
        let before = old(path);
        let after = files.get(path).unwrap_or_default();
        diffs.push(FileDiff {
            path: path.clone(),
            unified_diff: unified(path, &before, after),
        });
    }
    diffs.sort_by(|a, b| a.path.cmp(&b.path));
    diffs
}

fn unified(path: &str, before: &str, after: &str) -> String {
    let old_header = format!("a/{path}");
    let new_header = format!("b/{path}");
    TextDiff::from_lines(before, after)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}

//! Snapshot store: the last published state per document.
//!
//! The only state figsync persists between runs. [`FileSnapshotStore`]
//! keeps one JSON document per design document at
//! `<home>/.figsync/snapshots/<document_id>.json`, written with the same
//! atomic temp file + rename pattern as the config file, using a fresh
//! temp file per write.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use figsync_core::{DocumentId, GeneratedFileSet};

use crate::error::{io_err, StoreError};

/// The change request a snapshot was published through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequestRecord {
    pub number: u64,
    pub url: String,
}

/// What the last successful publish put on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedSnapshot {
    pub document: DocumentId,
    pub files: GeneratedFileSet,
    /// Host blob id per generated path.
    pub blobs: BTreeMap<String, String>,
    pub branch: String,
    pub base_branch: String,
    /// `None` when the base branch already carried the files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_request: Option<ChangeRequestRecord>,
    pub published_at: DateTime<Utc>,
}

/// Keyed storage of [`PublishedSnapshot`]s.
pub trait SnapshotStore: Send + Sync {
    fn get(&self, document: &DocumentId) -> Result<Option<PublishedSnapshot>, StoreError>;
    fn put(&self, snapshot: &PublishedSnapshot) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// FileSnapshotStore
// ---------------------------------------------------------------------------

/// JSON files under `<home>/.figsync/snapshots/`.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    home: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

/// `<home>/.figsync/snapshots/<document_id>.json`: pure, no I/O.
pub fn snapshot_path_at(home: &Path, document: &DocumentId) -> PathBuf {
    let file_stem: String = document
        .0
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    figsync_core::config::figsync_root(home)
        .join("snapshots")
        .join(format!("{file_stem}.json"))
}

impl SnapshotStore for FileSnapshotStore {
    fn get(&self, document: &DocumentId) -> Result<Option<PublishedSnapshot>, StoreError> {
        let path = snapshot_path_at(&self.home, document);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let snapshot = serde_json::from_str(&contents)
            .map_err(|source| StoreError::Json { path, source })?;
        Ok(Some(snapshot))
    }

    fn put(&self, snapshot: &PublishedSnapshot) -> Result<(), StoreError> {
        let path = snapshot_path_at(&self.home, &snapshot.document);
        let Some(dir) = path.parent() else {
            return Err(io_err(
                path,
                std::io::Error::other("invalid snapshot path"),
            ));
        };
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

        let json = serde_json::to_string_pretty(snapshot).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        // Each writer gets its own temp file so overlapping puts for one
        // document never rename each other's file away.
        let mut tmp = tempfile::Builder::new()
            .prefix(".snapshot-")
            .suffix(".json.tmp")
            .tempfile_in(dir)
            .map_err(|e| io_err(dir, e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| io_err(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| io_err(&path, e.error))?;
        tracing::debug!(document = %snapshot.document, path = %path.display(), "saved snapshot");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySnapshotStore
// ---------------------------------------------------------------------------

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<DocumentId, PublishedSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get(&self, document: &DocumentId) -> Result<Option<PublishedSnapshot>, StoreError> {
        let snapshots = self.snapshots.lock().unwrap_or_else(|p| p.into_inner());
        Ok(snapshots.get(document).cloned())
    }

    fn put(&self, snapshot: &PublishedSnapshot) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(|p| p.into_inner());
        snapshots.insert(snapshot.document.clone(), snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figsync_core::TreeHash;
    use tempfile::TempDir;

    fn snapshot(doc: &str) -> PublishedSnapshot {
        let mut files = GeneratedFileSet::new(TreeHash("abc".into()));
        files.insert("g/index.ts", "export {};\n");
        let mut blobs = BTreeMap::new();
        blobs.insert("g/index.ts".to_string(), "blob1".to_string());
        PublishedSnapshot {
            document: DocumentId::from(doc),
            files,
            blobs,
            branch: "figsync/doc/1".into(),
            base_branch: "main".into(),
            change_request: Some(ChangeRequestRecord {
                number: 7,
                url: "https://example.test/pr/7".into(),
            }),
            published_at: Utc::now(),
        }
    }

    #[test]
    fn missing_snapshot_is_none() {
        let home = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(home.path());
        assert!(store.get(&DocumentId::from("nope")).unwrap().is_none());
    }

    #[test]
    fn roundtrip_save_load() {
        let home = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(home.path());
        let snap = snapshot("FILE1");
        store.put(&snap).unwrap();
        assert_eq!(store.get(&snap.document).unwrap(), Some(snap));
    }

    fn leftover_tmp_files(home: &Path) -> Vec<PathBuf> {
        let dir = figsync_core::config::figsync_root(home).join("snapshots");
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let home = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(home.path());
        store.put(&snapshot("FILE1")).unwrap();
        assert!(
            leftover_tmp_files(home.path()).is_empty(),
            "tmp file should be removed after atomic rename"
        );
    }

    #[test]
    fn overlapping_puts_for_one_document_all_succeed() {
        let home = TempDir::new().unwrap();
        let store = std::sync::Arc::new(FileSnapshotStore::new(home.path()));

        for round in 0..25 {
            let handles: Vec<_> = (0..4)
                .map(|writer| {
                    let store = store.clone();
                    std::thread::spawn(move || {
                        let mut snap = snapshot("DOC");
                        snap.branch = format!("figsync/doc/{round}-{writer}");
                        store.put(&snap)
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap().expect("concurrent put must not fail");
            }
        }

        let last = store.get(&DocumentId::from("DOC")).unwrap().unwrap();
        assert!(last.branch.starts_with("figsync/doc/24-"), "{}", last.branch);
        assert!(leftover_tmp_files(home.path()).is_empty());
    }

    #[test]
    fn document_ids_are_made_path_safe() {
        let path = snapshot_path_at(Path::new("/h"), &DocumentId::from("../evil/id"));
        assert!(path.ends_with(".figsync/snapshots/___evil_id.json"));
    }

    #[test]
    fn corrupt_snapshot_reports_path() {
        let home = TempDir::new().unwrap();
        let doc = DocumentId::from("BAD");
        let path = snapshot_path_at(home.path(), &doc);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        let err = FileSnapshotStore::new(home.path()).get(&doc).unwrap_err();
        assert!(matches!(err, StoreError::Json { .. }));
        assert!(err.to_string().contains("BAD.json"));
    }

    #[test]
    fn memory_store_replaces_by_document() {
        let store = MemorySnapshotStore::new();
        let mut snap = snapshot("D");
        store.put(&snap).unwrap();
        snap.branch = "figsync/doc/2".into();
        store.put(&snap).unwrap();
        assert_eq!(store.get(&snap.document).unwrap().unwrap().branch, "figsync/doc/2");
    }
}

//! In-memory [`DesignSource`] for tests and offline runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use figsync_core::{DesignDocument, DocumentId};

use crate::client::DesignSource;
use crate::error::FetchError;

#[derive(Debug, Clone)]
enum Entry {
    Document(DesignDocument),
    Unauthorized,
    Unavailable,
}

/// Serves documents from a map. Unknown ids are `NotFound`.
#[derive(Debug, Default)]
pub struct StaticDesignSource {
    entries: Mutex<HashMap<DocumentId, Entry>>,
    fetches: AtomicUsize,
}

impl StaticDesignSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: DesignDocument) -> Self {
        let source = Self::new();
        source.put(document);
        source
    }

    /// Insert or replace a document, keyed by its own id.
    pub fn put(&self, document: DesignDocument) {
        self.entries()
            .insert(document.id.clone(), Entry::Document(document));
    }

    /// Make fetches of `id` fail as if the token were rejected.
    pub fn deny(&self, id: DocumentId) {
        self.entries().insert(id, Entry::Unauthorized);
    }

    /// Make fetches of `id` fail as if the upstream were down.
    pub fn make_unavailable(&self, id: DocumentId) {
        self.entries().insert(id, Entry::Unavailable);
    }

    /// Number of `fetch` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<DocumentId, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DesignSource for StaticDesignSource {
    async fn fetch(&self, document: &DocumentId) -> Result<DesignDocument, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let entry = self.entries().get(document).cloned();
        match entry {
            Some(Entry::Document(doc)) => Ok(doc),
            Some(Entry::Unauthorized) => Err(FetchError::Unauthorized { status: 403 }),
            Some(Entry::Unavailable) => Err(FetchError::UpstreamUnavailable {
                reason: "static source marked unavailable".to_string(),
            }),
            None => Err(FetchError::NotFound {
                document: document.clone(),
            }),
        }
    }
}

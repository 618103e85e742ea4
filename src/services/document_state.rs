//! In-memory buffer content and version tracking for open documents,
//! mirroring what the editor believes each buffer currently contains.

use std::collections::HashMap;

use async_lsp::lsp_types::Url;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct DocumentState {
    pub content: String,
    pub version: i32,
}

#[derive(Default)]
pub struct DocumentStateManager {
    documents: Mutex<HashMap<Url, DocumentState>>,
}

impl DocumentStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, uri: Url, content: String, version: i32) {
        self.documents
            .lock()
            .await
            .insert(uri, DocumentState { content, version });
    }

    pub async fn get(&self, uri: &Url) -> Option<DocumentState> {
        self.documents.lock().await.get(uri).cloned()
    }

    pub async fn remove(&self, uri: &Url) {
        self.documents.lock().await.remove(uri);
    }

    /// A point-in-time copy of every tracked document, used to rebuild
    /// sessions for all open buffers after a config or preamble change.
    pub async fn snapshot(&self) -> Vec<(Url, DocumentState)> {
        self.documents
            .lock()
            .await
            .iter()
            .map(|(uri, state)| (uri.clone(), state.clone()))
            .collect()
    }
}

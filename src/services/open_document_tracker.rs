//! Tracks which URIs are currently open in the editor, independent of
//! whatever session or document state exists for them.

use std::collections::HashSet;

use async_lsp::lsp_types::Url;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct OpenDocumentTracker {
    open: Mutex<HashSet<Url>>,
}

impl OpenDocumentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_open(&self, uri: Url) {
        self.open.lock().await.insert(uri);
    }

    pub async fn mark_closed(&self, uri: &Url) {
        self.open.lock().await.remove(uri);
    }

    pub async fn is_open(&self, uri: &Url) -> bool {
        self.open.lock().await.contains(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracks_open_and_close() {
        let tracker = OpenDocumentTracker::new();
        let uri = Url::parse("file:///workspace/top.sv").unwrap();

        assert!(!tracker.is_open(&uri).await);
        tracker.mark_open(uri.clone()).await;
        assert!(tracker.is_open(&uri).await);
        tracker.mark_closed(&uri).await;
        assert!(!tracker.is_open(&uri).await);
    }
}

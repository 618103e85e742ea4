//! The thin orchestrator the transport layer talks to. Owns every other
//! service and sequences them; the actual work lives in `core` and
//! `semantic`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_lsp::lsp_types::{Diagnostic, DocumentSymbol, Location, Position, Url};
use tokio::sync::Notify;

use crate::core::canonical_path::CanonicalPath;
use crate::core::project_layout_service::ProjectLayoutService;
use crate::error::ServerError;
use crate::semantic::diagnostic_converter;
use crate::services::document_state::DocumentStateManager;
use crate::services::open_document_tracker::OpenDocumentTracker;
use crate::services::overlay_session::OverlaySession;
use crate::services::preamble_manager::PreambleManager;
use crate::services::session_manager::{DiagnosticHook, SessionManager};
use crate::sv::compilation::Compilation;

/// Pushes a version-tagged diagnostics batch for `uri` to the client.
/// `LanguageService` stays transport-agnostic; the transport supplies this
/// via `set_diagnostics_publisher` so `textDocument/publishDiagnostics` can
/// be sent from deep inside a debounced rebuild without `LanguageService`
/// knowing about `ClientSocket`.
pub type DiagnosticsPublisher = Arc<dyn Fn(Url, i32, Vec<Diagnostic>) + Send + Sync>;

/// Kind of filesystem change reported by `workspace/didChangeWatchedFiles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Created,
    Changed,
    Deleted,
}

/// One-shot-but-idempotent broadcast: `notify_waiters` only wakes tasks
/// already parked in `wait`; the `AtomicBool` makes late arrivals see the
/// event as already having happened instead of hanging forever.
struct ReadyEvent {
    fired: AtomicBool,
    notify: Notify,
}

impl ReadyEvent {
    fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn fire(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn wait(&self) {
        if self.fired.load(Ordering::SeqCst) {
            return;
        }
        self.notify.notified().await;
    }
}

pub struct LanguageService {
    workspace_root: tokio::sync::RwLock<Option<CanonicalPath>>,
    layout_service: tokio::sync::RwLock<Option<Arc<ProjectLayoutService>>>,
    preamble: tokio::sync::RwLock<Option<Arc<PreambleManager>>>,
    session_manager: tokio::sync::RwLock<Option<Arc<SessionManager>>>,
    open_docs: Arc<OpenDocumentTracker>,
    doc_states: DocumentStateManager,
    config_ready: ReadyEvent,
    workspace_ready: ReadyEvent,
    preamble_rebuild_in_progress: AtomicBool,
    preamble_rebuild_pending: AtomicBool,
    diagnostics_publisher: std::sync::OnceLock<DiagnosticsPublisher>,
}

impl Default for LanguageService {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageService {
    pub fn new() -> Self {
        Self {
            workspace_root: tokio::sync::RwLock::new(None),
            layout_service: tokio::sync::RwLock::new(None),
            preamble: tokio::sync::RwLock::new(None),
            session_manager: tokio::sync::RwLock::new(None),
            open_docs: Arc::new(OpenDocumentTracker::new()),
            doc_states: DocumentStateManager::new(),
            config_ready: ReadyEvent::new(),
            workspace_ready: ReadyEvent::new(),
            preamble_rebuild_in_progress: AtomicBool::new(false),
            preamble_rebuild_pending: AtomicBool::new(false),
            diagnostics_publisher: std::sync::OnceLock::new(),
        }
    }

    /// Wires up how session-rebuild diagnostics reach the client. Without
    /// this, `trigger_session_rebuild` still runs (sessions build, go-to-
    /// definition and document-symbol queries work) but nothing is pushed
    /// over `textDocument/publishDiagnostics`. Meant to be called once,
    /// right after construction and before the transport starts dispatching
    /// notifications; later calls are ignored.
    pub fn set_diagnostics_publisher(&self, publisher: DiagnosticsPublisher) {
        let _ = self.diagnostics_publisher.set(publisher);
    }

    /// Brings the workspace up: loads `.slangd`, then builds the initial
    /// preamble on the blocking pool. `config_ready` fires once the layout
    /// is known; `workspace_ready` once the preamble finishes, which may
    /// take noticeably longer on a large project.
    pub async fn initialize_workspace(self: &Arc<Self>, uri: &Url) {
        let root = CanonicalPath::from_uri(uri);
        *self.workspace_root.write().await = Some(root.clone());

        let layout_service = Arc::new(ProjectLayoutService::new(root));
        layout_service.load_config().await;
        *self.layout_service.write().await = Some(Arc::clone(&layout_service));
        self.config_ready.fire();

        let snapshot = layout_service.get_layout_snapshot().await;
        let layout = snapshot.layout;
        let preamble = tokio::task::spawn_blocking(move || {
            Arc::new(PreambleManager::create_from_project_layout(&layout, snapshot.version))
        })
        .await
        .expect("preamble build task panicked");

        *self.preamble.write().await = Some(Arc::clone(&preamble));
        *self.session_manager.write().await = Some(Arc::new(SessionManager::new(Some(preamble))));
        self.workspace_ready.fire();
    }

    pub async fn on_document_opened(self: &Arc<Self>, uri: Url, content: String, version: i32) {
        self.open_docs.mark_open(uri.clone()).await;
        self.doc_states.set(uri.clone(), content.clone(), version).await;
        self.trigger_session_rebuild(uri, content, version).await;
    }

    pub async fn on_document_changed(&self, uri: Url, content: String, version: i32) {
        self.doc_states.set(uri, content, version).await;
    }

    /// `didSave` carries no version of its own (the LSP spec doesn't send
    /// one): a save re-elaborates whatever version was last recorded by
    /// `didOpen`/`didChange`, it doesn't advance it.
    pub async fn on_document_saved(self: &Arc<Self>, uri: Url, content: String) {
        let version = self.doc_states.get(&uri).await.map(|s| s.version).unwrap_or(0);
        self.doc_states.set(uri.clone(), content.clone(), version).await;
        self.trigger_session_rebuild(uri, content, version).await;
    }

    pub async fn on_document_closed(self: &Arc<Self>, uri: Url) {
        self.open_docs.mark_closed(&uri).await;
        self.doc_states.remove(&uri).await;
        if let Some(manager) = self.session_manager.read().await.clone() {
            manager.cancel_pending_session(&uri).await;
            manager.schedule_cleanup(uri, Arc::clone(&self.open_docs));
        }
    }

    async fn trigger_session_rebuild(self: &Arc<Self>, uri: Url, content: String, version: i32) {
        self.workspace_ready.wait().await;
        let Some(manager) = self.session_manager.read().await.clone() else {
            return;
        };
        let Some(layout_service) = self.layout_service.read().await.clone() else {
            return;
        };
        let layout = layout_service.get_layout_snapshot().await.layout;
        let hook = self.diagnostics_hook_for(uri.clone());
        manager.update_session(uri, content, version, layout, hook);
    }

    /// Builds a `DiagnosticHook` bound to `uri` from the registered
    /// publisher, or `None` if the transport hasn't set one (e.g. tests that
    /// exercise session building without a `ClientSocket`).
    fn diagnostics_hook_for(&self, uri: Url) -> Option<DiagnosticHook> {
        let publisher = self.diagnostics_publisher.get()?.clone();
        Some(Box::new(move |version, diagnostics| publisher(uri, version, diagnostics)))
    }

    /// Fast single-file path used while the user is typing: no preamble,
    /// no cross-compilation binding, just the current buffer's own parse
    /// diagnostics.
    pub async fn compute_parse_diagnostics(&self, uri: &Url, content: String) -> Vec<Diagnostic> {
        let uri = uri.clone();
        let path = CanonicalPath::from_uri(&uri).as_path().to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut compilation = Compilation::new(None);
            let main_buffer = compilation.add_source(path, content);
            diagnostic_converter::extract_parse_diagnostics(
                compilation.diagnostics(),
                compilation.sources(),
                main_buffer,
            )
        })
        .await
        .unwrap_or_default()
    }

    /// Never errors: an absent session yields an empty result so a client
    /// request never hangs waiting on a reply that won't come.
    pub async fn get_definitions_for_position(&self, uri: &Url, position: Position) -> Vec<Location> {
        let Some(manager) = self.session_manager.read().await.clone() else {
            return Vec::new();
        };
        manager
            .with_session(uri, |session| {
                session
                    .semantic_index()
                    .lookup_definition_at(uri, position)
                    .into_iter()
                    .collect()
            })
            .await
            .unwrap_or_default()
    }

    pub async fn get_document_symbols(&self, uri: &Url) -> Vec<DocumentSymbol> {
        let Some(manager) = self.session_manager.read().await.clone() else {
            return Vec::new();
        };
        manager
            .with_session(uri, |session: &OverlaySession| session.semantic_index().get_document_symbols())
            .await
            .unwrap_or_default()
    }

    /// Rebuilds layout and preamble, then invalidates and rebuilds every
    /// open session so diagnostics refresh without requiring another
    /// edit. Debounced and coalesced: a burst of config writes collapses
    /// to one rebuild, then at most one more for whatever arrived during
    /// it.
    pub async fn handle_config_change(self: &Arc<Self>) {
        if self
            .preamble_rebuild_in_progress
            .swap(true, Ordering::SeqCst)
        {
            self.preamble_rebuild_pending.store(true, Ordering::SeqCst);
            return;
        }

        let service = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                service.rebuild_workspace_state().await;
                if !service
                    .preamble_rebuild_pending
                    .swap(false, Ordering::SeqCst)
                {
                    break;
                }
            }
            service
                .preamble_rebuild_in_progress
                .store(false, Ordering::SeqCst);
        });
    }

    async fn rebuild_workspace_state(self: &Arc<Self>) {
        let Some(layout_service) = self.layout_service.read().await.clone() else {
            return;
        };
        layout_service.rebuild_layout().await;
        let snapshot = layout_service.get_layout_snapshot().await;
        let layout = snapshot.layout;

        let preamble = tokio::task::spawn_blocking(move || {
            Arc::new(PreambleManager::create_from_project_layout(&layout, snapshot.version))
        })
        .await
        .expect("preamble rebuild task panicked");

        *self.preamble.write().await = Some(Arc::clone(&preamble));

        let Some(manager) = self.session_manager.read().await.clone() else {
            return;
        };
        manager.update_preamble_manager(Arc::clone(&preamble)).await;
        manager.invalidate_all_sessions().await;

        for (uri, state) in self.doc_states.snapshot().await {
            self.trigger_session_rebuild(uri, state.content, state.version).await;
        }
    }

    /// On `Created`/`Deleted`, a debounced layout rebuild is enough since
    /// the file set itself changed. On `Changed`, conservatively
    /// invalidate every open session: there is no dependency graph to
    /// tell us which overlays actually depend on this file.
    pub async fn handle_source_file_change(self: &Arc<Self>, kind: FileChangeKind) {
        match kind {
            FileChangeKind::Created | FileChangeKind::Deleted => {
                if let Some(layout_service) = self.layout_service.read().await.clone() {
                    layout_service.schedule_debounced_rebuild();
                }
                if let Some(manager) = self.session_manager.read().await.clone() {
                    manager.invalidate_all_sessions().await;
                }
            }
            FileChangeKind::Changed => {
                if let Some(manager) = self.session_manager.read().await.clone() {
                    manager.invalidate_all_sessions().await;
                }
            }
        }
    }

    pub async fn handle_config_file_change(self: &Arc<Self>, path: &CanonicalPath) -> bool {
        let Some(layout_service) = self.layout_service.read().await.clone() else {
            return false;
        };
        let changed = layout_service.handle_config_file_change(path).await;
        if changed {
            self.handle_config_change().await;
        }
        changed
    }

    pub async fn err_if_uninitialized(&self) -> Result<(), ServerError> {
        if self.workspace_root.read().await.is_some() {
            Ok(())
        } else {
            Err(ServerError::WorkspaceNotInitialized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn errs_before_a_workspace_is_initialized() {
        let service = Arc::new(LanguageService::new());
        assert!(matches!(
            service.err_if_uninitialized().await,
            Err(ServerError::WorkspaceNotInitialized)
        ));
    }

    #[tokio::test]
    async fn initializing_a_workspace_builds_the_preamble_and_clears_the_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top.sv"), "module top; endmodule").unwrap();
        let root_uri = CanonicalPath::from_path(dir.path()).to_uri();

        let service = Arc::new(LanguageService::new());
        service.initialize_workspace(&root_uri).await;

        assert!(service.err_if_uninitialized().await.is_ok());
        assert!(service.preamble.read().await.as_ref().unwrap().get_module("top").is_some());
    }

    #[tokio::test]
    async fn opening_a_document_eventually_produces_document_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let top_path = dir.path().join("top.sv");
        std::fs::write(&top_path, "module top; endmodule").unwrap();
        let root_uri = CanonicalPath::from_path(dir.path()).to_uri();
        let doc_uri = CanonicalPath::from_path(&top_path).to_uri();

        let service = Arc::new(LanguageService::new());
        service.initialize_workspace(&root_uri).await;
        service
            .on_document_opened(doc_uri.clone(), "module top; logic x; endmodule".to_string(), 1)
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(800)).await;

        let symbols = service.get_document_symbols(&doc_uri).await;
        assert!(symbols.iter().any(|s| s.name == "top"));
    }

    #[tokio::test]
    async fn saving_a_document_publishes_diagnostics_tagged_with_the_last_known_version() {
        let dir = tempfile::tempdir().unwrap();
        let top_path = dir.path().join("top.sv");
        std::fs::write(&top_path, "module top; endmodule").unwrap();
        let root_uri = CanonicalPath::from_path(dir.path()).to_uri();
        let doc_uri = CanonicalPath::from_path(&top_path).to_uri();

        let service = Arc::new(LanguageService::new());
        service.initialize_workspace(&root_uri).await;

        let published: Arc<tokio::sync::Mutex<Option<(i32, Vec<Diagnostic>)>>> = Arc::new(tokio::sync::Mutex::new(None));
        let published_for_hook = Arc::clone(&published);
        service.set_diagnostics_publisher(Arc::new(move |_uri, version, diagnostics| {
            let published = Arc::clone(&published_for_hook);
            tokio::spawn(async move {
                *published.lock().await = Some((version, diagnostics));
            });
        }));

        service.on_document_opened(doc_uri.clone(), "module top; endmodule".to_string(), 3).await;
        service.on_document_saved(doc_uri.clone(), "module top; endmodule".to_string()).await;

        tokio::time::sleep(std::time::Duration::from_millis(800)).await;

        let got = published.lock().await;
        let (version, _) = got.as_ref().expect("a diagnostics batch was published");
        assert_eq!(*version, 3);
    }

    #[tokio::test]
    async fn closing_a_document_clears_its_tracked_open_state() {
        let dir = tempfile::tempdir().unwrap();
        let top_path = dir.path().join("top.sv");
        std::fs::write(&top_path, "module top; endmodule").unwrap();
        let root_uri = CanonicalPath::from_path(dir.path()).to_uri();
        let doc_uri = CanonicalPath::from_path(&top_path).to_uri();

        let service = Arc::new(LanguageService::new());
        service.initialize_workspace(&root_uri).await;
        service.on_document_opened(doc_uri.clone(), "module top; endmodule".to_string(), 1).await;
        assert!(service.open_docs.is_open(&doc_uri).await);

        service.on_document_closed(doc_uri.clone()).await;
        assert!(!service.open_docs.is_open(&doc_uri).await);
    }
}

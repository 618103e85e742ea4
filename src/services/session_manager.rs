//! Per-open-URI lifecycle of `OverlaySession`s: debounced rebuilds,
//! coalescing of rapid edits while a build is in flight, and cooperative
//! cancellation of builds that never got to start.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_lsp::lsp_types::{Diagnostic, Url};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::project_layout::ProjectLayout;
use crate::error::ServerError;
use crate::semantic::diagnostic_converter;
use crate::services::open_document_tracker::OpenDocumentTracker;
use crate::services::overlay_session::OverlaySession;
use crate::services::preamble_manager::PreambleManager;

const DEBOUNCE: Duration = Duration::from_millis(500);
const CLEANUP_DELAY: Duration = Duration::from_secs(5);

enum RebuildState {
    Idle,
    InProgress,
    /// A newer edit arrived while a build was running; holds the content,
    /// version, and diagnostic hook to build next, once the in-flight build
    /// completes. The coalesced build's own hook is kept (not the stale
    /// in-flight build's), so diagnostics for the version that wins still
    /// reach the client.
    PendingNext(String, i32, Option<DiagnosticHook>),
}

struct UriState {
    session: Option<Arc<OverlaySession>>,
    rebuild_state: RebuildState,
    rebuild_timer: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    cleanup_timer: Option<JoinHandle<()>>,
    /// Fired by `run_build` every time `rebuild_state` leaves `InProgress`,
    /// so `with_session` can wait out a build instead of reading a stale
    /// cached session.
    settled: Arc<Notify>,
}

impl Default for UriState {
    fn default() -> Self {
        Self {
            session: None,
            rebuild_state: RebuildState::Idle,
            rebuild_timer: None,
            cancel: CancellationToken::new(),
            cleanup_timer: None,
            settled: Arc::new(Notify::new()),
        }
    }
}

/// Invoked with the version and diagnostics produced by a session rebuild,
/// so `SessionManager` can publish them without knowing about the transport.
/// The version is the one actually built, which may differ from the version
/// a caller's `update_session` call originally registered this hook under
/// if a later edit coalesced into the same in-flight build.
pub type DiagnosticHook = Box<dyn FnOnce(i32, Vec<Diagnostic>) + Send + 'static>;

pub struct SessionManager {
    uris: Mutex<HashMap<Url, UriState>>,
    preamble: Mutex<Option<Arc<PreambleManager>>>,
}

impl SessionManager {
    pub fn new(preamble: Option<Arc<PreambleManager>>) -> Self {
        Self {
            uris: Mutex::new(HashMap::new()),
            preamble: Mutex::new(preamble),
        }
    }

    pub async fn update_preamble_manager(&self, new: Arc<PreambleManager>) {
        *self.preamble.lock().await = Some(new);
    }

    /// (Re)build the session for `uri` against `content`, after a 500ms
    /// debounce. A build already in flight for this URI is never
    /// cancelled; the latest content is recorded instead and a follow-up
    /// build starts the moment the in-flight one finishes.
    pub fn update_session(
        self: &Arc<Self>,
        uri: Url,
        content: String,
        version: i32,
        layout: Arc<ProjectLayout>,
        diagnostic_hook: Option<DiagnosticHook>,
    ) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let cancel = {
                let mut guard = manager.uris.lock().await;
                let state = guard.entry(uri.clone()).or_default();
                if let Some(old) = state.rebuild_timer.take() {
                    old.abort();
                }
                if let Some(old) = state.cleanup_timer.take() {
                    old.abort();
                }
                if matches!(state.rebuild_state, RebuildState::InProgress) {
                    state.rebuild_state = RebuildState::PendingNext(content, version, diagnostic_hook);
                    return;
                }
                state.cancel = CancellationToken::new();
                state.cancel.clone()
            };

            let manager2 = Arc::clone(&manager);
            let uri2 = uri.clone();
            let handle = tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(DEBOUNCE) => {
                        manager2.run_build(uri2, content, version, layout, diagnostic_hook).await;
                    }
                    _ = cancel.cancelled() => {}
                }
            });

            let mut guard = manager.uris.lock().await;
            guard.entry(uri).or_default().rebuild_timer = Some(handle);
        });
    }

    /// Runs the build for `uri`, then drains any `PendingNext` left behind
    /// by edits that arrived while this build was running.
    async fn run_build(
        self: Arc<Self>,
        uri: Url,
        mut content: String,
        mut version: i32,
        layout: Arc<ProjectLayout>,
        mut diagnostic_hook: Option<DiagnosticHook>,
    ) {
        loop {
            {
                let mut guard = self.uris.lock().await;
                guard.entry(uri.clone()).or_default().rebuild_state = RebuildState::InProgress;
            }

            let preamble = self.preamble.lock().await.clone();
            let uri_for_task = uri.clone();
            let layout_for_task = Arc::clone(&layout);
            let built = tokio::task::spawn_blocking(move || {
                OverlaySession::create(&uri_for_task, content, &layout_for_task, preamble)
            })
            .await;

            if let Ok(session) = built {
                if let Some(hook) = diagnostic_hook.take() {
                    let diagnostics = diagnostic_converter::extract_collected_diagnostics(
                        session.compilation().diagnostics(),
                        session.source_manager(),
                        session.main_buffer_id(),
                        session.preamble().map(|p| p.as_ref()),
                    );
                    hook(version, diagnostics);
                }
                let mut guard = self.uris.lock().await;
                let state = guard.entry(uri.clone()).or_default();
                state.session = Some(Arc::new(session));
                state.settled.notify_waiters();

                match std::mem::replace(&mut state.rebuild_state, RebuildState::Idle) {
                    RebuildState::PendingNext(next_content, next_version, next_hook) => {
                        drop(guard);
                        content = next_content;
                        version = next_version;
                        diagnostic_hook = next_hook;
                        continue;
                    }
                    _ => break,
                }
            } else {
                tracing::error!(target: "slangd::session", %uri, "session build task panicked");
                let mut guard = self.uris.lock().await;
                let state = guard.entry(uri.clone()).or_default();
                state.rebuild_state = RebuildState::Idle;
                state.settled.notify_waiters();
                break;
            }
        }
        let _ = version;
    }

    /// Waits for any in-flight build for `uri` to settle enough to hand
    /// back a usable session, then invokes `f` with a cloned handle. Never
    /// panics on an absent session; callers decide what "absent" means.
    pub async fn with_session<T>(
        &self,
        uri: &Url,
        f: impl FnOnce(&OverlaySession) -> T,
    ) -> Result<T, ServerError> {
        loop {
            let guard = self.uris.lock().await;
            let Some(state) = guard.get(uri) else {
                return Err(ServerError::SessionAbsent { uri: uri.clone() });
            };
            if !matches!(state.rebuild_state, RebuildState::InProgress) {
                break;
            }
            // Register interest before releasing the lock, so a
            // `run_build` that grabs the lock and settles the instant we
            // drop it still reaches us.
            let settled = Arc::clone(&state.settled);
            let notified = settled.notified();
            drop(guard);
            notified.await;
        }

        let session = {
            let guard = self.uris.lock().await;
            guard.get(uri).and_then(|s| s.session.clone())
        };
        match session {
            Some(session) => Ok(f(&session)),
            None => Err(ServerError::SessionAbsent { uri: uri.clone() }),
        }
    }

    /// Drops every cached session; the next `with_session` call for any
    /// URI will see it as absent until a fresh `update_session` completes.
    pub async fn invalidate_all_sessions(&self) {
        let mut guard = self.uris.lock().await;
        for state in guard.values_mut() {
            state.session = None;
        }
    }

    /// Cancels a not-yet-started debounced build for `uri`. A build
    /// already running is left alone; this only bounds the cost of
    /// documents opened and closed faster than the debounce window (e.g.
    /// editor preview tabs flipping through files).
    pub async fn cancel_pending_session(&self, uri: &Url) {
        let mut guard = self.uris.lock().await;
        if let Some(state) = guard.get_mut(uri) {
            state.cancel.cancel();
            if let Some(handle) = state.rebuild_timer.take() {
                handle.abort();
            }
        }
    }

    /// After 5s, drop the session for `uri` unless `tracker` reports it
    /// has been reopened in the meantime.
    pub fn schedule_cleanup(self: &Arc<Self>, uri: Url, tracker: Arc<OpenDocumentTracker>) {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(CLEANUP_DELAY).await;
            if tracker.is_open(&uri).await {
                return;
            }
            let mut guard = manager.uris.lock().await;
            guard.remove(&uri);
        });

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut guard = manager.uris.lock().await;
            let state = guard.entry(uri).or_default();
            if let Some(old) = state.cleanup_timer.take() {
                old.abort();
            }
            state.cleanup_timer = Some(handle);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_uri() -> Url {
        Url::parse("file:///top.sv").unwrap()
    }

    #[tokio::test]
    async fn with_session_waits_for_an_in_flight_build_to_settle() {
        let manager = Arc::new(SessionManager::new(None));

        // Seed "a build is already in flight" the way a real update_session
        // call would leave it, but with no session yet and a deliberately
        // long-running finish so a non-waiting with_session would either
        // error or read nothing useful.
        {
            let mut guard = manager.uris.lock().await;
            guard.entry(test_uri()).or_default().rebuild_state = RebuildState::InProgress;
        }

        let manager2 = Arc::clone(&manager);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let session = OverlaySession::create(
                &test_uri(),
                "module top; endmodule".to_string(),
                &ProjectLayout::default(),
                None,
            );
            let mut guard = manager2.uris.lock().await;
            let state = guard.entry(test_uri()).or_default();
            state.session = Some(Arc::new(session));
            state.rebuild_state = RebuildState::Idle;
            state.settled.notify_waiters();
        });

        let started = std::time::Instant::now();
        let resolved = manager
            .with_session(&test_uri(), |session| session.compilation().resolve_top_level("top").is_some())
            .await
            .expect("with_session should wait for the in-flight build rather than erroring");
        assert!(resolved);
        assert!(
            started.elapsed() >= Duration::from_millis(140),
            "with_session returned before the in-flight build settled"
        );
    }

    #[tokio::test]
    async fn with_session_errs_when_nothing_has_built_yet() {
        let manager = Arc::new(SessionManager::new(None));
        let err = manager.with_session(&test_uri(), |_| ()).await.unwrap_err();
        assert!(matches!(err, ServerError::SessionAbsent { .. }));
    }

    #[tokio::test]
    async fn builds_a_session_after_the_debounce_window() {
        let manager = Arc::new(SessionManager::new(None));
        manager.update_session(
            test_uri(),
            "module top; endmodule".to_string(),
            1,
            Arc::new(ProjectLayout::default()),
            None,
        );

        tokio::time::sleep(DEBOUNCE + Duration::from_millis(300)).await;

        let resolved = manager
            .with_session(&test_uri(), |session| session.compilation().resolve_top_level("top").is_some())
            .await
            .expect("session should have built");
        assert!(resolved);
    }

    #[tokio::test]
    async fn a_later_edit_before_debounce_fires_wins_over_an_earlier_one() {
        let manager = Arc::new(SessionManager::new(None));
        manager.update_session(
            test_uri(),
            "module first; endmodule".to_string(),
            1,
            Arc::new(ProjectLayout::default()),
            None,
        );
        // Give the first call's spawned task time to register its debounce
        // timer before the second arrives, so it is the one aborted below
        // rather than racing it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.update_session(
            test_uri(),
            "module second; endmodule".to_string(),
            2,
            Arc::new(ProjectLayout::default()),
            None,
        );

        tokio::time::sleep(DEBOUNCE + Duration::from_millis(300)).await;

        let has_second = manager
            .with_session(&test_uri(), |session| session.compilation().resolve_top_level("second").is_some())
            .await
            .unwrap();
        let has_first = manager
            .with_session(&test_uri(), |session| session.compilation().resolve_top_level("first").is_some())
            .await
            .unwrap();
        assert!(has_second);
        assert!(!has_first);
    }

    #[tokio::test]
    async fn an_edit_that_arrives_mid_build_keeps_its_own_diagnostic_hook() {
        let manager = Arc::new(SessionManager::new(None));

        // Seed "a build is already in flight", the state an update_session
        // call sees when a prior edit's run_build has already started.
        {
            let mut guard = manager.uris.lock().await;
            guard.entry(test_uri()).or_default().rebuild_state = RebuildState::InProgress;
        }

        let hook: DiagnosticHook = Box::new(|_version, _diagnostics| {});
        manager.update_session(
            test_uri(),
            "module second; endmodule".to_string(),
            2,
            Arc::new(ProjectLayout::default()),
            Some(hook),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;

        let guard = manager.uris.lock().await;
        match &guard.get(&test_uri()).unwrap().rebuild_state {
            RebuildState::PendingNext(_, version, hook) => {
                assert_eq!(*version, 2);
                assert!(hook.is_some(), "the coalesced edit's own hook must not be dropped");
            }
            _ => panic!("expected the coalescing edit to be recorded as PendingNext"),
        }
    }

    #[tokio::test]
    async fn invalidate_all_sessions_clears_cached_builds() {
        let manager = Arc::new(SessionManager::new(None));
        manager.update_session(
            test_uri(),
            "module top; endmodule".to_string(),
            1,
            Arc::new(ProjectLayout::default()),
            None,
        );
        tokio::time::sleep(DEBOUNCE + Duration::from_millis(300)).await;
        manager.with_session(&test_uri(), |_| ()).await.expect("built");

        manager.invalidate_all_sessions().await;

        let err = manager.with_session(&test_uri(), |_| ()).await.unwrap_err();
        assert!(matches!(err, ServerError::SessionAbsent { .. }));
    }
}

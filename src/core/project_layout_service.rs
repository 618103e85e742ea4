//! Loads `.slangd`, runs file discovery, and produces versioned
//! `ProjectLayout` snapshots. Mutable state is serialized behind a single
//! `tokio::sync::Mutex`, mirroring the original's single-strand executor.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::core::canonical_path::CanonicalPath;
use crate::core::config::{PathFilter, SlangdConfig};
use crate::core::discovery;
use crate::core::project_layout::{LayoutSnapshot, ProjectLayout};

const DEBOUNCE: Duration = Duration::from_millis(500);
const CONFIG_FILE_NAME: &str = ".slangd";

struct Inner {
    workspace_root: CanonicalPath,
    config: SlangdConfig,
    layout: Arc<ProjectLayout>,
    version: u64,
    debounce_handle: Option<JoinHandle<()>>,
}

pub struct ProjectLayoutService {
    inner: Mutex<Inner>,
}

impl ProjectLayoutService {
    pub fn new(workspace_root: CanonicalPath) -> Self {
        Self {
            inner: Mutex::new(Inner {
                workspace_root,
                config: SlangdConfig::default(),
                layout: Arc::new(ProjectLayout::default()),
                version: 0,
                debounce_handle: None,
            }),
        }
    }

    /// Read `<workspace_root>/.slangd` if present, then rebuild the
    /// layout. Returns whether a config file existed.
    pub async fn load_config(&self) -> bool {
        let mut guard = self.inner.lock().await;
        let config_path = guard.workspace_root.as_path().join(CONFIG_FILE_NAME);
        let existed = match tokio::fs::read_to_string(&config_path).await {
            Ok(text) => {
                match SlangdConfig::from_yaml(&text) {
                    Ok(cfg) => guard.config = cfg,
                    Err(err) => {
                        tracing::error!(target: "slangd::layout", %err, "failed to parse .slangd, keeping previous config");
                    }
                }
                true
            }
            Err(_) => {
                guard.config = SlangdConfig::default();
                false
            }
        };
        Self::rebuild_locked(&mut guard);
        existed
    }

    /// If `path` is this workspace's `.slangd`, reload and rebuild.
    pub async fn handle_config_file_change(&self, path: &CanonicalPath) -> bool {
        let is_config = {
            let guard = self.inner.lock().await;
            path.as_path() == guard.workspace_root.as_path().join(CONFIG_FILE_NAME)
        };
        if !is_config {
            return false;
        }
        self.load_config().await;
        true
    }

    pub async fn get_layout_snapshot(&self) -> LayoutSnapshot {
        let guard = self.inner.lock().await;
        LayoutSnapshot {
            layout: guard.layout.clone(),
            version: guard.version,
            timestamp: Instant::now(),
        }
    }

    pub async fn get_source_files(&self) -> Vec<CanonicalPath> {
        self.inner.lock().await.layout.files.clone()
    }

    pub async fn get_include_directories(&self) -> Vec<CanonicalPath> {
        self.inner.lock().await.layout.include_dirs.clone()
    }

    pub async fn get_defines(&self) -> Vec<String> {
        self.inner.lock().await.layout.defines.clone()
    }

    pub async fn rebuild_layout(&self) {
        let mut guard = self.inner.lock().await;
        Self::rebuild_locked(&mut guard);
    }

    fn rebuild_locked(guard: &mut Inner) {
        let mut files = discovery::discover_files(&guard.config, &guard.workspace_root);
        let filter = PathFilter::compile(guard.config.condition.as_ref());
        files.retain(|f| filter.matches(f.as_str()));
        files.sort();
        files.dedup();

        let include_dirs = guard
            .config
            .include_dirs
            .iter()
            .map(|d| guard.workspace_root.join(d))
            .collect();

        guard.layout = Arc::new(ProjectLayout {
            files,
            include_dirs,
            defines: guard.config.defines.clone(),
        });
        guard.version += 1;
    }

    /// Coalesce a burst of filesystem change notifications into one
    /// rebuild after a quiet period. No-op when auto-discovery is off,
    /// since then only explicit config/filelist edits matter and those
    /// already trigger `handle_config_file_change`.
    pub fn schedule_debounced_rebuild(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            let should_rebuild = { service.inner.lock().await.config.auto_discover };
            if should_rebuild {
                service.rebuild_layout().await;
            }
        });

        // Fire-and-replace: we don't hold the lock across the async spawn
        // above, so store the new handle and abort whatever was pending.
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut guard = service.inner.lock().await;
            if let Some(old) = guard.debounce_handle.take() {
                old.abort();
            }
            guard.debounce_handle = Some(handle);
        });
    }

    pub async fn workspace_root(&self) -> CanonicalPath {
        self.inner.lock().await.workspace_root.clone()
    }
}

pub fn is_config_file(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()) == Some(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rebuild_is_idempotent_for_unchanged_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.sv"), "module a; endmodule").unwrap();
        std::fs::write(tmp.path().join("b.sv"), "module b; endmodule").unwrap();

        let root = CanonicalPath::from_path(tmp.path());
        let service = ProjectLayoutService::new(root);
        service.load_config().await;
        let first = service.get_source_files().await;
        service.rebuild_layout().await;
        let second = service.get_source_files().await;

        let mut first_sorted = first.clone();
        let mut second_sorted = second.clone();
        first_sorted.sort();
        second_sorted.sort();
        assert_eq!(first_sorted, second_sorted);
    }

    #[tokio::test]
    async fn rebuild_strictly_increases_version() {
        let tmp = tempfile::tempdir().unwrap();
        let root = CanonicalPath::from_path(tmp.path());
        let service = ProjectLayoutService::new(root);
        let before = service.get_layout_snapshot().await.version;
        service.rebuild_layout().await;
        let after = service.get_layout_snapshot().await.version;
        assert!(after > before);
    }

    #[tokio::test]
    async fn auto_discover_finds_sv_files_recursively() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("rtl")).unwrap();
        std::fs::write(tmp.path().join("rtl/top.sv"), "module top; endmodule").unwrap();

        let root = CanonicalPath::from_path(tmp.path());
        let service = ProjectLayoutService::new(root);
        service.load_config().await;
        let files = service.get_source_files().await;
        assert_eq!(files.len(), 1);
        assert!(files[0].as_str().ends_with("rtl/top.sv"));
    }

    #[tokio::test]
    async fn path_exclude_drops_generated_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("generated")).unwrap();
        std::fs::write(tmp.path().join("generated/gen.sv"), "module gen; endmodule").unwrap();
        std::fs::write(tmp.path().join("top.sv"), "module top; endmodule").unwrap();
        std::fs::write(
            tmp.path().join(".slangd"),
            "If:\n  PathExclude: \".*/generated/.*\"\n",
        )
        .unwrap();

        let root = CanonicalPath::from_path(tmp.path());
        let service = ProjectLayoutService::new(root);
        service.load_config().await;
        let files = service.get_source_files().await;
        assert_eq!(files.len(), 1);
        assert!(files[0].as_str().ends_with("top.sv"));
    }
}

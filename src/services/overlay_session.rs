//! Short-lived, per-request compilation: the current buffer layered over
//! the preamble's declarations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_lsp::lsp_types::Url;

use crate::core::canonical_path::CanonicalPath;
use crate::core::project_layout::ProjectLayout;
use crate::semantic::index_visitor;
use crate::semantic::semantic_index::SemanticIndex;
use crate::services::preamble_manager::PreambleManager;
use crate::sv::compilation::Compilation;
use crate::sv::source::{BufferId, SourceManager};

/// One compilation over one buffer, built fresh for a single request (or
/// cached per open URI — callers decide). Immutable after construction:
/// there is no API to mutate a session in place, only to build a new one.
pub struct OverlaySession {
    compilation: Compilation,
    main_buffer_id: BufferId,
    semantic_index: SemanticIndex,
    preamble: Option<Arc<PreambleManager>>,
    indexing_errors: u64,
}

impl OverlaySession {
    /// Build a session for `uri`/`content`. Never fails: parse and
    /// semantic errors become diagnostics, not a `create` failure. Runs
    /// synchronously and should be driven from `spawn_blocking` by the
    /// caller for anything beyond trivial file sizes.
    pub fn create(
        uri: &Url,
        content: String,
        layout: &ProjectLayout,
        preamble: Option<Arc<PreambleManager>>,
    ) -> Self {
        let base = preamble.as_ref().map(|p| p.compilation_arc());
        let mut compilation = Compilation::new(base);

        let path = CanonicalPath::from_uri(uri).as_path().to_path_buf();
        let main_buffer_id = compilation.add_source(path, content);

        if let Some(preamble) = &preamble {
            load_referenced_modules(&mut compilation, preamble, layout);
        }

        let result = index_visitor::build_index(
            &compilation,
            preamble.as_deref(),
            main_buffer_id,
            uri.clone(),
        );

        Self {
            compilation,
            main_buffer_id,
            semantic_index: result.index,
            preamble,
            indexing_errors: result.indexing_errors,
        }
    }

    pub fn semantic_index(&self) -> &SemanticIndex {
        &self.semantic_index
    }

    pub fn compilation(&self) -> &Compilation {
        &self.compilation
    }

    pub fn source_manager(&self) -> &SourceManager {
        self.compilation.sources()
    }

    pub fn main_buffer_id(&self) -> BufferId {
        self.main_buffer_id
    }

    pub fn preamble(&self) -> Option<&Arc<PreambleManager>> {
        self.preamble.as_ref()
    }

    pub fn indexing_errors(&self) -> u64 {
        self.indexing_errors
    }
}

/// Parse any modules/interfaces the current buffer instantiates that
/// aren't already part of the preamble's compilation — a file the user
/// just created but hasn't saved into the layout yet, for instance.
/// Modules the preamble already knows about are *not* re-parsed here;
/// cross-compilation binding makes their symbols visible without it.
fn load_referenced_modules(
    compilation: &mut Compilation,
    preamble: &PreambleManager,
    layout: &ProjectLayout,
) {
    let referenced: Vec<String> = compilation
        .units()
        .iter()
        .flat_map(|unit| unit.containers.iter())
        .flat_map(|c| c.members.iter())
        .filter_map(|m| match m {
            crate::sv::ast::Member::Instance(inst) => Some(inst.module_name.name.clone()),
            _ => None,
        })
        .collect();

    for name in referenced {
        // Already resolvable through the preamble's symbols; no need to
        // duplicate its text into this overlay's SourceManager.
        if preamble.get_module(&name).is_some() {
            continue;
        }
        let Some(candidate) = layout
            .files
            .iter()
            .find(|f| file_stem_matches(f.as_path(), &name))
        else {
            continue;
        };
        if compilation.sources().buffer_for_path(candidate.as_path()).is_some() {
            continue;
        }
        match std::fs::read_to_string(candidate.as_path()) {
            Ok(text) => {
                compilation.add_source(candidate.as_path().to_path_buf(), text);
            }
            Err(err) => {
                tracing::warn!(target: "slangd::overlay", path = %candidate, %err, "failed to read referenced module source");
            }
        }
    }
}

fn file_stem_matches(path: &Path, module_name: &str) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| stem == module_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::project_layout::ProjectLayout;

    fn uri_for(path: &Path) -> Url {
        CanonicalPath::from_path(path).to_uri()
    }

    #[test]
    fn resolves_package_declared_only_in_the_preamble() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_path = dir.path().join("types_pkg.sv");
        std::fs::write(&pkg_path, "package types_pkg; endpackage").unwrap();
        let layout = ProjectLayout {
            files: vec![CanonicalPath::from_path(&pkg_path)],
            include_dirs: Vec::new(),
            defines: Vec::new(),
        };
        let preamble = Arc::new(PreambleManager::create_from_project_layout(&layout, 1));

        let top_path = dir.path().join("top.sv");
        let session = OverlaySession::create(
            &uri_for(&top_path),
            "module top; import types_pkg::*; endmodule".to_string(),
            &layout,
            Some(Arc::clone(&preamble)),
        );

        assert!(session.compilation().resolve_top_level("types_pkg").is_some());
        assert_eq!(session.indexing_errors(), 0);
    }

    #[test]
    fn loads_sibling_module_not_present_in_preamble() {
        let dir = tempfile::tempdir().unwrap();
        let sub_path = dir.path().join("sub.sv");
        std::fs::write(&sub_path, "module sub; endmodule").unwrap();
        let layout = ProjectLayout {
            files: vec![CanonicalPath::from_path(&sub_path)],
            include_dirs: Vec::new(),
            defines: Vec::new(),
        };

        let top_path = dir.path().join("top.sv");
        let session = OverlaySession::create(
            &uri_for(&top_path),
            "module top; sub s1(); endmodule".to_string(),
            &layout,
            None,
        );

        assert!(session.compilation().resolve_top_level("sub").is_some());
    }

    #[test]
    fn known_preamble_module_is_not_reparsed() {
        let dir = tempfile::tempdir().unwrap();
        let sub_path = dir.path().join("sub.sv");
        std::fs::write(&sub_path, "module sub; endmodule").unwrap();
        let layout = ProjectLayout {
            files: vec![CanonicalPath::from_path(&sub_path)],
            include_dirs: Vec::new(),
            defines: Vec::new(),
        };
        let preamble = Arc::new(PreambleManager::create_from_project_layout(&layout, 1));

        let top_path = dir.path().join("top.sv");
        let session = OverlaySession::create(
            &uri_for(&top_path),
            "module top; sub s1(); endmodule".to_string(),
            &layout,
            Some(preamble),
        );

        assert!(session.compilation().sources().buffer_for_path(&sub_path).is_none());
        assert!(session.compilation().resolve_top_level("sub").is_some());
    }
}

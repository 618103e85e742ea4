//! The immutable, process-wide background compilation. Construction is
//! the expensive part (parsing every file in the layout); everything
//! after that is O(1)/O(log n) lookups against precomputed tables.

use std::collections::HashMap;
use std::sync::Arc;

use async_lsp::lsp_types::{Location, Position, Range, Url};

use crate::core::canonical_path::CanonicalPath;
use crate::core::project_layout::ProjectLayout;
use crate::sv::compilation::Compilation;
use crate::sv::diagnostics::DiagnosticCode;
use crate::sv::source::SourceManager;
use crate::sv::symbol::SymbolId;

#[derive(Debug, Clone)]
pub struct PortInfo {
    pub name: String,
    pub def_range: Range,
}

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub file_uri: Url,
    pub def_range: Range,
    pub ports: HashMap<String, PortInfo>,
    pub parameters: HashMap<String, PortInfo>,
}

#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub name: String,
    pub file_uri: Url,
    pub def_range: Range,
}

/// Precomputed LSP coordinates for a preamble symbol, keyed by `SymbolId`.
/// This is the mechanism that lets `semantic::IndexVisitor` report a
/// definition location for a symbol whose declaring buffer lives in a
/// `SourceManager` the overlay never touches.
#[derive(Debug, Clone)]
pub struct PreambleSymbolInfo {
    pub file_uri: Url,
    pub def_range: Range,
}

pub struct PreambleManager {
    compilation: Arc<Compilation>,
    modules: HashMap<String, ModuleInfo>,
    packages: HashMap<String, PackageInfo>,
    package_map: HashMap<String, SymbolId>,
    symbol_info: HashMap<SymbolId, PreambleSymbolInfo>,
    version: u64,
}

impl PreambleManager {
    /// Parse and bind every file named by `layout`. Synchronous and
    /// CPU-bound by design: callers run this inside
    /// `tokio::task::spawn_blocking`.
    pub fn create_from_project_layout(layout: &ProjectLayout, version: u64) -> Self {
        let mut compilation = Compilation::new(None);

        for file in &layout.files {
            match std::fs::read_to_string(file.as_path()) {
                Ok(text) => {
                    compilation.add_source(file.as_path().to_path_buf(), text);
                }
                Err(err) => {
                    tracing::warn!(target: "slangd::preamble", path = %file, %err, "failed to read file, skipping");
                }
            }
        }

        for diag in compilation.diagnostics() {
            if diag.code == DiagnosticCode::DuplicateDefinition {
                tracing::warn!(target: "slangd::preamble", message = %diag.message, "duplicate definition detected while building preamble");
            }
        }

        let mut modules = HashMap::new();
        let mut packages = HashMap::new();
        let mut package_map = HashMap::new();

        for unit in compilation.units() {
            for container in &unit.containers {
                let Some(id) = compilation.resolve_at_span(container.name.span) else {
                    continue;
                };
                let file_uri = uri_for_span(compilation.sources(), container.name.span);
                let def_range = range_for_span(compilation.sources(), container.name.span);
                match container.kind {
                    crate::sv::ast::ContainerKind::Module => {
                        let mut ports = HashMap::new();
                        for port in &container.ports {
                            ports.insert(
                                port.name.name.clone(),
                                PortInfo {
                                    name: port.name.name.clone(),
                                    def_range: range_for_span(compilation.sources(), port.name.span),
                                },
                            );
                        }
                        let mut parameters = HashMap::new();
                        for param in &container.parameters {
                            parameters.insert(
                                param.name.name.clone(),
                                PortInfo {
                                    name: param.name.name.clone(),
                                    def_range: range_for_span(compilation.sources(), param.name.span),
                                },
                            );
                        }
                        modules.insert(
                            container.name.name.clone(),
                            ModuleInfo {
                                name: container.name.name.clone(),
                                file_uri,
                                def_range,
                                ports,
                                parameters,
                            },
                        );
                    }
                    crate::sv::ast::ContainerKind::Package => {
                        packages.insert(
                            container.name.name.clone(),
                            PackageInfo {
                                name: container.name.name.clone(),
                                file_uri,
                                def_range,
                            },
                        );
                        package_map.insert(container.name.name.clone(), id);
                    }
                    crate::sv::ast::ContainerKind::Interface => {
                        let mut ports = HashMap::new();
                        for port in &container.ports {
                            ports.insert(
                                port.name.name.clone(),
                                PortInfo {
                                    name: port.name.name.clone(),
                                    def_range: range_for_span(compilation.sources(), port.name.span),
                                },
                            );
                        }
                        modules.insert(
                            container.name.name.clone(),
                            ModuleInfo {
                                name: container.name.name.clone(),
                                file_uri,
                                def_range,
                                ports,
                                parameters: HashMap::new(),
                            },
                        );
                    }
                }
            }
        }

        let symbol_info = build_symbol_info(&compilation);

        Self {
            compilation: Arc::new(compilation),
            modules,
            packages,
            package_map,
            symbol_info,
            version,
        }
    }

    pub fn get_packages(&self) -> impl Iterator<Item = &PackageInfo> {
        self.packages.values()
    }

    pub fn get_modules(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.values()
    }

    pub fn get_module(&self, name: &str) -> Option<&ModuleInfo> {
        self.modules.get(name)
    }

    pub fn get_package(&self, name: &str) -> Option<&PackageInfo> {
        self.packages.get(name)
    }

    pub fn package_symbol_id(&self, name: &str) -> Option<SymbolId> {
        self.package_map.get(name).copied()
    }

    pub fn is_preamble_symbol(&self, id: SymbolId) -> bool {
        self.compilation.symbols().symbol(id).is_some()
    }

    pub fn get_symbol_info(&self, id: SymbolId) -> Option<&PreambleSymbolInfo> {
        self.symbol_info.get(&id)
    }

    pub fn get_source_manager(&self) -> &SourceManager {
        self.compilation.sources()
    }

    pub fn compilation(&self) -> &Compilation {
        &self.compilation
    }

    pub fn compilation_arc(&self) -> Arc<Compilation> {
        self.compilation.clone()
    }

    pub fn get_version(&self) -> u64 {
        self.version
    }
}

fn uri_for_span(sources: &SourceManager, span: crate::sv::source::Span) -> Url {
    sources
        .path(span.buffer)
        .map(|p| CanonicalPath::from_path(p).to_uri())
        .unwrap_or_else(|| Url::parse("file:///").expect("static URI is valid"))
}

fn range_for_span(sources: &SourceManager, span: crate::sv::source::Span) -> Range {
    let (start, end) = sources.span_line_col(span);
    Range {
        start: Position {
            line: start.line,
            character: start.character,
        },
        end: Position {
            line: end.line,
            character: end.character,
        },
    }
}

fn build_symbol_info(compilation: &Compilation) -> HashMap<SymbolId, PreambleSymbolInfo> {
    let mut info = HashMap::new();
    for (id, symbol) in &compilation.symbols().symbols {
        let file_uri = uri_for_span(compilation.sources(), symbol.name_span);
        let def_range = range_for_span(compilation.sources(), symbol.name_span);
        info.insert(*id, PreambleSymbolInfo { file_uri, def_range });
    }
    info
}

pub type SharedPreamble = Arc<PreambleManager>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::canonical_path::CanonicalPath;

    #[test]
    fn indexes_modules_and_packages_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let top_path = dir.path().join("top.sv");
        std::fs::write(&top_path, "module top #(parameter WIDTH = 8) (input clk); endmodule").unwrap();
        let pkg_path = dir.path().join("types_pkg.sv");
        std::fs::write(&pkg_path, "package types_pkg; endpackage").unwrap();

        let layout = ProjectLayout {
            files: vec![CanonicalPath::from_path(&top_path), CanonicalPath::from_path(&pkg_path)],
            include_dirs: Vec::new(),
            defines: Vec::new(),
        };
        let preamble = PreambleManager::create_from_project_layout(&layout, 1);

        let module = preamble.get_module("top").expect("module indexed");
        assert!(module.parameters.contains_key("WIDTH"));
        assert!(module.ports.contains_key("clk"));
        assert!(preamble.get_package("types_pkg").is_some());
        assert!(preamble.package_symbol_id("types_pkg").is_some());
        assert_eq!(preamble.get_version(), 1);
    }

    #[test]
    fn symbol_info_covers_every_bound_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("top.sv");
        std::fs::write(&path, "module top; logic x; endmodule").unwrap();
        let layout = ProjectLayout {
            files: vec![CanonicalPath::from_path(&path)],
            include_dirs: Vec::new(),
            defines: Vec::new(),
        };
        let preamble = PreambleManager::create_from_project_layout(&layout, 1);
        let module_id = preamble
            .compilation()
            .resolve_top_level("top")
            .expect("module resolves");
        assert!(preamble.is_preamble_symbol(module_id));
        assert!(preamble.get_symbol_info(module_id).is_some());
    }
}

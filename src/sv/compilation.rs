//! Ties the lexer, parser and symbol table into a single `Compilation`:
//! the facade that plays the role the spec's layered session model assigns
//! to an external SystemVerilog elaborator. A `Compilation` can be built
//! standing alone (the preamble) or layered on top of another one (an
//! overlay), in which case name resolution falls back to the base
//! compilation whenever a name isn't found locally. Because `BufferId` and
//! `SymbolId` are minted from global counters, a `SymbolId` the overlay
//! resolves against its base remains valid once copied into the overlay's
//! own result set.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::sv::ast::{CompilationUnit, ContainerDecl, ContainerKind, Member};
use crate::sv::diagnostics::CompilerDiagnostic;
use crate::sv::lexer::Lexer;
use crate::sv::parser;
use crate::sv::source::{BufferId, SourceManager, Span};
use crate::sv::symbol::{Scope, SymbolId, SymbolKind, SymbolTable};

/// One parsed-and-bound translation unit, plus everything needed to
/// translate its offsets back into LSP positions and its names into
/// symbols.
pub struct Compilation {
    base: Option<Arc<Compilation>>,
    sources: SourceManager,
    units: Vec<CompilationUnit>,
    symbols: SymbolTable,
    diagnostics: Vec<CompilerDiagnostic>,
    /// Packages named in a scope's `import pkg::*;`/`import pkg::name;`,
    /// keyed by the scope's own symbol id. Consulted by
    /// `resolve_in_scope_chain` once the scope's own members come up empty;
    /// the facade does not distinguish a wildcard import from a
    /// single-name one, since both make the package's members reachable
    /// unqualified within the scope.
    imports: std::collections::HashMap<SymbolId, Vec<String>>,
}

impl Compilation {
    pub fn new(base: Option<Arc<Compilation>>) -> Self {
        Self {
            base,
            sources: SourceManager::new(),
            units: Vec::new(),
            symbols: SymbolTable::new(),
            diagnostics: Vec::new(),
            imports: std::collections::HashMap::new(),
        }
    }

    pub fn base(&self) -> Option<&Arc<Compilation>> {
        self.base.as_ref()
    }

    pub fn sources(&self) -> &SourceManager {
        &self.sources
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn units(&self) -> &[CompilationUnit] {
        &self.units
    }

    pub fn diagnostics(&self) -> &[CompilerDiagnostic] {
        &self.diagnostics
    }

    /// Parse and bind one file's text into this compilation, returning the
    /// buffer it was stored under. Binding happens immediately (this facade
    /// has no separate "elaboration" pass) so diagnostics and symbols are
    /// available as soon as this call returns.
    pub fn add_source(&mut self, path: PathBuf, text: String) -> BufferId {
        let buffer = self.sources.add_buffer(path, text);
        let tokens = Lexer::new(buffer, self.sources.text(buffer)).tokenize();
        let result = parser::parse(buffer, tokens);
        self.diagnostics.extend(result.diagnostics);
        self.bind_unit(&result.unit);
        self.units.push(result.unit);
        buffer
    }

    fn bind_unit(&mut self, unit: &CompilationUnit) {
        for container in &unit.containers {
            self.bind_container(container);
        }
    }

    fn bind_container(&mut self, container: &ContainerDecl) {
        let kind = match container.kind {
            ContainerKind::Module => SymbolKind::Module,
            ContainerKind::Package => SymbolKind::Package,
            ContainerKind::Interface => SymbolKind::Interface,
        };
        let id = self.symbols.declare(
            kind,
            &container.name.name,
            container.name.span,
            container.full_span,
            None,
        );
        if let Some(prev) = self.symbols.top_level.insert(&container.name.name, id) {
            self.warn_duplicate(&container.name.name, prev, container.name.span);
        }

        let mut scope = Scope::default();
        for param in &container.parameters {
            let pid = self.symbols.declare(
                SymbolKind::Parameter,
                &param.name.name,
                param.name.span,
                param.name.span,
                Some(id),
            );
            scope.insert(&param.name.name, pid);
        }
        for port in &container.ports {
            let pid = self.symbols.declare(
                SymbolKind::Port,
                &port.name.name,
                port.name.span,
                port.name.span,
                Some(id),
            );
            scope.insert(&port.name.name, pid);
        }
        self.bind_members(&container.members, id, &mut scope);
        self.symbols.scopes.insert(id, scope);
    }

    fn bind_members(&mut self, members: &[Member], parent: SymbolId, scope: &mut Scope) {
        for member in members {
            match member {
                Member::Parameter(p) => {
                    let id = self.symbols.declare(
                        SymbolKind::Parameter,
                        &p.name.name,
                        p.name.span,
                        p.name.span,
                        Some(parent),
                    );
                    scope.insert(&p.name.name, id);
                }
                Member::Variable(v) => {
                    for name in &v.names {
                        let id = self.symbols.declare(
                            SymbolKind::Variable,
                            &name.name,
                            name.span,
                            name.span,
                            Some(parent),
                        );
                        scope.insert(&name.name, id);
                    }
                }
                Member::Typedef(t) => {
                    let id = self.symbols.declare(
                        SymbolKind::Typedef,
                        &t.name.name,
                        t.name.span,
                        t.name.span,
                        Some(parent),
                    );
                    scope.insert(&t.name.name, id);
                }
                Member::Enum(e) => {
                    let enum_span = e.name.as_ref().map(|n| n.span);
                    let enum_id = if let Some(name) = &e.name {
                        let id = self.symbols.declare(
                            SymbolKind::Enum,
                            &name.name,
                            name.span,
                            name.span,
                            Some(parent),
                        );
                        scope.insert(&name.name, id);
                        Some(id)
                    } else {
                        None
                    };
                    for value in &e.values {
                        let id = self.symbols.declare(
                            SymbolKind::EnumValue,
                            &value.name,
                            value.span,
                            value.span,
                            enum_id.or(Some(parent)),
                        );
                        // Enumerands are visible in the enclosing scope,
                        // matching SystemVerilog's unscoped-enum rule.
                        scope.insert(&value.name, id);
                    }
                    let _ = enum_span;
                }
                Member::Subroutine(s) => {
                    let kind = if s.is_task {
                        SymbolKind::Task
                    } else {
                        SymbolKind::Function
                    };
                    let full_span = s
                        .end_label
                        .as_ref()
                        .map(|l| Span::new(l.span.buffer, s.name.span.start, l.span.end))
                        .unwrap_or(s.name.span);
                    let id = self
                        .symbols
                        .declare(kind, &s.name.name, s.name.span, full_span, Some(parent));
                    scope.insert(&s.name.name, id);
                    let mut sub_scope = Scope::default();
                    for arg in &s.args {
                        let aid = self.symbols.declare(
                            SymbolKind::Port,
                            &arg.name.name,
                            arg.name.span,
                            arg.name.span,
                            Some(id),
                        );
                        sub_scope.insert(&arg.name.name, aid);
                    }
                    self.bind_members(&s.body, id, &mut sub_scope);
                    self.symbols.scopes.insert(id, sub_scope);
                }
                Member::Class(c) => {
                    let full_span = c
                        .end_label
                        .as_ref()
                        .map(|l| Span::new(l.span.buffer, c.name.span.start, l.span.end))
                        .unwrap_or(c.name.span);
                    let id = self
                        .symbols
                        .declare(SymbolKind::Class, &c.name.name, c.name.span, full_span, Some(parent));
                    scope.insert(&c.name.name, id);
                    let mut class_scope = Scope::default();
                    for p in &c.type_params {
                        let pid = self.symbols.declare(
                            SymbolKind::Parameter,
                            &p.name,
                            p.span,
                            p.span,
                            Some(id),
                        );
                        class_scope.insert(&p.name, pid);
                    }
                    self.bind_members(&c.members, id, &mut class_scope);
                    self.symbols.scopes.insert(id, class_scope);
                }
                Member::Genvar(g) => {
                    for name in &g.names {
                        let id = self.symbols.declare(
                            SymbolKind::Genvar,
                            &name.name,
                            name.span,
                            name.span,
                            Some(parent),
                        );
                        scope.insert(&name.name, id);
                    }
                }
                Member::Generate(g) => {
                    self.bind_generate(g, parent, scope);
                }
                Member::NamedBlock(b) => {
                    let (name, name_span) = match &b.label {
                        Some(l) => (l.name.clone(), l.span),
                        None => (String::new(), self.anonymous_span(parent)),
                    };
                    let id = self.symbols.declare(
                        SymbolKind::NamedBlock,
                        &name,
                        name_span,
                        name_span,
                        Some(parent),
                    );
                    if b.label.is_some() {
                        scope.insert(&name, id);
                    }
                    let mut inner = Scope::default();
                    self.bind_members(&b.body, id, &mut inner);
                    self.symbols.scopes.insert(id, inner);
                }
                Member::Modport(m) => {
                    let id = self.symbols.declare(
                        SymbolKind::Modport,
                        &m.name.name,
                        m.name.span,
                        m.name.span,
                        Some(parent),
                    );
                    scope.insert(&m.name.name, id);
                    let mut modport_scope = Scope::default();
                    for port in &m.ports {
                        let pid = self.symbols.declare(
                            SymbolKind::Port,
                            &port.name.name,
                            port.name.span,
                            port.name.span,
                            Some(id),
                        );
                        modport_scope.insert(&port.name.name, pid);
                    }
                    self.symbols.scopes.insert(id, modport_scope);
                }
                Member::Import(item) => {
                    // Imports don't declare a symbol, but they make the
                    // package's members reachable unqualified from `parent`
                    // onward; `resolve_in_scope_chain` consults this.
                    self.imports.entry(parent).or_default().push(item.package.name.clone());
                }
                Member::Instance(inst) => {
                    for item in &inst.instances {
                        let id = self.symbols.declare(
                            SymbolKind::Instance,
                            &item.name.name,
                            item.name.span,
                            item.name.span,
                            Some(parent),
                        );
                        scope.insert(&item.name.name, id);
                    }
                }
                Member::Assign(_) | Member::ProceduralBlock(_) => {
                    // No declarations; references inside are resolved by
                    // the visitor walking the AST directly.
                }
            }
        }
    }

    fn bind_generate(&mut self, g: &crate::sv::ast::GenerateBlock, parent: SymbolId, scope: &mut Scope) {
        let (name, name_span) = match &g.label {
            Some(l) => (l.name.clone(), l.span),
            None => (String::new(), self.anonymous_span(parent)),
        };
        let id = self.symbols.declare(
            SymbolKind::GenerateBlock,
            &name,
            name_span,
            name_span,
            Some(parent),
        );
        if g.label.is_some() {
            scope.insert(&name, id);
        }
        let mut inner = Scope::default();
        self.bind_members(&g.body, id, &mut inner);
        self.symbols.scopes.insert(id, inner);
        if let Some(else_branch) = &g.else_branch {
            self.bind_generate(else_branch, parent, scope);
        }
    }

    /// Resolve a bare top-level name (module/package/interface), checking
    /// this compilation first and falling back to the base compilation
    /// (the preamble) if present and the name isn't found locally.
    pub fn resolve_top_level(&self, name: &str) -> Option<SymbolId> {
        self.symbols
            .top_level
            .get(name)
            .or_else(|| self.base.as_ref().and_then(|b| b.resolve_top_level(name)))
    }

    /// Resolve `pkg::member`, falling back to the base compilation.
    pub fn resolve_scoped(&self, pkg: &str, member: &str) -> Option<SymbolId> {
        self.symbols
            .resolve_scoped(pkg, member)
            .or_else(|| self.base.as_ref().and_then(|b| b.resolve_scoped(pkg, member)))
    }

    /// Look up a symbol by id, checking the base compilation if it isn't
    /// one of ours. Needed because an overlay's reference can resolve to a
    /// `SymbolId` minted while binding the preamble.
    pub fn symbol(&self, id: SymbolId) -> Option<&crate::sv::symbol::Symbol> {
        self.symbols
            .symbol(id)
            .or_else(|| self.base.as_ref().and_then(|b| b.symbol(id)))
    }

    /// Recover the `SymbolId` the binder minted for a declarator's own
    /// span, checking the base compilation too.
    pub fn resolve_at_span(&self, span: Span) -> Option<SymbolId> {
        self.symbols
            .symbol_at_name_span(span)
            .or_else(|| self.base.as_ref().and_then(|b| b.resolve_at_span(span)))
    }

    pub fn scope_of(&self, id: SymbolId) -> Option<&Scope> {
        self.symbols
            .scope(id)
            .or_else(|| self.base.as_ref().and_then(|b| b.scope_of(id)))
    }

    /// Walk `name` up the scope chain starting at `start`, then fall back
    /// to top-level names. Mirrors ordinary SystemVerilog lexical scoping
    /// closely enough for reference tracking without a full name-space
    /// model.
    pub fn resolve_in_scope_chain(&self, start: SymbolId, name: &str) -> Option<SymbolId> {
        let mut current = Some(start);
        while let Some(id) = current {
            if let Some(found) = self.scope_of(id).and_then(|s| s.get(name)) {
                return Some(found);
            }
            if let Some(found) = self
                .imports_at(id)
                .and_then(|pkgs| pkgs.iter().find_map(|pkg| self.resolve_scoped(pkg, name)))
            {
                return Some(found);
            }
            current = self.symbol(id).and_then(|s| s.parent);
        }
        self.resolve_top_level(name)
    }

    /// Packages imported into `id`'s scope, checking the base compilation
    /// too (an overlay reference may walk up into a preamble-owned scope).
    fn imports_at(&self, id: SymbolId) -> Option<&Vec<String>> {
        self.imports
            .get(&id)
            .or_else(|| self.base.as_ref().and_then(|b| b.imports_at(id)))
    }

    /// Location info for a symbol: which buffer and source manager it was
    /// declared in. Overlay callers use this to decide whether a
    /// definition target lives in their own buffer or must be reported
    /// against a preamble path instead.
    pub fn path_for_symbol(&self, id: SymbolId) -> Option<&Path> {
        if let Some(sym) = self.symbols.symbol(id) {
            return self.sources.path(sym.name_span.buffer);
        }
        self.base.as_ref().and_then(|b| b.path_for_symbol(id))
    }

    pub fn line_col_for_symbol(
        &self,
        id: SymbolId,
    ) -> Option<(crate::sv::source::LineCol, crate::sv::source::LineCol)> {
        if let Some(sym) = self.symbols.symbol(id) {
            return Some(self.sources.span_line_col(sym.name_span));
        }
        self.base
            .as_ref()
            .and_then(|b| b.line_col_for_symbol(id))
    }

    fn warn_duplicate(&mut self, name: &str, _previous: SymbolId, span: Span) {
        self.diagnostics.push(CompilerDiagnostic::new(
            crate::sv::diagnostics::DiagnosticCode::DuplicateDefinition,
            crate::sv::diagnostics::Severity::Warning,
            format!("redefinition of '{name}'"),
            span,
        ));
    }

    /// Anonymous (unlabeled) `begin`/generate blocks still need a span to
    /// satisfy `Symbol::name_span`; reuse the zero-width point at the start
    /// of the parent's own span rather than inventing a sentinel buffer.
    fn anonymous_span(&self, parent: SymbolId) -> Span {
        self.symbols
            .symbol(parent)
            .map(|s| Span::new(s.name_span.buffer, s.name_span.start, s.name_span.start))
            .unwrap_or_else(|| Span::new(BufferId::fresh(), 0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_module_ports_and_parameters() {
        let mut compilation = Compilation::new(None);
        compilation.add_source(
            PathBuf::from("top.sv"),
            "module top #(parameter WIDTH = 8) (input clk, output rst); endmodule".to_string(),
        );

        let id = compilation.resolve_top_level("top").expect("module should bind");
        let scope = compilation.scope_of(id).expect("module scope");
        assert!(scope.get("WIDTH").is_some());
        assert!(scope.get("clk").is_some());
        assert!(scope.get("rst").is_some());
    }

    #[test]
    fn duplicate_module_names_warn_and_last_write_wins() {
        let mut compilation = Compilation::new(None);
        compilation.add_source(PathBuf::from("a.sv"), "module dup; endmodule".to_string());
        compilation.add_source(PathBuf::from("b.sv"), "module dup; endmodule".to_string());

        let warned = compilation
            .diagnostics()
            .iter()
            .any(|d| d.code == crate::sv::diagnostics::DiagnosticCode::DuplicateDefinition);
        assert!(warned);

        let id = compilation.resolve_top_level("dup").expect("still resolvable");
        let path = compilation.path_for_symbol(id).expect("has a path");
        assert_eq!(path, Path::new("b.sv"));
    }

    #[test]
    fn overlay_resolves_names_through_base_compilation() {
        let mut preamble = Compilation::new(None);
        preamble.add_source(PathBuf::from("pkg.sv"), "package types_pkg; endpackage".to_string());
        let preamble = Arc::new(preamble);

        let mut overlay = Compilation::new(Some(Arc::clone(&preamble)));
        overlay.add_source(PathBuf::from("top.sv"), "module top; endmodule".to_string());

        assert!(overlay.resolve_top_level("top").is_some());
        let pkg_id = overlay.resolve_top_level("types_pkg").expect("falls back to base");
        assert_eq!(compilation_symbol_path(&overlay, pkg_id), Some(Path::new("pkg.sv")));
    }

    fn compilation_symbol_path<'a>(c: &'a Compilation, id: SymbolId) -> Option<&'a Path> {
        c.path_for_symbol(id)
    }

    #[test]
    fn scope_chain_falls_back_through_parent_to_top_level() {
        let mut compilation = Compilation::new(None);
        compilation.add_source(
            PathBuf::from("top.sv"),
            "module top; logic x; begin : blk logic y; end endmodule".to_string(),
        );

        let top = compilation.resolve_top_level("top").unwrap();
        let block_scope = compilation.scope_of(top).and_then(|s| s.get("blk")).unwrap();

        assert!(compilation.resolve_in_scope_chain(block_scope, "y").is_some());
        assert!(compilation.resolve_in_scope_chain(block_scope, "x").is_some());
        assert!(compilation.resolve_in_scope_chain(block_scope, "top").is_some());
    }
}

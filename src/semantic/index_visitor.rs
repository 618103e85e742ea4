//! Walks a `Compilation`'s AST for one file and produces a `SemanticIndex`.
//! This is the component that has to get the cross-compilation location
//! problem right: a reference in the overlay may resolve to a symbol whose
//! `SymbolId` was minted while binding the preamble, in which case its
//! coordinates must come from the preamble's precomputed `symbol_info`
//! table (via `PreambleManager::get_symbol_info`), never by reinterpreting
//! the id's span through the overlay's own `SourceManager`.

use std::collections::HashSet;

use async_lsp::lsp_types::{Location, Position, Range, SymbolKind as LspSymbolKind, Url};

use crate::semantic::semantic_index::{ScopeId, SemanticEntry, SemanticIndex};
use crate::services::preamble_manager::PreambleManager;
use crate::sv::ast::{
    ContainerDecl, Expr, GenerateBlock, ImportItem, Instantiation, Member, TypeRef,
};
use crate::sv::compilation::Compilation;
use crate::sv::source::{BufferId, SourceManager, Span};
use crate::sv::symbol::{SymbolId, SymbolKind};

fn lsp_kind(kind: SymbolKind) -> LspSymbolKind {
    match kind {
        SymbolKind::Module => LspSymbolKind::MODULE,
        SymbolKind::Package => LspSymbolKind::PACKAGE,
        SymbolKind::Interface => LspSymbolKind::INTERFACE,
        SymbolKind::Modport => LspSymbolKind::INTERFACE,
        SymbolKind::Parameter => LspSymbolKind::CONSTANT,
        SymbolKind::Port => LspSymbolKind::PROPERTY,
        SymbolKind::Variable => LspSymbolKind::VARIABLE,
        SymbolKind::Typedef => LspSymbolKind::TYPE_PARAMETER,
        SymbolKind::Enum => LspSymbolKind::ENUM,
        SymbolKind::EnumValue => LspSymbolKind::ENUM_MEMBER,
        SymbolKind::Function => LspSymbolKind::FUNCTION,
        SymbolKind::Task => LspSymbolKind::METHOD,
        SymbolKind::Class => LspSymbolKind::CLASS,
        SymbolKind::Genvar => LspSymbolKind::VARIABLE,
        SymbolKind::GenerateBlock => LspSymbolKind::NAMESPACE,
        SymbolKind::NamedBlock => LspSymbolKind::NAMESPACE,
        SymbolKind::Instance => LspSymbolKind::OBJECT,
    }
}

pub struct IndexResult {
    pub index: SemanticIndex,
    pub indexing_errors: u64,
}

pub fn build_index(
    compilation: &Compilation,
    preamble: Option<&PreambleManager>,
    current_buffer: BufferId,
    current_uri: Url,
) -> IndexResult {
    let mut visitor = Visitor {
        compilation,
        preamble,
        source: compilation.sources(),
        current_buffer,
        current_uri,
        entries: Vec::new(),
        visited_type_spans: HashSet::new(),
        visited_condition_spans: HashSet::new(),
        indexing_errors: 0,
    };
    for unit in compilation.units() {
        for container in &unit.containers {
            if container.name.span.buffer != current_buffer {
                continue;
            }
            visitor.visit_container(container, None);
        }
    }
    IndexResult {
        index: SemanticIndex::new(visitor.entries),
        indexing_errors: visitor.indexing_errors,
    }
}

struct Visitor<'a> {
    compilation: &'a Compilation,
    preamble: Option<&'a PreambleManager>,
    source: &'a SourceManager,
    current_buffer: BufferId,
    current_uri: Url,
    entries: Vec<SemanticEntry>,
    visited_type_spans: HashSet<Span>,
    visited_condition_spans: HashSet<Span>,
    indexing_errors: u64,
}

impl<'a> Visitor<'a> {
    fn span_to_range(&self, span: Span) -> Range {
        let (start, end) = self.source.span_line_col(span);
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

    fn self_location(&self, span: Span) -> Location {
        Location {
            uri: self.current_uri.clone(),
            range: self.span_to_range(span),
        }
    }

    /// Resolve `id` to a `Location`, routing through the preamble's
    /// `symbol_info` table when `id` was minted there. Returns `None` (and
    /// bumps the error counter) when a preamble id has no recorded info —
    /// the single sanctioned "silently drop" case in the design.
    fn location_for_symbol(&mut self, id: SymbolId) -> Option<Location> {
        // Symbol was declared in this compilation's own units (the
        // overlay's main buffer or a sibling file pulled in for
        // elaboration): convert through our own SourceManager.
        if let Some(sym) = self.compilation.symbols().symbol(id) {
            return Some(self.self_location_in_own_sources(sym.name_span));
        }
        // Otherwise the id was minted while binding the preamble; its
        // coordinates must come from the preamble's own SourceManager via
        // the precomputed lookup table, never by reinterpreting the span
        // through this compilation's SourceManager.
        if let Some(preamble) = self.preamble {
            if let Some(info) = preamble.get_symbol_info(id) {
                return Some(Location {
                    uri: info.file_uri.clone(),
                    range: info.def_range,
                });
            }
            if preamble.is_preamble_symbol(id) {
                self.indexing_errors += 1;
                return None;
            }
        }
        None
    }

    fn self_location_in_own_sources(&self, span: Span) -> Location {
        let uri = if span.buffer == self.current_buffer {
            self.current_uri.clone()
        } else {
            self.compilation
                .sources()
                .path(span.buffer)
                .map(|p| {
                    crate::core::canonical_path::CanonicalPath::from_path(p).to_uri()
                })
                .unwrap_or_else(|| self.current_uri.clone())
        };
        Location {
            uri,
            range: self.span_to_range(span),
        }
    }

    fn emit_definition(
        &mut self,
        id: SymbolId,
        kind: SymbolKind,
        name: &str,
        name_span: Span,
        parent_scope: Option<ScopeId>,
        children_scope: Option<ScopeId>,
    ) {
        let loc = self.self_location_in_own_sources(name_span);
        self.entries.push(SemanticEntry {
            ref_range: loc.range,
            def_loc: loc,
            symbol_id: id,
            lsp_kind: lsp_kind(kind),
            name: name.to_string(),
            parent_scope,
            children_scope,
            is_definition: true,
        });
    }

    fn emit_reference(&mut self, target: SymbolId, kind: SymbolKind, name: &str, ref_span: Span) {
        if ref_span.buffer != self.current_buffer {
            return;
        }
        let Some(def_loc) = self.location_for_symbol(target) else {
            return;
        };
        self.entries.push(SemanticEntry {
            ref_range: self.span_to_range(ref_span),
            def_loc,
            symbol_id: target,
            lsp_kind: lsp_kind(kind),
            name: name.to_string(),
            parent_scope: None,
            children_scope: None,
            is_definition: false,
        });
    }

    fn visit_container(&mut self, container: &ContainerDecl, parent_scope: Option<ScopeId>) {
        let Some(id) = self.compilation.resolve_at_span(container.name.span) else {
            return;
        };
        let kind = match container.kind {
            crate::sv::ast::ContainerKind::Module => SymbolKind::Module,
            crate::sv::ast::ContainerKind::Package => SymbolKind::Package,
            crate::sv::ast::ContainerKind::Interface => SymbolKind::Interface,
        };
        self.emit_definition(
            id,
            kind,
            &container.name.name,
            container.name.span,
            parent_scope,
            Some(id),
        );
        if let Some(end_label) = &container.end_label {
            self.emit_reference(id, kind, &end_label.name, end_label.span);
        }

        for param in &container.parameters {
            if let Some(pid) = self.compilation.resolve_at_span(param.name.span) {
                self.emit_definition(pid, SymbolKind::Parameter, &param.name.name, param.name.span, Some(id), None);
            }
            if let Some(default) = &param.default {
                self.visit_expr(default, id);
            }
        }
        for port in &container.ports {
            if let Some(pid) = self.compilation.resolve_at_span(port.name.span) {
                self.emit_definition(pid, SymbolKind::Port, &port.name.name, port.name.span, Some(id), None);
            }
            if let Some(type_ref) = &port.type_ref {
                self.visit_type_ref(type_ref, id);
                if let Some(modport) = &port.modport {
                    if let Some(mid) = self
                        .compilation
                        .resolve_scoped(&type_ref.name.name, &modport.name)
                    {
                        self.emit_reference(mid, SymbolKind::Modport, &modport.name, modport.span);
                    }
                }
            }
        }
        self.visit_members(&container.members, id);
    }

    fn visit_members(&mut self, members: &[Member], scope: SymbolId) {
        for member in members {
            self.visit_member(member, scope);
        }
    }

    fn visit_member(&mut self, member: &Member, scope: SymbolId) {
        match member {
            Member::Parameter(p) => {
                if let Some(id) = self.compilation.resolve_at_span(p.name.span) {
                    self.emit_definition(id, SymbolKind::Parameter, &p.name.name, p.name.span, Some(scope), None);
                }
                if let Some(default) = &p.default {
                    self.visit_expr(default, scope);
                }
            }
            Member::Variable(v) => {
                if let Some(type_ref) = &v.type_ref {
                    self.visit_type_ref(type_ref, scope);
                }
                for name in &v.names {
                    if let Some(id) = self.compilation.resolve_at_span(name.span) {
                        self.emit_definition(id, SymbolKind::Variable, &name.name, name.span, Some(scope), None);
                    }
                }
            }
            Member::Typedef(t) => {
                if let Some(id) = self.compilation.resolve_at_span(t.name.span) {
                    self.emit_definition(id, SymbolKind::Typedef, &t.name.name, t.name.span, Some(scope), None);
                }
                if let Some(type_ref) = &t.type_ref {
                    self.visit_type_ref(type_ref, scope);
                }
            }
            Member::Enum(e) => {
                let enum_id = match &e.name {
                    Some(name) => {
                        let id = self.compilation.resolve_at_span(name.span);
                        if let Some(id) = id {
                            self.emit_definition(id, SymbolKind::Enum, &name.name, name.span, Some(scope), Some(id));
                        }
                        id
                    }
                    None => None,
                };
                for value in &e.values {
                    if let Some(id) = self.compilation.resolve_at_span(value.span) {
                        self.emit_definition(
                            id,
                            SymbolKind::EnumValue,
                            &value.name,
                            value.span,
                            enum_id.or(Some(scope)),
                            None,
                        );
                    }
                }
            }
            Member::Subroutine(s) => {
                let Some(id) = self.compilation.resolve_at_span(s.name.span) else {
                    return;
                };
                let kind = if s.is_task { SymbolKind::Task } else { SymbolKind::Function };
                self.emit_definition(id, kind, &s.name.name, s.name.span, Some(scope), Some(id));
                if let Some(end_label) = &s.end_label {
                    self.emit_reference(id, kind, &end_label.name, end_label.span);
                }
                for arg in &s.args {
                    if let Some(aid) = self.compilation.resolve_at_span(arg.name.span) {
                        self.emit_definition(aid, SymbolKind::Port, &arg.name.name, arg.name.span, Some(id), None);
                    }
                }
                self.visit_members(&s.body, id);
            }
            Member::Class(c) => {
                let Some(id) = self.compilation.resolve_at_span(c.name.span) else {
                    return;
                };
                self.emit_definition(id, SymbolKind::Class, &c.name.name, c.name.span, Some(scope), Some(id));
                if let Some(end_label) = &c.end_label {
                    self.emit_reference(id, SymbolKind::Class, &end_label.name, end_label.span);
                }
                if let Some(extends) = &c.extends {
                    self.visit_type_ref(extends, scope);
                }
                self.visit_members(&c.members, id);
            }
            Member::Genvar(g) => {
                for name in &g.names {
                    if let Some(id) = self.compilation.resolve_at_span(name.span) {
                        self.emit_definition(id, SymbolKind::Genvar, &name.name, name.span, Some(scope), None);
                    }
                }
            }
            Member::Generate(g) => self.visit_generate(g, scope),
            Member::NamedBlock(b) => {
                if let Some(label) = &b.label {
                    if let Some(id) = self.compilation.resolve_at_span(label.span) {
                        self.emit_definition(id, SymbolKind::NamedBlock, &label.name, label.span, Some(scope), Some(id));
                        self.visit_members(&b.body, id);
                        return;
                    }
                }
                self.visit_members(&b.body, scope);
            }
            Member::Modport(m) => {
                if let Some(id) = self.compilation.resolve_at_span(m.name.span) {
                    self.emit_definition(id, SymbolKind::Modport, &m.name.name, m.name.span, Some(scope), Some(id));
                    for port in &m.ports {
                        if let Some(pid) = self.compilation.resolve_at_span(port.name.span) {
                            self.emit_definition(pid, SymbolKind::Port, &port.name.name, port.name.span, Some(id), None);
                        }
                    }
                }
            }
            Member::Import(import) => self.visit_import(import, scope),
            Member::Instance(inst) => self.visit_instantiation(inst, scope),
            Member::Assign(a) => {
                self.visit_expr(&a.lhs, scope);
                if let Some(rhs) = &a.rhs {
                    self.visit_expr(rhs, scope);
                }
            }
            Member::ProceduralBlock(body) => self.visit_members(body, scope),
        }
    }

    fn visit_generate(&mut self, g: &GenerateBlock, scope: SymbolId) {
        if let Some(condition) = &g.condition {
            if self.visited_condition_spans.insert(condition.span()) {
                self.visit_expr(condition, scope);
            }
        }
        if let Some(label) = &g.label {
            if let Some(id) = self.compilation.resolve_at_span(label.span) {
                self.emit_definition(id, SymbolKind::GenerateBlock, &label.name, label.span, Some(scope), Some(id));
                self.visit_members(&g.body, id);
            } else {
                self.visit_members(&g.body, scope);
            }
        } else {
            self.visit_members(&g.body, scope);
        }
        if let Some(else_branch) = &g.else_branch {
            self.visit_generate(else_branch, scope);
        }
    }

    fn visit_import(&mut self, import: &ImportItem, scope: SymbolId) {
        if let Some(pkg_id) = self.compilation.resolve_top_level(&import.package.name) {
            self.emit_reference(pkg_id, SymbolKind::Package, &import.package.name, import.package.span);
            if let Some(member) = &import.member {
                if let Some(member_id) = self.compilation.resolve_scoped(&import.package.name, &member.name) {
                    self.emit_reference(member_id, SymbolKind::Variable, &member.name, member.span);
                }
            }
        }
        let _ = scope;
    }

    fn visit_instantiation(&mut self, inst: &Instantiation, scope: SymbolId) {
        let module_id = self.compilation.resolve_top_level(&inst.module_name.name);
        if let Some(module_id) = module_id {
            self.emit_reference(module_id, SymbolKind::Module, &inst.module_name.name, inst.module_name.span);
        }
        for (name, expr) in &inst.param_overrides {
            if let Some(module_id) = module_id {
                if let Some(pid) = self.compilation.scope_of(module_id).and_then(|s| s.get(&name.name)) {
                    self.emit_reference(pid, SymbolKind::Parameter, &name.name, name.span);
                }
            }
            if let Some(expr) = expr {
                self.visit_expr(expr, scope);
            }
        }
        for item in &inst.instances {
            if let Some(id) = self.compilation.resolve_at_span(item.name.span) {
                self.emit_definition(id, SymbolKind::Instance, &item.name.name, item.name.span, Some(scope), None);
            }
            for conn in &item.connections {
                if let Some(module_id) = module_id {
                    if let Some(pid) = self.compilation.scope_of(module_id).and_then(|s| s.get(&conn.port_name.name)) {
                        self.emit_reference(pid, SymbolKind::Port, &conn.port_name.name, conn.port_name.span);
                    }
                }
                if let Some(expr) = &conn.expr {
                    self.visit_expr(expr, scope);
                }
            }
        }
    }

    fn visit_type_ref(&mut self, type_ref: &TypeRef, scope: SymbolId) {
        if !self.visited_type_spans.insert(type_ref.name.span) {
            return;
        }
        let mut class_id = None;
        if let Some(scope_ident) = &type_ref.scope {
            if let Some(pkg_id) = self.compilation.resolve_top_level(&scope_ident.name) {
                self.emit_reference(pkg_id, SymbolKind::Package, &scope_ident.name, scope_ident.span);
            }
            if let Some(id) = self
                .compilation
                .resolve_scoped(&scope_ident.name, &type_ref.name.name)
            {
                self.emit_reference(id, SymbolKind::Typedef, &type_ref.name.name, type_ref.name.span);
                class_id = Some(id);
            }
        } else if let Some(id) = self.compilation.resolve_in_scope_chain(scope, &type_ref.name.name) {
            self.emit_reference(id, SymbolKind::Typedef, &type_ref.name.name, type_ref.name.span);
            class_id = Some(id);
        }
        for (param_name, expr) in &type_ref.class_params {
            if let Some(param_name) = param_name {
                if let Some(pid) = class_id.and_then(|id| self.compilation.scope_of(id)).and_then(|s| s.get(&param_name.name)) {
                    self.emit_reference(pid, SymbolKind::Parameter, &param_name.name, param_name.span);
                }
            }
            self.visit_expr(expr, scope);
        }
    }

    fn visit_expr(&mut self, expr: &Expr, scope: SymbolId) {
        match expr {
            Expr::Ident(id) => {
                if let Some(target) = self.compilation.resolve_in_scope_chain(scope, &id.name) {
                    let kind = self
                        .compilation
                        .symbol(target)
                        .map(|s| s.kind)
                        .unwrap_or(SymbolKind::Variable);
                    self.emit_reference(target, kind, &id.name, id.span);
                }
            }
            Expr::Scoped(pkg, item) => {
                if let Some(pkg_id) = self.compilation.resolve_top_level(&pkg.name) {
                    self.emit_reference(pkg_id, SymbolKind::Package, &pkg.name, pkg.span);
                }
                if let Some(id) = self.compilation.resolve_scoped(&pkg.name, &item.name) {
                    self.emit_reference(id, SymbolKind::Variable, &item.name, item.span);
                }
            }
            Expr::Member(base, _member) => {
                // Member access needs a type system to resolve precisely;
                // this facade only follows the base expression.
                self.visit_expr(base, scope);
            }
            Expr::Call(callee, args) => {
                self.visit_expr(callee, scope);
                for arg in args {
                    self.visit_expr(arg, scope);
                }
            }
            Expr::ClassScopedCall(class, method, args) => {
                if let Some(class_id) = self.compilation.resolve_in_scope_chain(scope, &class.name) {
                    self.emit_reference(class_id, SymbolKind::Class, &class.name, class.span);
                    if let Some(method_id) = self.compilation.scope_of(class_id).and_then(|s| s.get(&method.name)) {
                        self.emit_reference(method_id, SymbolKind::Function, &method.name, method.span);
                    }
                }
                for arg in args {
                    self.visit_expr(arg, scope);
                }
            }
            Expr::Opaque(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::canonical_path::CanonicalPath;
    use crate::core::project_layout::ProjectLayout;
    use crate::services::preamble_manager::PreambleManager;

    fn parse(text: &str) -> (Compilation, BufferId) {
        let mut compilation = Compilation::new(None);
        let id = compilation.add_source(std::path::PathBuf::from("top.sv"), text.to_string());
        (compilation, id)
    }

    #[test]
    fn indexes_a_module_definition_and_its_port() {
        let (compilation, buffer) = parse("module top(input clk); endmodule");
        let uri = Url::parse("file:///top.sv").unwrap();
        let result = build_index(&compilation, None, buffer, uri);
        let defs: Vec<_> = result.index.get_semantic_entries().iter().filter(|e| e.is_definition).collect();
        assert!(defs.iter().any(|e| e.name == "top" && e.lsp_kind == LspSymbolKind::MODULE));
        assert!(defs.iter().any(|e| e.name == "clk" && e.lsp_kind == LspSymbolKind::PROPERTY));
        assert_eq!(result.indexing_errors, 0);
    }

    #[test]
    fn indexes_an_instantiation_reference_to_its_module() {
        let (compilation, buffer) = parse("module top; sub s1(); endmodule module sub; endmodule");
        let uri = Url::parse("file:///top.sv").unwrap();
        let result = build_index(&compilation, None, buffer, uri);
        let entries = result.index.get_semantic_entries();
        let reference = entries
            .iter()
            .find(|e| !e.is_definition && e.name == "sub")
            .expect("instantiation reference recorded");
        assert_eq!(reference.def_loc.uri.as_str(), "file:///top.sv");
    }

    #[test]
    fn resolves_reference_to_a_preamble_symbol_via_symbol_info() {
        let dir = tempfile::tempdir().unwrap();
        let sub_path = dir.path().join("sub.sv");
        std::fs::write(&sub_path, "module sub; endmodule").unwrap();
        let layout = ProjectLayout {
            files: vec![CanonicalPath::from_path(&sub_path)],
            include_dirs: Vec::new(),
            defines: Vec::new(),
        };
        let preamble = PreambleManager::create_from_project_layout(&layout, 1);

        let mut overlay = Compilation::new(Some(preamble.compilation_arc()));
        let buffer = overlay.add_source(std::path::PathBuf::from("top.sv"), "module top; sub s1(); endmodule".to_string());
        let uri = Url::parse("file:///top.sv").unwrap();

        let result = build_index(&overlay, Some(&preamble), buffer, uri);
        let reference = result
            .index
            .get_semantic_entries()
            .iter()
            .find(|e| !e.is_definition && e.name == "sub")
            .expect("reference to preamble module recorded");
        assert!(reference.def_loc.uri.as_str().ends_with("sub.sv"));
        assert_eq!(result.indexing_errors, 0);
    }
}

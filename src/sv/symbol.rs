//! Symbol table shapes. `SymbolId` is minted from a single process-wide
//! counter (same trick as [`crate::sv::source::BufferId`]) so IDs stay
//! unique across the preamble's `Compilation` and every overlay's
//! `Compilation`, which is exactly what lets `semantic::SemanticIndex`
//! resolve a reference in an overlay to a definition that lives in the
//! preamble without the two compilations knowing about each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::sv::source::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(u64);

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

impl SymbolId {
    pub fn fresh() -> Self {
        Self(NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Module,
    Package,
    Interface,
    Modport,
    Parameter,
    Port,
    Variable,
    Typedef,
    Enum,
    EnumValue,
    Function,
    Task,
    Class,
    Genvar,
    GenerateBlock,
    NamedBlock,
    Instance,
}

/// One entry in the symbol table. `name_span` is the declarator's own
/// range (used for go-to-definition targets and rename-safe document
/// symbols); `full_span` is the range of the whole declaring construct
/// (used for containment queries, e.g. "which module is the cursor in").
#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: SymbolId,
    pub kind: SymbolKind,
    pub name: String,
    pub name_span: Span,
    pub full_span: Span,
    pub parent: Option<SymbolId>,
    pub detail: Option<String>,
}

/// Lookup table for the members of one scope (a container, a class, a
/// subroutine, or a generate/named block). Deliberately last-write-wins on
/// duplicate names: `core::project_layout_service` and here both treat a
/// duplicate declaration as "warn and keep the most recently added",
/// mirroring how a real elaborator reports but doesn't hard-fail on
/// redefinition.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub members: HashMap<String, SymbolId>,
}

impl Scope {
    pub fn insert(&mut self, name: &str, id: SymbolId) -> Option<SymbolId> {
        self.members.insert(name.to_string(), id)
    }

    pub fn get(&self, name: &str) -> Option<SymbolId> {
        self.members.get(name).copied()
    }
}

/// Owns every symbol and scope produced while binding one `Compilation`.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub symbols: HashMap<SymbolId, Symbol>,
    pub scopes: HashMap<SymbolId, Scope>,
    /// Top-level (compilation-unit-scope) names: module/package/interface
    /// definitions visible for instantiation and `pkg::` resolution.
    pub top_level: Scope,
    /// Declarator span -> id, so the indexing pass can recover the
    /// `SymbolId` the binder minted for a given AST node without
    /// threading ids back through the tree.
    by_name_span: HashMap<Span, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(
        &mut self,
        kind: SymbolKind,
        name: &str,
        name_span: Span,
        full_span: Span,
        parent: Option<SymbolId>,
    ) -> SymbolId {
        let id = SymbolId::fresh();
        self.symbols.insert(
            id,
            Symbol {
                id,
                kind,
                name: name.to_string(),
                name_span,
                full_span,
                parent,
                detail: None,
            },
        );
        self.by_name_span.insert(name_span, id);
        id
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(&id)
    }

    pub fn symbol_at_name_span(&self, span: Span) -> Option<SymbolId> {
        self.by_name_span.get(&span).copied()
    }

    pub fn scope_mut(&mut self, id: SymbolId) -> &mut Scope {
        self.scopes.entry(id).or_default()
    }

    pub fn scope(&self, id: SymbolId) -> Option<&Scope> {
        self.scopes.get(&id)
    }

    /// Resolve `pkg::member` against top-level scope, falling back to
    /// `None` if either segment is unknown. Used for cross-compilation
    /// lookups: when `pkg` was declared in the preamble, the `SymbolId`
    /// returned here is a preamble id, which is valid in an overlay's
    /// result set precisely because IDs are globally unique.
    pub fn resolve_scoped(&self, pkg: &str, member: &str) -> Option<SymbolId> {
        let pkg_id = self.top_level.get(pkg)?;
        self.scope(pkg_id)?.get(member)
    }
}

//! The flat table of definition/reference entries produced by walking one
//! file's AST, and the queries LanguageService runs against it.

use async_lsp::lsp_types::{DocumentSymbol, Location, Position, Range, SymbolKind as LspSymbolKind, Url};

use crate::sv::SymbolId;

pub type ScopeId = SymbolId;

#[derive(Debug, Clone)]
pub struct SemanticEntry {
    pub ref_range: Range,
    pub def_loc: Location,
    pub symbol_id: SymbolId,
    pub lsp_kind: LspSymbolKind,
    pub name: String,
    pub parent_scope: Option<ScopeId>,
    pub children_scope: Option<ScopeId>,
    pub is_definition: bool,
}

/// Append-only while indexing; immutable afterward. `index_visitor`
/// produces the entries, `IndexVisitor::finish` hands back a `SemanticIndex`
/// and no mutable handle is ever exposed again.
#[derive(Debug, Clone, Default)]
pub struct SemanticIndex {
    entries: Vec<SemanticEntry>,
}

impl SemanticIndex {
    pub fn new(entries: Vec<SemanticEntry>) -> Self {
        Self { entries }
    }

    pub fn get_semantic_entries(&self) -> &[SemanticEntry] {
        &self.entries
    }

    /// Find the reference entry covering `position` in `uri`, preferring
    /// the smallest (innermost) range on overlap.
    pub fn lookup_definition_at(&self, uri: &Url, position: Position) -> Option<Location> {
        let _ = uri;
        self.entries
            .iter()
            .filter(|e| range_contains(e.ref_range, position))
            .min_by_key(|e| range_len(e.ref_range))
            .map(|e| e.def_loc.clone())
    }

    /// Build the document-symbol tree for `uri` from definition entries,
    /// using `parent_scope`/`children_scope` rather than name-string
    /// matching so sibling symbols that share a name never collide.
    pub fn get_document_symbols(&self) -> Vec<DocumentSymbol> {
        use std::collections::HashMap;

        let defs: Vec<&SemanticEntry> = self.entries.iter().filter(|e| e.is_definition).collect();

        let mut by_children_scope: HashMap<ScopeId, Vec<&SemanticEntry>> = HashMap::new();
        for e in &defs {
            if let Some(parent) = e.parent_scope {
                by_children_scope.entry(parent).or_default().push(e);
            }
        }

        let roots: Vec<&SemanticEntry> = defs.iter().filter(|e| e.parent_scope.is_none()).copied().collect();

        fn build(entry: &SemanticEntry, by_scope: &HashMap<ScopeId, Vec<&SemanticEntry>>) -> DocumentSymbol {
            let children = entry
                .children_scope
                .and_then(|scope| by_scope.get(&scope))
                .map(|kids| kids.iter().map(|k| build(k, by_scope)).collect())
                .unwrap_or_default();

            #[allow(deprecated)]
            DocumentSymbol {
                name: entry.name.clone(),
                detail: None,
                kind: entry.lsp_kind,
                tags: None,
                deprecated: None,
                range: entry.ref_range,
                selection_range: entry.ref_range,
                children: Some(children),
            }
        }

        roots.into_iter().map(|e| build(e, &by_children_scope)).collect()
    }
}

fn range_contains(range: Range, position: Position) -> bool {
    let after_start = position.line > range.start.line
        || (position.line == range.start.line && position.character >= range.start.character);
    let before_end = position.line < range.end.line
        || (position.line == range.end.line && position.character <= range.end.character);
    after_start && before_end
}

fn range_len(range: Range) -> (u32, u32) {
    if range.start.line == range.end.line {
        (0, range.end.character.saturating_sub(range.start.character))
    } else {
        (range.end.line - range.start.line, range.end.character)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: u32, character: u32) -> Position {
        Position { line, character }
    }

    fn range(sl: u32, sc: u32, el: u32, ec: u32) -> Range {
        Range { start: pos(sl, sc), end: pos(el, ec) }
    }

    fn dummy_symbol(n: u64) -> SymbolId {
        // SymbolId has no public constructor; entries only need distinct,
        // comparable ids, which resolving the same buffer through a fresh
        // Compilation reliably produces.
        let mut compilation = crate::sv::compilation::Compilation::new(None);
        let text = format!("module m{n}; endmodule");
        compilation.add_source(std::path::PathBuf::from(format!("m{n}.sv")), text);
        compilation.resolve_top_level(&format!("m{n}")).unwrap()
    }

    fn loc(range: Range) -> Location {
        Location { uri: Url::parse("file:///top.sv").unwrap(), range }
    }

    #[test]
    fn prefers_the_smallest_enclosing_range_on_overlap() {
        let outer = dummy_symbol(1);
        let inner = dummy_symbol(2);
        let entries = vec![
            SemanticEntry {
                ref_range: range(0, 0, 0, 20),
                def_loc: loc(range(0, 0, 0, 1)),
                symbol_id: outer,
                lsp_kind: LspSymbolKind::MODULE,
                name: "outer".to_string(),
                parent_scope: None,
                children_scope: None,
                is_definition: false,
            },
            SemanticEntry {
                ref_range: range(0, 5, 0, 8),
                def_loc: loc(range(0, 5, 0, 6)),
                symbol_id: inner,
                lsp_kind: LspSymbolKind::VARIABLE,
                name: "inner".to_string(),
                parent_scope: None,
                children_scope: None,
                is_definition: false,
            },
        ];
        let index = SemanticIndex::new(entries);
        let found = index
            .lookup_definition_at(&Url::parse("file:///top.sv").unwrap(), pos(0, 6))
            .unwrap();
        assert_eq!(found.range, range(0, 5, 0, 6));
    }

    #[test]
    fn builds_a_nested_symbol_tree_from_scope_links() {
        let module = dummy_symbol(3);
        let port = dummy_symbol(4);
        let entries = vec![
            SemanticEntry {
                ref_range: range(0, 0, 0, 10),
                def_loc: loc(range(0, 0, 0, 10)),
                symbol_id: module,
                lsp_kind: LspSymbolKind::MODULE,
                name: "top".to_string(),
                parent_scope: None,
                children_scope: Some(module),
                is_definition: true,
            },
            SemanticEntry {
                ref_range: range(0, 11, 0, 14),
                def_loc: loc(range(0, 11, 0, 14)),
                symbol_id: port,
                lsp_kind: LspSymbolKind::PROPERTY,
                name: "clk".to_string(),
                parent_scope: Some(module),
                children_scope: None,
                is_definition: true,
            },
        ];
        let index = SemanticIndex::new(entries);
        let symbols = index.get_document_symbols();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "top");
        let children = symbols[0].children.as_ref().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "clk");
    }
}

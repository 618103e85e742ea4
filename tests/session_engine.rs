//! End-to-end tests against the public `sv`/`services` surface: building a
//! preamble from real files on disk, layering an overlay over it, and
//! checking the definitions/diagnostics/symbols that come back.

use std::sync::Arc;

use async_lsp::lsp_types::Url;

use slangd_rs::core::canonical_path::CanonicalPath;
use slangd_rs::core::project_layout::ProjectLayout;
use slangd_rs::services::{OverlaySession, PreambleManager};
use slangd_rs::sv::compilation::Compilation;

fn layout_for(files: &[std::path::PathBuf]) -> ProjectLayout {
    ProjectLayout {
        files: files.iter().map(|f| CanonicalPath::from_path(f)).collect(),
        include_dirs: Vec::new(),
        defines: Vec::new(),
    }
}

fn uri_for(path: &std::path::Path) -> Url {
    CanonicalPath::from_path(path).to_uri()
}

/// Scenario A: cross-file go-to-definition through a wildcard import.
#[test]
fn cross_file_definition_through_wildcard_import() {
    let dir = tempfile::tempdir().unwrap();
    let pkg_path = dir.path().join("pkg.sv");
    std::fs::write(
        &pkg_path,
        "package config_pkg;\n  parameter DATA_WIDTH = 32;\n  typedef logic [DATA_WIDTH-1:0] word_t;\nendpackage\n",
    )
    .unwrap();

    let layout = layout_for(&[pkg_path.clone()]);
    let preamble = Arc::new(PreambleManager::create_from_project_layout(&layout, 1));

    let use_path = dir.path().join("use.sv");
    let use_uri = uri_for(&use_path);
    let session = OverlaySession::create(
        &use_uri,
        "module m;\n  import config_pkg::*;\n  word_t r;\nendmodule\n".to_string(),
        &layout,
        Some(preamble),
    );

    let entry = session
        .semantic_index()
        .get_semantic_entries()
        .iter()
        .find(|e| !e.is_definition && e.name == "word_t")
        .expect("word_t reference recorded");
    assert!(entry.def_loc.uri.as_str().ends_with("pkg.sv"));
    assert_eq!(entry.def_loc.range.start.line, 2);
    assert_eq!(session.indexing_errors(), 0);
}

/// Scenario B: same-file self reference (a variable referenced after its
/// declaration resolves to that declaration, not some other entry).
#[test]
fn same_file_reference_resolves_to_its_own_declaration() {
    let mut compilation = Compilation::new(None);
    let buffer = compilation.add_source(
        std::path::PathBuf::from("m.sv"),
        "module m;\n  logic x;\n  assign x = 1;\nendmodule\n".to_string(),
    );
    let uri = Url::parse("file:///m.sv").unwrap();
    let result = slangd_rs::semantic::index_visitor::build_index(&compilation, None, buffer, uri.clone());

    let definition_line = result
        .index
        .get_semantic_entries()
        .iter()
        .find(|e| e.is_definition && e.name == "x")
        .map(|e| e.def_loc.range.start.line)
        .expect("x has a definition entry");
    assert_eq!(definition_line, 1);

    let found = result
        .index
        .lookup_definition_at(&uri, async_lsp::lsp_types::Position { line: 2, character: 9 })
        .expect("reference to x on line 2 resolves");
    assert_eq!(found.range.start.line, definition_line);
}

/// Scenario C: go-to-definition on a module-instance port connection lands
/// on the port declarator in the module that declares it.
#[test]
fn instance_port_connection_resolves_to_the_port_declarator() {
    let dir = tempfile::tempdir().unwrap();
    let alu_path = dir.path().join("alu.sv");
    std::fs::write(&alu_path, "module ALU(input a_port); endmodule\n").unwrap();

    let layout = layout_for(&[alu_path.clone()]);
    let preamble = Arc::new(PreambleManager::create_from_project_layout(&layout, 1));

    let use_path = dir.path().join("top.sv");
    let session = OverlaySession::create(
        &uri_for(&use_path),
        "module top; ALU inst(.a_port(sig)); endmodule\n".to_string(),
        &layout,
        Some(preamble),
    );

    let reference = session
        .semantic_index()
        .get_semantic_entries()
        .iter()
        .find(|e| !e.is_definition && e.name == "a_port")
        .expect("port connection reference recorded");
    assert!(reference.def_loc.uri.as_str().ends_with("alu.sv"));
}

/// Boundary: an empty file builds a session with no diagnostics and an
/// empty index.
#[test]
fn empty_source_file_builds_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.sv");
    let session = OverlaySession::create(&uri_for(&path), String::new(), &ProjectLayout::default(), None);

    assert!(session.semantic_index().get_semantic_entries().is_empty());
    assert!(session.compilation().diagnostics().is_empty());
    assert_eq!(session.indexing_errors(), 0);
}

/// Boundary: a syntax error yields parse diagnostics but indexing still
/// completes without panicking.
#[test]
fn syntax_error_yields_diagnostics_without_crashing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.sv");
    let session = OverlaySession::create(
        &uri_for(&path),
        "module top( input clk".to_string(),
        &ProjectLayout::default(),
        None,
    );

    assert!(!session.compilation().diagnostics().is_empty());
}

/// Indexing the same (content, preamble) twice yields equal entry vectors.
#[test]
fn indexing_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let pkg_path = dir.path().join("pkg.sv");
    std::fs::write(&pkg_path, "package p; parameter W = 1; endpackage\n").unwrap();
    let layout = layout_for(&[pkg_path]);
    let preamble = Arc::new(PreambleManager::create_from_project_layout(&layout, 1));

    let use_path = dir.path().join("top.sv");
    let content = "module top; import p::*; endmodule\n".to_string();

    let first = OverlaySession::create(&uri_for(&use_path), content.clone(), &layout, Some(Arc::clone(&preamble)));
    let second = OverlaySession::create(&uri_for(&use_path), content, &layout, Some(preamble));

    let names = |s: &OverlaySession| -> Vec<String> {
        s.semantic_index().get_semantic_entries().iter().map(|e| e.name.clone()).collect()
    };
    assert_eq!(names(&first), names(&second));
}

//! Stateless conversion from compiler-facade diagnostics to LSP
//! diagnostics: filtering to the main buffer, severity remapping, and a
//! couple of targeted rewrites that point the user at `.slangd`.

use async_lsp::lsp_types::{
    Diagnostic, DiagnosticSeverity, NumberOrString, Position, Range as LspRange,
};

use crate::services::preamble_manager::PreambleManager;
use crate::sv::diagnostics::{CompilerDiagnostic, DiagnosticCode, Severity};
use crate::sv::source::{BufferId, SourceManager};

fn severity_to_lsp(sev: Severity) -> DiagnosticSeverity {
    match sev {
        Severity::Ignored => DiagnosticSeverity::HINT,
        Severity::Note => DiagnosticSeverity::INFORMATION,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Error | Severity::Fatal => DiagnosticSeverity::ERROR,
    }
}

fn code_to_lsp(code: DiagnosticCode) -> NumberOrString {
    NumberOrString::String(format!("{code:?}"))
}

fn to_lsp_range(source: &SourceManager, diag: &CompilerDiagnostic) -> LspRange {
    let (start, end) = source.span_line_col(diag.span);
    LspRange {
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

/// Parse-only diagnostics for `main_buffer`, used by the fast
/// single-file path while the user is typing.
pub fn extract_parse_diagnostics(
    diagnostics: &[CompilerDiagnostic],
    source: &SourceManager,
    main_buffer: BufferId,
) -> Vec<Diagnostic> {
    convert(diagnostics, source, main_buffer, None)
}

/// Diagnostics accumulated while building the full overlay (parse plus
/// whatever the indexing walk noticed), with preamble-aware suppression
/// of false-positive `UnknownModule` findings.
pub fn extract_collected_diagnostics(
    diagnostics: &[CompilerDiagnostic],
    source: &SourceManager,
    main_buffer: BufferId,
    preamble: Option<&PreambleManager>,
) -> Vec<Diagnostic> {
    convert(diagnostics, source, main_buffer, preamble)
}

fn convert(
    diagnostics: &[CompilerDiagnostic],
    source: &SourceManager,
    main_buffer: BufferId,
    preamble: Option<&PreambleManager>,
) -> Vec<Diagnostic> {
    diagnostics
        .iter()
        .filter(|d| d.span.buffer == main_buffer)
        .filter(|d| !suppress_known_module(d, preamble))
        .map(|d| build_diagnostic(d, source))
        .collect()
}

fn suppress_known_module(diag: &CompilerDiagnostic, preamble: Option<&PreambleManager>) -> bool {
    if diag.code != DiagnosticCode::UnknownModule {
        return false;
    }
    let Some(preamble) = preamble else {
        return false;
    };
    // The message is expected to carry the bare module name as the final
    // word; this mirrors how the facade reports it in `parser`.
    let candidate = diag.message.split_whitespace().last().unwrap_or("");
    preamble.get_module(candidate).is_some()
}

fn build_diagnostic(diag: &CompilerDiagnostic, source: &SourceManager) -> Diagnostic {
    let (severity, message) = match diag.code {
        DiagnosticCode::UnresolvedHierarchicalPath => (
            DiagnosticSeverity::HINT,
            diag.message.clone(),
        ),
        DiagnosticCode::CouldNotOpenIncludeFile => (
            severity_to_lsp(diag.severity),
            format!(
                "{} (check IncludeDirs in .slangd)",
                diag.message
            ),
        ),
        DiagnosticCode::UnknownDirective => (
            severity_to_lsp(diag.severity),
            format!("{} (check Defines in .slangd)", diag.message),
        ),
        _ => (severity_to_lsp(diag.severity), diag.message.clone()),
    };

    Diagnostic {
        range: to_lsp_range(source, diag),
        severity: Some(severity),
        code: Some(code_to_lsp(diag.code)),
        code_description: None,
        source: Some("slangd".to_string()),
        message,
        related_information: None,
        tags: None,
        data: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::canonical_path::CanonicalPath;
    use crate::core::project_layout::ProjectLayout;
    use crate::sv::source::{BufferId, Span};

    fn make_source() -> (SourceManager, BufferId) {
        let mut source = SourceManager::new();
        let buffer = source.add_buffer(PathBuf::from("top.sv"), "module top; endmodule".to_string());
        (source, buffer)
    }

    use std::path::PathBuf;

    #[test]
    fn filters_diagnostics_to_the_main_buffer() {
        let (source, main) = make_source();
        let mut other_source = SourceManager::new();
        let other = other_source.add_buffer(PathBuf::from("other.sv"), "module x; endmodule".to_string());

        let diagnostics = vec![
            CompilerDiagnostic::new(DiagnosticCode::UnexpectedToken, Severity::Error, "bad token", Span::new(main, 0, 4)),
            CompilerDiagnostic::new(DiagnosticCode::UnexpectedToken, Severity::Error, "from elsewhere", Span::new(other, 0, 4)),
        ];

        let out = extract_parse_diagnostics(&diagnostics, &source, main);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, "bad token");
    }

    #[test]
    fn suppresses_unknown_module_when_preamble_knows_it() {
        let dir = tempfile::tempdir().unwrap();
        let sub_path = dir.path().join("sub.sv");
        std::fs::write(&sub_path, "module sub; endmodule").unwrap();
        let layout = ProjectLayout {
            files: vec![CanonicalPath::from_path(&sub_path)],
            include_dirs: Vec::new(),
            defines: Vec::new(),
        };
        let preamble = crate::services::preamble_manager::PreambleManager::create_from_project_layout(&layout, 1);

        let (source, main) = make_source();
        let diagnostics = vec![CompilerDiagnostic::new(
            DiagnosticCode::UnknownModule,
            Severity::Error,
            "unknown module sub",
            Span::new(main, 0, 4),
        )];

        let out = extract_collected_diagnostics(&diagnostics, &source, main, Some(&preamble));
        assert!(out.is_empty());

        let out_no_preamble = extract_collected_diagnostics(&diagnostics, &source, main, None);
        assert_eq!(out_no_preamble.len(), 1);
    }

    #[test]
    fn rewrites_include_and_directive_messages_to_mention_slangd_config() {
        let (source, main) = make_source();
        let diagnostics = vec![
            CompilerDiagnostic::new(DiagnosticCode::CouldNotOpenIncludeFile, Severity::Error, "missing.svh", Span::new(main, 0, 4)),
            CompilerDiagnostic::new(DiagnosticCode::UnknownDirective, Severity::Warning, "`FOO", Span::new(main, 0, 4)),
        ];
        let out = extract_parse_diagnostics(&diagnostics, &source, main);
        assert!(out[0].message.contains("IncludeDirs in .slangd"));
        assert!(out[1].message.contains("Defines in .slangd"));
    }
}

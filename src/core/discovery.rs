//! File discovery: turning a `SlangdConfig` into a concrete file list,
//! either from explicit file lists or by walking the workspace.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::core::canonical_path::CanonicalPath;
use crate::core::config::{FileListsConfig, SlangdConfig};

const SV_EXTENSIONS: &[&str] = &["sv", "svh", "v", "vh"];

/// Parse one filelist's text into a list of paths, resolved relative to
/// `filelist_dir` unless `absolute` is set. Handles `\`-continuation,
/// `#`/`//` comments, and blank lines.
pub fn parse_filelist(text: &str, filelist_dir: &Path, absolute: bool) -> Vec<PathBuf> {
    let mut entries = Vec::new();
    let mut pending = String::new();
    for raw_line in text.lines() {
        let line = strip_comment(raw_line).trim_end();
        let continued = line.ends_with('\\');
        let content = if continued {
            &line[..line.len() - 1]
        } else {
            line
        };
        pending.push_str(content.trim());
        if continued {
            pending.push(' ');
            continue;
        }
        let entry = pending.trim();
        if !entry.is_empty() {
            entries.push(entry.to_string());
        }
        pending.clear();
    }
    if !pending.trim().is_empty() {
        entries.push(pending.trim().to_string());
    }

    entries
        .into_iter()
        .map(|e| {
            let p = PathBuf::from(&e);
            if absolute || p.is_absolute() {
                p
            } else {
                filelist_dir.join(p)
            }
        })
        .collect()
}

fn strip_comment(line: &str) -> &str {
    if let Some(idx) = line.find("//") {
        return &line[..idx];
    }
    if let Some(idx) = line.find('#') {
        return &line[..idx];
    }
    line
}

/// Recursively walk `root`, collecting every file with a SystemVerilog
/// extension. Respects `.gitignore`-style ignore files the way `ignore`
/// always does; that's a feature here, not an oversight, since generated
/// or vendored trees are typically excluded that way already.
pub fn discover_workspace_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(root).hidden(false).build();
    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let ext_matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SV_EXTENSIONS.iter().any(|sv| sv.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if ext_matches {
            files.push(path.to_path_buf());
        }
    }
    files
}

/// Resolve every file named by `config` under `workspace_root`, following
/// the discovery policy: explicit `Files`/`FileLists` win over
/// auto-discovery; an empty config with `AutoDiscover` falls back to a
/// recursive workspace walk.
pub fn discover_files(config: &SlangdConfig, workspace_root: &CanonicalPath) -> Vec<CanonicalPath> {
    let root = workspace_root.as_path();
    let mut files = Vec::new();

    if config.has_explicit_sources() {
        for rel in &config.files {
            files.push(root.join(rel));
        }
        if let Some(FileListsConfig { paths, absolute }) = &config.file_lists {
            for list_path in paths {
                let resolved_list = root.join(list_path);
                if let Ok(text) = std::fs::read_to_string(&resolved_list) {
                    let dir = resolved_list.parent().unwrap_or(root);
                    files.extend(parse_filelist(&text, dir, *absolute));
                } else {
                    tracing::warn!(target: "slangd::layout", path = %resolved_list.display(), "could not read filelist");
                }
            }
        }
    } else if config.auto_discover {
        files.extend(discover_workspace_files(root));
    }

    files.into_iter().map(|p| CanonicalPath::from_path(&p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filelist_handles_continuation_and_comments() {
        let text = "# comment\nrtl/a.sv \\\nrtl/b.sv\n// also comment\nrtl/c.sv\n";
        let dir = Path::new("/workspace");
        let files = parse_filelist(text, dir, false);
        assert_eq!(
            files,
            vec![
                PathBuf::from("/workspace/rtl/a.sv"),
                PathBuf::from("/workspace/rtl/b.sv"),
                PathBuf::from("/workspace/rtl/c.sv"),
            ]
        );
    }

    #[test]
    fn filelist_respects_absolute_flag() {
        let text = "/abs/x.sv\n";
        let files = parse_filelist(text, Path::new("/workspace"), true);
        assert_eq!(files, vec![PathBuf::from("/abs/x.sv")]);
    }
}

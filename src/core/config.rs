//! `.slangd` configuration file shape and path filtering.

use regex::Regex;
use serde::Deserialize;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct SlangdConfig {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub file_lists: Option<FileListsConfig>,
    #[serde(default)]
    pub include_dirs: Vec<String>,
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default = "default_true")]
    pub auto_discover: bool,
    #[serde(rename = "If", default)]
    pub condition: Option<PathCondition>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct FileListsConfig {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub absolute: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PathCondition {
    #[serde(default)]
    pub path_match: StringOrList,
    #[serde(default)]
    pub path_exclude: StringOrList,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    #[default]
    Empty,
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn as_slice(&self) -> Vec<&str> {
        match self {
            StringOrList::Empty => Vec::new(),
            StringOrList::One(s) => vec![s.as_str()],
            StringOrList::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

impl SlangdConfig {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn has_explicit_sources(&self) -> bool {
        !self.files.is_empty()
            || self
                .file_lists
                .as_ref()
                .is_some_and(|f| !f.paths.is_empty())
    }
}

/// Compiled form of a `PathCondition`, built once per layout rebuild.
/// Invalid patterns fail open (include everything) with the failure
/// logged by the caller.
pub struct PathFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl PathFilter {
    pub fn compile(condition: Option<&PathCondition>) -> Self {
        let Some(condition) = condition else {
            return Self {
                include: Vec::new(),
                exclude: Vec::new(),
            };
        };
        let include = compile_all(&condition.path_match);
        let exclude = compile_all(&condition.path_exclude);
        Self { include, exclude }
    }

    pub fn matches(&self, path: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|r| r.is_match(path));
        let excluded = self.exclude.iter().any(|r| r.is_match(path));
        included && !excluded
    }
}

fn compile_all(patterns: &StringOrList) -> Vec<Regex> {
    patterns
        .as_slice()
        .into_iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(target: "slangd::layout", pattern = p, %err, "invalid path filter regex, ignoring");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let yaml = "Files:\n  - a.sv\n  - b.sv\n";
        let cfg = SlangdConfig::from_yaml(yaml).unwrap();
        assert_eq!(cfg.files, vec!["a.sv", "b.sv"]);
        assert!(cfg.auto_discover);
    }

    #[test]
    fn empty_config_auto_discovers() {
        let cfg = SlangdConfig::from_yaml("").unwrap();
        assert!(cfg.auto_discover);
        assert!(!cfg.has_explicit_sources());
    }

    #[test]
    fn path_exclude_filters_generated_dir() {
        let cfg = SlangdConfig::from_yaml("If:\n  PathExclude: \".*/generated/.*\"\n").unwrap();
        let filter = PathFilter::compile(cfg.condition.as_ref());
        assert!(filter.matches("rtl/a.sv"));
        assert!(!filter.matches("build/generated/a.sv"));
    }

    #[test]
    fn invalid_regex_fails_open() {
        let cfg = SlangdConfig::from_yaml("If:\n  PathMatch: \"(unterminated\"\n").unwrap();
        let filter = PathFilter::compile(cfg.condition.as_ref());
        assert!(filter.matches("anything.sv"));
    }
}

//! Normalized filesystem path, the one type used as a map key for files
//! throughout the server.

use std::fmt;
use std::path::{Path, PathBuf};

use async_lsp::lsp_types::Url;
use percent_encoding::{percent_decode_str, percent_encode, AsciiSet, CONTROLS};

const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalPath(String);

impl CanonicalPath {
    /// Parse a `file://` URI into a normalized path. Never fails: a
    /// malformed URI yields an empty path.
    pub fn from_uri(uri: &Url) -> Self {
        if uri.scheme() != "file" {
            return Self(String::new());
        }
        let decoded = percent_decode_str(uri.path())
            .decode_utf8()
            .map(|s| s.into_owned())
            .unwrap_or_default();
        Self::from_path(Path::new(&decoded))
    }

    pub fn from_path(path: &Path) -> Self {
        let normalized = path
            .canonicalize()
            .unwrap_or_else(|_| normalize_lexically(path));
        Self(normalized.to_string_lossy().replace('\\', "/"))
    }

    pub fn to_uri(&self) -> Url {
        let encoded: String = self
            .0
            .split('/')
            .map(|seg| percent_encode(seg.as_bytes(), FRAGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        Url::parse(&format!("file://{encoded}")).unwrap_or_else(|_| {
            Url::parse("file:///").expect("static URI is valid")
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_sub_path_of(&self, other: &CanonicalPath) -> bool {
        if other.0.is_empty() || self.0 == other.0 {
            return self.0 == other.0;
        }
        let prefix = if other.0.ends_with('/') {
            other.0.clone()
        } else {
            format!("{}/", other.0)
        };
        self.0.starts_with(&prefix)
    }

    pub fn join(&self, segment: &str) -> CanonicalPath {
        Self::from_path(&self.as_path().join(segment))
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<PathBuf> for CanonicalPath {
    fn from(p: PathBuf) -> Self {
        Self::from_path(&p)
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_uri_for_existing_paths() {
        let dir = std::env::temp_dir();
        let path = CanonicalPath::from_path(&dir);
        let uri = path.to_uri();
        let back = CanonicalPath::from_uri(&uri);
        assert_eq!(path, back);
    }

    #[test]
    fn malformed_uri_yields_empty_path() {
        let uri = Url::parse("http://example.com/foo").unwrap();
        let path = CanonicalPath::from_uri(&uri);
        assert!(path.is_empty());
    }

    #[test]
    fn detects_sub_paths() {
        let root = CanonicalPath("/workspace".to_string());
        let child = CanonicalPath("/workspace/rtl/a.sv".to_string());
        let unrelated = CanonicalPath("/other/a.sv".to_string());
        assert!(child.is_sub_path_of(&root));
        assert!(!unrelated.is_sub_path_of(&root));
    }
}

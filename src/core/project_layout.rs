//! `ProjectLayout` and its versioned snapshot.

use std::sync::Arc;
use std::time::Instant;

use crate::core::canonical_path::CanonicalPath;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectLayout {
    pub files: Vec<CanonicalPath>,
    pub include_dirs: Vec<CanonicalPath>,
    pub defines: Vec<String>,
}

#[derive(Clone)]
pub struct LayoutSnapshot {
    pub layout: Arc<ProjectLayout>,
    pub version: u64,
    pub timestamp: Instant,
}

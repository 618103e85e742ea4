//! Project-layout resolution: `.slangd` config, file discovery, and the
//! versioned `ProjectLayout` that everything downstream builds from.

pub mod canonical_path;
pub mod config;
pub mod discovery;
pub mod project_layout;
pub mod project_layout_service;

pub use canonical_path::CanonicalPath;
pub use project_layout::{LayoutSnapshot, ProjectLayout};
pub use project_layout_service::ProjectLayoutService;

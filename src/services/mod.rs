//! The session engine: preamble/overlay compilation, per-URI lifecycle
//! management, and the façade the transport layer drives.

pub mod document_state;
pub mod language_service;
pub mod open_document_tracker;
pub mod overlay_session;
pub mod preamble_manager;
pub mod session_manager;

pub use document_state::{DocumentState, DocumentStateManager};
pub use language_service::{FileChangeKind, LanguageService};
pub use open_document_tracker::OpenDocumentTracker;
pub use overlay_session::OverlaySession;
pub use preamble_manager::{ModuleInfo, PackageInfo, PreambleManager, SharedPreamble};
pub use session_manager::{DiagnosticHook, SessionManager};

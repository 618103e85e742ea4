//! Unified error taxonomy. Most fallible operations inside the session
//! engine swallow their own errors (they become `tracing` log lines or LSP
//! diagnostics, per the error-handling policy); `ServerError` exists for
//! the smaller set of failures a caller must be able to match on.

use async_lsp::lsp_types::Url;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to parse .slangd config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("invalid path filter regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("workspace has not finished initializing")]
    WorkspaceNotInitialized,

    #[error("no session for {uri}")]
    SessionAbsent { uri: Url },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

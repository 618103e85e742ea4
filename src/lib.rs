//! SystemVerilog Language Server
//!
//! Layered compilation session engine: an immutable, process-wide
//! "preamble" compilation over the whole project, and short-lived
//! "overlay" compilations that layer one open buffer on top of it for
//! fast, incremental go-to-definition and document-symbol support.

pub mod cli;
pub mod core;
pub mod error;
pub mod logging;
pub mod semantic;
pub mod services;
pub mod sv;

pub use error::ServerError;
pub use services::LanguageService;

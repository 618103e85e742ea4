//! `tracing` initialization. Logs go to stderr unconditionally: stdout (or
//! the named pipe) is reserved for the LSP transport and must never carry
//! anything but protocol bytes.

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let default_directive = if verbose { "slangd_rs=debug,warn" } else { "slangd_rs=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

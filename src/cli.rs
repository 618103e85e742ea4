//! Command-line surface for the server binary.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "slangd-rs", about = "Language Server Protocol implementation for SystemVerilog")]
pub struct Args {
    /// Name of the pipe/socket the client expects to connect on. When
    /// absent the server speaks LSP over stdio instead.
    #[arg(long)]
    pub pipe: Option<String>,

    /// Workspace root to serve. Defaults to the current directory; most
    /// clients override this via the `initialize` request's root URI.
    #[arg(long)]
    pub workspace: Option<std::path::PathBuf>,

    /// Raise the tracing filter to `debug` for everything under `slangd`.
    #[arg(short, long)]
    pub verbose: bool,
}

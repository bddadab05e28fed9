//! procall - run external programs and report status and output.
//!
//! Thin CLI over the `procall` library: `run` invokes one program,
//! `pipe` chains several, `which` resolves a name on `PATH`.

mod cli;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("procall=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("procall=warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    execute(cli).await
}

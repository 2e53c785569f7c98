//! Binary crate for the `weather` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Wiring configuration, providers and the aggregator together
//! - Human-friendly output formatting
//! - Serving the same aggregation over HTTP

use std::process::ExitCode;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use weather_core::{Config, load_dotenv};

mod cli;
mod output;
mod server;
mod signals;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cmd = cli::Cli::parse();
    let dotenv = load_dotenv();
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(err) = dotenv {
        warn!(error = %err, "ignoring malformed .env file");
    }

    cmd.run(config).await
}

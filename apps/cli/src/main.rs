//! WikiDigest CLI: crawl wiki article trees and serve their summaries.
//!
//! Runs foreground crawls, answers summary lookups, and hosts the HTTP API.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

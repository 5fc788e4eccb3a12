//! spiderbase CLI — crawl-output ingestion and maintenance driver.
//!
//! Records crawl lifecycle events, ingests tabular crawl exports into the
//! result store, and runs storage maintenance.

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

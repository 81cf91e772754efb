//! colscan - Find which stored text objects carry given identifiers
//!
//! colscan provides:
//! - Streaming per-object scans that skip header and trailer lines
//! - Bounded concurrent fan-out over a paginated object listing
//! - Per-key aggregation rendered as text/json/jsonl/md

use anyhow::Result;
use clap::Parser;

mod backends;
mod cli;
mod core;
mod logging;
mod scan;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli::run(cli).await
}

//! Seedtide CLI - Command-line interface
//!
//! Seeds torrents towards their trackers and inspects torrent files.

mod commands;

use clap::Parser;
use seedtide_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "seedtide")]
#[command(about = "Announces believable seeding activity to BitTorrent trackers")]
struct Cli {
    /// Console log level (the full trace goes to logs/seedtide-last-run.log)
    #[arg(long, global = true, default_value = "info")]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), None)?;

    commands::handle_command(cli.command).await
}

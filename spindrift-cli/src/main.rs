//! Spindrift CLI - Command-line interface
//!
//! Runs the P2P request router server and small inspection utilities.

mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "spindrift")]
#[command(about = "A supervised peer-to-peer download manager")]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    commands::handle_command(cli.command).await?;

    Ok(())
}

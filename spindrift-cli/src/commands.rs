//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;
use spindrift_core::config::SpindriftConfig;
use spindrift_core::engine::{BoxedSwarmEngine, SimulatedSwarmEngine};
use spindrift_core::supervisor::WorkerSupervisor;
use spindrift_core::tracing_setup::{CliLogLevel, init_tracing};
use spindrift_web::{parse_p2p_url, run_server};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the request router server
    Serve {
        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
        /// Download destination directory
        #[arg(long)]
        download_dir: Option<PathBuf>,
        /// Durable state file path
        #[arg(long)]
        state_file: Option<PathBuf>,
        /// Console log level
        #[arg(long, value_enum, default_value = "info")]
        log_level: CliLogLevel,
        /// Directory for the debug log file
        #[arg(long)]
        logs_dir: Option<PathBuf>,
        /// Fixed seed for the simulated swarm engine
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Parse a P2P URL and print what the router would see
    Inspect {
        /// A magnet, bt:// or bittorrent:// URL
        url: String,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Serve {
            port,
            download_dir,
            state_file,
            log_level,
            logs_dir,
            seed,
        } => {
            serve(
                port,
                download_dir,
                state_file,
                log_level,
                logs_dir,
                seed,
            )
            .await
        }
        Commands::Inspect { url } => inspect(&url),
    }
}

async fn serve(
    port: u16,
    download_dir: Option<PathBuf>,
    state_file: Option<PathBuf>,
    log_level: CliLogLevel,
    logs_dir: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(log_level.as_tracing_level(), logs_dir.as_deref())?;

    let mut config = SpindriftConfig::from_env();
    if let Some(dir) = download_dir {
        config.download.download_dir = dir;
    }
    if let Some(path) = state_file {
        config.store.state_file = path;
    }
    if seed.is_some() {
        config.download.deterministic_seed = seed;
    }

    let download = config.download.clone();
    let supervisor = Arc::new(WorkerSupervisor::new(
        config,
        Arc::new(move |events| {
            Box::new(SimulatedSwarmEngine::new(&download, events)) as BoxedSwarmEngine
        }),
    ));
    supervisor.initialize().await;

    // Ctrl-C flushes active downloads to the store as Paused before exit.
    tokio::select! {
        result = run_server(Arc::clone(&supervisor), port) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            supervisor.shutdown_worker().await;
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
    }

    Ok(())
}

fn inspect(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let request = parse_p2p_url(url)?;

    println!("scheme:    {}", request.scheme.as_str());
    println!("infoHash:  {}", request.info_hash);
    println!("magnetURI: {}", request.magnet_uri);
    let trackers = request.params_all("tr");
    if !trackers.is_empty() {
        println!("trackers:");
        for tracker in trackers {
            println!("  {tracker}");
        }
    }

    Ok(())
}

//! Centralized configuration for Spindrift.
//!
//! All tunable parameters live here to avoid hard-coded values scattered
//! throughout the codebase. Supports environment variable overrides.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Spindrift components.
///
/// Groups related settings into logical sections.
#[derive(Debug, Clone, Default)]
pub struct SpindriftConfig {
    pub download: DownloadConfig,
    pub worker: WorkerConfig,
    pub ipc: IpcConfig,
    pub store: StoreConfig,
}

/// Download destination and engine behavior.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Absolute destination directory for downloaded data, created if absent
    pub download_dir: PathBuf,
    /// Simulated engine: bytes per second delivered per torrent
    pub simulated_download_speed: u64,
    /// Simulated engine: deterministic seed for reproducible runs
    pub deterministic_seed: Option<u64>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            simulated_download_speed: 1_048_576, // 1 MB/s
            deterministic_seed: None,
        }
    }
}

/// Worker lifecycle timing.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long `initialize` waits for the worker's ready signal
    pub ready_timeout: Duration,
    /// Poll interval while waiting for readiness
    pub ready_poll_interval: Duration,
    /// Interval between status recomputations in the worker
    pub status_push_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(10),
            ready_poll_interval: Duration::from_millis(100),
            status_push_interval: Duration::from_secs(2),
        }
    }
}

/// Command/response protocol parameters.
#[derive(Debug, Clone)]
pub struct IpcConfig {
    /// Per-command deadline; commands resolve with a soft timeout error after this
    pub command_timeout: Duration,
    /// Bound on the host->worker request channel
    pub request_channel_capacity: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            request_channel_capacity: 64,
        }
    }
}

/// Durable state store location and write behavior.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path of the JSON state file
    pub state_file: PathBuf,
    /// Suffix used for the temp file in atomic writes
    pub temp_file_suffix: &'static str,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("spindrift-state.json"),
            temp_file_suffix: ".tmp",
        }
    }
}

impl SpindriftConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via `SPINDRIFT_*` variables while
    /// keeping sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("SPINDRIFT_DOWNLOAD_DIR") {
            config.download.download_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("SPINDRIFT_STATE_FILE") {
            config.store.state_file = PathBuf::from(path);
        }

        if let Ok(timeout) = std::env::var("SPINDRIFT_COMMAND_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.ipc.command_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(interval) = std::env::var("SPINDRIFT_PUSH_INTERVAL_MS") {
            if let Ok(millis) = interval.parse::<u64>() {
                config.worker.status_push_interval = Duration::from_millis(millis);
            }
        }

        if let Ok(seed) = std::env::var("SPINDRIFT_SIMULATION_SEED") {
            if let Ok(seed_value) = seed.parse::<u64>() {
                config.download.deterministic_seed = Some(seed_value);
            }
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Short timeouts, a fast push interval, and a fixed seed so protocol
    /// tests run quickly and deterministically.
    pub fn for_testing() -> Self {
        Self {
            download: DownloadConfig {
                download_dir: PathBuf::from("downloads"),
                simulated_download_speed: 10_485_760, // 10 MB/s for fast completion
                deterministic_seed: Some(42),
            },
            worker: WorkerConfig {
                ready_timeout: Duration::from_secs(2),
                ready_poll_interval: Duration::from_millis(10),
                status_push_interval: Duration::from_millis(50),
            },
            ipc: IpcConfig {
                command_timeout: Duration::from_secs(2),
                request_channel_capacity: 16,
            },
            store: StoreConfig::default(),
        }
    }
}

//! Spindrift Core - Supervised peer-to-peer download engine
//!
//! This crate provides the building blocks for torrent downloads behind a
//! crash boundary: magnet link parsing, a swarm engine abstraction with a
//! deterministic simulation, the download worker and its message protocol,
//! the supervising host with its status cache, and durable state storage.

pub mod config;
pub mod engine;
pub mod magnet;
pub mod status;
pub mod supervisor;
pub mod tracing_setup;
pub mod worker;

// Re-export main types for convenient access
pub use config::SpindriftConfig;
pub use magnet::{InfoHash, MagnetLink};
pub use status::{DownloadState, DownloadStatus, StateStore, StatusCache, StoreError};
pub use supervisor::WorkerSupervisor;

/// Failures in the download subsystem, from magnet parsing through the
/// worker protocol to the swarm engine itself.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Invalid magnet link: {reason}")]
    InvalidMagnet { reason: String },

    #[error("Torrent {info_hash} not found")]
    TorrentNotFound { info_hash: magnet::InfoHash },

    #[error("Worker did not answer {action} command in time")]
    CommandTimeout { action: &'static str },

    #[error("Worker unavailable: {reason}")]
    WorkerUnavailable { reason: String },

    #[error("Engine error: {reason}")]
    Engine { reason: String },

    #[error("State store error: {0}")]
    Store(#[from] status::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            DownloadError::InvalidMagnet { reason } => {
                format!("Invalid magnet link: {reason}")
            }
            DownloadError::TorrentNotFound { .. } => "Torrent not found".to_string(),
            DownloadError::CommandTimeout { .. } => {
                "The download worker is not responding".to_string()
            }
            DownloadError::WorkerUnavailable { .. } => {
                "The download worker is unavailable".to_string()
            }
            DownloadError::Engine { reason } => format!("Download error: {reason}"),
            DownloadError::Store(_) => "Could not persist download state".to_string(),
            DownloadError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input rather than a system fault.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            DownloadError::InvalidMagnet { .. } | DownloadError::TorrentNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

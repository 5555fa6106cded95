//! The opaque swarm engine boundary.
//!
//! The actual wire protocol (peer discovery, piece selection, choking) lives
//! behind the `SwarmEngine` trait; Spindrift only drives its
//! add/pause/resume/destroy primitives and consumes its lifecycle events.

pub mod adapter;
pub mod simulation;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use adapter::{EngineAdapter, StartOutcome};
pub use simulation::SimulatedSwarmEngine;

use crate::DownloadError;
use crate::magnet::{InfoHash, MagnetLink};

/// Built-in public tracker set merged into every start.
///
/// Versioned alongside the code; websocket trackers first for browser-peer
/// reach, then UDP.
pub const DEFAULT_TRACKERS: &[&str] = &[
    "wss://tracker.openwebtorrent.com",
    "wss://tracker.btorrent.xyz",
    "wss://tracker.fastcast.nz",
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://tracker.coppersurfer.tk:6969/announce",
    "udp://explodie.org:6969/announce",
];

/// Unions caller-supplied trackers with the built-in defaults.
///
/// Order-preserving: defaults first, then novel caller entries.
pub fn merge_trackers(extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = DEFAULT_TRACKERS.iter().map(|t| t.to_string()).collect();
    for tracker in extra {
        if !merged.iter().any(|t| t == tracker) {
            merged.push(tracker.clone());
        }
    }
    merged
}

/// Lifecycle events pushed by the engine, consumed by one dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// All pieces verified; the torrent finished downloading
    Done { info_hash: InfoHash },
    /// Non-fatal engine complaint for one torrent
    Warning {
        info_hash: Option<InfoHash>,
        message: String,
    },
    /// Engine error; fatal for the torrent, never for the worker
    Error {
        info_hash: Option<InfoHash>,
        message: String,
    },
}

/// Sender half handed to engine implementations for lifecycle events.
pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;

/// One file inside a torrent, as the engine reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotFile {
    pub name: String,
    pub relative_path: String,
    pub length: u64,
    pub downloaded: u64,
}

/// Point-in-time engine-side view of one torrent.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentSnapshot {
    pub info_hash: InfoHash,
    /// None until metadata resolves
    pub name: Option<String>,
    pub progress: f64,
    pub downloaded: u64,
    pub uploaded: u64,
    pub download_speed: u64,
    pub upload_speed: u64,
    pub num_peers: u32,
    /// Seconds; None when infinite or unknown
    pub time_remaining: Option<u64>,
    pub files: Vec<SnapshotFile>,
    pub done: bool,
}

/// Primitive operations the underlying swarm engine must expose.
///
/// Policy (tracker merging, choke-on-pause, never-seed) lives in
/// [`EngineAdapter`], not here; implementations only honor the mechanical
/// contract of each primitive.
#[async_trait]
pub trait SwarmEngine: Send + 'static {
    /// Registers a torrent with the swarm and begins transferring.
    ///
    /// # Errors
    /// - `DownloadError::Engine` - Engine rejected the torrent
    async fn add(&mut self, magnet: MagnetLink, trackers: Vec<String>)
    -> Result<(), DownloadError>;

    /// Whether a live handle exists for this hash.
    fn contains(&self, info_hash: InfoHash) -> bool;

    /// Stops admitting new peer connections.
    async fn stop_new_connections(&mut self, info_hash: InfoHash) -> Result<(), DownloadError>;

    /// Chokes every existing peer connection.
    async fn choke_peers(&mut self, info_hash: InfoHash) -> Result<(), DownloadError>;

    /// Deselects all pieces so no further requests are issued.
    async fn deselect_pieces(&mut self, info_hash: InfoHash) -> Result<(), DownloadError>;

    /// Resumes admitting new peer connections.
    async fn resume_connections(&mut self, info_hash: InfoHash) -> Result<(), DownloadError>;

    /// Unchokes every existing peer connection.
    async fn unchoke_peers(&mut self, info_hash: InfoHash) -> Result<(), DownloadError>;

    /// Reselects every file for download.
    async fn select_all_files(&mut self, info_hash: InfoHash) -> Result<(), DownloadError>;

    /// Tears down the handle. With `keep_files` the downloaded data stays
    /// on disk; networking always stops.
    async fn destroy(&mut self, info_hash: InfoHash, keep_files: bool)
    -> Result<(), DownloadError>;

    /// Current engine-side view of one torrent, if it is live.
    async fn snapshot(&mut self, info_hash: InfoHash) -> Option<TorrentSnapshot>;

    /// Current view of every live torrent.
    async fn snapshot_all(&mut self) -> Vec<TorrentSnapshot>;
}

/// Boxed engine used where the implementation is chosen at runtime.
pub type BoxedSwarmEngine = Box<dyn SwarmEngine>;

#[async_trait]
impl SwarmEngine for BoxedSwarmEngine {
    async fn add(
        &mut self,
        magnet: MagnetLink,
        trackers: Vec<String>,
    ) -> Result<(), DownloadError> {
        (**self).add(magnet, trackers).await
    }

    fn contains(&self, info_hash: InfoHash) -> bool {
        (**self).contains(info_hash)
    }

    async fn stop_new_connections(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        (**self).stop_new_connections(info_hash).await
    }

    async fn choke_peers(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        (**self).choke_peers(info_hash).await
    }

    async fn deselect_pieces(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        (**self).deselect_pieces(info_hash).await
    }

    async fn resume_connections(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        (**self).resume_connections(info_hash).await
    }

    async fn unchoke_peers(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        (**self).unchoke_peers(info_hash).await
    }

    async fn select_all_files(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        (**self).select_all_files(info_hash).await
    }

    async fn destroy(
        &mut self,
        info_hash: InfoHash,
        keep_files: bool,
    ) -> Result<(), DownloadError> {
        (**self).destroy(info_hash, keep_files).await
    }

    async fn snapshot(&mut self, info_hash: InfoHash) -> Option<TorrentSnapshot> {
        (**self).snapshot(info_hash).await
    }

    async fn snapshot_all(&mut self) -> Vec<TorrentSnapshot> {
        (**self).snapshot_all().await
    }
}

//! Download status records and the host-side cache/store pair.
//!
//! The `DownloadStatus` record is the one entity the whole subsystem trades
//! in: the worker computes it, the supervisor caches it, the store persists
//! it, and the router serves it.

pub mod cache;
pub mod store;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use cache::StatusCache;
pub use store::{StateStore, StoreError};

use crate::magnet::{InfoHash, MagnetLink};

/// Name shown while the engine is still resolving torrent metadata.
pub const METADATA_PENDING_NAME: &str = "Fetching metadata…";

/// Lifecycle state of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// Added, waiting for the worker to confirm the engine handle
    Starting,
    /// Engine handle live, transferring
    Active,
    /// Transfer halted; peers choked, no new connections
    Paused,
    /// Completed; engine handle destroyed, record retained until removed
    Done,
    /// Explicitly removed; record erased from cache and store
    Removed,
}

/// Per-file progress within a torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    pub index: u32,
    pub name: String,
    pub relative_path: String,
    pub length: u64,
    pub downloaded: u64,
    pub progress: f64,
}

/// Full status of one download, keyed by info hash.
///
/// This is both the push-update payload and the durable record; `Active`
/// progress lives only in the cache while `Paused`/`Done` transitions are
/// flushed to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStatus {
    pub info_hash: InfoHash,
    #[serde(rename = "magnetURI")]
    pub magnet_uri: String,
    pub name: String,
    pub download_path: PathBuf,
    /// Completion fraction in [0.0, 1.0]
    pub progress: f64,
    pub downloaded: u64,
    pub uploaded: u64,
    /// Bytes per second
    pub download_speed: u64,
    /// Bytes per second
    pub upload_speed: u64,
    pub num_peers: u32,
    /// Seconds until completion; None when infinite or unknown
    pub time_remaining: Option<u64>,
    pub ratio: f64,
    #[serde(default)]
    pub files: Vec<FileStatus>,
    pub state: DownloadState,
    pub added_at: DateTime<Utc>,
}

impl DownloadStatus {
    /// Creates the initial `Starting` record for a freshly added magnet.
    pub fn starting(magnet: &MagnetLink, download_path: PathBuf) -> Self {
        Self {
            info_hash: magnet.info_hash,
            magnet_uri: magnet.uri.clone(),
            name: magnet
                .display_name
                .clone()
                .unwrap_or_else(|| METADATA_PENDING_NAME.to_string()),
            download_path,
            progress: 0.0,
            downloaded: 0,
            uploaded: 0,
            download_speed: 0,
            upload_speed: 0,
            num_peers: 0,
            time_remaining: None,
            ratio: 0.0,
            files: Vec::new(),
            state: DownloadState::Starting,
            added_at: Utc::now(),
        }
    }

    /// Whether a push update is warranted relative to the previous record.
    ///
    /// Only the fields that matter for UI refresh participate; metadata-only
    /// churn does not generate IPC traffic.
    pub fn push_fields_changed(&self, previous: &Self) -> bool {
        self.progress != previous.progress
            || self.download_speed != previous.download_speed
            || self.upload_speed != previous.upload_speed
            || self.num_peers != previous.num_peers
            || self.state != previous.state
    }

    /// True once the record has reached a state with no live engine handle.
    pub fn is_done(&self) -> bool {
        self.state == DownloadState::Done
    }
}

#[cfg(test)]
pub(crate) fn test_status(hash_byte: u8, state: DownloadState) -> DownloadStatus {
    let magnet = MagnetLink {
        info_hash: InfoHash::new([hash_byte; 20]),
        display_name: Some(format!("download-{hash_byte}")),
        trackers: vec![],
        uri: format!(
            "magnet:?xt=urn:btih:{}",
            InfoHash::new([hash_byte; 20])
        ),
    };
    let mut status = DownloadStatus::starting(&magnet, PathBuf::from("/tmp/downloads"));
    status.state = state;
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starting_record_defaults() {
        let magnet = MagnetLink::parse(
            "magnet:?xt=urn:btih:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        )
        .unwrap();
        let status = DownloadStatus::starting(&magnet, PathBuf::from("/data"));

        assert_eq!(status.state, DownloadState::Starting);
        assert_eq!(status.name, METADATA_PENDING_NAME);
        assert_eq!(status.progress, 0.0);
        assert_eq!(status.num_peers, 0);
        assert!(status.time_remaining.is_none());
        assert!(status.files.is_empty());
    }

    #[test]
    fn test_starting_record_uses_display_name() {
        let magnet = MagnetLink::parse(
            "magnet:?xt=urn:btih:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa&dn=ubuntu.iso",
        )
        .unwrap();
        let status = DownloadStatus::starting(&magnet, PathBuf::from("/data"));
        assert_eq!(status.name, "ubuntu.iso");
    }

    #[test]
    fn test_push_change_detection() {
        let base = test_status(1, DownloadState::Active);

        let unchanged = base.clone();
        assert!(!unchanged.push_fields_changed(&base));

        let mut progressed = base.clone();
        progressed.progress = 0.5;
        assert!(progressed.push_fields_changed(&base));

        let mut peers = base.clone();
        peers.num_peers = 3;
        assert!(peers.push_fields_changed(&base));

        let mut paused = base.clone();
        paused.state = DownloadState::Paused;
        assert!(paused.push_fields_changed(&base));

        // Name or file-list churn alone does not trigger a push.
        let mut renamed = base.clone();
        renamed.name = "resolved-name".to_string();
        assert!(!renamed.push_fields_changed(&base));
    }

    #[test]
    fn test_status_json_field_names() {
        let status = test_status(0xaa, DownloadState::Active);
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(
            json["infoHash"],
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert!(json["magnetURI"].as_str().unwrap().starts_with("magnet:?"));
        assert_eq!(json["state"], "active");
        assert!(json.get("downloadSpeed").is_some());
        assert!(json.get("timeRemaining").is_some());
    }
}

//! Worker-side adapter translating supervisor commands into engine calls.
//!
//! Owns the policy the raw engine does not: tracker merging, idempotent
//! re-adds, pause that actually halts transfer, and destroy-on-done so the
//! engine never seeds after completion.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{SwarmEngine, TorrentSnapshot, merge_trackers};
use crate::DownloadError;
use crate::magnet::{InfoHash, MagnetLink};
use crate::status::{DownloadState, DownloadStatus, FileStatus, METADATA_PENDING_NAME};

struct AdapterRecord {
    magnet_uri: String,
    added_at: DateTime<Utc>,
    paused: bool,
    done: bool,
}

/// Result of a start command.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub status: DownloadStatus,
    /// True when the hash already had a live handle and nothing was added
    pub already_active: bool,
}

/// Normalizes one swarm engine into the download data model.
pub struct EngineAdapter<E: SwarmEngine> {
    engine: E,
    download_path: PathBuf,
    records: HashMap<InfoHash, AdapterRecord>,
}

impl<E: SwarmEngine> EngineAdapter<E> {
    pub fn new(engine: E, download_path: PathBuf) -> Self {
        Self {
            engine,
            download_path,
            records: HashMap::new(),
        }
    }

    /// Starts a download from a magnet URI.
    ///
    /// Re-adding a hash with a live handle is idempotent: the existing
    /// status is returned unchanged and no second handle is created.
    ///
    /// # Errors
    /// - `DownloadError::InvalidMagnet` - Unparsable magnet URI
    /// - `DownloadError::Engine` - Engine rejected the add
    pub async fn start(
        &mut self,
        magnet_uri: &str,
        extra_trackers: &[String],
    ) -> Result<StartOutcome, DownloadError> {
        let magnet = MagnetLink::parse(magnet_uri)?;
        let info_hash = magnet.info_hash;

        if self.engine.contains(info_hash) {
            debug!("start for already-active torrent {info_hash}, returning existing handle");
            let status = self
                .status(info_hash)
                .await
                .ok_or(DownloadError::TorrentNotFound { info_hash })?;
            return Ok(StartOutcome {
                status,
                already_active: true,
            });
        }

        let mut trackers = magnet.trackers.clone();
        trackers.extend(extra_trackers.iter().cloned());
        let trackers = merge_trackers(&trackers);

        self.engine.add(magnet.clone(), trackers).await?;
        self.records.insert(
            info_hash,
            AdapterRecord {
                magnet_uri: magnet.uri.clone(),
                added_at: Utc::now(),
                paused: false,
                done: false,
            },
        );
        info!("started torrent {info_hash}");

        let status = self
            .status(info_hash)
            .await
            .ok_or(DownloadError::TorrentNotFound { info_hash })?;
        Ok(StartOutcome {
            status,
            already_active: false,
        })
    }

    /// Halts transfer for one torrent.
    ///
    /// Stopping new connections alone leaves in-flight transfer running, so
    /// every existing peer is also choked and all pieces deselected.
    pub async fn pause(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        self.engine.stop_new_connections(info_hash).await?;
        self.engine.choke_peers(info_hash).await?;
        self.engine.deselect_pieces(info_hash).await?;
        if let Some(record) = self.records.get_mut(&info_hash) {
            record.paused = true;
        }
        info!("paused torrent {info_hash}");
        Ok(())
    }

    /// Resumes transfer: unchokes peers and reselects all files.
    pub async fn resume(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        self.engine.resume_connections(info_hash).await?;
        self.engine.unchoke_peers(info_hash).await?;
        self.engine.select_all_files(info_hash).await?;
        if let Some(record) = self.records.get_mut(&info_hash) {
            record.paused = false;
        }
        info!("resumed torrent {info_hash}");
        Ok(())
    }

    /// Destroys the handle, keeping downloaded data on disk.
    pub async fn remove(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        self.engine.destroy(info_hash, true).await?;
        self.records.remove(&info_hash);
        info!("removed torrent {info_hash}");
        Ok(())
    }

    /// Handles the engine's done event for one torrent.
    ///
    /// Emits the final full status marked `Done`, then destroys the handle
    /// with keep-files semantics so the engine never seeds. Repeated done
    /// events return None and change nothing.
    pub async fn complete(&mut self, info_hash: InfoHash) -> Option<DownloadStatus> {
        let record = self.records.get_mut(&info_hash)?;
        if record.done {
            return None;
        }
        record.done = true;

        let final_status = match self.engine.snapshot(info_hash).await {
            Some(snapshot) => {
                let record = &self.records[&info_hash];
                let mut status = build_status(&snapshot, record, &self.download_path);
                status.state = DownloadState::Done;
                status.download_speed = 0;
                status.upload_speed = 0;
                status.num_peers = 0;
                status.time_remaining = None;
                status
            }
            None => return None,
        };

        if let Err(e) = self.engine.destroy(info_hash, true).await {
            warn!("destroy after completion failed for {info_hash}: {e}");
        }
        info!("torrent {info_hash} done, handle destroyed (no seeding)");
        Some(final_status)
    }

    /// Whether a live engine handle exists for this hash.
    pub fn contains(&self, info_hash: InfoHash) -> bool {
        self.engine.contains(info_hash)
    }

    /// Full status for one live torrent.
    pub async fn status(&mut self, info_hash: InfoHash) -> Option<DownloadStatus> {
        let snapshot = self.engine.snapshot(info_hash).await?;
        let record = self.records.get(&info_hash)?;
        Some(build_status(&snapshot, record, &self.download_path))
    }

    /// Full status for every live torrent.
    pub async fn status_all(&mut self) -> Vec<DownloadStatus> {
        let snapshots = self.engine.snapshot_all().await;
        snapshots
            .iter()
            .filter_map(|snapshot| {
                let record = self.records.get(&snapshot.info_hash)?;
                Some(build_status(snapshot, record, &self.download_path))
            })
            .collect()
    }
}

fn build_status(
    snapshot: &TorrentSnapshot,
    record: &AdapterRecord,
    download_path: &std::path::Path,
) -> DownloadStatus {
    let state = if snapshot.done {
        DownloadState::Done
    } else if record.paused {
        DownloadState::Paused
    } else {
        DownloadState::Active
    };

    let files = snapshot
        .files
        .iter()
        .enumerate()
        .map(|(index, file)| FileStatus {
            index: index as u32,
            name: file.name.clone(),
            relative_path: file.relative_path.clone(),
            length: file.length,
            downloaded: file.downloaded,
            progress: if file.length == 0 {
                0.0
            } else {
                file.downloaded as f64 / file.length as f64
            },
        })
        .collect();

    DownloadStatus {
        info_hash: snapshot.info_hash,
        magnet_uri: record.magnet_uri.clone(),
        name: snapshot
            .name
            .clone()
            .unwrap_or_else(|| METADATA_PENDING_NAME.to_string()),
        download_path: download_path.to_path_buf(),
        progress: snapshot.progress,
        downloaded: snapshot.downloaded,
        uploaded: snapshot.uploaded,
        download_speed: snapshot.download_speed,
        upload_speed: snapshot.upload_speed,
        num_peers: snapshot.num_peers,
        time_remaining: snapshot.time_remaining,
        ratio: if snapshot.downloaded == 0 {
            0.0
        } else {
            snapshot.uploaded as f64 / snapshot.downloaded as f64
        },
        files,
        state,
        added_at: record.added_at,
    }
}

//! Deterministic in-process swarm engine for development and tests.
//!
//! Models transfer as elapsed-time-times-speed, with peer counts and sizes
//! drawn from a seedable generator so runs reproduce exactly.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{EngineEvent, EngineEventSender, SnapshotFile, SwarmEngine, TorrentSnapshot};
use crate::DownloadError;
use crate::config::DownloadConfig;
use crate::magnet::{InfoHash, MagnetLink};

struct SimTorrent {
    name: String,
    total_size: u64,
    downloaded: u64,
    uploaded: u64,
    num_peers: u32,
    last_tick: Instant,
    connections_stopped: bool,
    peers_choked: bool,
    pieces_selected: bool,
    done_emitted: bool,
}

impl SimTorrent {
    fn transferring(&self) -> bool {
        !self.peers_choked && self.pieces_selected && self.downloaded < self.total_size
    }
}

/// Simulated swarm engine backing development mode and protocol tests.
pub struct SimulatedSwarmEngine {
    torrents: HashMap<InfoHash, SimTorrent>,
    events: EngineEventSender,
    download_speed: u64,
    rng: StdRng,
}

impl SimulatedSwarmEngine {
    pub fn new(config: &DownloadConfig, events: EngineEventSender) -> Self {
        let rng = match config.deterministic_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            torrents: HashMap::new(),
            events,
            download_speed: config.simulated_download_speed,
            rng,
        }
    }

    fn advance(torrent: &mut SimTorrent, speed: u64) {
        let elapsed = torrent.last_tick.elapsed();
        torrent.last_tick = Instant::now();
        if !torrent.transferring() {
            return;
        }
        let gained = (elapsed.as_secs_f64() * speed as f64) as u64;
        torrent.downloaded = (torrent.downloaded + gained).min(torrent.total_size);
        torrent.uploaded += gained / 20;
    }

    fn snapshot_of(torrent: &SimTorrent, info_hash: InfoHash, speed: u64) -> TorrentSnapshot {
        let progress = if torrent.total_size == 0 {
            0.0
        } else {
            torrent.downloaded as f64 / torrent.total_size as f64
        };
        let done = torrent.downloaded >= torrent.total_size;
        let transferring = torrent.transferring();
        let download_speed = if transferring { speed } else { 0 };
        let remaining = torrent.total_size - torrent.downloaded;
        let time_remaining = if done || !transferring {
            None
        } else {
            Some(remaining / speed.max(1))
        };

        TorrentSnapshot {
            info_hash,
            name: Some(torrent.name.clone()),
            progress,
            downloaded: torrent.downloaded,
            uploaded: torrent.uploaded,
            download_speed,
            upload_speed: if transferring { speed / 20 } else { 0 },
            num_peers: if torrent.connections_stopped {
                0
            } else {
                torrent.num_peers
            },
            time_remaining,
            files: vec![SnapshotFile {
                name: torrent.name.clone(),
                relative_path: torrent.name.clone(),
                length: torrent.total_size,
                downloaded: torrent.downloaded,
            }],
            done,
        }
    }

    fn torrent_mut(&mut self, info_hash: InfoHash) -> Result<&mut SimTorrent, DownloadError> {
        self.torrents
            .get_mut(&info_hash)
            .ok_or(DownloadError::TorrentNotFound { info_hash })
    }

    fn emit_done_if_finished(events: &EngineEventSender, torrent: &mut SimTorrent, hash: InfoHash) {
        if torrent.downloaded >= torrent.total_size && !torrent.done_emitted {
            torrent.done_emitted = true;
            let _ = events.send(EngineEvent::Done { info_hash: hash });
        }
    }
}

#[async_trait]
impl SwarmEngine for SimulatedSwarmEngine {
    async fn add(
        &mut self,
        magnet: MagnetLink,
        _trackers: Vec<String>,
    ) -> Result<(), DownloadError> {
        let info_hash = magnet.info_hash;
        if self.torrents.contains_key(&info_hash) {
            return Ok(());
        }

        let name = magnet.display_name.clone().unwrap_or_else(|| {
            format!("Torrent_{}", &info_hash.to_string()[..16])
        });
        // 4-64 MiB of content and a modest swarm, from the seeded generator.
        let total_size = self.rng.random_range(4..=64) * 1_048_576;
        let num_peers = self.rng.random_range(2..=20);

        self.torrents.insert(
            info_hash,
            SimTorrent {
                name,
                total_size,
                downloaded: 0,
                uploaded: 0,
                num_peers,
                last_tick: Instant::now(),
                connections_stopped: false,
                peers_choked: false,
                pieces_selected: true,
                done_emitted: false,
            },
        );
        Ok(())
    }

    fn contains(&self, info_hash: InfoHash) -> bool {
        self.torrents.contains_key(&info_hash)
    }

    async fn stop_new_connections(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        self.torrent_mut(info_hash)?.connections_stopped = true;
        Ok(())
    }

    async fn choke_peers(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        let speed = self.download_speed;
        let torrent = self.torrent_mut(info_hash)?;
        Self::advance(torrent, speed);
        torrent.peers_choked = true;
        Ok(())
    }

    async fn deselect_pieces(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        self.torrent_mut(info_hash)?.pieces_selected = false;
        Ok(())
    }

    async fn resume_connections(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        self.torrent_mut(info_hash)?.connections_stopped = false;
        Ok(())
    }

    async fn unchoke_peers(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        let torrent = self.torrent_mut(info_hash)?;
        torrent.peers_choked = false;
        torrent.last_tick = Instant::now();
        Ok(())
    }

    async fn select_all_files(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
        let torrent = self.torrent_mut(info_hash)?;
        torrent.pieces_selected = true;
        torrent.last_tick = Instant::now();
        Ok(())
    }

    async fn destroy(
        &mut self,
        info_hash: InfoHash,
        _keep_files: bool,
    ) -> Result<(), DownloadError> {
        self.torrents
            .remove(&info_hash)
            .map(|_| ())
            .ok_or(DownloadError::TorrentNotFound { info_hash })
    }

    async fn snapshot(&mut self, info_hash: InfoHash) -> Option<TorrentSnapshot> {
        let speed = self.download_speed;
        let torrent = self.torrents.get_mut(&info_hash)?;
        Self::advance(torrent, speed);
        Self::emit_done_if_finished(&self.events, torrent, info_hash);
        Some(Self::snapshot_of(torrent, info_hash, speed))
    }

    async fn snapshot_all(&mut self) -> Vec<TorrentSnapshot> {
        let speed = self.download_speed;
        let mut snapshots = Vec::with_capacity(self.torrents.len());
        for (&info_hash, torrent) in &mut self.torrents {
            Self::advance(torrent, speed);
            Self::emit_done_if_finished(&self.events, torrent, info_hash);
            snapshots.push(Self::snapshot_of(torrent, info_hash, speed));
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn test_engine() -> (SimulatedSwarmEngine, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = DownloadConfig {
            deterministic_seed: Some(42),
            simulated_download_speed: 1_048_576,
            ..Default::default()
        };
        (SimulatedSwarmEngine::new(&config, tx), rx)
    }

    fn test_magnet(byte: u8) -> MagnetLink {
        let hash = InfoHash::new([byte; 20]);
        MagnetLink::parse(&format!("magnet:?xt=urn:btih:{hash}&dn=sim-{byte}")).unwrap()
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let (mut engine, _rx) = test_engine();
        let magnet = test_magnet(1);

        engine.add(magnet.clone(), vec![]).await.unwrap();
        engine.add(magnet.clone(), vec![]).await.unwrap();

        assert!(engine.contains(magnet.info_hash));
        assert_eq!(engine.snapshot_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_choked_torrent_reports_zero_speed() {
        let (mut engine, _rx) = test_engine();
        let magnet = test_magnet(2);
        let hash = magnet.info_hash;
        engine.add(magnet, vec![]).await.unwrap();

        engine.choke_peers(hash).await.unwrap();
        engine.deselect_pieces(hash).await.unwrap();

        let snapshot = engine.snapshot(hash).await.unwrap();
        assert_eq!(snapshot.download_speed, 0);
        assert_eq!(snapshot.upload_speed, 0);
        assert!(snapshot.time_remaining.is_none());
    }

    #[tokio::test]
    async fn test_destroy_removes_handle() {
        let (mut engine, _rx) = test_engine();
        let magnet = test_magnet(3);
        let hash = magnet.info_hash;
        engine.add(magnet, vec![]).await.unwrap();

        engine.destroy(hash, true).await.unwrap();
        assert!(!engine.contains(hash));
        assert!(matches!(
            engine.destroy(hash, true).await,
            Err(DownloadError::TorrentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_done_event_emitted_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = DownloadConfig {
            deterministic_seed: Some(7),
            // Fast enough to finish any simulated size instantly.
            simulated_download_speed: u64::MAX / 1024,
            ..Default::default()
        };
        let mut engine = SimulatedSwarmEngine::new(&config, tx);
        let magnet = test_magnet(4);
        let hash = magnet.info_hash;
        engine.add(magnet, vec![]).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let first = engine.snapshot(hash).await.unwrap();
        assert!(first.done);
        let _ = engine.snapshot(hash).await.unwrap();

        assert_eq!(rx.recv().await, Some(EngineEvent::Done { info_hash: hash }));
        assert!(rx.try_recv().is_err());
    }
}

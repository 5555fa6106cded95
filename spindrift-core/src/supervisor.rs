//! Worker supervisor: owns the worker lifecycle and the command protocol.
//!
//! Spawns at most one worker, correlates responses to commands by id,
//! applies push messages to the status cache, and turns worker death into
//! durable `Paused` records instead of lost downloads. The worker is never
//! restarted eagerly; the next command that needs one respawns it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::DownloadError;
use crate::config::SpindriftConfig;
use crate::magnet::{InfoHash, MagnetLink};
use crate::status::{DownloadState, DownloadStatus, StateStore, StatusCache};
use crate::worker::{
    EngineFactory, PushMessage, ResponsePayload, WorkerAction, WorkerMessage, WorkerRequest,
    spawn_worker,
};

struct WorkerSlot {
    requests: mpsc::Sender<WorkerRequest>,
    generation: u64,
}

type PendingMap = parking_lot::Mutex<HashMap<u64, oneshot::Sender<ResponsePayload>>>;

/// State shared between the supervisor and its message pump task.
struct Shared {
    cache: StatusCache,
    store: StateStore,
    pending: PendingMap,
    ready: AtomicBool,
    worker: tokio::sync::Mutex<Option<WorkerSlot>>,
}

/// Supervises the download worker and exposes the command API.
pub struct WorkerSupervisor {
    config: SpindriftConfig,
    engine_factory: EngineFactory,
    next_id: AtomicU64,
    next_generation: AtomicU64,
    shared: Arc<Shared>,
}

impl WorkerSupervisor {
    pub fn new(config: SpindriftConfig, engine_factory: EngineFactory) -> Self {
        let shared = Arc::new(Shared {
            cache: StatusCache::new(),
            store: StateStore::new(&config.store),
            pending: parking_lot::Mutex::new(HashMap::new()),
            ready: AtomicBool::new(false),
            worker: tokio::sync::Mutex::new(None),
        });
        Self {
            config,
            engine_factory,
            next_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
            shared,
        }
    }

    /// Loads durable state into the cache and spawns the first worker.
    ///
    /// Blocks up to the configured readiness timeout waiting for the
    /// worker's ready signal, then proceeds regardless so a slow worker
    /// cannot wedge the host. A corrupt state file is logged and treated
    /// as empty.
    pub async fn initialize(&self) {
        match self.shared.store.load().await {
            Ok(records) => {
                info!("loaded {} persisted download records", records.len());
                self.shared.cache.load_from(records);
            }
            Err(e) => {
                warn!("state file unreadable, starting empty: {e}");
            }
        }

        if let Err(e) = self.ensure_worker().await {
            warn!("worker spawn during initialize failed: {e}");
        }
    }

    /// Status of one download, served entirely from the cache.
    ///
    /// # Errors
    /// - `DownloadError::TorrentNotFound` - No live or cached record
    pub fn status(&self, info_hash: InfoHash) -> Result<DownloadStatus, DownloadError> {
        self.shared
            .cache
            .get(info_hash)
            .ok_or(DownloadError::TorrentNotFound { info_hash })
    }

    /// Status of every known download, newest first, from the cache.
    pub fn status_all(&self) -> Vec<DownloadStatus> {
        self.shared.cache.all()
    }

    /// Starts (or idempotently re-starts) a download from a magnet URI.
    ///
    /// # Errors
    /// - `DownloadError::InvalidMagnet` - Unparsable magnet URI
    /// - `DownloadError::Engine` - Worker-side add failure
    /// - `DownloadError::CommandTimeout` - No response within the deadline
    pub async fn start(
        &self,
        magnet_uri: &str,
        announce: &[String],
    ) -> Result<DownloadStatus, DownloadError> {
        let magnet = MagnetLink::parse(magnet_uri)?;
        let info_hash = magnet.info_hash;

        let existing = self.shared.cache.get(info_hash);
        if existing.is_none() {
            let status =
                DownloadStatus::starting(&magnet, self.config.download.download_dir.clone());
            self.shared.cache.apply(status);
        }

        let action = WorkerAction::Start {
            magnet_uri: magnet.uri.clone(),
            announce: announce.to_vec(),
        };
        let result = match self.send_command(action).await {
            Ok(ResponsePayload::Started { info_hash, .. }) => self
                .shared
                .cache
                .get(info_hash)
                .ok_or(DownloadError::TorrentNotFound { info_hash }),
            Ok(ResponsePayload::Error { error }) => Err(DownloadError::Engine { reason: error }),
            Ok(other) => Err(unexpected_response("start", &other)),
            Err(e) => Err(e),
        };
        // On any failed start, a record we speculatively inserted must not
        // linger as a phantom `Starting` entry.
        if result.is_err() && existing.is_none() {
            self.shared.cache.remove(info_hash);
        }
        result
    }

    /// Pauses a download; the `Paused` record is flushed durably.
    ///
    /// # Errors
    /// - `DownloadError::TorrentNotFound` - Unknown hash
    pub async fn pause(&self, info_hash: InfoHash) -> Result<DownloadStatus, DownloadError> {
        let record = self
            .shared
            .cache
            .get(info_hash)
            .ok_or(DownloadError::TorrentNotFound { info_hash })?;

        match self.send_command(WorkerAction::Pause { info_hash }).await? {
            ResponsePayload::Paused { .. } => {
                let updated = self
                    .shared
                    .cache
                    .set_state(info_hash, DownloadState::Paused)
                    .unwrap_or_else(|| {
                        let mut status = record;
                        status.state = DownloadState::Paused;
                        status
                    });
                self.shared.store.upsert(&updated).await?;
                Ok(updated)
            }
            ResponsePayload::Error { error } => Err(DownloadError::Engine { reason: error }),
            other => Err(unexpected_response("pause", &other)),
        }
    }

    /// Resumes a paused download.
    ///
    /// When the worker has no live handle (typically after a crash), the
    /// cached magnet URI is replayed through the normal start path instead
    /// of surfacing an error.
    pub async fn resume(&self, info_hash: InfoHash) -> Result<DownloadStatus, DownloadError> {
        let record = self
            .shared
            .cache
            .get(info_hash)
            .ok_or(DownloadError::TorrentNotFound { info_hash })?;

        match self.send_command(WorkerAction::Resume { info_hash }).await? {
            ResponsePayload::Resumed { .. } => {
                let updated = self
                    .shared
                    .cache
                    .set_state(info_hash, DownloadState::Active)
                    .unwrap_or_else(|| {
                        let mut status = record;
                        status.state = DownloadState::Active;
                        status
                    });
                Ok(updated)
            }
            ResponsePayload::Error { error } => {
                info!("resume of {info_hash} had no live handle ({error}), restarting from magnet");
                self.start(&record.magnet_uri, &[]).await
            }
            other => Err(unexpected_response("resume", &other)),
        }
    }

    /// Removes a download: engine handle destroyed (data kept on disk),
    /// cache entry and durable record erased.
    ///
    /// # Errors
    /// - `DownloadError::TorrentNotFound` - Unknown hash; store untouched
    pub async fn remove(&self, info_hash: InfoHash) -> Result<(), DownloadError> {
        if self.shared.cache.get(info_hash).is_none() {
            return Err(DownloadError::TorrentNotFound { info_hash });
        }

        // Best-effort at the worker; the record is erased either way.
        match self.send_command(WorkerAction::Remove { info_hash }).await {
            Ok(ResponsePayload::Removed { .. }) => {}
            Ok(ResponsePayload::Error { error }) => {
                debug!("worker had no handle for {info_hash} on remove: {error}");
            }
            Ok(other) => {
                warn!("unexpected remove response for {info_hash}: {other:?}");
            }
            Err(e) => warn!("remove command did not reach the worker: {e}"),
        }

        self.shared.cache.remove(info_hash);
        self.shared.store.delete(info_hash).await?;
        Ok(())
    }

    /// Stops the current worker, demoting its active downloads to `Paused`.
    ///
    /// Used on application shutdown; the same path runs when the worker
    /// dies on its own. The next command respawns a worker lazily.
    pub async fn shutdown_worker(&self) {
        let mut slot = self.shared.worker.lock().await;
        // Dropping the request sender ends the worker loop; the message
        // pump observes the closed stream and runs crash recovery.
        *slot = None;
        self.shared.ready.store(false, Ordering::SeqCst);
    }

    /// Whether a worker is currently alive and accepting commands.
    pub async fn worker_alive(&self) -> bool {
        let slot = self.shared.worker.lock().await;
        slot.as_ref().is_some_and(|s| !s.requests.is_closed())
    }

    async fn ensure_worker(&self) -> Result<mpsc::Sender<WorkerRequest>, DownloadError> {
        let mut slot = self.shared.worker.lock().await;
        if let Some(worker) = slot.as_ref() {
            if !worker.requests.is_closed() {
                return Ok(worker.requests.clone());
            }
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        info!("spawning download worker (generation {generation})");
        self.shared.ready.store(false, Ordering::SeqCst);

        let link = spawn_worker(&self.config, self.engine_factory.clone());
        let requests = link.requests.clone();
        *slot = Some(WorkerSlot {
            requests: link.requests,
            generation,
        });
        drop(slot);

        tokio::spawn(run_message_pump(
            link.messages,
            Arc::clone(&self.shared),
            generation,
        ));

        self.wait_ready().await;
        Ok(requests)
    }

    /// Polls for the worker's ready signal up to the configured timeout;
    /// proceeds either way.
    async fn wait_ready(&self) {
        let deadline = Instant::now() + self.config.worker.ready_timeout;
        while !self.shared.ready.load(Ordering::SeqCst) {
            if Instant::now() >= deadline {
                warn!(
                    "worker not ready after {:?}, proceeding anyway",
                    self.config.worker.ready_timeout
                );
                return;
            }
            tokio::time::sleep(self.config.worker.ready_poll_interval).await;
        }
    }

    async fn send_command(
        &self,
        action: WorkerAction,
    ) -> Result<ResponsePayload, DownloadError> {
        let requests = self.ensure_worker().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = action.name();

        let (responder, response) = oneshot::channel();
        self.shared.pending.lock().insert(id, responder);

        // The deadline covers the send as well: a wedged worker stops
        // draining its bounded request channel, and a send into a full
        // channel would otherwise wait for capacity unboundedly.
        let exchange = async {
            if requests.send(WorkerRequest { id, action }).await.is_err() {
                return Err(DownloadError::WorkerUnavailable {
                    reason: "worker exited before accepting the command".to_string(),
                });
            }
            // Pending map cleared during crash recovery drops the sender.
            response.await.map_err(|_| DownloadError::WorkerUnavailable {
                reason: "worker exited before responding".to_string(),
            })
        };

        match tokio::time::timeout(self.config.ipc.command_timeout, exchange).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(e)) => {
                self.shared.pending.lock().remove(&id);
                Err(e)
            }
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                Err(DownloadError::CommandTimeout { action: name })
            }
        }
    }
}

fn unexpected_response(action: &str, payload: &ResponsePayload) -> DownloadError {
    DownloadError::Engine {
        reason: format!("unexpected {action} response: {payload:?}"),
    }
}

/// Drains one worker's message stream until it dies, then runs recovery.
async fn run_message_pump(
    mut messages: mpsc::UnboundedReceiver<WorkerMessage>,
    shared: Arc<Shared>,
    generation: u64,
) {
    while let Some(message) = messages.recv().await {
        match message {
            WorkerMessage::Response(response) => {
                let responder = shared.pending.lock().remove(&response.id);
                match responder {
                    Some(responder) => {
                        let _ = responder.send(response.payload);
                    }
                    // Late response after timeout; already resolved.
                    None => debug!("dropping response for unknown request id {}", response.id),
                }
            }
            WorkerMessage::Push(push) => apply_push(&shared, push).await,
        }
    }

    info!("worker (generation {generation}) exited, recovering state");
    recover_after_worker_exit(&shared, generation).await;
}

async fn apply_push(shared: &Shared, push: PushMessage) {
    match push {
        PushMessage::Ready => {
            shared.ready.store(true, Ordering::SeqCst);
            debug!("worker signalled ready");
        }
        PushMessage::StatusUpdate { status } => {
            shared.cache.apply(*status);
        }
        PushMessage::StatusUpdateBulk { torrents } => {
            for status in torrents {
                shared.cache.apply(status);
            }
        }
        PushMessage::Done { info_hash } => {
            // The one durable write marking this download Done.
            if let Some(record) = shared.cache.set_state(info_hash, DownloadState::Done) {
                if let Err(e) = shared.store.upsert(&record).await {
                    error!("failed to persist completed download {info_hash}: {e}");
                }
            }
        }
        PushMessage::Removed { info_hash } => {
            shared.cache.remove(info_hash);
            if let Err(e) = shared.store.delete(info_hash).await {
                error!("failed to delete record for {info_hash}: {e}");
            }
        }
        PushMessage::ClientError { error } => {
            error!("worker reported engine error: {error}");
        }
    }
}

/// Worker-death recovery per the crash-handling contract.
///
/// Active downloads become durable `Paused` records, the cache and pending
/// map are cleared, and the store is reloaded so subsequent reads are
/// consistent. No worker is respawned here.
async fn recover_after_worker_exit(shared: &Shared, generation: u64) {
    shared.ready.store(false, Ordering::SeqCst);

    {
        let mut slot = shared.worker.lock().await;
        if slot.as_ref().is_some_and(|s| s.generation == generation) {
            *slot = None;
        }
    }

    let demoted = shared.cache.demote_live_to_paused();
    for status in &demoted {
        if let Err(e) = shared.store.upsert(status).await {
            error!(
                "failed to snapshot {} as paused during recovery: {e}",
                status.info_hash
            );
        }
    }
    if !demoted.is_empty() {
        info!("demoted {} active downloads to paused", demoted.len());
    }

    // Dropping the pending senders resolves every in-flight caller with a
    // worker-lost error instead of leaving them to time out.
    shared.pending.lock().clear();

    shared.cache.clear();
    match shared.store.load().await {
        Ok(records) => shared.cache.load_from(records),
        Err(e) => error!("failed to reload state store after worker exit: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::engine::{BoxedSwarmEngine, SimulatedSwarmEngine, SwarmEngine, TorrentSnapshot};

    fn simulated_factory(config: &SpindriftConfig) -> EngineFactory {
        let download = config.download.clone();
        Arc::new(move |events| {
            Box::new(SimulatedSwarmEngine::new(&download, events)) as BoxedSwarmEngine
        })
    }

    fn test_config(dir: &tempfile::TempDir) -> SpindriftConfig {
        let mut config = SpindriftConfig::for_testing();
        config.download.download_dir = dir.path().join("downloads");
        config.store.state_file = dir.path().join("state.json");
        config
    }

    const MAGNET: &str = "magnet:?xt=urn:btih:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA&dn=test";

    #[tokio::test]
    async fn test_initialize_is_ready_within_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let supervisor = WorkerSupervisor::new(config.clone(), simulated_factory(&config));

        supervisor.initialize().await;
        assert!(supervisor.worker_alive().await);
    }

    #[tokio::test]
    async fn test_start_and_cached_status() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let supervisor = WorkerSupervisor::new(config.clone(), simulated_factory(&config));
        supervisor.initialize().await;

        let status = supervisor.start(MAGNET, &[]).await.unwrap();
        assert_eq!(
            status.info_hash.to_string(),
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert_eq!(status.state, DownloadState::Active);

        // Reads are served from the cache without a worker round trip.
        let cached = supervisor.status(status.info_hash).unwrap();
        assert_eq!(cached.magnet_uri, MAGNET);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let supervisor = WorkerSupervisor::new(config.clone(), simulated_factory(&config));
        supervisor.initialize().await;

        let first = supervisor.start(MAGNET, &[]).await.unwrap();
        let second = supervisor.start(MAGNET, &[]).await.unwrap();

        assert_eq!(first.info_hash, second.info_hash);
        assert_eq!(first.magnet_uri, second.magnet_uri);
        assert_eq!(supervisor.status_all().len(), 1);
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_magnet_host_side() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let supervisor = WorkerSupervisor::new(config.clone(), simulated_factory(&config));

        assert!(matches!(
            supervisor.start("not-a-magnet", &[]).await,
            Err(DownloadError::InvalidMagnet { .. })
        ));
        assert!(supervisor.status_all().is_empty());
    }

    #[tokio::test]
    async fn test_pause_flushes_durable_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let supervisor = WorkerSupervisor::new(config.clone(), simulated_factory(&config));
        supervisor.initialize().await;

        let hash = supervisor.start(MAGNET, &[]).await.unwrap().info_hash;
        let paused = supervisor.pause(hash).await.unwrap();
        assert_eq!(paused.state, DownloadState::Paused);

        let store = StateStore::new(&config.store);
        let records = store.load().await.unwrap();
        assert_eq!(records.get(&hash).unwrap().state, DownloadState::Paused);
    }

    #[tokio::test]
    async fn test_remove_unknown_hash_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let supervisor = WorkerSupervisor::new(config.clone(), simulated_factory(&config));
        supervisor.initialize().await;

        let hash = supervisor.start(MAGNET, &[]).await.unwrap().info_hash;
        supervisor.pause(hash).await.unwrap();

        let unknown = InfoHash::new([0x42; 20]);
        assert!(matches!(
            supervisor.remove(unknown).await,
            Err(DownloadError::TorrentNotFound { .. })
        ));

        let records = StateStore::new(&config.store).load().await.unwrap();
        assert!(records.contains_key(&hash));
    }

    #[tokio::test]
    async fn test_remove_erases_cache_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let supervisor = WorkerSupervisor::new(config.clone(), simulated_factory(&config));
        supervisor.initialize().await;

        let hash = supervisor.start(MAGNET, &[]).await.unwrap().info_hash;
        supervisor.pause(hash).await.unwrap();

        supervisor.remove(hash).await.unwrap();
        assert!(matches!(
            supervisor.status(hash),
            Err(DownloadError::TorrentNotFound { .. })
        ));
        let records = StateStore::new(&config.store).load().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_worker_death_demotes_active_to_paused() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let supervisor = WorkerSupervisor::new(config.clone(), simulated_factory(&config));
        supervisor.initialize().await;

        let hash = supervisor.start(MAGNET, &[]).await.unwrap().info_hash;

        supervisor.shutdown_worker().await;
        // Let the message pump observe the closed stream and recover.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = supervisor.status(hash).unwrap();
        assert_eq!(status.state, DownloadState::Paused);
        assert_eq!(status.magnet_uri, MAGNET);
        assert_eq!(status.download_speed, 0);

        // The demotion is durable.
        let records = StateStore::new(&config.store).load().await.unwrap();
        assert_eq!(records.get(&hash).unwrap().state, DownloadState::Paused);
    }

    #[tokio::test]
    async fn test_resume_after_crash_replays_magnet() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let supervisor = WorkerSupervisor::new(config.clone(), simulated_factory(&config));
        supervisor.initialize().await;

        let hash = supervisor.start(MAGNET, &[]).await.unwrap().info_hash;
        supervisor.shutdown_worker().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The fresh worker has no handle; resume recovers via the magnet.
        let resumed = supervisor.resume(hash).await.unwrap();
        assert_eq!(resumed.info_hash, hash);
        assert_eq!(resumed.state, DownloadState::Active);
        assert!(supervisor.worker_alive().await);
    }

    /// Engine whose add never completes, for timeout coverage.
    struct StallEngine;

    #[async_trait]
    impl SwarmEngine for StallEngine {
        async fn add(
            &mut self,
            _magnet: MagnetLink,
            _trackers: Vec<String>,
        ) -> Result<(), DownloadError> {
            futures::future::pending::<()>().await;
            Ok(())
        }

        fn contains(&self, _info_hash: InfoHash) -> bool {
            false
        }

        async fn stop_new_connections(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
            Err(DownloadError::TorrentNotFound { info_hash })
        }

        async fn choke_peers(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
            Err(DownloadError::TorrentNotFound { info_hash })
        }

        async fn deselect_pieces(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
            Err(DownloadError::TorrentNotFound { info_hash })
        }

        async fn resume_connections(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
            Err(DownloadError::TorrentNotFound { info_hash })
        }

        async fn unchoke_peers(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
            Err(DownloadError::TorrentNotFound { info_hash })
        }

        async fn select_all_files(&mut self, info_hash: InfoHash) -> Result<(), DownloadError> {
            Err(DownloadError::TorrentNotFound { info_hash })
        }

        async fn destroy(
            &mut self,
            info_hash: InfoHash,
            _keep_files: bool,
        ) -> Result<(), DownloadError> {
            Err(DownloadError::TorrentNotFound { info_hash })
        }

        async fn snapshot(&mut self, _info_hash: InfoHash) -> Option<TorrentSnapshot> {
            None
        }

        async fn snapshot_all(&mut self) -> Vec<TorrentSnapshot> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_command_timeout_resolves_softly() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.ipc.command_timeout = Duration::from_millis(200);
        let supervisor = WorkerSupervisor::new(
            config.clone(),
            Arc::new(|_events| Box::new(StallEngine) as BoxedSwarmEngine),
        );
        supervisor.initialize().await;

        let started = Instant::now();
        let result = supervisor.start(MAGNET, &[]).await;
        assert!(matches!(
            result,
            Err(DownloadError::CommandTimeout { action: "start" })
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_failed_start_leaves_no_phantom_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.ipc.command_timeout = Duration::from_millis(200);
        let supervisor = WorkerSupervisor::new(
            config.clone(),
            Arc::new(|_events| Box::new(StallEngine) as BoxedSwarmEngine),
        );
        supervisor.initialize().await;

        assert!(supervisor.start(MAGNET, &[]).await.is_err());

        // The speculative `Starting` entry must not survive the failure.
        assert!(supervisor.status_all().is_empty());
        let hash = MagnetLink::parse(MAGNET).unwrap().info_hash;
        assert!(matches!(
            supervisor.status(hash),
            Err(DownloadError::TorrentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_commands_time_out_even_with_full_request_channel() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.ipc.command_timeout = Duration::from_millis(300);
        config.ipc.request_channel_capacity = 1;
        let supervisor = Arc::new(WorkerSupervisor::new(
            config.clone(),
            Arc::new(|_events| Box::new(StallEngine) as BoxedSwarmEngine),
        ));
        supervisor.initialize().await;

        // The worker wedges on the first start, the second fills the
        // one-slot request channel, and the third blocks on the send
        // itself. All three must still resolve within the deadline.
        let magnets = [
            "magnet:?xt=urn:btih:1111111111111111111111111111111111111111",
            "magnet:?xt=urn:btih:2222222222222222222222222222222222222222",
            "magnet:?xt=urn:btih:3333333333333333333333333333333333333333",
        ];
        let tasks: Vec<_> = magnets
            .into_iter()
            .map(|magnet| {
                let supervisor = Arc::clone(&supervisor);
                tokio::spawn(async move { supervisor.start(magnet, &[]).await })
            })
            .collect();

        let results = tokio::time::timeout(
            Duration::from_secs(2),
            futures::future::join_all(tasks),
        )
        .await
        .expect("every command resolves within the deadline");

        for result in results {
            assert!(matches!(
                result.unwrap(),
                Err(DownloadError::CommandTimeout { action: "start" })
            ));
        }
        assert!(supervisor.status_all().is_empty());
    }
}

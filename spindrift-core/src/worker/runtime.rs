//! Worker runtime: a single dispatch loop behind a panic boundary.
//!
//! The worker runs as an isolated task; the supervisor observes its
//! termination the same way it would a child-process exit. One
//! `tokio::select!` loop processes supervisor requests, engine lifecycle
//! events, and the periodic status recomputation in order, so every state
//! transition happens in one place.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::messages::{
    PushMessage, ResponsePayload, WorkerAction, WorkerMessage, WorkerRequest, WorkerResponse,
};
use crate::config::SpindriftConfig;
use crate::engine::{BoxedSwarmEngine, EngineAdapter, EngineEvent, EngineEventSender};
use crate::magnet::InfoHash;
use crate::status::DownloadStatus;

/// Builds a fresh engine for each worker spawn.
pub type EngineFactory =
    std::sync::Arc<dyn Fn(EngineEventSender) -> BoxedSwarmEngine + Send + Sync>;

/// Channel ends the supervisor holds for one live worker.
pub struct WorkerLink {
    pub requests: mpsc::Sender<WorkerRequest>,
    pub messages: mpsc::UnboundedReceiver<WorkerMessage>,
    pub join: JoinHandle<()>,
}

/// Spawns a worker task and returns the supervisor's ends of its channels.
///
/// The worker creates the download directory if absent, initializes its
/// engine, announces readiness, and then serves the IPC protocol until the
/// request channel closes.
pub fn spawn_worker(config: &SpindriftConfig, engine_factory: EngineFactory) -> WorkerLink {
    let (request_tx, request_rx) = mpsc::channel(config.ipc.request_channel_capacity);
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let config = config.clone();

    let join = tokio::spawn(async move {
        run_worker(config, engine_factory, request_rx, message_tx).await;
    });

    WorkerLink {
        requests: request_tx,
        messages: message_rx,
        join,
    }
}

async fn run_worker(
    config: SpindriftConfig,
    engine_factory: EngineFactory,
    mut requests: mpsc::Receiver<WorkerRequest>,
    outbound: mpsc::UnboundedSender<WorkerMessage>,
) {
    debug!("worker starting");

    let download_dir = config.download.download_dir.clone();
    if let Err(e) = tokio::fs::create_dir_all(&download_dir).await {
        error!("failed to create download directory {}: {e}", download_dir.display());
        let _ = outbound.send(WorkerMessage::Push(PushMessage::ClientError {
            error: format!("download directory unavailable: {e}"),
        }));
        return;
    }

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let engine = engine_factory(event_tx);
    let mut adapter = EngineAdapter::new(engine, download_dir);

    let _ = outbound.send(WorkerMessage::Push(PushMessage::Ready));

    let mut last_pushed: HashMap<InfoHash, DownloadStatus> = HashMap::new();
    let mut interval = tokio::time::interval(config.worker.status_push_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else { break };
                handle_request(&mut adapter, &outbound, &mut last_pushed, request).await;
            }
            Some(event) = events.recv() => {
                handle_engine_event(&mut adapter, &outbound, &mut last_pushed, event).await;
            }
            _ = interval.tick() => {
                push_status_deltas(&mut adapter, &outbound, &mut last_pushed).await;
            }
        }
    }

    debug!("worker stopped");
}

async fn handle_request(
    adapter: &mut EngineAdapter<BoxedSwarmEngine>,
    outbound: &mpsc::UnboundedSender<WorkerMessage>,
    last_pushed: &mut HashMap<InfoHash, DownloadStatus>,
    request: WorkerRequest,
) {
    let payload = match request.action {
        WorkerAction::Start {
            magnet_uri,
            announce,
        } => match adapter.start(&magnet_uri, &announce).await {
            Ok(outcome) => {
                push_status(outbound, last_pushed, outcome.status.clone());
                ResponsePayload::Started {
                    info_hash: outcome.status.info_hash,
                    magnet_uri: outcome.status.magnet_uri.clone(),
                    already_active: outcome.already_active,
                }
            }
            Err(e) => ResponsePayload::Error {
                error: e.to_string(),
            },
        },

        WorkerAction::Pause { info_hash } => match adapter.pause(info_hash).await {
            Ok(()) => {
                if let Some(status) = adapter.status(info_hash).await {
                    push_status(outbound, last_pushed, status);
                }
                ResponsePayload::Paused {
                    info_hash,
                    paused: true,
                }
            }
            Err(e) => ResponsePayload::Error {
                error: e.to_string(),
            },
        },

        WorkerAction::Resume { info_hash } => match adapter.resume(info_hash).await {
            Ok(()) => {
                if let Some(status) = adapter.status(info_hash).await {
                    push_status(outbound, last_pushed, status);
                }
                ResponsePayload::Resumed {
                    info_hash,
                    paused: false,
                }
            }
            Err(e) => ResponsePayload::Error {
                error: e.to_string(),
            },
        },

        WorkerAction::Remove { info_hash } => match adapter.remove(info_hash).await {
            Ok(()) => {
                last_pushed.remove(&info_hash);
                let _ = outbound.send(WorkerMessage::Push(PushMessage::Removed { info_hash }));
                ResponsePayload::Removed {
                    info_hash,
                    removed: true,
                }
            }
            Err(e) => ResponsePayload::Error {
                error: e.to_string(),
            },
        },
    };

    let _ = outbound.send(WorkerMessage::Response(WorkerResponse {
        id: request.id,
        payload,
    }));
}

async fn handle_engine_event(
    adapter: &mut EngineAdapter<BoxedSwarmEngine>,
    outbound: &mpsc::UnboundedSender<WorkerMessage>,
    last_pushed: &mut HashMap<InfoHash, DownloadStatus>,
    event: EngineEvent,
) {
    match event {
        EngineEvent::Done { info_hash } => {
            // complete() is idempotent; a duplicate done event is a no-op.
            if let Some(final_status) = adapter.complete(info_hash).await {
                last_pushed.remove(&info_hash);
                let _ = outbound.send(WorkerMessage::Push(PushMessage::StatusUpdate {
                    status: Box::new(final_status),
                }));
                let _ = outbound.send(WorkerMessage::Push(PushMessage::Done { info_hash }));
            }
        }
        EngineEvent::Warning { info_hash, message } => {
            warn!("engine warning ({info_hash:?}): {message}");
        }
        EngineEvent::Error { info_hash, message } => {
            // Fatal for one torrent, never for the worker.
            error!("engine error ({info_hash:?}): {message}");
            let _ = outbound.send(WorkerMessage::Push(PushMessage::ClientError {
                error: message,
            }));
        }
    }
}

/// Recomputes status for every live torrent, pushing only changed entries.
async fn push_status_deltas(
    adapter: &mut EngineAdapter<BoxedSwarmEngine>,
    outbound: &mpsc::UnboundedSender<WorkerMessage>,
    last_pushed: &mut HashMap<InfoHash, DownloadStatus>,
) {
    let statuses = adapter.status_all().await;
    let changed: Vec<DownloadStatus> = statuses
        .into_iter()
        .filter(|status| {
            last_pushed
                .get(&status.info_hash)
                .is_none_or(|previous| status.push_fields_changed(previous))
        })
        .collect();

    for status in &changed {
        last_pushed.insert(status.info_hash, status.clone());
    }

    let mut changed = changed;
    if changed.len() > 1 {
        let _ = outbound.send(WorkerMessage::Push(PushMessage::StatusUpdateBulk {
            torrents: changed,
        }));
    } else if let Some(status) = changed.pop() {
        let _ = outbound.send(WorkerMessage::Push(PushMessage::StatusUpdate {
            status: Box::new(status),
        }));
    }
}

fn push_status(
    outbound: &mpsc::UnboundedSender<WorkerMessage>,
    last_pushed: &mut HashMap<InfoHash, DownloadStatus>,
    status: DownloadStatus,
) {
    last_pushed.insert(status.info_hash, status.clone());
    let _ = outbound.send(WorkerMessage::Push(PushMessage::StatusUpdate {
        status: Box::new(status),
    }));
}

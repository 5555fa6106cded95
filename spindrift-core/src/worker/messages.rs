//! IPC message shapes between the host process and the worker.
//!
//! One channel carries two classes of worker-to-host traffic: correlated
//! responses (carry `id`) and uncorrelated pushes. The host tells them
//! apart by shape, never by sequence. All types serialize to the JSON the
//! host application consumes.

use serde::{Deserialize, Serialize};

use crate::magnet::InfoHash;
use crate::status::DownloadStatus;

/// Host-to-worker command payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WorkerAction {
    Start {
        #[serde(rename = "magnetURI")]
        magnet_uri: String,
        #[serde(default)]
        announce: Vec<String>,
    },
    Pause {
        #[serde(rename = "hash")]
        info_hash: InfoHash,
    },
    Resume {
        #[serde(rename = "hash")]
        info_hash: InfoHash,
    },
    Remove {
        #[serde(rename = "hash")]
        info_hash: InfoHash,
    },
}

impl WorkerAction {
    /// Short name for logging and timeout errors.
    pub fn name(&self) -> &'static str {
        match self {
            WorkerAction::Start { .. } => "start",
            WorkerAction::Pause { .. } => "pause",
            WorkerAction::Resume { .. } => "resume",
            WorkerAction::Remove { .. } => "remove",
        }
    }
}

/// Host-to-worker command with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: u64,
    #[serde(flatten)]
    pub action: WorkerAction,
}

/// Worker-to-host correlated response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ResponsePayload {
    Started {
        info_hash: InfoHash,
        #[serde(rename = "magnetURI")]
        magnet_uri: String,
        already_active: bool,
    },
    Paused {
        info_hash: InfoHash,
        paused: bool,
    },
    Resumed {
        info_hash: InfoHash,
        paused: bool,
    },
    Removed {
        info_hash: InfoHash,
        removed: bool,
    },
    Error {
        error: String,
    },
}

/// Worker-to-host correlated response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: u64,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

/// Worker-to-host uncorrelated push notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PushMessage {
    /// Engine initialized; the worker is accepting commands
    Ready,
    /// Status delta for one torrent
    StatusUpdate {
        #[serde(flatten)]
        status: Box<DownloadStatus>,
    },
    /// Status deltas for several torrents in one message
    StatusUpdateBulk { torrents: Vec<DownloadStatus> },
    /// One torrent finished downloading
    Done { info_hash: InfoHash },
    /// One torrent's handle was destroyed by a remove command
    Removed { info_hash: InfoHash },
    /// Non-fatal engine error, surfaced for diagnostics
    ClientError { error: String },
}

/// Any message the worker sends to the host.
///
/// Untagged: a correlated response always carries `id`, a push never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerMessage {
    Response(WorkerResponse),
    Push(PushMessage),
}

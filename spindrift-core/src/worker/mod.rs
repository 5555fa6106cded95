//! The download worker: owns the engine adapter and speaks the IPC protocol.

pub mod messages;
pub mod runtime;

pub use messages::{
    PushMessage, ResponsePayload, WorkerAction, WorkerMessage, WorkerRequest, WorkerResponse,
};
pub use runtime::{EngineFactory, WorkerLink, spawn_worker};

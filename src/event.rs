//! The typed event bus and command surface (§6, §9).
//!
//! Re-architected from the distilled spec's callback-registration source
//! into one `Event` enum delivered over a channel and one `Command` enum
//! accepted by [`crate::engine::Engine`]'s worker — directly grounded on
//! the teacher's `RuntimeEvent`/`RuntimeCommand` pair in
//! `GUI/src/runtime/mod.rs`.

use std::path::PathBuf;

use log::Level;

use crate::error::EngineError;
use crate::peer::Peer;

/// Status an in-flight transfer can be in on the wire, per §6's
/// `transfer-progress` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferProgressStatus {
    Connecting,
    Sending,
    Receiving,
}

/// Discovery state machine phase exposed externally (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStatus {
    AdvancedScanning,
    Idle,
}

/// A log record forwarded from an internal task, mirroring the teacher's
/// `RuntimeLogEvent`.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: Level,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Everything the engine reports to an embedding collaborator (§6).
#[derive(Debug, Clone)]
pub enum Event {
    InterfacesChanged,
    PeersCleared,
    PeerDiscovered(Peer),
    DiscoveryStatus(DiscoveryStatus),
    TransferProgress {
        transfer_id: String,
        status: TransferProgressStatus,
        filename: String,
        progress_pct: u8,
        bytes: u64,
        total: u64,
        speed_mb_s: f64,
    },
    TransferComplete {
        transfer_id: String,
        filename: String,
        path: Option<PathBuf>,
    },
    TransferError {
        transfer_id: String,
        error: String,
    },
    Log(LogEvent),
}

/// A single (peer, file) unit within a `sendBatch` request.
#[derive(Debug, Clone)]
pub struct SendTarget {
    pub peer_address: String,
    pub file_path: PathBuf,
}

/// A `sendBatch` request (§6).
#[derive(Debug, Clone)]
pub struct SendBatchRequest {
    pub batch_id: Option<String>,
    pub peer_addresses: Vec<String>,
    pub file_paths: Vec<PathBuf>,
}

impl SendBatchRequest {
    /// Expand into the (peer × file) matrix C4 drives independently per
    /// peer (§4.4 "Batching").
    pub fn targets(&self) -> Vec<(String, Vec<PathBuf>)> {
        self.peer_addresses
            .iter()
            .map(|peer| (peer.clone(), self.file_paths.clone()))
            .collect()
    }
}

/// Commands accepted by the engine's façade worker (§6). `EngineHandle`
/// methods in `engine.rs` are thin wrappers that send these, with `oneshot`
/// replies where a result is expected.
#[derive(Debug)]
pub enum Command {
    StartDiscovery,
    Stop,
    CheckPeer {
        address: String,
        reply: tokio::sync::oneshot::Sender<bool>,
    },
    SendBatch {
        request: SendBatchRequest,
        reply: tokio::sync::oneshot::Sender<Result<String, EngineError>>,
    },
    CancelTransfer {
        id: String,
    },
    PauseTransfer {
        id: String,
    },
    ResumeTransfer {
        id: String,
    },
    SetDownloadsDir {
        path: PathBuf,
        reply: tokio::sync::oneshot::Sender<Result<(), EngineError>>,
    },
    GetDownloadsDir {
        reply: tokio::sync::oneshot::Sender<PathBuf>,
    },
    Shutdown,
}

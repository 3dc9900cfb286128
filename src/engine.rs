//! The engine façade (§6): `spawn_engine` mirrors the teacher's
//! `spawn_runtime` (`GUI/src/runtime/mod.rs`) — a worker task owning all
//! mutable state, a bounded command channel in, an event channel out, and a
//! `Clone`-able handle whose methods are thin `send`-and-(optionally)-await
//! wrappers. Unlike the teacher's `RuntimeWorker`, which owns exactly one
//! long-lived connection, this worker owns three independent concerns
//! (C1 interface monitor, C2 discovery, C3/C4/C5 transfer) with different
//! lifetimes: the transfer listener runs for the engine's entire life,
//! while discovery starts/stops/restarts on command.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;

use log::Level;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::discovery::{self, DiscoverySession};
use crate::error::EngineError;
use crate::event::{Command, Event, LogEvent, SendBatchRequest};
use crate::interfaces::run_interface_monitor;
use crate::peer::PeerTable;
use crate::transfer::{listener::run_transfer_listener, registry::TransferRegistry, sender};

/// Channel depth for the event bus, matching the teacher's 512-slot
/// `RuntimeEvent` channel in `spawn_runtime`.
const EVENT_CHANNEL_CAPACITY: usize = 512;
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// A thin, `Clone`-able façade over the engine's worker task.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    pub async fn start_discovery(&self) {
        let _ = self.command_tx.send(Command::StartDiscovery).await;
    }

    pub async fn stop_discovery(&self) {
        let _ = self.command_tx.send(Command::Stop).await;
    }

    pub async fn check_peer(&self, address: String) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::CheckPeer { address, reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn send_batch(&self, request: SendBatchRequest) -> Result<String, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(Command::SendBatch { request, reply })
            .await
            .map_err(|_| EngineError::Concurrency("engine worker is gone".to_string()))?;
        rx.await
            .map_err(|_| EngineError::Concurrency("engine worker dropped the reply".to_string()))?
    }

    pub async fn cancel_transfer(&self, id: String) {
        let _ = self.command_tx.send(Command::CancelTransfer { id }).await;
    }

    pub async fn pause_transfer(&self, id: String) {
        let _ = self.command_tx.send(Command::PauseTransfer { id }).await;
    }

    pub async fn resume_transfer(&self, id: String) {
        let _ = self.command_tx.send(Command::ResumeTransfer { id }).await;
    }

    pub async fn set_downloads_dir(&self, path: PathBuf) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(Command::SetDownloadsDir { path, reply })
            .await
            .map_err(|_| EngineError::Concurrency("engine worker is gone".to_string()))?;
        rx.await
            .map_err(|_| EngineError::Concurrency("engine worker dropped the reply".to_string()))?
    }

    pub async fn get_downloads_dir(&self) -> Option<PathBuf> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(Command::GetDownloadsDir { reply })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown).await;
    }
}

/// Spawn the engine's worker task on the caller's runtime and return a
/// handle plus the event stream. Binds the transfer listener immediately
/// (§4.2 "bound for the entire lifetime of the engine"); discovery starts
/// only once `StartDiscovery` is sent.
pub async fn spawn_engine(config: EngineConfig) -> (EngineHandle, mpsc::Receiver<Event>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let mut worker = EngineWorker::new(config, event_tx.clone());
    worker.start_interface_monitor();
    worker.start_transfer_listener().await;

    tokio::spawn(async move {
        worker.run(command_rx).await;
    });

    (EngineHandle { command_tx }, event_rx)
}

struct EngineWorker {
    device_name: String,
    discovery_port: u16,
    transfer_port: u16,
    downloads_dir: PathBuf,
    events: mpsc::Sender<Event>,
    peers: PeerTable,
    registry: TransferRegistry,
    engine_cancel: CancellationToken,
    discovery_session: Option<DiscoverySession>,
    interface_monitor: Option<JoinHandle<()>>,
    transfer_listener: Option<JoinHandle<()>>,
}

impl EngineWorker {
    fn new(config: EngineConfig, events: mpsc::Sender<Event>) -> Self {
        Self {
            device_name: config.resolve_device_name(),
            discovery_port: config.discovery_port,
            transfer_port: config.transfer_port,
            downloads_dir: config.downloads_dir,
            events,
            peers: PeerTable::new(),
            registry: TransferRegistry::new(),
            engine_cancel: CancellationToken::new(),
            discovery_session: None,
            interface_monitor: None,
            transfer_listener: None,
        }
    }

    fn start_interface_monitor(&mut self) {
        let events = self.events.clone();
        let cancel = self.engine_cancel.child_token();
        self.interface_monitor = Some(tokio::spawn(async move {
            run_interface_monitor(events, cancel).await;
        }));
    }

    async fn start_transfer_listener(&mut self) {
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.transfer_port);
        match TcpListener::bind(bind_addr).await {
            Ok(listener) => {
                let downloads_dir = self.downloads_dir.clone();
                let registry = self.registry.clone();
                let events = self.events.clone();
                let cancel = self.engine_cancel.child_token();
                self.transfer_listener = Some(tokio::spawn(async move {
                    run_transfer_listener(listener, downloads_dir, registry, events, cancel).await;
                }));
            }
            Err(e) => {
                self.log(
                    Level::Error,
                    format!("transfer listener bind failed on port {}: {e}", self.transfer_port),
                )
                .await;
            }
        }
    }

    async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(cmd) = commands.recv().await {
            match cmd {
                Command::StartDiscovery => self.handle_start_discovery().await,
                Command::Stop => self.handle_stop_discovery().await,
                Command::CheckPeer { address, reply } => {
                    let reachable = self.check_peer(&address).await;
                    let _ = reply.send(reachable);
                }
                Command::SendBatch { request, reply } => {
                    let outcome = self.handle_send_batch(request).await;
                    let _ = reply.send(outcome);
                }
                Command::CancelTransfer { id } => {
                    // Cancelling the token unblocks the live sender/receiver
                    // task's I/O, and that task's own error path emits the
                    // single `TransferError` for this transfer (§8 property
                    // 3: at most one per id) — this handler must not also
                    // emit one, or cancel would produce two.
                    self.registry.cancel(&id);
                }
                Command::PauseTransfer { id } => self.registry.pause(&id),
                Command::ResumeTransfer { id } => self.registry.resume(&id),
                Command::SetDownloadsDir { path, reply } => {
                    let outcome = self.set_downloads_dir(path).await;
                    let _ = reply.send(outcome);
                }
                Command::GetDownloadsDir { reply } => {
                    let _ = reply.send(self.downloads_dir.clone());
                }
                Command::Shutdown => {
                    self.shutdown().await;
                    break;
                }
            }
        }
    }

    async fn handle_start_discovery(&mut self) {
        if let Some(session) = self.discovery_session.take() {
            session.stop().await;
        }
        let _ = self.events.send(Event::PeersCleared).await;
        let session = discovery::start_discovery(
            self.device_name.clone(),
            self.discovery_port,
            self.transfer_port,
            self.peers.clone(),
            self.events.clone(),
        )
        .await;
        self.discovery_session = Some(session);
    }

    async fn handle_stop_discovery(&mut self) {
        if let Some(session) = self.discovery_session.take() {
            session.stop().await;
        }
    }

    async fn check_peer(&self, address: &str) -> bool {
        if self.peers.contains(address) {
            return true;
        }
        let target = format!("{address}:{}", self.transfer_port);
        tokio::time::timeout(
            std::time::Duration::from_millis(crate::transfer::protocol::CONNECT_TIMEOUT_MS),
            tokio::net::TcpStream::connect(target),
        )
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
    }

    async fn handle_send_batch(&mut self, request: SendBatchRequest) -> Result<String, EngineError> {
        for file in &request.file_paths {
            if tokio::fs::metadata(file).await.is_err() {
                return Err(EngineError::Resource(format!(
                    "{} does not exist",
                    file.display()
                )));
            }
        }

        let guard = self.registry.try_begin_batch()?;
        let batch_id = request
            .batch_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let targets = request.targets();
        let registry = self.registry.clone();
        let events = self.events.clone();
        let transfer_port = self.transfer_port;
        let batch_id_for_task = batch_id.clone();

        tokio::spawn(async move {
            sender::run_batch(batch_id_for_task, targets, transfer_port, registry, events).await;
            drop(guard);
        });

        Ok(batch_id)
    }

    async fn set_downloads_dir(&mut self, path: PathBuf) -> Result<(), EngineError> {
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| EngineError::Configuration(format!("cannot use {}: {e}", path.display())))?;
        self.downloads_dir = path;
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Some(session) = self.discovery_session.take() {
            session.stop().await;
        }
        self.engine_cancel.cancel();
        if let Some(handle) = self.interface_monitor.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.transfer_listener.take() {
            let _ = handle.await;
        }
    }

    async fn log(&self, level: Level, message: impl Into<String>) {
        let _ = self.events.send(Event::Log(LogEvent::new(level, message))).await;
    }
}

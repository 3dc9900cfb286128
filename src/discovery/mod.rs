//! Discovery service orchestrator (C2, §4.2).
//!
//! Grounded on the teacher's `start_lan_mode`/`LanTasks` (`runtime/lan/mod.rs`):
//! one entry point spawns the broadcaster, listener, and (here, additionally)
//! the subnet-sweep fallback as sibling tasks sharing one
//! `CancellationToken`, and returns a handle the caller can tear down.
//! `restart()` is this module's analogue of re-calling `start_lan_mode` —
//! it tears down the previous task set and clears the peer table so stale
//! entries don't survive a restart (§4.2 "Restart semantics").

pub mod broadcaster;
pub mod listener;
pub mod protocol;
pub mod sweep;

use std::collections::HashSet;
use std::net::Ipv4Addr;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::event::Event;
use crate::interfaces;
use crate::peer::PeerTable;

/// A running discovery session's task handles, cancellable as one unit.
pub struct DiscoverySession {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl DiscoverySession {
    pub async fn stop(self) {
        self.cancel.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Start the broadcaster, listener, and subnet-sweep fallback as sibling
/// tasks under one cancellation scope. `peers` is cleared first so that a
/// restart re-triggers `PeerDiscovered` for peers still on the network.
pub async fn start_discovery(
    name: String,
    discovery_port: u16,
    transfer_port: u16,
    peers: PeerTable,
    events: mpsc::Sender<Event>,
) -> DiscoverySession {
    peers.clear();

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    let local_addresses: HashSet<Ipv4Addr> = interfaces::enumerate()
        .into_iter()
        .flat_map(|iface| iface.addresses)
        .map(|entry| entry.address)
        .collect();

    let socket = listener::bind_reusable_udp(discovery_port, &events).await;

    if let Some(socket) = socket {
        let peers_for_listener = peers.clone();
        let events_for_listener = events.clone();
        let cancel_for_listener = cancel.clone();
        handles.push(tokio::spawn(async move {
            listener::run_discovery_listener(
                socket,
                peers_for_listener,
                local_addresses,
                events_for_listener,
                cancel_for_listener,
            )
            .await;
        }));
    }

    {
        let events_for_broadcaster = events.clone();
        let cancel_for_broadcaster = cancel.clone();
        let name = name.clone();
        handles.push(tokio::spawn(async move {
            broadcaster::run_discovery_broadcaster(
                name,
                discovery_port,
                events_for_broadcaster,
                cancel_for_broadcaster,
            )
            .await;
        }));
    }

    {
        let peers_for_sweep = peers.clone();
        let events_for_sweep = events.clone();
        let cancel_for_sweep = cancel.clone();
        handles.push(tokio::spawn(async move {
            sweep::run_subnet_sweep(
                transfer_port,
                peers_for_sweep,
                events_for_sweep,
                cancel_for_sweep,
            )
            .await;
        }));
    }

    DiscoverySession { cancel, handles }
}

//! UDP presence broadcaster (§4.2, §6).
//!
//! Grounded on the teacher's `run_beacon_broadcaster`
//! (`runtime/lan/discovery.rs`): an ephemeral-port `UdpSocket` with
//! `SO_BROADCAST`, ticking on an `interval()` against a
//! `CancellationToken`. Generalized in two ways the teacher's beacon does
//! not need: (1) the frame is sent to the global broadcast address and to
//! every per-interface directed broadcast address and naive `x.y.z.255`
//! address, since some routers/APs drop 255.255.255.255 and the directed
//! and naive forms can differ for subnets narrower than /24 (§4.2
//! "Broadcast target"); (2) all three are recomputed from
//! [`crate::interfaces::enumerate`] on every tick so a newly-connected
//! interface picks up the broadcast without a restart.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use log::Level;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use super::protocol::{DiscoveryFrame, PRESENCE_INTERVAL_MS};
use crate::event::{Event, LogEvent};
use crate::interfaces::{self, AddrEntry};

/// Compute the directed-broadcast address for an interface address/netmask
/// pair, i.e. `address | !netmask` (§4.2).
pub fn directed_broadcast(entry: &AddrEntry) -> Ipv4Addr {
    let addr = u32::from(entry.address);
    let mask = u32::from(entry.netmask);
    Ipv4Addr::from(addr | !mask)
}

/// The naive `x.y.z.255` broadcast form for an interface address, i.e. its
/// own first three octets with the last forced to 255 (§4.2). Distinct from
/// the directed broadcast whenever the subnet is narrower than /24.
fn naive_broadcast(entry: &AddrEntry) -> Ipv4Addr {
    let octets = entry.address.octets();
    Ipv4Addr::new(octets[0], octets[1], octets[2], 255)
}

/// Every broadcast-style address this host should send presence frames to:
/// the global broadcast address plus each interface's directed broadcast
/// address and naive `x.y.z.255` form, deduplicated.
fn broadcast_targets() -> Vec<Ipv4Addr> {
    let mut targets = vec![Ipv4Addr::BROADCAST];
    for iface in interfaces::enumerate() {
        for entry in &iface.addresses {
            let directed = directed_broadcast(entry);
            if !targets.contains(&directed) {
                targets.push(directed);
            }
            let naive = naive_broadcast(entry);
            if !targets.contains(&naive) {
                targets.push(naive);
            }
        }
    }
    targets
}

pub async fn run_discovery_broadcaster(
    name: String,
    discovery_port: u16,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    let socket = match UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await {
        Ok(s) => s,
        Err(e) => {
            log_line(&events, Level::Error, format!("discovery broadcaster bind failed: {e}")).await;
            return;
        }
    };

    if let Err(e) = socket.set_broadcast(true) {
        log_line(&events, Level::Error, format!("discovery broadcaster set_broadcast failed: {e}")).await;
        return;
    }

    log_line(&events, Level::Info, format!("discovery broadcaster started on port {discovery_port}")).await;

    let frame = DiscoveryFrame::new(name, Some(super::protocol::platform_tag().to_string()));
    let payload = frame.encode();
    let mut tick = interval(std::time::Duration::from_millis(PRESENCE_INTERVAL_MS));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                for target in broadcast_targets() {
                    let dest = SocketAddr::V4(SocketAddrV4::new(target, discovery_port));
                    if let Err(e) = socket.send_to(&payload, dest).await {
                        log_line(&events, Level::Warn, format!("presence send to {target} failed: {e}")).await;
                    }
                }
            }
        }
    }

    log_line(&events, Level::Debug, "discovery broadcaster stopped".to_string()).await;
}

async fn log_line(events: &mpsc::Sender<Event>, level: Level, message: String) {
    let _ = events.send(Event::Log(LogEvent::new(level, message))).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directed_broadcast_slash_24() {
        let entry = AddrEntry {
            address: Ipv4Addr::new(192, 168, 1, 42),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
        };
        assert_eq!(directed_broadcast(&entry), Ipv4Addr::new(192, 168, 1, 255));
    }

    #[test]
    fn directed_broadcast_slash_16() {
        let entry = AddrEntry {
            address: Ipv4Addr::new(10, 20, 3, 7),
            netmask: Ipv4Addr::new(255, 255, 0, 0),
        };
        assert_eq!(directed_broadcast(&entry), Ipv4Addr::new(10, 20, 255, 255));
    }

    #[test]
    fn naive_broadcast_differs_from_directed_on_slash_16() {
        let entry = AddrEntry {
            address: Ipv4Addr::new(10, 20, 3, 7),
            netmask: Ipv4Addr::new(255, 255, 0, 0),
        };
        assert_eq!(naive_broadcast(&entry), Ipv4Addr::new(10, 20, 3, 255));
        assert_ne!(naive_broadcast(&entry), directed_broadcast(&entry));
    }
}

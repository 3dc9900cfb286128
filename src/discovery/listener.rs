//! UDP presence listener (§4.2, §6).
//!
//! Grounded on the teacher's `run_beacon_listener`/`bind_reusable_udp`
//! (`runtime/lan/discovery.rs`), generalized from the teacher's
//! `device_id`-keyed peer map to this spec's IPv4-address-keyed
//! [`PeerTable`], and from `DiscoveryBeacon` to [`DiscoveryFrame`]. The
//! teacher filters self-beacons by comparing `device_id`; this spec has no
//! device id in the wire frame; loopback suppression instead works against
//! the local machine's own addresses (§4.2 "never treats a message
//! originating from one of its own bound addresses as a peer"), supplied by
//! the caller from [`crate::interfaces::enumerate`].

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4};

use log::Level;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::protocol::DiscoveryFrame;
use crate::event::{Event, LogEvent};
use crate::peer::{now_unix_secs, PeerTable, Upsert};

/// Bind a UDP socket with `SO_REUSEADDR`/`SO_REUSEPORT` so the discovery
/// port can be shared across processes on one host during development, the
/// same way the teacher's `bind_reusable_udp` does.
pub async fn bind_reusable_udp(port: u16, events: &mpsc::Sender<Event>) -> Option<UdpSocket> {
    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);

    let socket = match Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)) {
        Ok(s) => s,
        Err(e) => {
            log_line(events, Level::Error, format!("discovery socket create failed: {e}")).await;
            return None;
        }
    };

    if let Err(e) = socket.set_reuse_address(true) {
        log_line(events, Level::Warn, format!("SO_REUSEADDR failed (non-fatal): {e}")).await;
    }
    #[cfg(not(target_os = "windows"))]
    {
        if let Err(e) = socket.set_reuse_port(true) {
            log_line(events, Level::Warn, format!("SO_REUSEPORT failed (non-fatal): {e}")).await;
        }
    }
    socket.set_nonblocking(true).ok();

    if let Err(e) = socket.bind(&socket2::SockAddr::from(addr)) {
        log_line(events, Level::Error, format!("discovery bind failed on port {port}: {e}")).await;
        return None;
    }

    let std_socket: std::net::UdpSocket = socket.into();
    match UdpSocket::from_std(std_socket) {
        Ok(s) => Some(s),
        Err(e) => {
            log_line(events, Level::Error, format!("discovery tokio conversion failed: {e}")).await;
            None
        }
    }
}

/// Listen for [`DiscoveryFrame`]s and maintain `peers`. `local_addresses`
/// is the current set of this host's own bound IPv4 addresses: frames that
/// appear to originate from one of them are discarded (loopback
/// suppression, §4.2).
pub async fn run_discovery_listener(
    socket: UdpSocket,
    peers: PeerTable,
    local_addresses: HashSet<Ipv4Addr>,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    log_line(&events, Level::Info, "discovery listener started".to_string()).await;

    let mut buf = [0u8; 2048];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, src_addr)) => {
                        let Some(frame) = DiscoveryFrame::decode(&buf[..len]) else {
                            continue;
                        };
                        let std::net::IpAddr::V4(src_ip) = src_addr.ip() else {
                            continue;
                        };
                        if local_addresses.contains(&src_ip) {
                            continue;
                        }

                        let address = src_ip.to_string();
                        let now = now_unix_secs();
                        match peers.upsert(&address, frame.name.clone(), frame.os.clone(), now) {
                            Upsert::New(peer) => {
                                log_line(
                                    &events,
                                    Level::Info,
                                    format!("peer discovered: {} ({})", peer.display_name, peer.address),
                                )
                                .await;
                                let _ = events.send(Event::PeerDiscovered(peer)).await;
                            }
                            Upsert::Updated => {}
                        }
                    }
                    Err(e) => {
                        log_line(&events, Level::Warn, format!("discovery recv error: {e}")).await;
                    }
                }
            }
        }
    }

    log_line(&events, Level::Debug, "discovery listener stopped".to_string()).await;
}

async fn log_line(events: &mpsc::Sender<Event>, level: Level, message: String) {
    let _ = events.send(Event::Log(LogEvent::new(level, message))).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::protocol::DiscoveryFrame;
    use std::time::Duration;

    #[tokio::test]
    async fn peer_discovered_on_first_frame_only() {
        let (tx, mut rx) = mpsc::channel(16);
        let listener_socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let listener_addr = listener_socket.local_addr().unwrap();
        let sender_socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let peers = PeerTable::new();
        let cancel = CancellationToken::new();
        let listener_cancel = cancel.clone();
        let peers_clone = peers.clone();
        let handle = tokio::spawn(async move {
            run_discovery_listener(
                listener_socket,
                peers_clone,
                HashSet::new(),
                tx,
                listener_cancel,
            )
            .await;
        });

        let frame = DiscoveryFrame::new("peer-a".into(), Some("linux".into()));
        sender_socket.send_to(&frame.encode(), listener_addr).await.unwrap();
        sender_socket.send_to(&frame.encode(), listener_addr).await.unwrap();

        let mut discovered_events = 0;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while tokio::time::Instant::now() < deadline {
            if let Ok(Some(event)) =
                tokio::time::timeout(Duration::from_millis(100), rx.recv()).await
            {
                if matches!(event, Event::PeerDiscovered(_)) {
                    discovered_events += 1;
                }
            }
            if peers.snapshot().len() == 1 && discovered_events >= 1 {
                break;
            }
        }

        assert_eq!(discovered_events, 1);
        assert_eq!(peers.snapshot().len(), 1);

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }
}

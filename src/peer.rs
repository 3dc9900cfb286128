//! Peer table shared between the discovery listener, the subnet sweep, and
//! the façade. Grounded on `src-tauri/src/runtime/lan/discovery.rs`'s
//! `DiscoveredPeers`/`DiscoveredPeer` pair, generalized from the teacher's
//! `device_id`-keyed map to this spec's IPv4-address-keyed map (§3: "Unique
//! key = IPv4 address").

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A host discovered on the LAN, keyed by its IPv4 address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    pub address: String,
    pub display_name: String,
    pub os: Option<String>,
    pub last_seen_unix_secs: u64,
}

impl Peer {
    /// The synthesized display name used when a peer is only known via the
    /// active subnet sweep's TCP probe (no presence frame ever received).
    pub fn synthesized_name(address: &str) -> String {
        format!("Discovered Device ({})", address)
    }
}

/// Thread-safe peer table. A single writer (the discovery listener and the
/// sweep task); readers take a snapshot via [`PeerTable::snapshot`].
#[derive(Clone, Default)]
pub struct PeerTable {
    inner: Arc<RwLock<HashMap<String, Peer>>>,
}

/// Outcome of inserting/updating a peer, used by the listener to decide
/// whether to emit `peer-discovered` (new only) versus update silently.
pub enum Upsert {
    New(Peer),
    Updated,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every entry. Used on discovery restart (§4.2 "Restart
    /// semantics") so a subsequent presence frame re-triggers
    /// `peer-discovered` for still-reachable peers.
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Peer> {
        self.inner.read().values().cloned().collect()
    }

    /// Insert a newly heard peer, or refresh `last_seen` on an existing one.
    /// Per the spec's ordering guarantee, `peer-discovered` fires at most
    /// once per (peer, discovery-session): only [`Upsert::New`] should
    /// trigger the event.
    pub fn upsert(
        &self,
        address: &str,
        display_name: String,
        os: Option<String>,
        now_unix_secs: u64,
    ) -> Upsert {
        let mut table = self.inner.write();
        if let Some(existing) = table.get_mut(address) {
            existing.last_seen_unix_secs = now_unix_secs;
            // A real hostname arriving after a synthesized name updates the
            // record in place without re-emitting `peer-discovered` — see
            // the §9 open-question decision recorded in DESIGN.md.
            if existing.display_name.starts_with("Discovered Device (") && !display_name.is_empty()
            {
                existing.display_name = display_name;
            }
            if os.is_some() {
                existing.os = os;
            }
            Upsert::Updated
        } else {
            let peer = Peer {
                address: address.to_string(),
                display_name,
                os,
                last_seen_unix_secs: now_unix_secs,
            };
            table.insert(address.to_string(), peer.clone());
            Upsert::New(peer)
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.inner.read().contains_key(address)
    }
}

/// Current UNIX timestamp in whole seconds.
pub fn now_unix_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_new_then_update() {
        let table = PeerTable::new();
        match table.upsert("10.0.0.2", "host-b".into(), Some("linux".into()), 1) {
            Upsert::New(p) => assert_eq!(p.address, "10.0.0.2"),
            Upsert::Updated => panic!("expected New"),
        }
        match table.upsert("10.0.0.2", "host-b".into(), Some("linux".into()), 2) {
            Upsert::Updated => {}
            Upsert::New(_) => panic!("expected Updated"),
        }
        assert_eq!(table.snapshot().len(), 1);
    }

    #[test]
    fn clear_empties_table() {
        let table = PeerTable::new();
        table.upsert("10.0.0.2", "host-b".into(), None, 1);
        assert!(!table.is_empty());
        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn synthesized_name_updates_silently_on_real_hostname() {
        let table = PeerTable::new();
        table.upsert("10.0.0.5", Peer::synthesized_name("10.0.0.5"), None, 1);
        table.upsert("10.0.0.5", "real-hostname".into(), Some("linux".into()), 2);
        let snap = table.snapshot();
        assert_eq!(snap[0].display_name, "real-hostname");
    }
}

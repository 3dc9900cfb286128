//! Discovery wire format (§6: UDP, port 9000).
//!
//! Generalized from the teacher's magic-prefixed `DiscoveryBeacon`
//! (`runtime/lan/protocol.rs`) to this spec's plain JSON document — this
//! system has no magic-byte framing requirement, so `encode`/`decode` are
//! simpler than the teacher's `encode_beacon`/`decode_beacon`.

use serde::{Deserialize, Serialize};

/// How often a presence frame is broadcast (§4.2).
pub const PRESENCE_INTERVAL_MS: u64 = 1000;

/// Delay after a discovery (re)start before the active subnet sweep
/// fallback kicks in, if the peer table is still empty (§4.2).
pub const SWEEP_DELAY_SECS: u64 = 5;

/// Connect timeout for each subnet-sweep TCP probe (§4.2).
pub const SWEEP_PROBE_TIMEOUT_MS: u64 = 800;

/// Maximum number of concurrent subnet-sweep probes (§4.2).
pub const SWEEP_BATCH_SIZE: usize = 15;

/// The one-way UDP presence announcement (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub name: String,
    pub os: Option<String>,
}

impl DiscoveryFrame {
    pub fn new(name: String, os: Option<String>) -> Self {
        Self {
            frame_type: "discovery".to_string(),
            name,
            os,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        // Serialization is infallible for this plain-data struct.
        serde_json::to_vec(self).expect("discovery frame serialization is infallible")
    }

    /// Parse a raw datagram. Returns `None` for malformed JSON or any
    /// `type` other than `"discovery"` — both are silently discarded per
    /// §7 ("Errors in the UDP receive path ... are swallowed silently").
    pub fn decode(data: &[u8]) -> Option<Self> {
        let frame: DiscoveryFrame = serde_json::from_slice(data).ok()?;
        if frame.frame_type != "discovery" {
            return None;
        }
        Some(frame)
    }
}

/// Current OS tag announced in discovery frames.
pub fn platform_tag() -> &'static str {
    std::env::consts::OS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let frame = DiscoveryFrame::new("host-a".into(), Some("linux".into()));
        let bytes = frame.encode();
        let decoded = DiscoveryFrame::decode(&bytes).unwrap();
        assert_eq!(decoded.name, "host-a");
        assert_eq!(decoded.os.as_deref(), Some("linux"));
    }

    #[test]
    fn unknown_type_ignored() {
        let bytes = br#"{"type":"something-else","name":"x"}"#;
        assert!(DiscoveryFrame::decode(bytes).is_none());
    }

    #[test]
    fn malformed_json_ignored() {
        assert!(DiscoveryFrame::decode(b"not json").is_none());
    }
}

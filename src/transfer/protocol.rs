//! Transfer wire format (§6: TCP, port 9001).
//!
//! A deliberate simplification versus the teacher's `PeerMessage` envelope
//! (`runtime/lan/protocol.rs`, a tagged enum length-prefixed for every
//! message including heartbeats): this protocol carries only one metadata
//! line followed by raw payload bytes, because a file transfer has no
//! further in-band messages to multiplex (§9 open-question decision, see
//! DESIGN.md). `TransferMetadata` keeps the teacher's plain-JSON-over-serde
//! convention; the framing itself is a newline terminator rather than the
//! teacher's 4-byte length prefix, since line-based framing is enough for a
//! fixed single-message header.

use serde::{Deserialize, Serialize};

/// The header line sent before a file's payload bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferMetadata {
    /// Absent when the sender has no caller-supplied id to propagate; the
    /// listener then keeps its own provisional id (§4.3).
    #[serde(rename = "transferId", default)]
    pub transfer_id: Option<String>,
    pub name: String,
    pub size: u64,
}

/// Upper bound on the metadata line, matching the teacher's bounded-frame
/// discipline (`MAX_FRAME_SIZE` in `protocol.rs`) adapted to this spec's
/// 64 KiB header limit (§4.3).
pub const MAX_METADATA_BYTES: usize = 64 * 1024;

/// Connect timeout for an outbound transfer connection (§4.4).
pub const CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Idle read/write timeout once a sender connection is established (§5).
pub const IO_IDLE_TIMEOUT_MS: u64 = 5_000;

/// Pause between consecutive files sent to the same peer within a batch
/// (§4.4 "Batching").
pub const INTER_FILE_PAUSE_MS: u64 = 100;

impl TransferMetadata {
    pub fn new(transfer_id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            transfer_id: Some(transfer_id.into()),
            name: name.into(),
            size,
        }
    }

    /// Encode as a single `\n`-terminated line.
    pub fn encode_line(&self) -> Vec<u8> {
        let mut line = serde_json::to_vec(self).expect("metadata serialization is infallible");
        line.push(b'\n');
        line
    }

    pub fn decode(line: &[u8]) -> Option<Self> {
        serde_json::from_slice(line).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let meta = TransferMetadata::new("t1", "photo.jpg", 4096);
        let line = meta.encode_line();
        assert_eq!(*line.last().unwrap(), b'\n');
        let decoded = TransferMetadata::decode(&line[..line.len() - 1]).unwrap();
        assert_eq!(decoded.transfer_id.as_deref(), Some("t1"));
        assert_eq!(decoded.name, "photo.jpg");
        assert_eq!(decoded.size, 4096);
    }

    #[test]
    fn malformed_metadata_rejected() {
        assert!(TransferMetadata::decode(b"not json").is_none());
    }

    #[test]
    fn missing_transfer_id_decodes_as_none() {
        let decoded = TransferMetadata::decode(br#"{"name":"photo.jpg","size":4096}"#).unwrap();
        assert!(decoded.transfer_id.is_none());
    }
}

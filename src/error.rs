//! Typed errors for the public engine boundary.
//!
//! Internal task bodies use `anyhow::Result` with `.context(...)` chains (as
//! the teacher's `runtime/lan/peer.rs` does) and convert to [`EngineError`]
//! only where a result crosses into the command/event façade, so callers can
//! match on a kind instead of parsing a message string.

use thiserror::Error;

/// Error kinds surfaced by [`crate::engine::EngineHandle`] commands, per the
/// error taxonomy in the spec's error-handling section.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Connect refused, timeout, or a broken pipe mid-stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// Metadata framing violation, malformed JSON, or a size mismatch.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A source file is missing, or the destination directory is unwritable.
    #[error("resource error: {0}")]
    Resource(String),

    /// A second batch was requested while one was already active, or an
    /// operation referenced an unknown transfer id.
    #[error("concurrency error: {0}")]
    Concurrency(String),

    /// UDP/TCP bind or listen failure at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

//! Zero-configuration peer-to-peer LAN file transfer engine.
//!
//! This crate is the network engine only: UDP presence discovery with an
//! active subnet sweep fallback, a TCP file transfer protocol, and the
//! transfer lifecycle/concurrency model around both. The graphical
//! interface, history display, and firewall provisioning a full application
//! would add are external collaborators driven by the [`event::Event`] /
//! [`event::Command`] surface exposed here — none of that is linked into
//! this crate.
//!
//! Entry point: [`engine::spawn_engine`].

pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod event;
pub mod interfaces;
pub mod logging;
pub mod peer;
pub mod progress;
pub mod transfer;

pub use config::EngineConfig;
pub use engine::{spawn_engine, EngineHandle};
pub use error::{EngineError, EngineResult};
pub use event::{Command, Event, SendBatchRequest, SendTarget};
pub use peer::Peer;

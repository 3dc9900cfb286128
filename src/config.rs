//! Engine configuration.
//!
//! Mirrors the teacher's `Config::load()` shape (originally at this same
//! path): read a TOML file, write a starter template and return an error
//! telling the user to edit it when the file doesn't exist yet. The knobs
//! here are the ones the core actually owns — ports and the downloads
//! directory — not a cloud server URL.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// UDP port used for discovery presence frames.
pub const DEFAULT_DISCOVERY_PORT: u16 = 9000;

/// TCP port used for file transfer connections.
pub const DEFAULT_TRANSFER_PORT: u16 = 9001;

fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}

fn default_transfer_port() -> u16 {
    DEFAULT_TRANSFER_PORT
}

/// Returns `<user-downloads>/EtherLink`, falling back to `./EtherLink` if
/// the platform downloads directory can't be resolved.
fn default_downloads_dir() -> PathBuf {
    dirs::download_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("EtherLink")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// UDP port for presence broadcast/listen. Injectable so tests can bind
    /// to an ephemeral port instead of colliding on 9000.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    /// TCP port for the transfer listener.
    #[serde(default = "default_transfer_port")]
    pub transfer_port: u16,

    /// Directory received files are written into. Created on engine start
    /// if absent.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,

    /// Human-friendly name announced in discovery frames. Defaults to the
    /// system hostname when `None`.
    #[serde(default)]
    pub device_name: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            transfer_port: default_transfer_port(),
            downloads_dir: default_downloads_dir(),
            device_name: None,
        }
    }
}

impl EngineConfig {
    /// Construct a config bound to loopback-friendly ephemeral ports and a
    /// caller-supplied scratch directory, for tests that need several
    /// independent engines in one process (per the "no singleton" design
    /// note).
    pub fn for_test(discovery_port: u16, transfer_port: u16, downloads_dir: PathBuf) -> Self {
        Self {
            discovery_port,
            transfer_port,
            downloads_dir,
            device_name: Some("test-device".to_string()),
        }
    }

    /// Load configuration from `path`. If the file does not exist, a
    /// starter template is written and an error is returned so the caller
    /// knows to inspect/edit it before proceeding — the teacher's own
    /// `Config::load()` does the same rather than silently picking defaults
    /// that the user can't discover.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let template = toml::to_string_pretty(&EngineConfig::default())
                .context("serializing default config template")?;
            std::fs::write(path, template)
                .with_context(|| format!("writing default config to {:?}", path))?;
            anyhow::bail!("default config created at {:?}; edit it and rerun", path);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {:?}", path))?;
        let cfg: EngineConfig = toml::from_str(&content).context("parsing config TOML")?;
        Ok(cfg)
    }

    /// Resolve the device name, falling back to the system hostname and
    /// finally to a short UUID-derived label, matching
    /// `runtime/lan/mod.rs::start_lan_mode`'s precedence in the teacher.
    pub fn resolve_device_name(&self) -> String {
        self.device_name
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(hostname_or_fallback)
    }
}

fn hostname_or_fallback() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("EtherLink-{}", &uuid::Uuid::new_v4().to_string()[..8]))
}

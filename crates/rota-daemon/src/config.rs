//! Daemon configuration from `rota.toml`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Top-level daemon configuration. Every field has a default, so an empty or
/// missing file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Holds `requests/`, `events.jsonl` and `audit.jsonl`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub optimizer: EndpointConfig,

    #[serde(default)]
    pub parser: EndpointConfig,

    #[serde(default)]
    pub ranker: RankerConfig,

    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            data_dir: default_data_dir(),
            optimizer: EndpointConfig::default(),
            parser: EndpointConfig::default(),
            ranker: RankerConfig::default(),
            approval: ApprovalConfig::default(),
            sync: SyncConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

/// An external collaborator reached over HTTP. No URL means not configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankerMode {
    #[default]
    Builtin,
    Http,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankerConfig {
    #[serde(default)]
    pub mode: RankerMode,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Fill-in candidates shown per vacated slot.
    #[serde(default = "default_display_candidates")]
    pub display_candidates: usize,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            display_candidates: default_display_candidates(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Broadcast buffer per subscriber before it is reported as lagging.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Frames queued per WebSocket client; a client that falls this far
    /// behind is disconnected.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            heartbeat_secs: default_heartbeat_secs(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

/// How long voided and rolled-back change sets are kept in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retired_hours")]
    pub retired_hours: u64,
    #[serde(default = "default_sweep_secs")]
    pub sweep_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retired_hours: default_retired_hours(),
            sweep_secs: default_sweep_secs(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".rota")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_display_candidates() -> usize {
    rota_approval::DEFAULT_DISPLAY_CANDIDATES
}

fn default_capacity() -> usize {
    rota_events::hub::DEFAULT_CAPACITY
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_outbound_queue() -> usize {
    64
}

fn default_retired_hours() -> u64 {
    24
}

fn default_sweep_secs() -> u64 {
    3600
}

impl DaemonConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Load the file if it exists, otherwise fall back to defaults. A file
    /// that exists but does not parse is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn requests_dir(&self) -> PathBuf {
        self.data_dir.join("requests")
    }

    pub fn event_log(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.data_dir.join("audit.jsonl")
    }
}

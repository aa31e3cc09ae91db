use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub remote: RemoteConfig,
    pub session: SessionConfig,
    pub recall: RecallConfig,
    pub capture: CaptureConfig,
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

/// Where the substrate lives and how to reach it.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    /// One of `rpc`, `rest`, `cli`.
    pub transport: String,
    pub base_url: String,
    pub api_key: String,
    /// Path for the RPC endpoint, relative to `base_url`.
    pub rpc_path: String,
    /// Executable used by the `cli` transport.
    pub cli_command: String,
    /// Arguments placed before the operation words on every CLI invocation.
    pub cli_args: Vec<String>,
    pub timeout_secs: u64,
    pub compile_timeout_secs: u64,
    pub health_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// Platform label sent with every created session.
    pub platform: String,
    pub compile_on_flush: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecallConfig {
    pub enabled: bool,
    pub limit: usize,
    /// Prompts shorter than this (in chars, after trimming) skip recall.
    pub min_prompt_chars: usize,
    pub min_confidence: Option<f64>,
    pub tags: Vec<String>,
    /// Upper bound on snapshot text injected when the remote is unreachable.
    pub fallback_max_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub max_per_turn: usize,
    pub min_chars: usize,
    pub max_chars: usize,
    pub importance: f64,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SnapshotConfig {
    pub path: String,
    pub max_items: usize,
    /// Broad query used to pull the snapshot set.
    pub query: String,
    pub min_confidence: Option<f64>,
    pub sync_on_session_end: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            transport: "rpc".into(),
            base_url: "http://127.0.0.1:8420".into(),
            api_key: String::new(),
            rpc_path: "/mcp".into(),
            cli_command: "substrate".into(),
            cli_args: Vec::new(),
            timeout_secs: 30,
            compile_timeout_secs: 120,
            health_timeout_secs: 5,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            platform: "openclaw".into(),
            compile_on_flush: true,
        }
    }
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 5,
            min_prompt_chars: 10,
            min_confidence: None,
            tags: Vec::new(),
            fallback_max_chars: 4000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_turn: 3,
            min_chars: 20,
            max_chars: 500,
            importance: 0.7,
            tags: vec!["auto-capture".into()],
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        let path = default_bridge_dir()
            .join("knowledge-snapshot.md")
            .to_string_lossy()
            .into_owned();
        Self {
            path,
            max_items: 200,
            query: "important decisions preferences facts".into(),
            min_confidence: Some(0.5),
            sync_on_session_end: false,
        }
    }
}

/// Returns `~/.kbridge/`, or `./.kbridge/` when no home directory is known.
pub fn default_bridge_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kbridge")
}

/// Returns the default config file path: `~/.kbridge/config.toml`
pub fn default_config_path() -> PathBuf {
    default_bridge_dir().join("config.toml")
}

impl BridgeConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            BridgeConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (KBRIDGE_URL, KBRIDGE_API_KEY,
    /// KBRIDGE_TRANSPORT, KBRIDGE_LOG_LEVEL, KBRIDGE_SNAPSHOT).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("KBRIDGE_URL") {
            self.remote.base_url = val;
        }
        if let Ok(val) = std::env::var("KBRIDGE_API_KEY") {
            self.remote.api_key = val;
        }
        if let Ok(val) = std::env::var("KBRIDGE_TRANSPORT") {
            self.remote.transport = val;
        }
        if let Ok(val) = std::env::var("KBRIDGE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("KBRIDGE_SNAPSHOT") {
            self.snapshot.path = val;
        }
    }

    /// Resolve the snapshot path, expanding `~` if needed.
    pub fn resolved_snapshot_path(&self) -> PathBuf {
        expand_tilde(&self.snapshot.path)
    }
}

impl RemoteConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

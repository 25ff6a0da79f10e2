//! Daemon configuration — CLI flags layered over an optional
//! `config.toml` in the data directory, with built-in defaults last.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

const DEFAULT_PORT: u16 = 4520;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// JSON-RPC WebSocket port (shared with the HTTP health probe).
    pub port: u16,
    /// Bind address; keep the default loopback unless you trust the LAN.
    pub bind_address: String,
    /// Data directory for settings and logs.
    pub data_dir: PathBuf,
    /// Log level filter (trace, debug, info, warn, error).
    pub log_level: String,
    /// Optional log file path (rotated daily).
    pub log_file: Option<PathBuf>,
    /// Provider endpoint overrides, mainly for local proxies.
    pub gemini_base_url: Option<String>,
    pub openai_base_url: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: default_bind_address(),
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
            log_file: None,
            gemini_base_url: None,
            openai_base_url: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".redraft")
}

impl DaemonConfig {
    /// Resolve the effective configuration: defaults, then `config.toml`
    /// from the data directory, then explicit CLI overrides.
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log_level: Option<String>,
        log_file: Option<PathBuf>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let mut config = Self::load_file(&data_dir).unwrap_or_default();
        config.data_dir = data_dir;
        if let Some(port) = port {
            config.port = port;
        }
        if let Some(level) = log_level {
            config.log_level = level;
        }
        if let Some(path) = log_file {
            config.log_file = Some(path);
        }
        config
    }

    fn load_file(data_dir: &std::path::Path) -> Option<Self> {
        let path = data_dir.join("config.toml");
        let raw = std::fs::read_to_string(&path).ok()?;
        match toml::from_str(&raw) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %path.display(), err = %e, "config.toml unreadable, using defaults");
                None
            }
        }
    }
}

//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_ws::TransportConfig;

/// Environment variable prefix for overrides, e.g.
/// `TETHER__TRANSPORT__HEARTBEAT_INTERVAL_MS=15000`.
const ENV_PREFIX: &str = "TETHER";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Streaming endpoint.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Base URL of the stateless endpoint.
    #[serde(default = "default_http_base_url")]
    pub http_base_url: String,

    /// Stateless request timeout.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Session to connect at startup.
    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub hybrid: HybridConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Transport selection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Operations that prefer the streaming transport.
    #[serde(default = "default_streaming_operations")]
    pub streaming_operations: Vec<String>,

    /// Operations that must never use the streaming transport.
    #[serde(default = "default_force_stateless")]
    pub force_stateless: Vec<String>,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            streaming_operations: default_streaming_operations(),
            force_stateless: default_force_stateless(),
        }
    }
}

fn default_streaming_operations() -> Vec<String> {
    ["chat", "get_history", "get_session", "clear_history"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_force_stateless() -> Vec<String> {
    vec!["create_session".to_string()]
}

/// Cross-tab state sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_broadcast_capacity")]
    pub capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            capacity: default_broadcast_capacity(),
        }
    }
}

fn default_broadcast_capacity() -> usize {
    64
}

/// Diagnostics HTTP server. Disabled when `bind_addr` is unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default)]
    pub bind_addr: Option<String>,
}

fn default_ws_url() -> String {
    "ws://127.0.0.1:8000/ws".to_string()
}

fn default_http_base_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            http_base_url: default_http_base_url(),
            http_timeout_ms: default_http_timeout_ms(),
            session_id: None,
            transport: TransportConfig::default(),
            hybrid: HybridConfig::default(),
            broadcast: BroadcastConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, then apply `TETHER__*` environment overrides.
    ///
    /// A missing file is not an error; defaults (plus overrides) are used.
    pub fn load(path: &str) -> AppResult<Self> {
        if !std::path::Path::new(path).exists() {
            tracing::warn!(path = %path, "Config file not found, using defaults");
        }

        let settings = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn diagnostics_enabled(&self) -> bool {
        self.diagnostics.bind_addr.is_some()
    }
}

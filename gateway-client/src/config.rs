//! Configuration for the gateway client.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gateway WebSocket connection configuration.
#[derive(Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway base URL, without query string.
    #[serde(default = "default_url")]
    pub url: String,
    /// Gateway API version, sent as the `v` query parameter.
    #[serde(default = "default_api_version")]
    pub api_version: u8,
    /// Payload encoding, sent as the `encoding` query parameter.
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Credential handed to `connect`. Only the binary requires it.
    #[serde(default)]
    pub token: Option<String>,
    /// Draw a fresh jitter for every heartbeat instead of once per session.
    #[serde(default)]
    pub rejitter_each_tick: bool,
    /// Upper bound on how long a local close may take to flush.
    #[serde(default = "default_close_timeout")]
    pub close_timeout_secs: u64,
}

impl GatewayConfig {
    /// Full endpoint URL, e.g. `wss://gateway.discord.gg/?v=9&encoding=json`.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/?v={}&encoding={}",
            self.url.trim_end_matches('/'),
            self.api_version,
            self.encoding
        )
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_version: default_api_version(),
            encoding: default_encoding(),
            token: None,
            rejitter_each_tick: false,
            close_timeout_secs: default_close_timeout(),
        }
    }
}

// Keeps the token out of logs.
impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &self.url)
            .field("api_version", &self.api_version)
            .field("encoding", &self.encoding)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("rejitter_each_tick", &self.rejitter_each_tick)
            .field("close_timeout_secs", &self.close_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_url() -> String {
    "wss://gateway.discord.gg".to_string()
}
fn default_api_version() -> u8 {
    9
}
fn default_encoding() -> String {
    "json".to_string()
}
fn default_close_timeout() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (GATEWAY__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(ConfigLoader::builder().add_source(File::with_name("config").required(false)))
    }

    fn load_from(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config = builder
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

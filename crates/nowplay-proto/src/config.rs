use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

/// Environment variable consulted for the upstream bearer token when the
/// config file does not carry one.
pub const TOKEN_ENV_VAR: &str = "NOWPLAY_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the playback API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Bearer token for the playback API.  Token acquisition and refresh are
    /// someone else's problem — this is just the opaque credential we attach.
    /// Falls back to the NOWPLAY_TOKEN environment variable when absent.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Base poll interval while a track is playing.
    #[serde(default = "default_playing_interval_secs")]
    pub playing_interval_secs: u64,
    /// Base poll interval while nothing is playing.
    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,
    /// Retry-delay floor after a failure.
    #[serde(default = "default_backoff_floor_ms")]
    pub backoff_floor_ms: u64,
    /// Retry-delay cap — bounds worst-case staleness.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            playing_interval_secs: default_playing_interval_secs(),
            idle_interval_secs: default_idle_interval_secs(),
            backoff_floor_ms: default_backoff_floor_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            poll: PollConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_playing_interval_secs() -> u64 {
    10
}

fn default_idle_interval_secs() -> u64 {
    30
}

fn default_backoff_floor_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    60_000
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8799
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Resolve the bearer token: config file first, environment second.
    pub fn resolve_token(&self) -> Option<String> {
        self.upstream
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty()))
    }
}

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use crate::error::ConfigError;
use crate::storage::VITALS_CAPACITY;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub vitals: VitalsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub path: String,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub stable_after_ms: u64,     // uptime after which a dropped connection resets the backoff
    pub max_attempts: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            path: "/ws/stream".to_string(),
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            stable_after_ms: 5_000,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig { interval_secs: 30 }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VitalsConfig {
    pub capacity: usize,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        VitalsConfig { capacity: VITALS_CAPACITY }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = fs::read_to_string(path)?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url must not be empty".to_string()));
        }
        if self.refresh.interval_secs == 0 {
            return Err(ConfigError::Invalid("refresh.interval_secs must be positive".to_string()));
        }
        if self.stream.initial_backoff_ms == 0 {
            return Err(ConfigError::Invalid("stream.initial_backoff_ms must be positive".to_string()));
        }
        if self.stream.initial_backoff_ms > self.stream.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "stream.initial_backoff_ms must not exceed stream.max_backoff_ms".to_string(),
            ));
        }
        if self.vitals.capacity == 0 {
            return Err(ConfigError::Invalid("vitals.capacity must be positive".to_string()));
        }
        Ok(())
    }
}

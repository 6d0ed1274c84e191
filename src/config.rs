use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use crate::error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    pub tracker: TrackerConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

/// RPC client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL
    pub endpoint: String,
    /// Block selector passed to eth_getBlockByNumber
    pub block_selector: BlockSelector,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Retries after the first attempt for transport failures, 0 disables retrying
    pub max_retries: u32,
    /// Initial retry delay in seconds
    pub retry_delay_seconds: u64,
    /// Maximum retry delay in seconds
    pub max_retry_delay_seconds: u64,
}

/// Which block the node is asked for on every poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSelector {
    Latest,
    Safe,
    Finalized,
}

impl BlockSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockSelector::Latest => "latest",
            BlockSelector::Safe => "safe",
            BlockSelector::Finalized => "finalized",
        }
    }
}

impl std::str::FromStr for BlockSelector {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(BlockSelector::Latest),
            "safe" => Ok(BlockSelector::Safe),
            "finalized" => Ok(BlockSelector::Finalized),
            other => Err(ConfigError::InvalidValue {
                key: "rpc.block_selector".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Polling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Seconds between indexing passes
    pub poll_interval_seconds: u64,
    /// Transactions kept per address, 0 keeps everything
    pub max_history_per_address: usize,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Server host/bind address
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://eth.llamarpc.com".to_string(),
            block_selector: BlockSelector::Finalized,
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 1,
            max_retry_delay_seconds: 10,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 5,
            max_history_per_address: 0,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables.
    /// Environment variables take precedence over file values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_with_path(&config_path)
    }

    /// Same as [`AppConfig::load`] with an explicit file path
    pub fn load_with_path(path: &str) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if it does not exist
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(endpoint) = env::var("ETH_RPC_URL") {
            self.rpc.endpoint = endpoint;
        }
        if let Some(selector) = parse_env::<BlockSelector>("BLOCK_SELECTOR")? {
            self.rpc.block_selector = selector;
        }
        if let Some(timeout) = parse_env("RPC_TIMEOUT_SECONDS")? {
            self.rpc.timeout_seconds = timeout;
        }
        if let Some(retries) = parse_env("RPC_MAX_RETRIES")? {
            self.rpc.max_retries = retries;
        }

        if let Some(interval) = parse_env("POLL_INTERVAL_SECONDS")? {
            self.tracker.poll_interval_seconds = interval;
        }
        if let Some(limit) = parse_env("MAX_HISTORY_PER_ADDRESS")? {
            self.tracker.max_history_per_address = limit;
        }

        if let Ok(host) = env::var("API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = parse_env("API_PORT")? {
            self.api.port = port;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rpc.endpoint.starts_with("http://") && !self.rpc.endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.rpc.endpoint.clone()));
        }

        if self.rpc.timeout_seconds == 0 || self.rpc.timeout_seconds > 300 {
            return Err(ConfigError::InvalidValue {
                key: "rpc.timeout_seconds".to_string(),
                value: self.rpc.timeout_seconds.to_string(),
            });
        }

        if self.rpc.max_retries > 20 {
            return Err(ConfigError::InvalidValue {
                key: "rpc.max_retries".to_string(),
                value: self.rpc.max_retries.to_string(),
            });
        }

        if self.rpc.retry_delay_seconds > self.rpc.max_retry_delay_seconds {
            return Err(ConfigError::InvalidValue {
                key: "rpc.retry_delay_seconds".to_string(),
                value: self.rpc.retry_delay_seconds.to_string(),
            });
        }

        if self.tracker.poll_interval_seconds == 0 || self.tracker.poll_interval_seconds > 300 {
            return Err(ConfigError::InvalidValue {
                key: "tracker.poll_interval_seconds".to_string(),
                value: self.tracker.poll_interval_seconds.to_string(),
            });
        }

        if self.api.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "api.port".to_string(),
                value: self.api.port.to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                value: self.logging.level.clone(),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                value: self.logging.format.clone(),
            });
        }

        Ok(())
    }

    /// Render the default configuration as TOML
    pub fn generate_sample_config() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| ConfigError::Parsing(e.to_string()))
    }
}

//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::cache::CacheProvider;
use crate::deltaproxy::EvictionMethod;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Front-end listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8480
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Upstream backend and its caching behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_name")]
    pub name: String,

    #[serde(default = "default_origin_url")]
    pub origin_url: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Widest single upstream fetch; 0 disables time sharding
    #[serde(default)]
    pub shard_max_size_time_ms: u64,

    /// Epoch-aligned cadence for time shards; 0 leaves shards unaligned
    #[serde(default)]
    pub shard_step_ms: u64,

    /// Most samples per upstream fetch; 0 disables point sharding
    #[serde(default)]
    pub shard_max_size_points: u64,

    #[serde(default)]
    pub backfill_tolerance_secs: u64,

    #[serde(default)]
    pub backfill_tolerance_points: u64,

    #[serde(default = "default_retention_factor")]
    pub timeseries_retention_factor: u64,

    #[serde(default = "default_eviction_method")]
    pub timeseries_eviction_method: String,

    #[serde(default = "default_timeseries_ttl")]
    pub timeseries_ttl_secs: u64,

    #[serde(default)]
    pub fast_forward_disable: bool,

    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

fn default_backend_name() -> String {
    "default".to_string()
}

fn default_origin_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retention_factor() -> u64 {
    1024
}

fn default_eviction_method() -> String {
    "oldest".to_string()
}

fn default_timeseries_ttl() -> u64 {
    21_600 // 6 hours
}

fn default_max_concurrent_fetches() -> usize {
    4
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: default_backend_name(),
            origin_url: default_origin_url(),
            timeout_ms: default_timeout_ms(),
            shard_max_size_time_ms: 0,
            shard_step_ms: 0,
            shard_max_size_points: 0,
            backfill_tolerance_secs: 0,
            backfill_tolerance_points: 0,
            timeseries_retention_factor: default_retention_factor(),
            timeseries_eviction_method: default_eviction_method(),
            timeseries_ttl_secs: default_timeseries_ttl(),
            fast_forward_disable: false,
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

impl BackendConfig {
    /// Parsed eviction method; unknown names fall back to `oldest`
    pub fn eviction_method(&self) -> EvictionMethod {
        self.timeseries_eviction_method.parse().unwrap_or_default()
    }
}

/// Cache engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,

    /// Memory engine byte limit; 0 is unbounded
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    /// Memory engine object limit; 0 is unbounded
    #[serde(default)]
    pub max_size_objects: u64,
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_sqlite_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("deltacache").join("cache.db"))
        .unwrap_or_else(|| PathBuf::from("./deltacache_data/cache.db"))
}

fn default_max_size_bytes() -> u64 {
    512 * 1024 * 1024 // 512 MB
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            sqlite_path: default_sqlite_path(),
            max_size_bytes: default_max_size_bytes(),
            max_size_objects: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("deltacache").join("config.toml")),
            Some(PathBuf::from("/etc/deltacache/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Check cross-field rules that serde defaults cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let backend = &self.backend;

        if backend.shard_max_size_time_ms > 0
            && backend.shard_step_ms > 0
            && backend.shard_max_size_time_ms % backend.shard_step_ms != 0
        {
            return Err(ConfigError::Invalid(
                "'shard_max_size_time_ms' must be a multiple of 'shard_step_ms' when both are non-zero"
                    .to_string(),
            ));
        }

        if backend.shard_max_size_time_ms > 0 && backend.shard_max_size_points > 0 {
            return Err(ConfigError::Invalid(
                "'shard_max_size_time_ms' and 'shard_max_size_points' cannot both be non-zero"
                    .to_string(),
            ));
        }

        backend
            .timeseries_eviction_method
            .parse::<EvictionMethod>()
            .map_err(ConfigError::Invalid)?;

        self.cache
            .provider
            .parse::<CacheProvider>()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "unknown log format '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Render the running configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Proxy overrides
        if let Ok(host) = std::env::var("DELTACACHE_HOST") {
            self.proxy.host = host;
        }
        if let Ok(port) = std::env::var("DELTACACHE_PORT") {
            if let Ok(p) = port.parse() {
                self.proxy.port = p;
            }
        }

        // Backend overrides
        if let Ok(url) = std::env::var("DELTACACHE_ORIGIN_URL") {
            self.backend.origin_url = url;
        }

        // Cache overrides
        if let Ok(provider) = std::env::var("DELTACACHE_CACHE_PROVIDER") {
            self.cache.provider = provider;
        }
        if let Ok(path) = std::env::var("DELTACACHE_SQLITE_PATH") {
            self.cache.sqlite_path = PathBuf::from(path);
        }

        // Logging overrides
        if let Ok(level) = std::env::var("DELTACACHE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("DELTACACHE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# deltacache Configuration
#
# Environment variables override these settings:
# - DELTACACHE_HOST
# - DELTACACHE_PORT
# - DELTACACHE_ORIGIN_URL
# - DELTACACHE_CACHE_PROVIDER
# - DELTACACHE_SQLITE_PATH
# - DELTACACHE_LOG_LEVEL
# - DELTACACHE_LOG_FORMAT

[proxy]
# Listener host
host = "0.0.0.0"

# Listener port
port = 8480

# Request timeout in seconds
request_timeout_secs = 30

[backend]
name = "default"

# Base URL of the upstream time-series API
origin_url = "http://localhost:9090"

# Upstream request timeout (ms)
timeout_ms = 30000

# Widest single upstream fetch (ms); 0 disables time sharding.
# Must be a multiple of shard_step_ms when both are set.
shard_max_size_time_ms = 0

# Align time shards to this epoch cadence (ms); 0 leaves them unaligned
shard_step_ms = 0

# Most samples per upstream fetch; cannot be combined with shard_max_size_time_ms
shard_max_size_points = 0

# Recent window always refetched, since the upstream may still be filling it
backfill_tolerance_secs = 0
backfill_tolerance_points = 0

# Most samples retained per cached series
timeseries_retention_factor = 1024

# How a series sheds samples past the retention factor: oldest or lru
timeseries_eviction_method = "oldest"

# Lifetime of a cached series (seconds)
timeseries_ttl_secs = 21600

# Skip appending the instantaneous value to ranges ending now
fast_forward_disable = false

# Upstream fetches in flight per request
max_concurrent_fetches = 4

[cache]
# Engine: memory or sqlite
provider = "memory"

# Database file for the sqlite engine
sqlite_path = "~/.local/share/deltacache/cache.db"

# Memory engine limits; 0 is unbounded
max_size_bytes = 536870912
max_size_objects = 0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.proxy.port, 8480);
        assert_eq!(config.backend.eviction_method(), EvictionMethod::Oldest);
    }

    #[test]
    fn test_generated_default_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend.timeseries_retention_factor, 1024);
        assert_eq!(config.cache.provider, "memory");
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[backend]\norigin_url = \"http://tsdb:8086\"\ntimeseries_eviction_method = \"lru\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.backend.origin_url, "http://tsdb:8086");
        assert_eq!(config.backend.eviction_method(), EvictionMethod::Lru);
        assert_eq!(config.backend.timeout_ms, 30_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_errors() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));

        let broken = temp_dir.path().join("broken.toml");
        std::fs::write(&broken, "[backend\n").unwrap();
        assert!(matches!(Config::load(&broken), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_shard_rules() {
        let mut config = Config::default();
        config.backend.shard_max_size_time_ms = 90_000;
        config.backend.shard_step_ms = 60_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.backend.shard_max_size_time_ms = 120_000;
        assert!(config.validate().is_ok());

        config.backend.shard_max_size_points = 100;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_names() {
        let mut config = Config::default();
        config.backend.timeseries_eviction_method = "random".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.provider = "redis".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_round_trip() {
        let mut config = Config::default();
        config.backend.shard_max_size_points = 500;
        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.backend.shard_max_size_points, 500);
        assert_eq!(parsed.proxy.host, config.proxy.host);
    }
}

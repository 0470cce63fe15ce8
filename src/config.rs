//! Configuration management
//!
//! This module provides configuration file support with TOML format,
//! environment variable overrides, and sensible defaults. The demo server
//! and the pool options are built from these structures.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::http::{HttpPoolOptions, DEFAULT_BASE_PATH};
use crate::ring::DEFAULT_REPLICAS;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Peer pool configuration
    #[serde(default)]
    pub pool: PoolConfig,

    /// Cache sizing configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Peer pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// This peer's base URL as other peers reach it
    #[serde(default = "default_self_url")]
    pub self_url: String,

    /// Base URLs of every peer in the group, this peer included
    #[serde(default)]
    pub peers: Vec<String>,

    /// HTTP path serving peer requests
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Virtual nodes per peer on the consistent-hash ring
    #[serde(default = "default_replicas")]
    pub replicas: usize,
}

/// Cache sizing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Combined byte budget for the main and hot tiers
    #[serde(default = "default_cache_bytes")]
    pub cache_bytes: u64,

    /// Probability in [0, 1] that a peer-fetched value is mirrored into
    /// the hot tier
    #[serde(default = "default_hot_sample_rate")]
    pub hot_sample_rate: f64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_self_url() -> String {
    format!("http://{}:{}", default_host(), default_port())
}

fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

fn default_replicas() -> usize {
    DEFAULT_REPLICAS
}

fn default_cache_bytes() -> u64 {
    64 << 20 // 64 MB
}

fn default_hot_sample_rate() -> f64 {
    0.1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            self_url: default_self_url(),
            peers: Vec::new(),
            base_path: default_base_path(),
            replicas: default_replicas(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_bytes: default_cache_bytes(),
            hot_sample_rate: default_hot_sample_rate(),
        }
    }
}

impl Config {
    /// Load configuration, trying in order:
    ///
    /// 1. The file named by the `PEERCACHE_CONFIG` environment variable
    /// 2. `./peercache.toml` in the current directory
    /// 3. Built-in defaults
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("PEERCACHE_CONFIG") {
            return Self::from_file(&path);
        }
        if Path::new("peercache.toml").exists() {
            return Self::from_file("peercache.toml");
        }
        Ok(Self::default())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|err| Error::Configuration(format!("invalid config file: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.pool.replicas == 0 {
            return Err(Error::Configuration(
                "pool.replicas must be at least 1".to_string(),
            ));
        }
        if !self.pool.base_path.starts_with('/') || !self.pool.base_path.ends_with('/') {
            return Err(Error::Configuration(format!(
                "pool.base_path {:?} must start and end with '/'",
                self.pool.base_path
            )));
        }
        if !(0.0..=1.0).contains(&self.cache.hot_sample_rate) {
            return Err(Error::Configuration(format!(
                "cache.hot_sample_rate {} must be within [0, 1]",
                self.cache.hot_sample_rate
            )));
        }
        Ok(())
    }
}

impl From<&PoolConfig> for HttpPoolOptions {
    fn from(config: &PoolConfig) -> Self {
        Self {
            base_path: config.base_path.clone(),
            replicas: config.replicas,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.pool.base_path, "/_groupcache/");
        assert_eq!(config.pool.replicas, 50);
        assert_eq!(config.cache.cache_bytes, 64 << 20);
        assert!((config.cache.hot_sample_rate - 0.1).abs() < f64::EPSILON);
        config.validate().expect("defaults validate");
    }

    #[test]
    fn test_from_file_with_partial_overrides() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[server]
port = 9100

[pool]
self_url = "http://10.0.0.1:9100"
peers = ["http://10.0.0.1:9100", "http://10.0.0.2:9100"]

[cache]
cache_bytes = 1048576
hot_sample_rate = 0.25
"#
        )
        .expect("write config");

        let config = Config::from_file(file.path()).expect("parses");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1"); // default retained
        assert_eq!(config.pool.peers.len(), 2);
        assert_eq!(config.pool.replicas, 50); // default retained
        assert_eq!(config.cache.cache_bytes, 1 << 20);
        assert!((config.cache.hot_sample_rate - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.pool.replicas = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pool.base_path = "no-slashes".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.hot_sample_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pool_options_from_config() {
        let mut pool = PoolConfig::default();
        pool.base_path = "/cache/".to_string();
        pool.replicas = 17;

        let options = HttpPoolOptions::from(&pool);
        assert_eq!(options.base_path, "/cache/");
        assert_eq!(options.replicas, 17);
    }
}

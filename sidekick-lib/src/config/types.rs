use serde::Deserialize;
use std::net::SocketAddr;

use super::rate_limit::RateLimitConfig;
use super::timeout::TimeoutConfig;

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    /// `RUST_LOG` takes precedence when set.
    /// Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Show module path (target) in log messages
    /// Default: false
    #[serde(default)]
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), show_target: false }
    }
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Address and port to listen on
    /// Default: "0.0.0.0:8081"
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Absolute `http://` URL of the single upstream service.
    /// May carry a base path, e.g. "http://10.0.0.5:9000/api"
    #[serde(default)]
    pub upstream: String,
    /// Forward the caller's Host header unchanged. When false, Host is
    /// rewritten to the upstream authority.
    /// Default: true
    #[serde(default = "default_true")]
    pub preserve_host: bool,
    /// Per-client rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Timeouts
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Configuration with defaults everywhere except the upstream
    pub fn with_upstream(upstream: impl Into<String>) -> Self {
        Self {
            listen: default_listen(),
            upstream: upstream.into(),
            preserve_host: true,
            rate_limit: RateLimitConfig::default(),
            timeout: TimeoutConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8081))
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

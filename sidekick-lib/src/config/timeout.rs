use serde::Deserialize;
use std::time::Duration;

/// Timeout configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TimeoutConfig {
    /// Upper bound for handling one request, upstream call included.
    /// When exceeded the caller receives 504 Gateway Timeout.
    /// Default: 30 seconds
    #[serde(default = "default_request_timeout")]
    pub request_secs: u64,
    /// Upstream TCP connect timeout in milliseconds
    /// Default: 5000 (5 seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,
    /// Graceful shutdown timeout in seconds
    /// Default: 30
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_secs: u64,
    /// Keep-alive settings for upstream connections
    #[serde(default)]
    pub keep_alive: KeepAliveConfig,
}

impl TimeoutConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: default_request_timeout(),
            connect_ms: default_connect_timeout(),
            shutdown_secs: default_shutdown_timeout(),
            keep_alive: KeepAliveConfig::default(),
        }
    }
}

/// TCP keep-alive for pooled upstream connections
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct KeepAliveConfig {
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Keep-alive probe interval and pooled connection idle timeout, in seconds
    /// Default: 60 seconds
    #[serde(default = "default_keep_alive_timeout")]
    pub timeout_secs: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self { enabled: true, timeout_secs: default_keep_alive_timeout() }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_keep_alive_timeout() -> u64 {
    60
}

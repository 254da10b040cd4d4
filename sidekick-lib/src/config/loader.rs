use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use crate::config::validator::validate;
use crate::config::Config;
use crate::error::{GatewayError, Result};

/// Values that take precedence over the config file.
///
/// The binary fills this from CLI flags and `SIDEKICK_*` environment
/// variables; `None` leaves the file (or default) value untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<SocketAddr>,
    pub upstream: Option<String>,
    pub rate_limit_capacity: Option<u32>,
    pub rate_limit_window_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(self, cfg: &mut Config) {
        if let Some(listen) = self.listen {
            cfg.listen = listen;
        }
        if let Some(upstream) = self.upstream {
            cfg.upstream = upstream;
        }
        if let Some(capacity) = self.rate_limit_capacity {
            cfg.rate_limit.capacity = capacity;
        }
        if let Some(window) = self.rate_limit_window_secs {
            cfg.rate_limit.window_secs = window;
        }
        if let Some(secs) = self.request_timeout_secs {
            cfg.timeout.request_secs = secs;
        }
        if let Some(level) = self.log_level {
            cfg.logging.level = level;
        }
    }
}

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let cfg = read_file(p.as_ref())?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Build the effective configuration: optional file, then overrides, then
/// validation. Without a file every key starts from its default.
pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Config> {
    let mut cfg = match path {
        Some(p) => read_file(p)?,
        None => parse_str("")?,
    };
    overrides.apply(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

pub fn parse_str(txt: &str) -> Result<Config> {
    toml::from_str(txt).map_err(|e| GatewayError::Config(format!("Failed to parse config: {e}")))
}

fn read_file(p: &Path) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| GatewayError::Config(format!("Failed to read config file: {e}")))?;
    parse_str(&txt)
}

use ipnet::IpNet;
use serde::Deserialize;
use std::time::Duration;

/// Rate limiting configuration
///
/// Every client gets its own token bucket holding `capacity` tokens that
/// refill continuously at `capacity / window_secs` tokens per second.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Burst size, i.e. requests allowed per window for one client
    /// Default: 100
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    /// Window over which a drained bucket refills completely, in seconds
    /// Default: 60
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Peers allowed to supply the client address via `X-Forwarded-For`.
    ///
    /// - absent: the header is honoured from any peer
    /// - `[]`: the header is never honoured
    /// - `["10.0.0.0/8", "::1/128"]`: honoured only from these networks
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_trusted_proxies")]
    pub trusted_proxies: Option<Vec<IpNet>>,
    /// Upper bound on the number of client buckets held in memory
    /// Default: 100000
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Buckets untouched for this long are dropped by the sweeper.
    /// Never shorter than `window_secs` in effect.
    /// Default: 600
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    /// How often the sweeper runs, in seconds
    /// Default: 60
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Idle TTL clamped to at least one window: a bucket idle that long is
    /// already full, so dropping it cannot change any later decision.
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs.max(self.window_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_capacity(),
            window_secs: default_window_secs(),
            trusted_proxies: None,
            max_clients: default_max_clients(),
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_capacity() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_clients() -> usize {
    100_000
}

fn default_idle_ttl_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn deserialize_trusted_proxies<'de, D>(deserializer: D) -> Result<Option<Vec<IpNet>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let strings: Option<Vec<String>> = Option::deserialize(deserializer)?;
    let Some(strings) = strings else {
        return Ok(None);
    };

    let mut networks = Vec::with_capacity(strings.len());
    for s in strings {
        match parse_network(&s) {
            Some(net) => networks.push(net),
            None => {
                return Err(serde::de::Error::custom(format!("Invalid IP network '{s}'")));
            }
        }
    }

    Ok(Some(networks))
}

/// Accepts CIDR notation or a bare address (treated as a host network)
fn parse_network(s: &str) -> Option<IpNet> {
    let s = s.trim();
    s.parse::<IpNet>()
        .ok()
        .or_else(|| s.parse::<std::net::IpAddr>().ok().map(IpNet::from))
}

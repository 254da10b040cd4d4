use crate::config::types::Config;
use crate::config::upstream::UpstreamTarget;
use crate::error::{GatewayError, Result};

/// Reject configurations the gateway must not serve traffic with
pub fn validate(config: &Config) -> Result<()> {
    UpstreamTarget::parse(&config.upstream)?;

    let rl = &config.rate_limit;
    if rl.capacity == 0 {
        return Err(GatewayError::Config("rate_limit.capacity must be > 0".into()));
    }
    if rl.window_secs == 0 {
        return Err(GatewayError::Config("rate_limit.window_secs must be > 0".into()));
    }
    if rl.max_clients == 0 {
        return Err(GatewayError::Config("rate_limit.max_clients must be > 0".into()));
    }
    if config.timeout.request_secs == 0 {
        return Err(GatewayError::Config("timeout.request_secs must be > 0".into()));
    }
    if config.timeout.connect_ms == 0 {
        return Err(GatewayError::Config("timeout.connect_ms must be > 0".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&Config::with_upstream("http://127.0.0.1:9000")).is_ok());
    }

    #[test]
    fn test_missing_upstream_fails() {
        let err = validate(&Config::with_upstream(""));
        assert!(matches!(err, Err(GatewayError::InvalidUpstream { .. })));
    }

    #[test]
    fn test_non_positive_limiter_parameters_fail() {
        let mut cfg = Config::with_upstream("http://127.0.0.1:9000");
        cfg.rate_limit.capacity = 0;
        assert!(matches!(validate(&cfg), Err(GatewayError::Config(_))));

        let mut cfg = Config::with_upstream("http://127.0.0.1:9000");
        cfg.rate_limit.window_secs = 0;
        assert!(matches!(validate(&cfg), Err(GatewayError::Config(_))));

        let mut cfg = Config::with_upstream("http://127.0.0.1:9000");
        cfg.timeout.request_secs = 0;
        assert!(matches!(validate(&cfg), Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_zero_capacity_rejected_even_when_disabled() {
        let mut cfg = Config::with_upstream("http://127.0.0.1:9000");
        cfg.rate_limit.enabled = false;
        cfg.rate_limit.capacity = 0;
        assert!(validate(&cfg).is_err());
    }
}

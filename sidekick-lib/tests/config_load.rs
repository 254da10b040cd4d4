use std::io::Write;
use std::time::Duration;

use sidekick_lib::config::{load, load_from_path, ConfigOverrides};
use sidekick_lib::GatewayError;
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[test]
fn loads_minimal_config() -> TestResult {
    let mut file = NamedTempFile::new()?;
    writeln!(file, r#"upstream = "http://127.0.0.1:9000""#)?;

    let cfg = load_from_path(file.path())?;
    assert_eq!(cfg.listen.to_string(), "0.0.0.0:8081");
    assert_eq!(cfg.upstream, "http://127.0.0.1:9000");
    assert!(cfg.preserve_host);
    assert!(cfg.rate_limit.enabled);
    assert_eq!(cfg.rate_limit.capacity, 100);
    assert_eq!(cfg.rate_limit.window(), Duration::from_secs(60));
    assert!(cfg.rate_limit.trusted_proxies.is_none());
    assert_eq!(cfg.timeout.request_timeout(), Duration::from_secs(30));
    assert_eq!(cfg.logging.level, "info");
    Ok(())
}

#[test]
fn loads_full_config() -> TestResult {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"
listen = "127.0.0.1:8088"
upstream = "http://10.0.0.5:9000/api/"
preserve_host = false

[rate_limit]
capacity = 5
window_secs = 10
trusted_proxies = ["10.0.0.0/8", "::1"]
max_clients = 500
idle_ttl_secs = 120
sweep_interval_secs = 15

[timeout]
request_secs = 3
connect_ms = 250
shutdown_secs = 5

[timeout.keep_alive]
enabled = false

[logging]
level = "debug"
show_target = true
"#
    )?;

    let cfg = load_from_path(file.path())?;
    assert_eq!(cfg.listen.to_string(), "127.0.0.1:8088");
    assert!(!cfg.preserve_host);
    assert_eq!(cfg.rate_limit.capacity, 5);
    assert_eq!(cfg.rate_limit.max_clients, 500);
    assert_eq!(cfg.rate_limit.idle_ttl(), Duration::from_secs(120));
    assert_eq!(cfg.rate_limit.sweep_interval(), Duration::from_secs(15));
    let proxies = cfg.rate_limit.trusted_proxies.ok_or("trusted_proxies missing")?;
    let proxies: Vec<String> = proxies.iter().map(ToString::to_string).collect();
    assert_eq!(proxies, vec!["10.0.0.0/8", "::1/128"]);
    assert_eq!(cfg.timeout.connect_timeout(), Duration::from_millis(250));
    assert!(!cfg.timeout.keep_alive.enabled);
    assert_eq!(cfg.logging.level, "debug");
    assert!(cfg.logging.show_target);
    Ok(())
}

#[test]
fn overrides_take_precedence_over_file() -> TestResult {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"
upstream = "http://127.0.0.1:9000"

[rate_limit]
capacity = 5
window_secs = 10
"#
    )?;

    let overrides = ConfigOverrides {
        listen: Some("127.0.0.1:0".parse()?),
        upstream: Some("http://127.0.0.1:9100".to_string()),
        rate_limit_capacity: Some(50),
        request_timeout_secs: Some(2),
        log_level: Some("warn".to_string()),
        ..Default::default()
    };
    let cfg = load(Some(file.path()), overrides)?;

    assert_eq!(cfg.listen.to_string(), "127.0.0.1:0");
    assert_eq!(cfg.upstream, "http://127.0.0.1:9100");
    assert_eq!(cfg.rate_limit.capacity, 50);
    // untouched by overrides
    assert_eq!(cfg.rate_limit.window_secs, 10);
    assert_eq!(cfg.timeout.request_secs, 2);
    assert_eq!(cfg.logging.level, "warn");
    Ok(())
}

#[test]
fn loads_without_file_when_upstream_overridden() -> TestResult {
    let overrides = ConfigOverrides {
        upstream: Some("http://backend:8080".to_string()),
        ..Default::default()
    };
    let cfg = load(None, overrides)?;
    assert_eq!(cfg.upstream, "http://backend:8080");
    assert_eq!(cfg.rate_limit.capacity, 100);
    Ok(())
}

#[test]
fn missing_upstream_is_rejected() {
    let err = load(None, ConfigOverrides::default());
    assert!(matches!(err, Err(GatewayError::InvalidUpstream { .. })));
}

#[test]
fn https_upstream_is_rejected() -> TestResult {
    let mut file = NamedTempFile::new()?;
    writeln!(file, r#"upstream = "https://api.example.com""#)?;
    let err = load_from_path(file.path());
    assert!(matches!(err, Err(GatewayError::InvalidUpstream { .. })));
    Ok(())
}

#[test]
fn zero_capacity_is_rejected() -> TestResult {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"
upstream = "http://127.0.0.1:9000"

[rate_limit]
capacity = 0
"#
    )?;
    let err = load_from_path(file.path());
    assert!(matches!(err, Err(GatewayError::Config(_))));
    Ok(())
}

#[test]
fn invalid_trusted_proxy_is_rejected() -> TestResult {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"
upstream = "http://127.0.0.1:9000"

[rate_limit]
trusted_proxies = ["not-a-network"]
"#
    )?;
    let err = load_from_path(file.path());
    assert!(matches!(err, Err(GatewayError::Config(_))));
    Ok(())
}

#[test]
fn missing_file_is_reported() {
    let err = load_from_path("/nonexistent/sidekick.toml");
    assert!(matches!(err, Err(GatewayError::Config(_))));
}

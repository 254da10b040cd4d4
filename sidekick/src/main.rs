#![forbid(unsafe_code)]

use clap::Parser;
use sidekick_lib::config::{load, ConfigOverrides};
use sidekick_lib::proxy;
use sidekick_lib::telemetry::init_tracing;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Sidekick HTTP edge gateway (per-client rate limiting)")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", env = "SIDEKICK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:8081
    #[arg(long, value_name = "ADDR", env = "SIDEKICK_LISTEN")]
    listen: Option<SocketAddr>,

    /// Upstream base URL, e.g. http://127.0.0.1:9000
    #[arg(short, long, value_name = "URL", env = "SIDEKICK_UPSTREAM")]
    upstream: Option<String>,

    /// Requests allowed per window for one client
    #[arg(long, value_name = "N", env = "SIDEKICK_RATE_LIMIT_CAPACITY")]
    rate_limit_capacity: Option<u32>,

    /// Seconds for an empty bucket to refill completely
    #[arg(long, value_name = "SECS", env = "SIDEKICK_RATE_LIMIT_WINDOW_SECS")]
    rate_limit_window_secs: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", env = "SIDEKICK_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_name = "LEVEL", env = "SIDEKICK_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen: self.listen,
            upstream: self.upstream.clone(),
            rate_limit_capacity: self.rate_limit_capacity,
            rate_limit_window_secs: self.rate_limit_window_secs,
            request_timeout_secs: self.request_timeout_secs,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match load(cli.config.as_deref(), cli.overrides()) {
        Ok(cfg) => cfg,
        Err(err) => {
            // no configured level to honour yet
            if init_tracing("info", false).is_ok() {
                error!(%err, "failed to load configuration");
            } else {
                eprintln!("failed to load configuration: {err}");
            }
            std::process::exit(1);
        }
    };

    if let Err(err) = init_tracing(&cfg.logging.level, cfg.logging.show_target) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    info!(
        listen = %cfg.listen,
        upstream = %cfg.upstream,
        rate_limit = cfg.rate_limit.enabled,
        capacity = cfg.rate_limit.capacity,
        window_secs = cfg.rate_limit.window_secs,
        "configuration loaded"
    );

    if let Err(err) = proxy::run(Arc::new(cfg)).await {
        error!(%err, "gateway exited with error");
        std::process::exit(1);
    }
}

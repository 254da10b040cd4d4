use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::error::{GatewayError, Result};

/// Install the global log subscriber.
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn init_tracing(log_level: &str, show_target: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(show_target);

    let subscriber = Registry::default().with(env_filter).with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| GatewayError::Config(format!("Failed to set global tracing subscriber: {e}")))?;

    Ok(())
}

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod proxy;
pub mod security;
pub mod telemetry;

pub use config::{load_from_path, Config, ConfigOverrides};
pub use error::{GatewayError, Result};
pub use proxy::{run, serve, Gateway};
pub use security::rate_limit::{Decision, LimiterRegistry, TokenBucket};
pub use security::{client_key, ClientIdentifier};

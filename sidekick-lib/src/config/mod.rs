mod loader;
mod rate_limit;
mod timeout;
mod types;
mod upstream;
mod validator;

pub use loader::{load, load_from_path, parse_str, ConfigOverrides};
pub use rate_limit::RateLimitConfig;
pub use timeout::{KeepAliveConfig, TimeoutConfig};
pub use types::{Config, LoggingConfig};
pub use upstream::UpstreamTarget;
pub use validator::validate;

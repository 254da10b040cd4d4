use thiserror::Error;

/// Errors that can stop the gateway from starting or serving
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid upstream URL {url:?}: {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Metrics error: {0}")]
    Metrics(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

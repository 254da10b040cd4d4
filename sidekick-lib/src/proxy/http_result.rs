use http::StatusCode;
use thiserror::Error;

/// HTTP result type, T is typically a hyper::Response
/// HttpError is used to generate a synthetic error response
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// Describes things that can go wrong while serving one request
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    #[error("Failed to generate upstream request: {0}")]
    FailedToGenerateUpstreamRequest(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream did not answer before the request deadline")]
    UpstreamTimeout,

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HttpError {
    /// Bounded label for the `error_type` metric dimension
    pub fn error_type(&self) -> &'static str {
        match self {
            HttpError::FailedToGenerateUpstreamRequest(_) => "upstream_request",
            HttpError::UpstreamUnavailable(_) => "upstream_unavailable",
            HttpError::UpstreamTimeout => "timeout",
            HttpError::InvalidUri(_) => "invalid_uri",
            HttpError::Internal(_) => "internal",
        }
    }

    /// Whether the failure happened talking to the upstream
    pub fn is_upstream(&self) -> bool {
        matches!(self, HttpError::UpstreamUnavailable(_) | HttpError::UpstreamTimeout)
    }
}

impl From<&HttpError> for StatusCode {
    fn from(e: &HttpError) -> StatusCode {
        match e {
            HttpError::FailedToGenerateUpstreamRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            HttpError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            HttpError::InvalidUri(_) => StatusCode::BAD_REQUEST,
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<HttpError> for StatusCode {
    fn from(e: HttpError) -> StatusCode {
        StatusCode::from(&e)
    }
}

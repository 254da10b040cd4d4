use http::request::Parts;
use http::{Method, StatusCode};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

use crate::proxy::http_result::HttpError;
use crate::proxy::router::Route;
use crate::security::Decision;

/// Caps absurd configured timeouts so the deadline stays representable.
const MAX_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Per-request state shared by the pipeline stages.
///
/// Stages fill it in on the way in (request id, client key, decision) and
/// the driver records the outcome (status, error) before the response hooks
/// run.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub peer: SocketAddr,
    pub client_key: Option<String>,
    pub method: Method,
    pub path: String,
    pub route: Route,
    pub started: Instant,
    pub deadline: Instant,
    pub status: StatusCode,
    pub decision: Option<Decision>,
    pub error: Option<HttpError>,
}

impl RequestContext {
    pub fn new(parts: &Parts, peer: SocketAddr, timeout: Duration) -> Self {
        let started = Instant::now();
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        let route = Route::resolve(&method, &path);
        Self {
            request_id: String::new(),
            peer,
            client_key: None,
            method,
            path,
            route,
            started,
            deadline: started + timeout.min(MAX_TIMEOUT),
            status: StatusCode::OK,
            decision: None,
            error: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

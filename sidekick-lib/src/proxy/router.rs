use http::Method;

pub const HEALTH_PATH: &str = "/health";
pub const READY_PATH: &str = "/ready";
pub const METRICS_PATH: &str = "/metrics";
pub const CATCH_ALL: &str = "/*";

/// Where a request is dispatched.
///
/// Only `GET` on the reserved paths is answered locally; every other
/// method/path combination goes to the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Health,
    Ready,
    Metrics,
    Proxy,
}

impl Route {
    pub fn resolve(method: &Method, path: &str) -> Self {
        if method != Method::GET {
            return Route::Proxy;
        }
        match path {
            HEALTH_PATH => Route::Health,
            READY_PATH => Route::Ready,
            METRICS_PATH => Route::Metrics,
            _ => Route::Proxy,
        }
    }

    /// Route template used as the metrics `route` label. Keeps label
    /// cardinality bounded no matter what paths clients send.
    pub fn label(self) -> &'static str {
        match self {
            Route::Health => HEALTH_PATH,
            Route::Ready => READY_PATH,
            Route::Metrics => METRICS_PATH,
            Route::Proxy => CATCH_ALL,
        }
    }

    /// Answered by the gateway itself: never rate limited, never forwarded.
    pub fn is_operational(self) -> bool {
        !matches!(self, Route::Proxy)
    }
}

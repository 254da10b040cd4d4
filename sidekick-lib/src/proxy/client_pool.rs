use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use crate::config::TimeoutConfig;

pub type HttpClient = Client<HttpConnector, Incoming>;

/// Shared HTTP/1.1 client for upstream connections.
///
/// Cloning is cheap and every clone draws from the same connection pool, so
/// one client is built at startup and handed to the forwarder.
pub fn upstream_client(timeout: &TimeoutConfig) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(timeout.connect_timeout()));
    connector.set_nodelay(true);
    // TCP keep-alive: sends periodic packets to keep TCP connection alive
    if timeout.keep_alive.enabled {
        connector.set_keepalive(Some(Duration::from_secs(timeout.keep_alive.timeout_secs)));
    } else {
        connector.set_keepalive(None);
    }

    let mut builder = Client::builder(TokioExecutor::new());
    if timeout.keep_alive.enabled {
        builder.pool_idle_timeout(Duration::from_secs(timeout.keep_alive.timeout_secs));
    } else {
        builder.pool_max_idle_per_host(0);
    }

    builder.build(connector)
}

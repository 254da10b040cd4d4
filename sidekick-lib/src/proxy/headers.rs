use http::header::{HeaderName, CONNECTION, HOST};
use http::{HeaderMap, HeaderValue};
use std::net::SocketAddr;

/// Header names the gateway reads or writes
pub mod names {
    /// Request identifier, reused when the caller sends one
    pub const REQUEST_ID: &str = "x-request-id";

    /// Capacity of the caller's bucket
    pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";

    /// Whole tokens left in the caller's bucket after this request
    pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

    /// Hop marker added to every forwarded request
    pub const FORWARDED_BY: &str = "x-forwarded-by";

    /// Edge marker added to every relayed upstream response, carries the version
    pub const EDGE: &str = "x-sidekick";

    /// Value of [`FORWARDED_BY`]
    pub const FORWARDED_BY_VALUE: &str = "sidekick";
}

/// X-Forwarded-* header names
pub mod forwarded {
    /// Client IP chain, each proxy appends the peer it received the request from
    pub const FOR: &str = "x-forwarded-for";

    /// Host header as sent by the client
    pub const HOST: &str = "x-forwarded-host";

    /// Scheme the client used to reach the gateway
    pub const PROTO: &str = "x-forwarded-proto";
}

/// Connection-scoped headers that must not be relayed (RFC 9110 §7.6.1)
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Add X-Forwarded-* headers and the hop marker to an outgoing request.
///
/// 1. Appends the peer IP to X-Forwarded-For (or creates it)
/// 2. Sets X-Forwarded-Host from the caller's Host header
/// 3. Sets X-Forwarded-Proto (always "http", the gateway does not terminate TLS)
/// 4. Sets X-Forwarded-By
pub fn add_forwarded_headers(headers: &mut HeaderMap, peer: SocketAddr) {
    let client_ip = peer.ip().to_canonical().to_string();
    let chain = match headers.get(forwarded::FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {client_ip}"),
        _ => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(forwarded::FOR, value);
    }

    if let Some(host) = headers.get(HOST).cloned() {
        headers.insert(forwarded::HOST, host);
    }

    headers.insert(forwarded::PROTO, HeaderValue::from_static("http"));
    headers.insert(names::FORWARDED_BY, HeaderValue::from_static(names::FORWARDED_BY_VALUE));
}

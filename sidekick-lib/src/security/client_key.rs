use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};

/// Header carrying the proxy chain, left-most entry is the originating client
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

const UNKNOWN_CLIENT: &str = "unknown";

/// Derive the rate limiting key for a request.
///
/// - non-empty `forwarded_for`: its first comma-separated entry, trimmed
/// - otherwise: the host part of `remote` (port stripped)
/// - `remote` not a socket address: `remote` verbatim
///
/// Always returns a non-empty string.
pub fn client_key(forwarded_for: Option<&str>, remote: &str) -> String {
    if let Some(first) = forwarded_for
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
    {
        return first.to_string();
    }

    match remote.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        Err(_) if remote.trim().is_empty() => UNKNOWN_CLIENT.to_string(),
        Err(_) => remote.to_string(),
    }
}

/// Client identification with a trust policy for `X-Forwarded-For`.
///
/// A client can put anything in `X-Forwarded-For`, so honouring it from
/// arbitrary peers lets callers pick their own rate limit key. With
/// `trusted_proxies` set, the header only counts when the transport peer is
/// one of the listed proxies.
#[derive(Debug, Clone, Default)]
pub struct ClientIdentifier {
    trusted_proxies: Option<Vec<IpNet>>,
}

impl ClientIdentifier {
    /// `None` trusts the header from every peer, `Some(&[])` from none.
    pub fn new(trusted_proxies: Option<Vec<IpNet>>) -> Self {
        Self { trusted_proxies }
    }

    pub fn trusts(&self, peer: IpAddr) -> bool {
        // dual-stack listeners report IPv4 peers as ::ffff:a.b.c.d
        let peer = peer.to_canonical();
        match &self.trusted_proxies {
            None => true,
            Some(networks) => networks.iter().any(|net| net.contains(&peer)),
        }
    }

    pub fn identify(&self, headers: &http::HeaderMap, peer: SocketAddr) -> String {
        let forwarded = if self.trusts(peer.ip()) {
            headers
                .get(X_FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
        } else {
            None
        };
        let peer = SocketAddr::new(peer.ip().to_canonical(), peer.port());
        client_key(forwarded, &peer.to_string())
    }
}

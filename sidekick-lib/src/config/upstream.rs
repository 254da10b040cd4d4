use http::uri::{Authority, PathAndQuery, Scheme};
use http::Uri;

use crate::error::{GatewayError, Result};

/// Parsed upstream base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    scheme: Scheme,
    authority: Authority,
    /// Base path without a trailing slash ("" for the root)
    base_path: String,
}

impl UpstreamTarget {
    /// Parse an absolute `http://host[:port][/base]` URL.
    ///
    /// Upstream TLS is not supported, so `https` is rejected here rather than
    /// failing on the first forwarded request.
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = |reason: &str| GatewayError::InvalidUpstream {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(invalid("upstream URL is required"));
        }

        let uri: Uri = trimmed.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;

        let scheme = uri.scheme().cloned().ok_or_else(|| invalid("missing scheme"))?;
        if scheme != Scheme::HTTP {
            return Err(invalid("only http:// upstreams are supported"));
        }
        let authority = uri.authority().cloned().ok_or_else(|| invalid("missing host"))?;
        if authority.host().is_empty() {
            return Err(invalid("missing host"));
        }
        if uri.query().is_some() {
            return Err(invalid("query string not allowed in upstream URL"));
        }

        let base_path = uri.path().trim_end_matches('/').to_string();

        Ok(Self { scheme, authority, base_path })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Rewrite an inbound path-and-query onto the upstream.
    ///
    /// The base path and the request path are joined with exactly one slash
    /// and the query string is kept as-is.
    pub fn rewrite(&self, inbound: Option<&PathAndQuery>) -> Result<Uri> {
        let (path, query) = match inbound {
            Some(pq) => (pq.path(), pq.query()),
            None => ("/", None),
        };

        let mut joined = String::with_capacity(
            self.base_path
                .len()
                .saturating_add(path.len())
                .saturating_add(query.map_or(0, |q| q.len().saturating_add(1)))
                .saturating_add(1),
        );
        joined.push_str(&self.base_path);
        if !path.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(path);
        if joined.is_empty() {
            joined.push('/');
        }
        if let Some(q) = query {
            joined.push('?');
            joined.push_str(q);
        }

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(joined)
            .build()
            .map_err(|e| GatewayError::Http(format!("Failed to build upstream URI: {e}")))
    }
}

impl std::fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.base_path)
    }
}

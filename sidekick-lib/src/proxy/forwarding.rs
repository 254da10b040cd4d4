use http::header::HOST;
use http::request::Parts;
use http::{HeaderValue, Request, Response, Version};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use crate::config::{TimeoutConfig, UpstreamTarget};
use crate::proxy::client_pool::{upstream_client, HttpClient};
use crate::proxy::headers::{add_forwarded_headers, names, strip_hop_by_hop};
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::RespBody;

/// Terminal of the proxy pipeline: relays a request to the single upstream.
///
/// No retries; a failed upstream call surfaces as 502.
#[derive(Clone)]
pub struct Forwarder {
    client: HttpClient,
    upstream: Arc<UpstreamTarget>,
    preserve_host: bool,
    edge_header: HeaderValue,
}

impl Forwarder {
    pub fn new(upstream: UpstreamTarget, preserve_host: bool, timeout: &TimeoutConfig) -> Self {
        Self {
            client: upstream_client(timeout),
            upstream: Arc::new(upstream),
            preserve_host,
            edge_header: HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn upstream(&self) -> &UpstreamTarget {
        &self.upstream
    }

    /// Turn the inbound request head into the upstream request head.
    pub fn prepare(&self, parts: &mut Parts, peer: SocketAddr) -> HttpResult<()> {
        // HTTP/2 callers carry the host in the URI rather than a Host header
        let original_host = parts.headers.get(HOST).cloned().or_else(|| {
            parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        });

        parts.uri = self
            .upstream
            .rewrite(parts.uri.path_and_query())
            .map_err(|e| HttpError::InvalidUri(e.to_string()))?;
        parts.version = Version::HTTP_11;

        strip_hop_by_hop(&mut parts.headers);
        if let Some(host) = &original_host {
            parts.headers.insert(HOST, host.clone());
        }
        add_forwarded_headers(&mut parts.headers, peer);

        let host = if self.preserve_host {
            original_host
        } else {
            let authority = HeaderValue::from_str(self.upstream.authority().as_str())
                .map_err(|e| HttpError::FailedToGenerateUpstreamRequest(e.to_string()))?;
            Some(authority)
        };
        match host {
            Some(host) => {
                parts.headers.insert(HOST, host);
            }
            None => {
                parts.headers.remove(HOST);
            }
        }
        Ok(())
    }

    pub async fn forward(&self, req: Request<Incoming>, peer: SocketAddr) -> HttpResult<Response<RespBody>> {
        let (mut parts, body) = req.into_parts();
        self.prepare(&mut parts, peer)?;

        let resp = self
            .client
            .request(Request::from_parts(parts, body))
            .await
            .map_err(|e| {
                warn!(upstream = %self.upstream, connect = e.is_connect(), error = %e, "upstream request failed");
                HttpError::UpstreamUnavailable(e.to_string())
            })?;

        let (mut parts, body) = resp.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        parts.headers.insert(names::EDGE, self.edge_header.clone());
        Ok(Response::from_parts(parts, body.boxed()))
    }
}

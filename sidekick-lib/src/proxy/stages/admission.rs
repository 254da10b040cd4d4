use http::request::Parts;
use http::{HeaderValue, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

use crate::proxy::context::RequestContext;
use crate::proxy::headers::names;
use crate::proxy::pipeline::{Flow, Stage};
use crate::proxy::synthetic_response::text_response;
use crate::proxy::RespBody;
use crate::security::{client_key, Decision, LimiterRegistry};
use crate::telemetry::Metrics;

/// Spends one token from the caller's bucket, answering 429 when empty.
pub struct AdmissionStage {
    limiter: Arc<LimiterRegistry>,
    metrics: Arc<Metrics>,
}

impl AdmissionStage {
    pub fn new(limiter: Arc<LimiterRegistry>, metrics: Arc<Metrics>) -> Self {
        Self { limiter, metrics }
    }
}

impl Stage for AdmissionStage {
    fn name(&self) -> &'static str {
        "admission"
    }

    fn on_request(&self, _parts: &mut Parts, ctx: &mut RequestContext) -> Flow {
        let key = match &ctx.client_key {
            Some(key) => key.clone(),
            None => client_key(None, &ctx.peer.to_string()),
        };

        let decision = self.limiter.check(&key);
        ctx.decision = Some(decision.clone());

        match decision {
            Decision::Admitted { .. } => Flow::Continue,
            Decision::Rejected { limit, retry_after } => {
                self.metrics.record_rate_limit_hit();
                debug!(
                    client = %key,
                    limit,
                    retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                    "rate limit exceeded"
                );
                Flow::Respond(too_many_requests_response(limit))
            }
        }
    }

    fn on_response(&self, response: &mut Response<RespBody>, ctx: &RequestContext) {
        if let Some(decision) = &ctx.decision {
            set_rate_limit_headers(response, decision.limit(), decision.remaining());
        }
    }
}

fn set_rate_limit_headers(response: &mut Response<RespBody>, limit: u32, remaining: u64) {
    let headers = response.headers_mut();
    headers.insert(names::RATE_LIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(names::RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
}

/// 429 answer for a caller whose bucket is empty.
///
/// `Retry-After` is a fixed one second hint; the exact wait is only logged.
pub fn too_many_requests_response(limit: u32) -> Response<RespBody> {
    let mut resp = text_response(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests");
    set_rate_limit_headers(&mut resp, limit, 0);
    resp.headers_mut()
        .insert(http::header::RETRY_AFTER, HeaderValue::from_static("1"));
    resp
}

use http::request::Parts;
use http::{HeaderValue, Response};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::proxy::context::RequestContext;
use crate::proxy::headers::names;
use crate::proxy::pipeline::{Flow, Stage};
use crate::proxy::RespBody;

/// Longest caller-supplied id that is reused as-is.
const MAX_INBOUND_ID_LEN: usize = 128;

/// Tags every request with an id, reusing the caller's `X-Request-Id` when
/// it is usable and generating `<prefix>-<counter>` otherwise.
///
/// The id is forwarded upstream and echoed on every response.
pub struct RequestIdStage {
    prefix: String,
    counter: AtomicU64,
}

impl RequestIdStage {
    /// Random per-process prefix so ids from different instances don't collide.
    pub fn new() -> Self {
        let seed = ahash::RandomState::new().hash_one(std::process::id());
        Self::with_prefix(format!("{:010x}", seed & 0xff_ffff_ffff))
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), counter: AtomicU64::new(0) }
    }

    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        format!("{}-{n:06}", self.prefix)
    }
}

impl Default for RequestIdStage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for RequestIdStage {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn on_request(&self, parts: &mut Parts, ctx: &mut RequestContext) -> Flow {
        let inbound = parts
            .headers
            .get(names::REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= MAX_INBOUND_ID_LEN)
            .map(str::to_string);

        ctx.request_id = match inbound {
            Some(id) => id,
            None => {
                let id = self.next_id();
                if let Ok(value) = HeaderValue::from_str(&id) {
                    parts.headers.insert(names::REQUEST_ID, value);
                }
                id
            }
        };
        Flow::Continue
    }

    fn on_response(&self, response: &mut Response<RespBody>, ctx: &RequestContext) {
        if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
            response.headers_mut().insert(names::REQUEST_ID, value);
        }
    }
}

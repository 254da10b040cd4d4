use http::request::Parts;
use http::Response;
use tracing::info;

use crate::proxy::context::RequestContext;
use crate::proxy::pipeline::{Flow, Stage};
use crate::proxy::RespBody;

/// One `info` line per request, written once the final status is known.
pub struct AccessLogStage;

impl Stage for AccessLogStage {
    fn name(&self) -> &'static str {
        "access_log"
    }

    fn on_request(&self, _parts: &mut Parts, _ctx: &mut RequestContext) -> Flow {
        Flow::Continue
    }

    fn on_response(&self, _response: &mut Response<RespBody>, ctx: &RequestContext) {
        let client = match &ctx.client_key {
            Some(key) => key.clone(),
            None => ctx.peer.ip().to_canonical().to_string(),
        };
        info!(
            request_id = %ctx.request_id,
            status = ctx.status.as_u16(),
            method = %ctx.method,
            path = %ctx.path,
            duration_ms = ctx.elapsed().as_secs_f64() * 1000.0,
            client = %client,
            "request"
        );
    }
}

use http::request::Parts;
use http::Response;
use std::sync::Arc;

use crate::proxy::context::RequestContext;
use crate::proxy::http_result::HttpError;
use crate::proxy::pipeline::{Flow, Stage};
use crate::proxy::RespBody;
use crate::telemetry::Metrics;

/// Records request count, latency and failure kinds.
///
/// Sits outside admission, so 429s are counted with their real status.
pub struct InstrumentationStage {
    metrics: Arc<Metrics>,
}

impl InstrumentationStage {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl Stage for InstrumentationStage {
    fn name(&self) -> &'static str {
        "instrumentation"
    }

    fn on_request(&self, _parts: &mut Parts, _ctx: &mut RequestContext) -> Flow {
        Flow::Continue
    }

    fn on_response(&self, _response: &mut Response<RespBody>, ctx: &RequestContext) {
        let method = ctx.method.as_str();
        let route = ctx.route.label();

        self.metrics.record_request(method, route, ctx.status.as_u16());
        self.metrics
            .record_request_duration(ctx.elapsed().as_secs_f64(), method, route);

        match &ctx.error {
            Some(HttpError::UpstreamTimeout) => {
                self.metrics.record_timeout();
                self.metrics.record_upstream_error(HttpError::UpstreamTimeout.error_type());
            }
            Some(e) if e.is_upstream() => self.metrics.record_upstream_error(e.error_type()),
            Some(e) => self.metrics.record_error(e.error_type()),
            None => {}
        }
    }
}

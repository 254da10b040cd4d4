use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use hyper::StatusCode;
use prometheus::{Encoder, TextEncoder};

use crate::error::{GatewayError, Result};

type RespBody = BoxBody<Bytes, hyper::Error>;

/// Render every metric family in `registry` in the Prometheus text format.
pub fn render_metrics(registry: &prometheus::Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| GatewayError::Metrics(format!("Failed to encode metrics: {e}")))?;

    String::from_utf8(buffer)
        .map_err(|e| GatewayError::Metrics(format!("Metrics output is not UTF-8: {e}")))
}

pub fn handle_metrics(registry: &prometheus::Registry) -> Result<Response<RespBody>> {
    let text = render_metrics(registry)?;

    let body = Full::new(Bytes::from(text))
        .map_err(|never| match never {})
        .boxed();

    let response = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", TextEncoder::new().format_type())
        .body(body)
        .map_err(|e| GatewayError::Http(format!("Failed to build response: {e}")))?;

    Ok(response)
}

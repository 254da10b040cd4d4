use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use hyper::StatusCode;
use serde_json::{json, Value};

use crate::error::{GatewayError, Result};

type RespBody = BoxBody<Bytes, hyper::Error>;

fn json_response(status: StatusCode, body: &Value) -> Result<Response<RespBody>> {
    let body_bytes = serde_json::to_vec(body)
        .map_err(|e| GatewayError::Http(format!("Failed to serialize health response: {e}")))?;

    let body = Full::new(Bytes::from(body_bytes))
        .map_err(|never| match never {})
        .boxed();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(body)
        .map_err(|e| GatewayError::Http(format!("Failed to build health response: {e}")))
}

/// Health check response - always returns 200 if process is running
pub fn health_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({"status": "healthy"}))
}

/// Readiness check - 200 while accepting traffic, 503 once shutdown has begun
pub fn ready_check_response(ready: bool) -> Result<Response<RespBody>> {
    if ready {
        json_response(StatusCode::OK, &json!({"status": "ready"}))
    } else {
        json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &json!({
                "status": "not_ready",
                "reason": "shutting_down"
            }),
        )
    }
}

use http::StatusCode;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::Response;

use crate::proxy::RespBody;

/// Build HTTP response with status code of 4xx and 5xx and an empty body
pub fn synthetic_error_response(status_code: StatusCode) -> Response<RespBody> {
    let mut res = Response::new(empty_body());
    *res.status_mut() = status_code;
    res
}

/// Plain-text response, used for local answers such as 429
pub fn text_response(status_code: StatusCode, text: &'static str) -> Response<RespBody> {
    let body = Full::new(Bytes::from_static(text.as_bytes()))
        .map_err(|never| match never {})
        .boxed();
    let mut res = Response::new(body);
    *res.status_mut() = status_code;
    res.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    res
}

pub fn empty_body() -> RespBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

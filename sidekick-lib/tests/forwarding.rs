use std::net::SocketAddr;

use http::request::Parts;
use http::{Method, Request};
use sidekick_lib::config::{TimeoutConfig, UpstreamTarget};
use sidekick_lib::proxy::Forwarder;

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

fn forwarder(url: &str, preserve_host: bool) -> sidekick_lib::Result<Forwarder> {
    Ok(Forwarder::new(UpstreamTarget::parse(url)?, preserve_host, &TimeoutConfig::default()))
}

fn request(method: Method, uri: &str, headers: &[(&str, &str)]) -> Result<Parts, http::Error> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    Ok(builder.body(())?.into_parts().0)
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

fn peer() -> SocketAddr {
    SocketAddr::from(([198, 51, 100, 20], 40123))
}

#[tokio::test]
async fn test_caller_host_is_kept_by_default() -> TestResult {
    let fwd = forwarder("http://127.0.0.1:9000/api/", true)?;
    let mut req = request(
        Method::POST,
        "/users/42?expand=true",
        &[("host", "edge.example.com"), ("connection", "keep-alive, x-hop"), ("x-hop", "1"), ("x-custom", "1")],
    )?;
    fwd.prepare(&mut req, peer())?;

    assert_eq!(req.uri.to_string(), "http://127.0.0.1:9000/api/users/42?expand=true");
    assert_eq!(req.method, Method::POST);
    assert_eq!(header(&req, "host"), Some("edge.example.com"));
    assert_eq!(header(&req, "x-forwarded-host"), Some("edge.example.com"));
    assert_eq!(header(&req, "x-forwarded-for"), Some("198.51.100.20"));
    assert_eq!(header(&req, "x-forwarded-proto"), Some("http"));
    assert_eq!(header(&req, "x-forwarded-by"), Some("sidekick"));
    assert_eq!(header(&req, "x-custom"), Some("1"));
    assert!(req.headers.get("connection").is_none());
    assert!(req.headers.get("x-hop").is_none());
    Ok(())
}

#[tokio::test]
async fn test_host_rewritten_to_upstream_when_asked() -> TestResult {
    let fwd = forwarder("http://127.0.0.1:9000", false)?;
    let mut req = request(Method::GET, "/", &[("host", "edge.example.com")])?;
    fwd.prepare(&mut req, peer())?;

    assert_eq!(header(&req, "host"), Some("127.0.0.1:9000"));
    assert_eq!(header(&req, "x-forwarded-host"), Some("edge.example.com"));
    assert_eq!(req.uri.to_string(), "http://127.0.0.1:9000/");
    Ok(())
}

#[tokio::test]
async fn test_existing_forwarded_chain_is_extended() -> TestResult {
    let fwd = forwarder("http://127.0.0.1:9000", true)?;
    let mut req = request(Method::GET, "/", &[("x-forwarded-for", "203.0.113.5")])?;
    fwd.prepare(&mut req, peer())?;

    assert_eq!(header(&req, "x-forwarded-for"), Some("203.0.113.5, 198.51.100.20"));
    Ok(())
}

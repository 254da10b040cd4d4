//! Ordered request pipeline.
//!
//! A request passes through every [`Stage`] in order. Any stage may answer
//! the request itself with [`Flow::Respond`], in which case the remaining
//! stages and the terminal are skipped. Either way, the response hooks of the
//! stages that were entered run in reverse order, so outer stages (logging,
//! instrumentation) always observe the final response.

use http::request::Parts;
use http::{Response, StatusCode};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::proxy::context::RequestContext;
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::synthetic_response::synthetic_error_response;
use crate::proxy::RespBody;

/// What a stage wants to happen next.
pub enum Flow {
    Continue,
    /// Short-circuit with this response.
    Respond(Response<RespBody>),
}

pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_request(&self, parts: &mut Parts, ctx: &mut RequestContext) -> Flow;

    /// Runs for every entered stage, innermost first.
    fn on_response(&self, _response: &mut Response<RespBody>, _ctx: &RequestContext) {}
}

#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Drive `parts` through the stages, then `terminal` if nobody answered.
    ///
    /// The terminal is bounded by `ctx.deadline`; when it expires the future
    /// is dropped and the caller gets 504.
    pub async fn run<T, Fut>(
        &self,
        mut parts: Parts,
        ctx: &mut RequestContext,
        terminal: T,
    ) -> Response<RespBody>
    where
        T: FnOnce(Parts) -> Fut,
        Fut: Future<Output = HttpResult<Response<RespBody>>>,
    {
        let mut entered = 0usize;
        let mut early = None;
        for stage in &self.stages {
            entered = entered.saturating_add(1);
            if let Flow::Respond(resp) = stage.on_request(&mut parts, ctx) {
                debug!(stage = stage.name(), status = %resp.status(), "stage answered request");
                early = Some(resp);
                break;
            }
        }

        let mut response = match early {
            Some(resp) => resp,
            None => match tokio::time::timeout_at(ctx.deadline, terminal(parts)).await {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => error_response(e, ctx),
                Err(_) => error_response(HttpError::UpstreamTimeout, ctx),
            },
        };

        ctx.status = response.status();
        for stage in self.stages.iter().take(entered).rev() {
            stage.on_response(&mut response, ctx);
        }
        response
    }
}

fn error_response(error: HttpError, ctx: &mut RequestContext) -> Response<RespBody> {
    let status = StatusCode::from(&error);
    ctx.error = Some(error);
    synthetic_error_response(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::synthetic_response::text_response;
    use http::{HeaderValue, Request};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records the order hooks run in.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        respond: bool,
    }

    impl Stage for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn on_request(&self, _parts: &mut Parts, _ctx: &mut RequestContext) -> Flow {
            if let Ok(mut log) = self.log.lock() {
                log.push(format!("req:{}", self.name));
            }
            if self.respond {
                Flow::Respond(text_response(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"))
            } else {
                Flow::Continue
            }
        }

        fn on_response(&self, response: &mut Response<RespBody>, ctx: &RequestContext) {
            if let Ok(mut log) = self.log.lock() {
                log.push(format!("resp:{}:{}", self.name, ctx.status.as_u16()));
            }
            response.headers_mut().append("x-seen-by", HeaderValue::from_static("stage"));
        }
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>, respond: bool) -> Arc<dyn Stage> {
        Arc::new(Recorder { name, log: Arc::clone(log), respond })
    }

    fn request(timeout: Duration) -> (Parts, RequestContext) {
        let (parts, _) = Request::get("/api/items?page=2").body(()).unwrap_or_default().into_parts();
        let ctx = RequestContext::new(&parts, ([127, 0, 0, 1], 40000).into(), timeout);
        (parts, ctx)
    }

    fn snapshot(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_stages_wrap_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![recorder("outer", &log, false), recorder("inner", &log, false)]);
        let (parts, mut ctx) = request(Duration::from_secs(5));

        let terminal_log = Arc::clone(&log);
        let resp = pipeline
            .run(parts, &mut ctx, |parts| async move {
                if let Ok(mut log) = terminal_log.lock() {
                    log.push(format!("terminal:{}", parts.uri));
                }
                Ok::<_, HttpError>(text_response(StatusCode::OK, "ok"))
            })
            .await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            snapshot(&log),
            vec![
                "req:outer",
                "req:inner",
                "terminal:/api/items?page=2",
                "resp:inner:200",
                "resp:outer:200"
            ]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_inner_stages_and_terminal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            recorder("log", &log, false),
            recorder("admission", &log, true),
            recorder("never", &log, false),
        ]);
        let (parts, mut ctx) = request(Duration::from_secs(5));

        let terminal_log = Arc::clone(&log);
        let resp = pipeline
            .run(parts, &mut ctx, |_| async move {
                if let Ok(mut log) = terminal_log.lock() {
                    log.push("terminal".to_string());
                }
                Ok::<_, HttpError>(text_response(StatusCode::OK, "ok"))
            })
            .await;

        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get_all("x-seen-by").iter().count(), 2);
        assert_eq!(
            snapshot(&log),
            vec!["req:log", "req:admission", "resp:admission:429", "resp:log:429"]
        );
    }

    #[tokio::test]
    async fn test_terminal_error_becomes_synthetic_response() {
        let pipeline = Pipeline::default();
        let (parts, mut ctx) = request(Duration::from_secs(5));

        let resp = pipeline
            .run(parts, &mut ctx, |_| async {
                Err::<Response<RespBody>, _>(HttpError::UpstreamUnavailable(
                    "connection refused".into(),
                ))
            })
            .await;

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ctx.status, StatusCode::BAD_GATEWAY);
        assert!(matches!(ctx.error, Some(HttpError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_deadline_yields_gateway_timeout() {
        let pipeline = Pipeline::default();
        let (parts, mut ctx) = request(Duration::from_millis(50));

        let resp = pipeline
            .run(parts, &mut ctx, |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, HttpError>(text_response(StatusCode::OK, "too late"))
            })
            .await;

        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ctx.error, Some(HttpError::UpstreamTimeout));
    }
}

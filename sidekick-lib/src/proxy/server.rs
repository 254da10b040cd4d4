use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::{Method, Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, UpstreamTarget};
use crate::error::{GatewayError, Result};
use crate::proxy::connection::ConnectionTracker;
use crate::proxy::context::RequestContext;
use crate::proxy::forwarding::Forwarder;
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::pipeline::{Pipeline, Stage};
use crate::proxy::router::Route;
use crate::proxy::stages::{
    AccessLogStage, AdmissionStage, IdentifyStage, InstrumentationStage, RequestIdStage,
};
use crate::proxy::synthetic_response::synthetic_error_response;
use crate::proxy::RespBody;
use crate::security::{ClientIdentifier, LimiterRegistry};
use crate::telemetry::{
    handle_metrics, health_check_response, init_metrics, ready_check_response, Metrics,
};

/// Everything needed to serve requests, shared by all connections.
pub struct Gateway {
    config: Arc<Config>,
    proxy_pipeline: Pipeline,
    operational_pipeline: Pipeline,
    forwarder: Forwarder,
    limiter: Option<Arc<LimiterRegistry>>,
    metrics: Arc<Metrics>,
    metrics_registry: Registry,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Build the gateway from a validated configuration.
    pub fn new(config: Arc<Config>, metrics: Arc<Metrics>, metrics_registry: Registry) -> Result<Self> {
        let upstream = UpstreamTarget::parse(&config.upstream)?;
        let forwarder = Forwarder::new(upstream, config.preserve_host, &config.timeout);

        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(LimiterRegistry::from_config(&config.rate_limit)));

        let request_id: Arc<dyn Stage> = Arc::new(RequestIdStage::new());
        let access_log: Arc<dyn Stage> = Arc::new(AccessLogStage);
        let instrumentation: Arc<dyn Stage> =
            Arc::new(InstrumentationStage::new(Arc::clone(&metrics)));

        let operational_pipeline = Pipeline::new(vec![
            Arc::clone(&request_id),
            Arc::clone(&access_log),
            Arc::clone(&instrumentation),
        ]);

        let mut proxy_stages = vec![request_id, access_log, instrumentation];
        if let Some(limiter) = &limiter {
            proxy_stages.push(Arc::new(IdentifyStage::new(ClientIdentifier::new(
                config.rate_limit.trusted_proxies.clone(),
            ))));
            proxy_stages.push(Arc::new(AdmissionStage::new(Arc::clone(limiter), Arc::clone(&metrics))));
        }
        let proxy_pipeline = Pipeline::new(proxy_stages);

        debug!(stages = ?proxy_pipeline.stage_names(), "proxy pipeline assembled");

        Ok(Self {
            config,
            proxy_pipeline,
            operational_pipeline,
            forwarder,
            limiter,
            metrics,
            metrics_registry,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// `None` when rate limiting is disabled.
    pub fn limiter(&self) -> Option<&Arc<LimiterRegistry>> {
        self.limiter.as_ref()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting connections and report not-ready.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_ready(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Serve one request through the pipeline that matches its route.
    pub async fn handle(&self, req: Request<Incoming>, peer: SocketAddr) -> Response<RespBody> {
        let (parts, body) = req.into_parts();
        let mut ctx = RequestContext::new(&parts, peer, self.config.timeout.request_timeout());

        let route = ctx.route;
        if route.is_operational() {
            return self
                .operational_pipeline
                .run(parts, &mut ctx, move |_| async move { self.operational_response(route) })
                .await;
        }

        let forwarder = &self.forwarder;
        self.proxy_pipeline
            .run(parts, &mut ctx, move |parts| forwarder.forward(Request::from_parts(parts, body), peer))
            .await
    }

    fn operational_response(&self, route: Route) -> HttpResult<Response<RespBody>> {
        let resp = match route {
            Route::Health => health_check_response(),
            Route::Ready => ready_check_response(self.is_ready()),
            Route::Metrics => handle_metrics(&self.metrics_registry),
            Route::Proxy => return Err(HttpError::Internal("proxy route has no local handler".into())),
        };
        resp.map_err(|e| HttpError::Internal(e.to_string()))
    }
}

/// Run `fut` on its own task so a panic inside it becomes a bare 500.
///
/// The task is aborted if the caller goes away first.
pub(crate) async fn contain_panics<F>(
    fut: F,
    peer: SocketAddr,
    method: &Method,
    route: Route,
    metrics: &Metrics,
) -> Response<RespBody>
where
    F: Future<Output = Response<RespBody>> + Send + 'static,
{
    match AbortOnDropHandle::new(tokio::spawn(fut)).await {
        Ok(resp) => resp,
        Err(e) => {
            if e.is_panic() {
                error!(?peer, %method, route = route.label(), "request handler panicked");
            } else {
                error!(?peer, %method, error = %e, "request task failed");
            }
            let error = HttpError::Internal(e.to_string());
            metrics.record_request(method.as_str(), route.label(), StatusCode::INTERNAL_SERVER_ERROR.as_u16());
            metrics.record_error(error.error_type());
            synthetic_error_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Periodically drop idle buckets and publish how many clients are tracked.
pub fn spawn_sweeper(
    limiter: Arc<LimiterRegistry>,
    metrics: Arc<Metrics>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = limiter.evict_idle();
                    metrics.record_tracked_clients(limiter.len());
                    debug!(removed, tracked = limiter.len(), "rate limit sweep");
                }
            }
        }
        debug!("rate limit sweeper stopped");
    })
}

/// Accept connections on `listener` until the gateway is shut down, then
/// give in-flight connections `timeout.shutdown_secs` to finish.
pub async fn serve(listener: TcpListener, gateway: Arc<Gateway>) -> Result<()> {
    let addr = listener.local_addr()?;
    let shutdown = gateway.shutdown_token();
    let builder = ConnBuilder::new(TokioExecutor::new());
    let connections = ConnectionTracker::new();

    let sweeper = gateway.limiter().map(|limiter| {
        spawn_sweeper(
            Arc::clone(limiter),
            Arc::clone(gateway.metrics()),
            gateway.config().rate_limit.sweep_interval(),
            shutdown.clone(),
        )
    });

    info!(?addr, upstream = %gateway.forwarder.upstream(), "sidekick listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                let guard = connections.track();
                let builder = builder.clone();
                let gateway = Arc::clone(&gateway);
                let shutdown = shutdown.clone();

                tokio::spawn(async move {
                    // Ensure counter is decremented when connection finishes
                    let _guard = guard;

                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let gateway = Arc::clone(&gateway);
                        async move {
                            let method = req.method().clone();
                            let route = Route::resolve(&method, req.uri().path());
                            let handler = {
                                let gateway = Arc::clone(&gateway);
                                async move { gateway.handle(req, peer).await }
                            };
                            let resp = contain_panics(handler, peer, &method, route, gateway.metrics()).await;
                            Ok::<_, hyper::Error>(resp)
                        }
                    });

                    let conn = builder.serve_connection(TokioIo::new(stream), svc);
                    tokio::pin!(conn);

                    let result = tokio::select! {
                        result = conn.as_mut() => result,
                        _ = shutdown.cancelled() => {
                            conn.as_mut().graceful_shutdown();
                            conn.await
                        }
                    };
                    if let Err(e) = result {
                        warn!(?peer, error = %e, "serve_connection error");
                    }
                });
            }
        }
    }

    drop(listener);
    let drain_timeout = gateway.config().timeout.shutdown_timeout();
    info!("Waiting for active connections to finish (timeout: {}s)", drain_timeout.as_secs());
    connections.wait_idle(drain_timeout).await;

    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.await {
            warn!(error = %e, "rate limit sweeper ended abnormally");
        }
    }

    info!("Gateway stopped");
    Ok(())
}

/// Cancel `shutdown` on SIGTERM or SIGINT.
fn spawn_signal_handler(shutdown: CancellationToken) -> Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        GatewayError::Io(std::io::Error::other(format!("Failed to setup SIGTERM handler: {e}")))
    })?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).map_err(|e| {
        GatewayError::Io(std::io::Error::other(format!("Failed to setup SIGINT handler: {e}")))
    })?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
    Ok(())
}

/// Bind the configured address and serve until SIGTERM/SIGINT.
pub async fn run(config: Arc<Config>) -> Result<()> {
    let (metrics, metrics_registry) = init_metrics()?;
    let gateway = Arc::new(Gateway::new(Arc::clone(&config), metrics, metrics_registry)?);

    let listener = TcpListener::bind(config.listen).await.map_err(GatewayError::Io)?;
    spawn_signal_handler(gateway.shutdown_token())?;

    serve(listener, gateway).await
}

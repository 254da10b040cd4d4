use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, MeterProvider};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

use crate::error::{GatewayError, Result};

pub mod labels {
    pub const METHOD: &str = "method";
    pub const ROUTE: &str = "route";
    pub const STATUS: &str = "status";
    pub const ERROR_TYPE: &str = "error_type";
    pub const VERSION: &str = "version";
}

pub mod names {
    pub const REQUESTS_TOTAL: &str = "sidekick_requests_total";
    pub const REQUEST_DURATION_SECONDS: &str = "sidekick_request_duration_seconds";
    pub const RATELIMIT_HITS_TOTAL: &str = "sidekick_ratelimit_hits_total";
    pub const RATELIMIT_TRACKED_CLIENTS: &str = "sidekick_ratelimit_tracked_clients";
    pub const UPSTREAM_ERRORS_TOTAL: &str = "sidekick_upstream_errors_total";
    pub const TIMEOUTS_TOTAL: &str = "sidekick_timeouts_total";
    pub const ERRORS_TOTAL: &str = "sidekick_errors_total";
    pub const BUILD_INFO: &str = "sidekick_build_info";
}

/// Prometheus default latency buckets, in seconds
const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

#[derive(Clone)]
pub struct Metrics {
    pub requests_total: Counter<u64>,
    pub request_duration_seconds: Histogram<f64>,

    // Rate limiting
    pub ratelimit_hits_total: Counter<u64>,
    pub ratelimit_tracked_clients: Gauge<u64>,

    // Failures
    pub upstream_errors_total: Counter<u64>,
    pub timeouts_total: Counter<u64>,
    pub errors_total: Counter<u64>,

    pub build_info: Gauge<u64>,

    // Dropping the provider stops collection, so it lives as long as the instruments.
    _provider: SdkMeterProvider,
}

impl Metrics {
    fn new(meter: &Meter, provider: SdkMeterProvider) -> Self {
        Self {
            requests_total: meter
                .u64_counter(names::REQUESTS_TOTAL)
                .with_description("Total number of HTTP requests handled by sidekick")
                .build(),
            request_duration_seconds: meter
                .f64_histogram(names::REQUEST_DURATION_SECONDS)
                .with_description("HTTP request duration in seconds")
                .with_boundaries(DURATION_BUCKETS.to_vec())
                .build(),

            ratelimit_hits_total: meter
                .u64_counter(names::RATELIMIT_HITS_TOTAL)
                .with_description("Total number of requests blocked by the rate limiter (429)")
                .build(),
            ratelimit_tracked_clients: meter
                .u64_gauge(names::RATELIMIT_TRACKED_CLIENTS)
                .with_description("Number of client buckets currently held by the rate limiter")
                .build(),

            upstream_errors_total: meter
                .u64_counter(names::UPSTREAM_ERRORS_TOTAL)
                .with_description("Total number of failed upstream calls")
                .build(),
            timeouts_total: meter
                .u64_counter(names::TIMEOUTS_TOTAL)
                .with_description("Total number of requests that hit the per-request timeout")
                .build(),
            errors_total: meter
                .u64_counter(names::ERRORS_TOTAL)
                .with_description("Total number of requests answered with a synthetic error")
                .build(),

            build_info: meter
                .u64_gauge(names::BUILD_INFO)
                .with_description("Build information")
                .build(),

            _provider: provider,
        }
    }

    pub fn set_build_info(&self) {
        self.build_info
            .record(1, &[KeyValue::new(labels::VERSION, env!("CARGO_PKG_VERSION"))]);
    }

    pub fn record_request(&self, method: &str, route: &str, status: u16) {
        self.requests_total.add(
            1,
            &[
                KeyValue::new(labels::METHOD, method.to_string()),
                KeyValue::new(labels::ROUTE, route.to_string()),
                KeyValue::new(labels::STATUS, status.to_string()),
            ],
        );
    }

    pub fn record_request_duration(&self, duration: f64, method: &str, route: &str) {
        self.request_duration_seconds.record(
            duration,
            &[
                KeyValue::new(labels::METHOD, method.to_string()),
                KeyValue::new(labels::ROUTE, route.to_string()),
            ],
        );
    }

    pub fn record_rate_limit_hit(&self) {
        self.ratelimit_hits_total.add(1, &[]);
    }

    pub fn record_tracked_clients(&self, count: usize) {
        self.ratelimit_tracked_clients
            .record(u64::try_from(count).unwrap_or(u64::MAX), &[]);
    }

    pub fn record_upstream_error(&self, error_type: &str) {
        self.upstream_errors_total
            .add(1, &[KeyValue::new(labels::ERROR_TYPE, error_type.to_string())]);
    }

    pub fn record_timeout(&self) {
        self.timeouts_total.add(1, &[]);
    }

    pub fn record_error(&self, error_type: &str) {
        self.errors_total
            .add(1, &[KeyValue::new(labels::ERROR_TYPE, error_type.to_string())]);
    }
}

/// Create the instruments and the Prometheus registry `/metrics` renders.
pub fn init_metrics() -> Result<(Arc<Metrics>, Registry)> {
    let registry = Registry::default();

    // instrument names already carry the `_total` suffix
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .without_counter_suffixes()
        .build()
        .map_err(|e| GatewayError::Metrics(format!("Failed to build Prometheus exporter: {e}")))?;

    let provider = SdkMeterProvider::builder().with_reader(exporter).build();
    let meter = provider.meter("sidekick");
    let metrics = Arc::new(Metrics::new(&meter, provider));

    metrics.set_build_info();

    Ok((metrics, registry))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(registry: &Registry, name: &str) -> f64 {
        let text = crate::telemetry::render_metrics(registry).unwrap_or_default();
        sample_sum(&text, name)
    }

    /// Sum every sample of `name` in the text exposition format
    fn sample_sum(text: &str, name: &str) -> f64 {
        text.lines()
            .filter(|line| !line.starts_with('#'))
            .filter(|line| {
                line.strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
            })
            .filter_map(|line| line.rsplit(' ').next()?.parse::<f64>().ok())
            .sum()
    }

    #[test]
    fn test_rate_limit_hits_are_exported() -> Result<()> {
        let (metrics, registry) = init_metrics()?;
        metrics.record_rate_limit_hit();
        metrics.record_rate_limit_hit();
        assert_eq!(counter_value(&registry, names::RATELIMIT_HITS_TOTAL), 2.0);
        Ok(())
    }

    #[test]
    fn test_counters_keep_their_names() -> Result<()> {
        let (metrics, registry) = init_metrics()?;
        metrics.record_rate_limit_hit();
        metrics.record_request("GET", "/*", 429);
        metrics.record_upstream_error("timeout");
        metrics.record_timeout();
        metrics.record_error("internal");

        let text = crate::telemetry::render_metrics(&registry)?;
        assert!(!text.contains("_total_total"), "counter suffix doubled:\n{text}");
        for name in [
            names::RATELIMIT_HITS_TOTAL,
            names::REQUESTS_TOTAL,
            names::UPSTREAM_ERRORS_TOTAL,
            names::TIMEOUTS_TOTAL,
            names::ERRORS_TOTAL,
        ] {
            assert_eq!(sample_sum(&text, name), 1.0, "{name} missing in:\n{text}");
        }
        let rejected = text
            .lines()
            .find(|l| l.starts_with(names::REQUESTS_TOTAL) && l.contains(r#"status="429""#));
        assert!(rejected.is_some_and(|l| l.contains(r#"route="/*""#)));
        Ok(())
    }

    #[test]
    fn test_instances_do_not_share_state() -> Result<()> {
        let (a, registry_a) = init_metrics()?;
        let (_b, registry_b) = init_metrics()?;
        a.record_request("GET", "/*", 200);
        assert_eq!(counter_value(&registry_a, names::REQUESTS_TOTAL), 1.0);
        assert_eq!(counter_value(&registry_b, names::REQUESTS_TOTAL), 0.0);
        Ok(())
    }
}

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    token_exchanges_total: IntCounterVec,
    posts_total: IntCounterVec,
}

impl Metrics {
    fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("social_poster".to_string()), None)?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "path", "status"],
        )?;
        let token_exchanges_total = IntCounterVec::new(
            Opts::new(
                "token_exchanges_total",
                "Token endpoint calls by outcome (success, failure, refreshed, refresh_failed)",
            ),
            &["outcome"],
        )?;
        let posts_total = IntCounterVec::new(
            Opts::new("posts_total", "Post attempts by source and outcome"),
            &["source", "outcome"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(token_exchanges_total.clone()))?;
        registry.register(Box::new(posts_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            token_exchanges_total,
            posts_total,
        })
    }
}

/// Register collectors. Calling it again is a no-op.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if METRICS.get().is_none() {
        let _ = METRICS.set(Metrics::new()?);
    }
    Ok(())
}

/// Text exposition of every registered metric; empty before [`init_metrics`].
pub fn get_metrics() -> String {
    let Some(metrics) = METRICS.get() else {
        return String::new();
    };

    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metrics.registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_http(method: &str, path: &str, status: u16, elapsed_secs: f64) {
    if let Some(metrics) = METRICS.get() {
        let status = status.to_string();
        let labels = [method, path, status.as_str()];
        metrics.http_requests_total.with_label_values(&labels).inc();
        metrics
            .http_request_duration_seconds
            .with_label_values(&labels)
            .observe(elapsed_secs);
    }
}

pub fn record_token_exchange(outcome: &str) {
    if let Some(metrics) = METRICS.get() {
        metrics
            .token_exchanges_total
            .with_label_values(&[outcome])
            .inc();
    }
}

pub fn record_post(source: &str, outcome: &str) {
    if let Some(metrics) = METRICS.get() {
        metrics
            .posts_total
            .with_label_values(&[source, outcome])
            .inc();
    }
}

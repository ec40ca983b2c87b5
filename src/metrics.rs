//! Prometheus metrics

use axum::{body::Body, http::Request, http::StatusCode, response::Response};
use lazy_static::lazy_static;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};
use tracing::Span;

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Simple request counter
    pub static ref INCOMING_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("incoming_requests", "The number of HTTP requests received"),
        &["http_method"]
    ).expect("valid metric");
    // Request counter by status code
    pub static ref RESPONSE_CODE_COLLECTOR: IntCounterVec = IntCounterVec::new(
        Opts::new("outgoing_response", "The number of responses sent."),
        &["status_code"]
    ).expect("valid metric");
    // Request histogram by response time
    pub static ref RESPONSE_TIME_COLLECTOR: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("response_time", "The time taken to respond to each request"),
            buckets: prometheus::DEFAULT_BUCKETS.to_vec(),
        },
        &[],
    ).expect("valid metric");
    // Aggregation counter by operation
    pub static ref AGGREGATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("aggregations", "The number of aggregations computed"),
        &["operation"]
    ).expect("valid metric");
    // Dataset cache misses
    pub static ref DATASET_CACHE_MISSES: IntCounter = IntCounter::new(
        "dataset_cache_misses", "The number of dataset lookups not served from the cache"
    ).expect("valid metric");
}

/// Register all metrics with the registry.
///
/// Must be called at most once.
pub fn register_metrics() {
    REGISTRY
        .register(Box::new(INCOMING_REQUESTS.clone()))
        .expect("metric registered once");
    REGISTRY
        .register(Box::new(RESPONSE_CODE_COLLECTOR.clone()))
        .expect("metric registered once");
    REGISTRY
        .register(Box::new(RESPONSE_TIME_COLLECTOR.clone()))
        .expect("metric registered once");
    REGISTRY
        .register(Box::new(AGGREGATIONS.clone()))
        .expect("metric registered once");
    REGISTRY
        .register(Box::new(DATASET_CACHE_MISSES.clone()))
        .expect("metric registered once");
}

/// Render the registered metrics in the Prometheus text format.
pub async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();

    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    String::from_utf8(buffer).map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
}

/// Increments the prometheus counter on all incoming requests, labelled by http method
pub fn request_counter(request: &Request<Body>, _span: &Span) {
    INCOMING_REQUESTS
        .with_label_values(&[&request.method().to_string().to_ascii_uppercase()])
        .inc();
}

/// Increment the prometheus counter on all outgoing responses, labelled by status code
pub fn record_response_metrics<B>(
    response: &Response<B>,
    latency: std::time::Duration,
    _span: &Span,
) {
    RESPONSE_CODE_COLLECTOR
        .with_label_values(&[response.status().as_str()])
        .inc();

    RESPONSE_TIME_COLLECTOR
        .with_label_values(&[])
        .observe(latency.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metrics_text() {
        AGGREGATIONS.with_label_values(&["mean"]).inc();
        let registry = Registry::new();
        registry.register(Box::new(AGGREGATIONS.clone())).unwrap();
        let mut buffer = Vec::new();
        prometheus::TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("aggregations{operation=\"mean\"}"), "{text}");
    }

    #[tokio::test]
    async fn metrics_handler_ok() {
        assert!(metrics_handler().await.is_ok());
    }
}

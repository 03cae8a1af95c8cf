//! Metrics and observability utilities
//!
//! Prometheus-style counters and histograms for HTTP requests and every
//! outbound provider call. The recorder is installed by the binaries.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Spurgeon metrics
pub const METRICS_PREFIX: &str = "spurgeon";

/// Histogram buckets for provider latency (in seconds); model calls can take minutes
pub const PROVIDER_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 1m
    120.0, // 2m
    300.0, // 5m
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total text generation requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Text generation latency in seconds"
    );

    describe_counter!(
        format!("{}_vector_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total vector index queries"
    );

    describe_histogram!(
        format!("{}_vector_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Vector index query latency in seconds"
    );

    describe_counter!(
        format!("{}_chat_categories_total", METRICS_PREFIX),
        Unit::Count,
        "Chat messages by classified category"
    );

    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => outcome(success)
    )
    .increment(1);

    histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Helper to record text generation metrics
pub fn record_llm_call(duration_secs: f64, model: &str, success: bool) {
    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => outcome(success)
    )
    .increment(1);

    histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Helper to record vector index metrics
pub fn record_vector_query(duration_secs: f64, index: &str, success: bool) {
    counter!(
        format!("{}_vector_queries_total", METRICS_PREFIX),
        "index" => index.to_string(),
        "status" => outcome(success)
    )
    .increment(1);

    histogram!(
        format!("{}_vector_query_duration_seconds", METRICS_PREFIX),
        "index" => index.to_string()
    )
    .record(duration_secs);
}

/// Helper to record the router's decision
pub fn record_chat_category(category: &str) {
    counter!(
        format!("{}_chat_categories_total", METRICS_PREFIX),
        "category" => category.to_string()
    )
    .increment(1);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}

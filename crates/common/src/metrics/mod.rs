//! Metrics and observability utilities
//!
//! Provides Prometheus-friendly metrics with standardized naming
//! conventions. Nothing here installs a recorder; binaries decide where
//! metrics go.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ReportQA metrics
pub const METRICS_PREFIX: &str = "reportqa";

/// Histogram buckets for end-to-end answer latency (in seconds).
/// A sub-question query makes at least three sequential LLM calls.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    20.00,  // 20s
    30.00,  // 30s
    60.00,  // 60s
    120.0,  // 2m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
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

    // Query pipeline metrics
    describe_counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        Unit::Count,
        "Total questions answered, by outcome"
    );

    describe_histogram!(
        format!("{}_question_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end question latency in seconds"
    );

    describe_histogram!(
        format!("{}_sub_questions_per_question", METRICS_PREFIX),
        Unit::Count,
        "Number of sub-questions produced by decomposition"
    );

    describe_counter!(
        format!("{}_sub_answers_total", METRICS_PREFIX),
        Unit::Count,
        "Sub-answers produced, by collection and status"
    );

    // Provider metrics
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
        format!("{}_completion_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total language model completion requests"
    );

    describe_histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model completion latency in seconds"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_pages_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total pages ingested"
    );

    describe_counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks embedded and indexed"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-collection ingestion latency in seconds"
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

/// Helper to record one answered (or failed) question
pub fn record_question(duration_secs: f64, sub_questions: usize, used_fallback: bool, success: bool) {
    let outcome = match (success, used_fallback) {
        (false, _) => "error",
        (true, true) => "fallback",
        (true, false) => "decomposed",
    };

    counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(format!("{}_question_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    if success {
        histogram!(format!("{}_sub_questions_per_question", METRICS_PREFIX))
            .record(sub_questions as f64);
    }
}

/// Helper to record a sub-answer outcome
pub fn record_sub_answer(collection: &str, degraded: bool) {
    let status = if degraded { "degraded" } else { "answered" };

    counter!(
        format!("{}_sub_answers_total", METRICS_PREFIX),
        "collection" => collection.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);

        tracing::trace!(model, batch_size, duration_secs, "Embedding batch completed");
    }
}

/// Helper to record language model metrics
pub fn record_completion(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_completion_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_completion_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record ingestion metrics for one collection
pub fn record_ingestion(duration_secs: f64, collection: &str, pages: usize, chunks: usize) {
    counter!(
        format!("{}_pages_ingested_total", METRICS_PREFIX),
        "collection" => collection.to_string()
    )
    .increment(pages as u64);

    counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        "collection" => collection.to_string()
    )
    .increment(chunks as u64);

    histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        "collection" => collection.to_string()
    )
    .record(duration_secs);
}

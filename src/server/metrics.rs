//! Prometheus metrics for the relay.
//!
//! Counters live in the default registry and are exposed in text format at
//! GET /metrics. Stream lifecycle accounting goes through [`StreamGuard`] so
//! a client disconnect is counted the same way as any other abort.

use std::sync::LazyLock;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, TextEncoder};

use crate::server::error::RelayError;

static REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register(
        IntCounterVec::new(
            Opts::new("relay_requests_total", "API requests by endpoint and outcome"),
            &["endpoint", "outcome"],
        )
        .expect("valid metric definition"),
    )
});

static ACTIVE_STREAMS: LazyLock<IntGauge> = LazyLock::new(|| {
    register(
        IntGauge::new("relay_active_streams", "SSE streams currently being relayed")
            .expect("valid metric definition"),
    )
});

static STREAMS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register(
        IntCounterVec::new(
            Opts::new("relay_streams_total", "Finished SSE streams by outcome"),
            &["outcome"],
        )
        .expect("valid metric definition"),
    )
});

fn register<C>(collector: C) -> C
where
    C: prometheus::core::Collector + Clone + 'static,
{
    prometheus::default_registry()
        .register(Box::new(collector.clone()))
        .expect("collector registered once");
    collector
}

/// Count one API request against `endpoint`.
pub fn record_request(endpoint: &str, error: Option<&RelayError>) {
    let outcome = error.map_or("ok", RelayError::metric_label);
    REQUESTS_TOTAL.with_label_values(&[endpoint, outcome]).inc();
}

/// RAII marker for one live SSE stream.
///
/// Increments the live-stream gauge on creation; on drop, decrements it and
/// counts the stream as completed or aborted. Dropping without
/// [`StreamGuard::finish`] covers both backend truncation and client
/// disconnect.
pub struct StreamGuard {
    completed: bool,
}

impl StreamGuard {
    pub fn begin() -> Self {
        ACTIVE_STREAMS.inc();
        Self { completed: false }
    }

    /// Mark the stream as having delivered its sentinel.
    pub fn finish(&mut self) {
        self.completed = true;
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        ACTIVE_STREAMS.dec();
        let outcome = if self.completed { "completed" } else { "aborted" };
        STREAMS_TOTAL.with_label_values(&[outcome]).inc();
    }
}

/// Render the default registry in Prometheus text exposition format.
pub async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

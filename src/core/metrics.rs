//! Prometheus metrics for monitoring the relay.
//!
//! Upstream failures are reported to clients as ordinary reply strings, so the
//! `upstream_failures` counter is the only place the true failure kind survives.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    GaugeVec, HistogramVec, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by method, endpoint, and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Number of currently active requests by endpoint
    pub active_requests: GaugeVec,

    /// Upstream failures folded into reply payloads, by mode and kind
    pub upstream_failures: IntCounterVec,

    /// Upstream round-trip latency in seconds, by mode
    pub upstream_latency: HistogramVec,

    /// Live chat sessions in the registry
    pub active_sessions: IntGauge,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// Safe to call more than once; every call returns the same instance.
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "relay_requests_total",
            "Total number of requests",
            &["method", "endpoint", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "relay_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint"],
            vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "relay_active_requests",
            "Number of active requests",
            &["endpoint"]
        )
        .expect("Failed to register active_requests metric");

        let upstream_failures = register_int_counter_vec!(
            "relay_upstream_failures_total",
            "Upstream failures returned to clients as diagnostic replies",
            &["mode", "kind"]
        )
        .expect("Failed to register upstream_failures metric");

        let upstream_latency = register_histogram_vec!(
            "relay_upstream_latency_seconds",
            "Upstream round-trip latency in seconds",
            &["mode"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0]
        )
        .expect("Failed to register upstream_latency metric");

        let active_sessions = register_int_gauge!(
            "relay_active_sessions",
            "Number of live chat sessions"
        )
        .expect("Failed to register active_sessions metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            upstream_failures,
            upstream_latency,
            active_sessions,
        }
    })
}

/// Get the global metrics instance, registering it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let metrics = init_metrics();

        metrics
            .request_count
            .with_label_values(&["POST", "/v1/chat", "200"])
            .inc();
        metrics
            .request_duration
            .with_label_values(&["POST", "/v1/chat"])
            .observe(0.25);

        assert!(
            metrics
                .request_count
                .with_label_values(&["POST", "/v1/chat", "200"])
                .get()
                >= 1
        );
    }

    #[test]
    fn test_metrics_singleton() {
        let a = init_metrics() as *const Metrics;
        let b = get_metrics() as *const Metrics;
        assert_eq!(a, b);
    }

    #[test]
    fn test_upstream_failure_counter() {
        let metrics = get_metrics();
        let counter = metrics
            .upstream_failures
            .with_label_values(&["chat", "test_kind"]);
        let before = counter.get();
        counter.inc();
        assert_eq!(counter.get(), before + 1);
    }
}

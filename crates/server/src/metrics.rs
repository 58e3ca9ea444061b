//! Prometheus metrics

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and describe the metrics we emit.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    describe_counter!(
        "lattice_serve_requests_total",
        "Recognition requests by endpoint and outcome"
    );
    describe_histogram!(
        "lattice_serve_request_seconds",
        "End-to-end request latency in seconds"
    );

    handle
}

pub fn record_request(endpoint: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("lattice_serve_requests_total", "endpoint" => endpoint, "outcome" => outcome)
        .increment(1);
}

pub fn record_request_seconds(endpoint: &'static str, seconds: f64) {
    histogram!("lattice_serve_request_seconds", "endpoint" => endpoint).record(seconds);
}

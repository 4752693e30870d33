//! Prometheus metrics handler

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder. Can only succeed once per process.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // Describe metrics
    describe_counter!("calls_initiated_total", "Outgoing calls placed");
    describe_counter!("calls_received_total", "Incoming calls that rang");
    describe_counter!(
        "calls_terminated_total",
        "Calls that reached a terminal status, by status"
    );
    describe_counter!(
        "calls_missed_busy_total",
        "Incoming calls turned away because another call was in progress"
    );
    describe_counter!(
        "signaling_protocol_errors_total",
        "Malformed signaling frames dropped"
    );
    describe_gauge!("relay_connections", "Users connected to the signaling relay");

    Ok(handle)
}

/// HTTP metrics handler
pub async fn metrics_handler(State(prometheus_handle): State<PrometheusHandle>) -> Response {
    (StatusCode::OK, prometheus_handle.render()).into_response()
}

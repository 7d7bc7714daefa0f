//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): latency by route, up to
//!   the end of the response body
//! - `gateway_token_mints_total` (counter): mints by strategy, outcome
//! - `gateway_workflow_dispatch_total` (counter): dispatches by outcome

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_request(route: &str, status: u16) {
    ::metrics::counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Records `gateway_request_duration_seconds` when dropped.
///
/// Move it into whatever outlives the response body.
#[derive(Debug)]
pub struct LatencyTimer {
    route: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(route: &'static str, start: Instant) -> Self {
        Self { route, start }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        ::metrics::histogram!("gateway_request_duration_seconds", "route" => self.route)
            .record(self.start.elapsed().as_secs_f64());
    }
}

/// `outcome` is one of `ok`, `error` or `degraded`.
pub fn record_token_mint(strategy: &str, outcome: &str) {
    ::metrics::counter!(
        "gateway_token_mints_total",
        "strategy" => strategy.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_workflow_dispatch(outcome: &str) {
    ::metrics::counter!("gateway_workflow_dispatch_total", "outcome" => outcome.to_string())
        .increment(1);
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cluster_workers_live` (gauge): workers currently tracked
//! - `cluster_workers_closing` (gauge): workers admitted for restart
//! - `cluster_worker_forks_total` (counter): successful forks
//! - `cluster_worker_exits_total` (counter): exits, labelled `expected`
//! - `cluster_restart_requests_total` (counter): labelled `outcome`
//!
//! Recording is a no-op until a recorder is installed, so workers and tests
//! pay nothing for it.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn set_worker_gauges(live: usize, closing: usize) {
    metrics::gauge!("cluster_workers_live").set(live as f64);
    metrics::gauge!("cluster_workers_closing").set(closing as f64);
}

pub fn record_fork() {
    metrics::counter!("cluster_worker_forks_total").increment(1);
}

pub fn record_exit(expected: bool) {
    let expected = if expected { "true" } else { "false" };
    metrics::counter!("cluster_worker_exits_total", "expected" => expected).increment(1);
}

pub fn record_restart_request(admitted: bool) {
    let outcome = if admitted { "admitted" } else { "rejected" };
    metrics::counter!("cluster_restart_requests_total", "outcome" => outcome).increment(1);
}

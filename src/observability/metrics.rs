//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gec_requests_total` (counter): requests by route and status
//! - `gec_tokens_issued_total` (counter): minted QR tokens
//! - `gec_verifications_total` (counter): verification attempts by outcome
//!   ("pass" or the rejection reason label)
//! - `gec_anchors_submitted_total` (counter): anchor transactions sent
//! - `gec_sessions_swept_total` (counter): expired sessions purged
//! - `gec_chain_healthy` (gauge): 1=reachable, 0=unreachable
//! - `gec_rate_limited_total` (counter): requests shed by the limiter

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter on its own listener.
///
/// Failure to bind is logged, not fatal; the gateway serves without
/// metrics rather than refusing to start.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, status: u16) {
    counter!("gec_requests_total", "route" => route, "status" => status.to_string()).increment(1);
}

pub fn record_token_issued() {
    counter!("gec_tokens_issued_total").increment(1);
}

pub fn record_verification(outcome: &'static str) {
    counter!("gec_verifications_total", "outcome" => outcome).increment(1);
}

pub fn record_anchor_submitted() {
    counter!("gec_anchors_submitted_total").increment(1);
}

pub fn record_sessions_swept(count: usize) {
    counter!("gec_sessions_swept_total").increment(count as u64);
}

pub fn record_chain_health(healthy: bool) {
    gauge!("gec_chain_healthy").set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_rate_limited(kind: &'static str) {
    counter!("gec_rate_limited_total", "kind" => kind).increment(1);
}

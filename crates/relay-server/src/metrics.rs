//! Metrics collection and export for the relay.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use anyhow::{Context, Result};
use firechat_relay_core::RelayStats;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "firechat_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "firechat_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "firechat_connections_rejected_total";
    pub const EVENTS_TOTAL: &str = "firechat_events_total";
    pub const FRAMES_BYTES: &str = "firechat_frames_bytes";
    pub const ROOMS_ACTIVE: &str = "firechat_rooms_active";
    pub const USERS_ONLINE: &str = "firechat_users_online";
    pub const DECODE_ERRORS_TOTAL: &str = "firechat_decode_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of accepted connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Handshakes refused before upgrade, by reason"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Inbound events relayed, by event name");
    metrics::describe_histogram!(names::FRAMES_BYTES, "Frame sizes in bytes, by direction");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of non-empty rooms");
    metrics::describe_gauge!(names::USERS_ONLINE, "Current number of online identities");
    metrics::describe_counter!(
        names::DECODE_ERRORS_TOTAL,
        "Inbound frames dropped because they could not be decoded"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a refused handshake.
pub fn record_rejection(reason: &'static str) {
    counter!(names::CONNECTIONS_REJECTED, "reason" => reason).increment(1);
}

/// Record a decoded inbound event.
pub fn record_event(event: &'static str) {
    counter!(names::EVENTS_TOTAL, "event" => event).increment(1);
}

/// Record the size of a frame.
pub fn record_frame(bytes: usize, direction: &'static str) {
    histogram!(names::FRAMES_BYTES, "direction" => direction).record(bytes as f64);
}

/// Record an undecodable inbound frame.
pub fn record_decode_error() {
    counter!(names::DECODE_ERRORS_TOTAL).increment(1);
}

/// Update the occupancy gauges.
pub fn set_relay_stats(stats: &RelayStats) {
    gauge!(names::ROOMS_ACTIVE).set(stats.rooms as f64);
    gauge!(names::USERS_ONLINE).set(stats.users_online as f64);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

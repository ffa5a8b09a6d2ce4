//! Prometheus Metrics Module
//!
//! # Metrics Categories
//!
//! - **Frames**: decoded frames by packet type, rejected frames by reason
//! - **Session**: current state, state transitions, closes, reconnects
//! - **Latency**: per-frame decode time
//!
//! Recording is a no-op until [`init_metrics`] installs the recorder, so the
//! library can be used without an exporter.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::domain::market_data::{DecodeError, PacketType};
use crate::domain::session::{CloseReason, SessionState};

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Errors installing the exporter.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The exporter could not be built or bound.
    #[error("failed to install Prometheus exporter: {0}")]
    Install(#[from] BuildError),
}

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// Must be called from within a Tokio runtime. Calling it again is a no-op
/// and returns the address bound the first time.
///
/// # Errors
///
/// Returns `MetricsError::Install` if the listener cannot be started.
pub fn init_metrics(port: u16) -> Result<SocketAddr, MetricsError> {
    if let Some(addr) = INSTALLED.get() {
        return Ok(*addr);
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    register_metrics();

    Ok(*INSTALLED.get_or_init(|| addr))
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "dhan_feed_frames_received_total",
        "Frames decoded, by packet type"
    );
    describe_counter!(
        "dhan_feed_frames_rejected_total",
        "Frames dropped by the decoder, by reason"
    );

    describe_gauge!(
        "dhan_feed_session_state",
        "Current session state (0 disconnected .. 5 closed)"
    );
    describe_counter!(
        "dhan_feed_state_transitions_total",
        "Session state transitions, by target state"
    );
    describe_counter!("dhan_feed_session_closes_total", "Session closes, by reason");
    describe_counter!(
        "dhan_feed_reconnects_total",
        "Reconnection attempts scheduled"
    );

    describe_histogram!(
        "dhan_feed_decode_seconds",
        "Time to decode one binary frame"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a decoded frame.
pub fn record_frame_received(packet_type: PacketType) {
    counter!(
        "dhan_feed_frames_received_total",
        "packet_type" => packet_type.as_str()
    )
    .increment(1);
}

/// Record a frame the decoder rejected.
pub fn record_frame_rejected(error: &DecodeError) {
    counter!(
        "dhan_feed_frames_rejected_total",
        "reason" => error.as_str()
    )
    .increment(1);
}

/// Record a state transition.
pub fn record_state(state: &SessionState) {
    gauge!("dhan_feed_session_state").set(f64::from(state.ordinal()));
    counter!(
        "dhan_feed_state_transitions_total",
        "state" => state.as_str()
    )
    .increment(1);
}

/// Record a terminal close.
pub fn record_close(reason: &CloseReason) {
    counter!(
        "dhan_feed_session_closes_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!("dhan_feed_reconnects_total").increment(1);
}

/// Record how long a frame took to decode.
pub fn record_decode_duration(duration: Duration) {
    histogram!("dhan_feed_decode_seconds").record(duration.as_secs_f64());
}

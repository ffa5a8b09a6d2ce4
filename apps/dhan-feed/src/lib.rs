#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_possible_truncation
    )
)]

//! Dhan Feed - Binary Market Data Client
//!
//! Keeps one authenticated WebSocket session per [`FeedSession`] to the
//! Dhan live market feed, decodes its fixed-layout little-endian packets
//! and hands typed [`MarketEvent`]s to a caller-supplied [`EventSink`].
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Market data types and session vocabulary
//!   - `market_data`: decoded packets, depth levels, disconnect reasons
//!   - `session`: lifecycle states and close reasons
//!   - `subscription`: instruments, delivery modes, subscription list
//!
//! - **Application**: Port definitions
//!   - `ports`: `EventSink` and the `FeedEvent` stream it receives
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `dhan`: wire codec, auth handshake, WebSocket session
//!   - `config`: environment-driven configuration
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: tracing and OpenTelemetry setup
//!
//! # Data Flow
//!
//! ```text
//!                ┌──────────────┐    ┌───────────────┐    ┌───────────┐
//! Dhan feed WS ─►│ FeedSession  │───►│ PacketDecoder │───►│ EventSink │──► consumer
//!                │ (state, auth,│    │ (header, body,│    └───────────┘
//!                │  subscribe)  │    │  depth block) │
//!                └──────────────┘    └───────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market data types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::market_data::{
    DEPTH_LEVELS, DecodeError, DepthBook, DepthLevel, DisconnectReason, ExchangeSegment,
    MarketEvent, PacketHeader, PacketType,
};
pub use domain::session::{CloseReason, SessionState};
pub use domain::subscription::{Instrument, SubscriptionList, SubscriptionMode};

// Ports
pub use application::ports::{CallbackSink, EventSink, FeedEvent, SinkClosed};

// Dhan adapter
pub use infrastructure::dhan::{
    AuthError, Credentials, DecoderOptions, FeedSession, PacketDecoder, ProtocolVersion,
    ReconnectConfig, ReconnectStrategy, SessionConfig, SessionError, SessionHandle,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, FeedConfig, ReconnectSettings, SessionSettings};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

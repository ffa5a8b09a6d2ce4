//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations behind the application ports: the Dhan
//! socket adapter plus configuration and observability.

/// Dhan WebSocket feed adapter (codec, handshake, session).
pub mod dhan;

/// Configuration loaded from the environment.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;

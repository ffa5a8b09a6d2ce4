//! Domain Layer - Core market data types and session vocabulary.
//!
//! Pure Rust types with serialization support. Nothing in this layer
//! knows about sockets or byte layouts.

/// Decoded market events (ticks, quotes, depth, disconnect notices).
pub mod market_data;

/// Feed session lifecycle states and close reasons.
pub mod session;

/// Instruments, delivery modes and the ordered subscription list.
pub mod subscription;

//! Dhan Live Feed Adapter
//!
//! Binary wire codec, authorization handshake and the WebSocket session
//! that ties them together.
//!
//! # Frame Layout
//!
//! Every binary frame starts with an 8-byte little-endian header:
//!
//! ```text
//! offset  0: u8   packet type
//! offset  1: u16  message length
//! offset  3: u8   exchange segment
//! offset  4: u32  security id
//! ```
//!
//! The packet type fixes the total frame length; bytes past it are ignored.

/// Authorization frame and connection URL.
pub mod auth;

/// Packet decoder and encoder.
pub mod codec;

/// Five-level market depth block.
pub mod depth;

/// JSON subscription requests.
pub mod messages;

/// Backoff policy for reconnecting sessions.
pub mod reconnect;

/// WebSocket session state machine.
pub mod session;

/// Little-endian field layouts.
pub mod wire;

pub use auth::{AuthError, AuthHandshake, Credentials, ProtocolVersion, build_auth_frame};
pub use codec::{DecodeError, DecoderOptions, PacketDecoder, encode_event};
pub use depth::{decode_depth, encode_depth};
pub use messages::SubscriptionRequest;
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy, ReconnectStrategy};
pub use session::{
    DEFAULT_FEED_URL, DesyncDetector, FeedSession, SessionCommand, SessionConfig, SessionEnded,
    SessionError, SessionHandle,
};
pub use wire::{Field, Scalar, WireError, WireReader, WireWriter};

//! Feed Session Lifecycle
//!
//! ```text
//! Disconnected ──connect──► Connecting ──open──► AwaitingAuth (v1 only)
//!                                │                    │
//!                                └──────(v2)──────────┤
//!                                                     ▼
//!                           Streaming ◄──first frame── Subscribing
//!                               │
//!                               └──close / error / desync / disconnect──► Closed(reason)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::market_data::DisconnectReason;

/// Why a session reached its terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// The server sent a disconnect packet.
    ServerDisconnect(DisconnectReason),
    /// Repeated truncated frames of the same size.
    ProtocolDesync {
        /// Length of the repeated short frame.
        frame_len: usize,
        /// Consecutive occurrences observed.
        occurrences: u32,
    },
    /// The server closed the socket or the stream ended.
    SocketClosed,
    /// The socket reported an error.
    SocketError(String),
    /// The caller cancelled the session.
    Cancelled,
    /// The event sink stopped accepting events.
    SinkClosed,
    /// The reconnect strategy gave up.
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl CloseReason {
    /// Whether a reconnect strategy may try again after this close.
    ///
    /// Only transport failures qualify; anything the server or caller
    /// decided is final.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SocketClosed | Self::SocketError(_))
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ServerDisconnect(_) => "server_disconnect",
            Self::ProtocolDesync { .. } => "protocol_desync",
            Self::SocketClosed => "socket_closed",
            Self::SocketError(_) => "socket_error",
            Self::Cancelled => "cancelled",
            Self::SinkClosed => "sink_closed",
            Self::ReconnectExhausted { .. } => "reconnect_exhausted",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerDisconnect(reason) => write!(f, "server disconnect: {reason}"),
            Self::ProtocolDesync {
                frame_len,
                occurrences,
            } => write!(
                f,
                "protocol desync: {occurrences} consecutive truncated frames of {frame_len} bytes"
            ),
            Self::SocketClosed => f.write_str("socket closed"),
            Self::SocketError(e) => write!(f, "socket error: {e}"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::SinkClosed => f.write_str("event sink closed"),
            Self::ReconnectExhausted { attempts } => {
                write!(f, "reconnect gave up after {attempts} attempts")
            }
        }
    }
}

/// Current state of a feed session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No socket.
    #[default]
    Disconnected,
    /// Socket open in progress.
    Connecting,
    /// Socket open, binary handshake being sent.
    AwaitingAuth,
    /// Subscription request sent, waiting for the first frame.
    Subscribing,
    /// Frames are flowing.
    Streaming,
    /// Terminal.
    Closed(CloseReason),
}

impl SessionState {
    /// Whether the session is in its terminal state.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// Whether the socket is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::AwaitingAuth | Self::Subscribing | Self::Streaming
        )
    }

    /// Numeric value exported as a gauge.
    #[must_use]
    pub const fn ordinal(&self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::AwaitingAuth => 2,
            Self::Subscribing => 3,
            Self::Streaming => 4,
            Self::Closed(_) => 5,
        }
    }

    /// State name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingAuth => "awaiting_auth",
            Self::Subscribing => "subscribing",
            Self::Streaming => "streaming",
            Self::Closed(_) => "closed",
        }
    }
}

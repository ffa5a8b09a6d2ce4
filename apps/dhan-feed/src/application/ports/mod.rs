//! Port Interfaces
//!
//! ## Driven Ports (Outbound)
//!
//! - `EventSink`: receives every `FeedEvent` a session produces, in the
//!   order frames arrived on the socket.
//!
//! Two adapters ship with the crate: a bounded or unbounded
//! `tokio::sync::mpsc` sender, and `CallbackSink` for plain closures.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::market_data::{DecodeError, MarketEvent};
use crate::domain::session::{CloseReason, SessionState};

/// Everything a session reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The session moved to a new state.
    StateChanged(SessionState),
    /// A frame decoded successfully.
    Market(MarketEvent),
    /// A frame was dropped; the session keeps running.
    FrameRejected {
        /// Size of the dropped frame.
        frame_len: usize,
        /// Why it was dropped.
        error: DecodeError,
    },
    /// The reconnect strategy is about to try again.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// The session reached its terminal state. Sent exactly once.
    Closed(CloseReason),
}

/// The sink refused an event because its consumer has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event sink closed")]
pub struct SinkClosed;

/// Consumer of session output.
#[async_trait]
pub trait EventSink: Send {
    /// Deliver one event. Returning `SinkClosed` ends the session.
    async fn deliver(&mut self, event: FeedEvent) -> Result<(), SinkClosed>;
}

#[async_trait]
impl EventSink for mpsc::Sender<FeedEvent> {
    async fn deliver(&mut self, event: FeedEvent) -> Result<(), SinkClosed> {
        self.send(event).await.map_err(|_| SinkClosed)
    }
}

#[async_trait]
impl EventSink for mpsc::UnboundedSender<FeedEvent> {
    async fn deliver(&mut self, event: FeedEvent) -> Result<(), SinkClosed> {
        self.send(event).map_err(|_| SinkClosed)
    }
}

/// Sink that hands each event to a closure.
pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: FnMut(FeedEvent) + Send,
{
    /// Wrap a closure.
    pub const fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> std::fmt::Debug for CallbackSink<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> EventSink for CallbackSink<F>
where
    F: FnMut(FeedEvent) + Send,
{
    async fn deliver(&mut self, event: FeedEvent) -> Result<(), SinkClosed> {
        (self.callback)(event);
        Ok(())
    }
}

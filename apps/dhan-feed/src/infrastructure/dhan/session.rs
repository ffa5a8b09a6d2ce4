//! Dhan Feed Session
//!
//! Owns one WebSocket connection to the live feed and drives it through
//! connect, authenticate, subscribe and stream. Every decoded frame is
//! handed to the caller's [`EventSink`] before the next frame is read.
//!
//! # Protocol
//!
//! 1. Open the connection URL (credentials in the query for v2)
//! 2. v1 only: send the 585-byte authorization frame
//! 3. Send the subscription request as a JSON text frame
//! 4. Decode binary frames until the socket closes, the server sends a
//!    disconnect packet, or the caller cancels
//!
//! Frames that fail to decode are reported and skipped. The same short
//! frame length repeating `desync_threshold` times in a row means the
//! stream framing is off, and the session closes.

use std::time::{Duration, Instant};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{EventSink, FeedEvent, SinkClosed};
use crate::domain::session::{CloseReason, SessionState};
use crate::domain::subscription::{Instrument, SubscriptionList, SubscriptionMode};
use crate::infrastructure::metrics;

use super::auth::{AuthError, AuthHandshake, Credentials, ProtocolVersion};
use super::codec::{DecodeError, DecoderOptions, PacketDecoder};
use super::messages::SubscriptionRequest;
use super::reconnect::ReconnectStrategy;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;

/// Production feed endpoint.
pub const DEFAULT_FEED_URL: &str = "wss://api-feed.dhan.co";

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end a session before it starts streaming.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The socket could not be opened in time.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Credentials were rejected locally; no connection was attempted.
    #[error("invalid credentials: {0}")]
    Credentials(#[from] AuthError),

    /// Sending the handshake or subscription failed.
    #[error("WebSocket error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// The subscription request could not be serialized.
    #[error("failed to encode subscription: {0}")]
    SubscriptionEncode(#[from] serde_json::Error),
}

impl SessionError {
    /// Whether a reconnect strategy may retry after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Transport(_))
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Everything a session needs to connect.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Feed base URL.
    pub url: String,
    /// How credentials are presented.
    pub version: ProtocolVersion,
    /// Client id and access token.
    pub credentials: Credentials,
    /// Delivery mode for all subscriptions.
    pub mode: SubscriptionMode,
    /// Instruments subscribed on connect.
    pub instruments: Vec<Instrument>,
    /// Limit for opening the socket.
    pub connect_timeout: Duration,
    /// Time in `Subscribing` before moving to `Streaming` without a frame.
    pub subscribe_timeout: Duration,
    /// Consecutive same-length truncated frames that close the session
    /// (0 disables the check).
    pub desync_threshold: u32,
    /// Decoder options.
    pub decoder: DecoderOptions,
    /// What to do after a transport failure.
    pub reconnect: ReconnectStrategy,
}

impl SessionConfig {
    /// Create a configuration with default endpoint, version and timeouts.
    #[must_use]
    pub fn new(credentials: Credentials, instruments: Vec<Instrument>) -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            version: ProtocolVersion::default(),
            credentials,
            mode: SubscriptionMode::default(),
            instruments,
            connect_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(5),
            desync_threshold: 3,
            decoder: DecoderOptions::default(),
            reconnect: ReconnectStrategy::default(),
        }
    }

    /// Use a different endpoint.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Use a different protocol version.
    #[must_use]
    pub const fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Use a different delivery mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: SubscriptionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use a reconnect strategy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectStrategy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Runtime request sent to a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Add instruments.
    Subscribe(Vec<Instrument>),
    /// Remove instruments.
    Unsubscribe(Vec<Instrument>),
}

/// The session has finished and no longer accepts commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session has ended")]
pub struct SessionEnded;

/// Controls a session from other tasks.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Add instruments to the subscription.
    ///
    /// # Errors
    ///
    /// Returns `SessionEnded` if the session is gone.
    pub fn subscribe(&self, instruments: Vec<Instrument>) -> Result<(), SessionEnded> {
        self.commands
            .send(SessionCommand::Subscribe(instruments))
            .map_err(|_| SessionEnded)
    }

    /// Remove instruments from the subscription.
    ///
    /// # Errors
    ///
    /// Returns `SessionEnded` if the session is gone.
    pub fn unsubscribe(&self, instruments: Vec<Instrument>) -> Result<(), SessionEnded> {
        self.commands
            .send(SessionCommand::Unsubscribe(instruments))
            .map_err(|_| SessionEnded)
    }

    /// Close the session. It ends with `CloseReason::Cancelled`.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels the session.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

// =============================================================================
// Desync Detection
// =============================================================================

/// Counts consecutive truncated frames of one length.
#[derive(Debug, Clone, Default)]
pub struct DesyncDetector {
    threshold: u32,
    frame_len: Option<usize>,
    occurrences: u32,
}

impl DesyncDetector {
    /// Create a detector; `threshold` 0 never trips.
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            threshold,
            frame_len: None,
            occurrences: 0,
        }
    }

    /// Record a truncated frame, returning the run length once it reaches
    /// the threshold.
    pub fn observe(&mut self, frame_len: usize) -> Option<u32> {
        if self.frame_len == Some(frame_len) {
            self.occurrences = self.occurrences.saturating_add(1);
        } else {
            self.frame_len = Some(frame_len);
            self.occurrences = 1;
        }

        (self.threshold > 0 && self.occurrences >= self.threshold).then_some(self.occurrences)
    }

    /// Break the current run.
    pub const fn reset(&mut self) {
        self.frame_len = None;
        self.occurrences = 0;
    }
}

// =============================================================================
// Session
// =============================================================================

enum Stop {
    Closed(CloseReason),
    Failed(SessionError),
}

impl From<SinkClosed> for Stop {
    fn from(_: SinkClosed) -> Self {
        Self::Closed(CloseReason::SinkClosed)
    }
}

impl From<SessionError> for Stop {
    fn from(err: SessionError) -> Self {
        Self::Failed(err)
    }
}

/// A single feed connection and its state machine.
///
/// Sessions are independent values; any number can run side by side.
#[derive(Debug)]
pub struct FeedSession {
    config: SessionConfig,
    decoder: PacketDecoder,
    subscriptions: SubscriptionList,
    state: SessionState,
    received_frame: bool,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    commands_open: bool,
    cancel: CancellationToken,
}

impl FeedSession {
    /// Create a session and its control handle.
    #[must_use]
    pub fn new(config: SessionConfig) -> (Self, SessionHandle) {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Create a session cancelled by `cancel`.
    #[must_use]
    pub fn with_cancellation(
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            decoder: PacketDecoder::new(config.decoder),
            subscriptions: config.instruments.iter().cloned().collect(),
            config,
            state: SessionState::Disconnected,
            received_frame: false,
            commands: rx,
            commands_open: true,
            cancel: cancel.clone(),
        };
        let handle = SessionHandle {
            commands: tx,
            cancel,
        };
        (session, handle)
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Subscribed instruments.
    #[must_use]
    pub const fn subscriptions(&self) -> &SubscriptionList {
        &self.subscriptions
    }

    /// Run the session until it closes.
    ///
    /// Returns the close reason, which is also the last event delivered to
    /// `sink`.
    ///
    /// # Errors
    ///
    /// - `SessionError::Credentials` before any connection attempt.
    /// - `SessionError::Connection` / `Transport` if setting up the
    ///   connection fails and no reconnect is configured.
    /// - `SessionError::SubscriptionEncode` if the request cannot be built.
    ///
    /// On error the session is back in `Disconnected`.
    pub async fn run<S: EventSink>(mut self, mut sink: S) -> Result<CloseReason, SessionError> {
        let handshake = AuthHandshake::prepare(
            &self.config.url,
            self.config.version,
            &self.config.credentials,
        )?;
        let mut policy = self.config.reconnect.policy();

        loop {
            self.received_frame = false;
            let outcome = match self.connect_and_stream(&handshake, &mut sink).await {
                Ok(reason) | Err(Stop::Closed(reason)) => Ok(reason),
                Err(Stop::Failed(err)) => Err(err),
            };

            let retryable = match &outcome {
                Ok(reason) => reason.is_retryable(),
                Err(err) => err.is_retryable(),
            };

            let Some(policy) = policy.as_mut().filter(|_| retryable) else {
                return match outcome {
                    Ok(reason) => Ok(self.finish(reason, &mut sink).await),
                    Err(err) => {
                        tracing::error!(error = %err, "Feed session failed");
                        // The sink only learns about the state; the error is returned.
                        let _ = self.transition(SessionState::Disconnected, &mut sink).await;
                        Err(err)
                    }
                };
            };

            match &outcome {
                Ok(reason) => tracing::warn!(reason = %reason, "Feed connection lost"),
                Err(err) => tracing::warn!(error = %err, "Feed connection failed"),
            }

            // Only a connection that delivered data counts as healthy.
            if self.received_frame {
                policy.reset();
            }

            let Some(delay) = policy.next_delay() else {
                let attempts = policy.attempt_count();
                return Ok(self
                    .finish(CloseReason::ReconnectExhausted { attempts }, &mut sink)
                    .await);
            };
            let attempt = policy.attempt_count();

            tracing::info!(
                attempt,
                delay_ms = delay.as_millis(),
                "Reconnecting to Dhan feed"
            );
            metrics::record_reconnect();

            if self
                .transition(SessionState::Disconnected, &mut sink)
                .await
                .is_err()
                || sink
                    .deliver(FeedEvent::Reconnecting { attempt, delay })
                    .await
                    .is_err()
            {
                return Ok(self.finish(CloseReason::SinkClosed, &mut sink).await);
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Feed session cancelled during reconnect delay");
                    return Ok(self.finish(CloseReason::Cancelled, &mut sink).await);
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn finish<S: EventSink>(&mut self, reason: CloseReason, sink: &mut S) -> CloseReason {
        tracing::info!(reason = %reason, "Feed session closed");
        metrics::record_close(&reason);

        // A closed sink cannot be told about its own closure.
        let _ = self
            .transition(SessionState::Closed(reason.clone()), sink)
            .await;
        let _ = sink.deliver(FeedEvent::Closed(reason.clone())).await;
        reason
    }

    async fn transition<S: EventSink>(
        &mut self,
        state: SessionState,
        sink: &mut S,
    ) -> Result<(), SinkClosed> {
        tracing::debug!(from = self.state.as_str(), to = state.as_str(), "Session state change");
        metrics::record_state(&state);
        self.state = state.clone();
        sink.deliver(FeedEvent::StateChanged(state)).await
    }

    /// One connection: open, authenticate, subscribe, then stream.
    async fn connect_and_stream<S: EventSink>(
        &mut self,
        handshake: &AuthHandshake,
        sink: &mut S,
    ) -> Result<CloseReason, Stop> {
        if self.cancel.is_cancelled() {
            return Ok(CloseReason::Cancelled);
        }

        self.transition(SessionState::Connecting, sink).await?;
        tracing::info!(
            version = %handshake.version(),
            instruments = self.subscriptions.len(),
            "Connecting to Dhan feed"
        );

        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(handshake.url()),
        );
        let ws_stream = tokio::select! {
            () = self.cancel.cancelled() => return Ok(CloseReason::Cancelled),
            result = connect => match result {
                Ok(Ok((ws_stream, _response))) => ws_stream,
                Ok(Err(e)) => return Err(SessionError::Connection(e.to_string()).into()),
                Err(_) => {
                    return Err(SessionError::Connection(format!(
                        "timed out after {:?}",
                        self.config.connect_timeout
                    ))
                    .into());
                }
            },
        };

        let (mut write, mut read) = ws_stream.split();

        if let Some(frame) = handshake.frame() {
            self.transition(SessionState::AwaitingAuth, sink).await?;
            write
                .send(Message::Binary(frame.to_vec().into()))
                .await
                .map_err(SessionError::from)?;
            tracing::debug!(bytes = frame.len(), "Sent authorization frame");
        }

        if !self.subscriptions.is_empty() {
            let request =
                SubscriptionRequest::subscribe(self.config.mode, self.subscriptions.as_slice());
            let json = request.to_json().map_err(SessionError::from)?;
            write
                .send(Message::Text(json.into()))
                .await
                .map_err(SessionError::from)?;
            tracing::info!(
                mode = self.config.mode.as_str(),
                instruments = request.instrument_count,
                "Subscription requested"
            );
        }
        self.transition(SessionState::Subscribing, sink).await?;

        let subscribe_deadline = tokio::time::sleep(self.config.subscribe_timeout);
        tokio::pin!(subscribe_deadline);
        let mut desync = DesyncDetector::new(self.config.desync_threshold);

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!(error = %e, "Close frame not sent");
                    }
                    return Ok(CloseReason::Cancelled);
                }
                () = &mut subscribe_deadline, if self.state == SessionState::Subscribing => {
                    tracing::debug!("No frame before subscribe timeout, assuming streaming");
                    self.transition(SessionState::Streaming, sink).await?;
                }
                command = self.commands.recv(), if self.commands_open => {
                    match command {
                        Some(command) => {
                            if let Err(e) = self.apply_command(command, &mut write).await {
                                return Ok(e);
                            }
                        }
                        None => self.commands_open = false,
                    }
                }
                message = read.next() => {
                    match message {
                        Some(Ok(Message::Binary(data))) => {
                            if let Some(reason) = self.handle_frame(&data, &mut desync, sink).await? {
                                return Ok(reason);
                            }
                        }
                        Some(Ok(Message::Text(text))) => {
                            tracing::debug!(text = text.as_str(), "Ignoring text frame");
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return Ok(CloseReason::SocketError(e.to_string()));
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Server sent close frame");
                            return Ok(CloseReason::SocketClosed);
                        }
                        Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                        Some(Err(e)) => {
                            return Ok(CloseReason::SocketError(e.to_string()));
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Ok(CloseReason::SocketClosed);
                        }
                    }
                }
            }
        }
    }

    /// Decode one frame and forward the result.
    ///
    /// Returns a close reason when the frame ends the session.
    async fn handle_frame<S: EventSink>(
        &mut self,
        frame: &[u8],
        desync: &mut DesyncDetector,
        sink: &mut S,
    ) -> Result<Option<CloseReason>, Stop> {
        let started = Instant::now();
        let decoded = self.decoder.decode(frame);
        metrics::record_decode_duration(started.elapsed());

        match decoded {
            Ok(event) => {
                desync.reset();
                self.received_frame = true;
                metrics::record_frame_received(event.packet_type());

                if self.state == SessionState::Subscribing {
                    self.transition(SessionState::Streaming, sink).await?;
                }

                let disconnect = event.disconnect_reason();
                sink.deliver(FeedEvent::Market(event)).await?;

                Ok(disconnect.map(|reason| {
                    tracing::warn!(reason = %reason, "Server disconnected the feed");
                    CloseReason::ServerDisconnect(reason)
                }))
            }
            Err(error) => {
                let frame_len = frame.len();
                tracing::warn!(frame_len, error = %error, "Dropping undecodable frame");
                metrics::record_frame_rejected(&error);
                sink.deliver(FeedEvent::FrameRejected { frame_len, error })
                    .await?;

                if !matches!(error, DecodeError::TruncatedFrame { .. }) {
                    desync.reset();
                    return Ok(None);
                }

                Ok(desync.observe(frame_len).map(|occurrences| {
                    tracing::error!(frame_len, occurrences, "Frame boundaries lost");
                    CloseReason::ProtocolDesync {
                        frame_len,
                        occurrences,
                    }
                }))
            }
        }
    }

    /// Apply a runtime subscription change, sending the delta.
    ///
    /// The local list only changes once the request has been sent.
    async fn apply_command(
        &mut self,
        command: SessionCommand,
        write: &mut WsWrite,
    ) -> Result<(), CloseReason> {
        let Some((next, request)) = plan_command(&self.subscriptions, self.config.mode, command)
        else {
            return Ok(());
        };

        let json = match request.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode subscription change");
                return Ok(());
            }
        };

        tracing::info!(
            request_code = request.request_code,
            instruments = request.instrument_count,
            "Updating subscription"
        );
        write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| CloseReason::SocketError(e.to_string()))?;

        self.subscriptions = next;
        Ok(())
    }
}

/// Work out the list after `command` and the request that announces it.
///
/// Returns `None` when the command changes nothing. `current` is left
/// untouched so the caller can commit once the request is on the wire.
fn plan_command(
    current: &SubscriptionList,
    mode: SubscriptionMode,
    command: SessionCommand,
) -> Option<(SubscriptionList, SubscriptionRequest)> {
    let mut next = current.clone();
    let request = match command {
        SessionCommand::Subscribe(instruments) => {
            let added = next.add(instruments);
            (!added.is_empty()).then(|| SubscriptionRequest::subscribe(mode, &added))
        }
        SessionCommand::Unsubscribe(instruments) => {
            let removed = next.remove(&instruments);
            (!removed.is_empty()).then(|| SubscriptionRequest::unsubscribe(mode, &removed))
        }
    }?;
    Some((next, request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market_data::ExchangeSegment;

    fn config() -> SessionConfig {
        let credentials = Credentials::new("100042", "token").unwrap();
        SessionConfig::new(
            credentials,
            vec![Instrument::new(ExchangeSegment::NseEquity, "11536")],
        )
    }

    #[test]
    fn planned_change_leaves_current_list_alone() {
        let current: SubscriptionList =
            vec![Instrument::new(ExchangeSegment::NseEquity, "11536")].into_iter().collect();
        let fno = Instrument::new(ExchangeSegment::NseFno, "49081");

        let (next, request) = plan_command(
            &current,
            SubscriptionMode::Quote,
            SessionCommand::Subscribe(vec![fno.clone()]),
        )
        .unwrap();

        assert_eq!(current.len(), 1);
        assert!(!current.contains(&fno));
        assert!(next.contains(&fno));
        assert_eq!(request.request_code, 17);
        assert_eq!(request.instrument_count, 1);
    }

    #[test]
    fn planned_no_op_change_sends_nothing() {
        let equity = Instrument::new(ExchangeSegment::NseEquity, "11536");
        let current: SubscriptionList = vec![equity.clone()].into_iter().collect();

        assert!(plan_command(
            &current,
            SubscriptionMode::Full,
            SessionCommand::Subscribe(vec![equity]),
        )
        .is_none());
        assert!(plan_command(
            &current,
            SubscriptionMode::Full,
            SessionCommand::Unsubscribe(vec![Instrument::new(ExchangeSegment::BseEquity, "500325")]),
        )
        .is_none());
    }

    #[test]
    fn planned_unsubscribe_uses_unsubscribe_code() {
        let equity = Instrument::new(ExchangeSegment::NseEquity, "11536");
        let current: SubscriptionList = vec![equity.clone()].into_iter().collect();

        let (next, request) = plan_command(
            &current,
            SubscriptionMode::Ticker,
            SessionCommand::Unsubscribe(vec![equity.clone()]),
        )
        .unwrap();

        assert!(current.contains(&equity));
        assert!(next.is_empty());
        assert_eq!(request.request_code, 16);
    }

    #[test]
    fn desync_trips_on_repeated_length() {
        let mut detector = DesyncDetector::new(3);
        assert_eq!(detector.observe(12), None);
        assert_eq!(detector.observe(12), None);
        assert_eq!(detector.observe(12), Some(3));
    }

    #[test]
    fn desync_run_breaks_on_new_length_or_reset() {
        let mut detector = DesyncDetector::new(2);
        assert_eq!(detector.observe(12), None);
        assert_eq!(detector.observe(9), None);
        detector.reset();
        assert_eq!(detector.observe(9), None);
        assert_eq!(detector.observe(9), Some(2));
    }

    #[test]
    fn desync_threshold_zero_disables() {
        let mut detector = DesyncDetector::new(0);
        for _ in 0..10 {
            assert_eq!(detector.observe(4), None);
        }
    }

    #[test]
    fn config_defaults() {
        let config = config();
        assert_eq!(config.url, DEFAULT_FEED_URL);
        assert_eq!(config.version, ProtocolVersion::V2);
        assert_eq!(config.mode, SubscriptionMode::Full);
        assert_eq!(config.desync_threshold, 3);
        assert_eq!(config.reconnect, ReconnectStrategy::Never);
    }

    #[test]
    fn new_session_starts_disconnected() {
        let (session, _handle) = FeedSession::new(config());
        assert_eq!(session.state(), &SessionState::Disconnected);
        assert_eq!(session.subscriptions().len(), 1);
    }

    #[test]
    fn handle_reports_ended_session() {
        let (session, handle) = FeedSession::new(config());
        drop(session);
        assert_eq!(handle.subscribe(vec![]), Err(SessionEnded));
    }

    #[test]
    fn error_retryability() {
        assert!(SessionError::Connection("refused".to_string()).is_retryable());
        assert!(
            !SessionError::Credentials(AuthError::EmptyCredential { field: "client id" })
                .is_retryable()
        );
    }

    #[tokio::test]
    async fn oversize_credentials_fail_before_connecting() {
        let credentials = Credentials::new("c".repeat(31), "token").unwrap();
        let config = SessionConfig::new(credentials, vec![])
            .with_url("ws://127.0.0.1:9")
            .with_version(ProtocolVersion::V1);
        let (session, _handle) = FeedSession::new(config);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = session.run(tx).await;
        assert!(matches!(
            result,
            Err(SessionError::Credentials(AuthError::CredentialTooLong {
                max: 30,
                actual: 31,
                ..
            }))
        ));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_before_start_closes_cancelled() {
        let (session, handle) = FeedSession::new(config().with_url("ws://127.0.0.1:9"));
        handle.shutdown();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let reason = session.run(tx).await.unwrap();
        assert_eq!(reason, CloseReason::Cancelled);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events.last(),
            Some(&FeedEvent::Closed(CloseReason::Cancelled))
        );
    }
}

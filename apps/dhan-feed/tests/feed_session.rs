//! Feed Session Integration Tests
//!
//! Runs sessions against an in-process WebSocket server that speaks the
//! Dhan binary protocol.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use dhan_feed::domain::market_data::{DisconnectPacket, TickerPacket};
use dhan_feed::infrastructure::dhan::encode_event;
use dhan_feed::infrastructure::dhan::messages::SubscriptionRequest;
use dhan_feed::{
    AuthError, CloseReason, Credentials, DecodeError, DisconnectReason, ExchangeSegment,
    FeedEvent, FeedSession, Instrument, MarketEvent, PacketHeader, ProtocolVersion,
    ReconnectConfig, ReconnectStrategy, SessionConfig, SessionError, SessionState,
    SubscriptionMode,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const CLIENT_ID: &str = "1000000001";

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("ws://{addr}/"))
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

/// Next text or binary message, skipping control frames.
async fn next_data(ws: &mut WebSocketStream<TcpStream>) -> Message {
    loop {
        let message = timeout(TEST_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for client")
            .expect("client went away")
            .unwrap();
        if message.is_text() || message.is_binary() || message.is_close() {
            return message;
        }
    }
}

async fn next_request(ws: &mut WebSocketStream<TcpStream>) -> SubscriptionRequest {
    let message = next_data(ws).await;
    serde_json::from_str(message.to_text().unwrap()).unwrap()
}

/// Read until the client drops the connection.
async fn drain(mut ws: WebSocketStream<TcpStream>) {
    while let Ok(Some(Ok(_))) = timeout(TEST_TIMEOUT, ws.next()).await {}
}

fn header(packet_type: u8, message_length: u16, security_id: u32) -> PacketHeader {
    PacketHeader {
        packet_type,
        message_length,
        exchange_segment: ExchangeSegment::NseEquity.code(),
        security_id,
    }
}

fn ticker(security_id: u32, price: f32) -> MarketEvent {
    MarketEvent::Ticker(TickerPacket {
        header: header(2, 16, security_id),
        last_traded_price: price,
        last_traded_time: 1_000,
    })
}

fn disconnect(code: u16) -> MarketEvent {
    MarketEvent::Disconnect(DisconnectPacket {
        header: header(50, 10, 0),
        reason: DisconnectReason::from_code(code),
    })
}

fn frame(event: &MarketEvent) -> Message {
    Message::binary(encode_event(event))
}

fn config(url: &str) -> SessionConfig {
    let credentials = Credentials::new(CLIENT_ID, "test-token").unwrap();
    SessionConfig::new(
        credentials,
        vec![Instrument::new(ExchangeSegment::NseEquity, "11536")],
    )
    .with_url(url)
    .with_mode(SubscriptionMode::Ticker)
}

async fn run_to_end(session: FeedSession) -> (Result<CloseReason, SessionError>, Vec<FeedEvent>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = timeout(TEST_TIMEOUT, session.run(tx)).await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (result, events)
}

fn states(events: &[FeedEvent]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|event| match event {
            FeedEvent::StateChanged(state) => Some(state.clone()),
            _ => None,
        })
        .collect()
}

fn market(events: &[FeedEvent]) -> Vec<MarketEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            FeedEvent::Market(market) => Some(*market),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Handshake
// =============================================================================

#[tokio::test]
async fn v1_sends_auth_frame_before_subscription() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let auth = next_data(&mut ws).await;
        let request = next_request(&mut ws).await;
        ws.send(frame(&ticker(11536, 101.5))).await.unwrap();
        ws.close(None).await.unwrap();
        (auth.into_data(), request)
    });

    let (session, _handle) = FeedSession::new(config(&url).with_version(ProtocolVersion::V1));
    let (result, events) = run_to_end(session).await;
    let (auth, request) = server.await.unwrap();

    assert_eq!(auth.len(), 585);
    assert_eq!(auth[0], 11);
    assert_eq!(u16::from_le_bytes([auth[1], auth[2]]), 585);
    assert_eq!(&auth[3..3 + CLIENT_ID.len()], CLIENT_ID.as_bytes());
    assert_eq!(&auth[583..], b"2P");

    assert_eq!(request.request_code, 15);
    assert_eq!(request.instrument_count, 1);
    assert_eq!(request.instrument_list[0].security_id, "11536");

    assert_eq!(result.unwrap(), CloseReason::SocketClosed);
    assert_eq!(
        states(&events),
        vec![
            SessionState::Connecting,
            SessionState::AwaitingAuth,
            SessionState::Subscribing,
            SessionState::Streaming,
            SessionState::Closed(CloseReason::SocketClosed),
        ]
    );
    assert_eq!(market(&events), vec![ticker(11536, 101.5)]);
    assert_eq!(
        events.last(),
        Some(&FeedEvent::Closed(CloseReason::SocketClosed))
    );
}

#[tokio::test]
async fn v2_puts_credentials_in_url_and_skips_auth_frame() {
    let (listener, url) = bind().await;
    let (uri_tx, uri_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let capture_uri = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let _ = uri_tx.send(req.uri().to_string());
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, capture_uri)
            .await
            .unwrap();
        let first = next_data(&mut ws).await;
        ws.send(frame(&disconnect(807))).await.unwrap();
        drain(ws).await;
        first
    });

    let (session, _handle) = FeedSession::new(config(&url));
    let (result, events) = run_to_end(session).await;
    let first = server.await.unwrap();
    let uri = uri_rx.await.unwrap();

    assert!(uri.contains("version=2"), "{uri}");
    assert!(uri.contains("token=test-token"), "{uri}");
    assert!(uri.contains(&format!("clientId={CLIENT_ID}")), "{uri}");
    assert!(uri.contains("authType=2"), "{uri}");
    assert!(first.is_text(), "first client frame was {first:?}");

    let reason = CloseReason::ServerDisconnect(DisconnectReason::TokenExpired);
    assert_eq!(result.unwrap(), reason);
    assert!(!states(&events).contains(&SessionState::AwaitingAuth));
    assert_eq!(events.last(), Some(&FeedEvent::Closed(reason)));
}

#[tokio::test]
async fn oversize_client_id_never_connects() {
    let credentials = Credentials::new("9".repeat(31), "test-token").unwrap();
    let config = SessionConfig::new(credentials, vec![])
        .with_url("ws://127.0.0.1:9/")
        .with_version(ProtocolVersion::V1);
    let (session, _handle) = FeedSession::new(config);

    let (result, events) = run_to_end(session).await;

    assert!(matches!(
        result,
        Err(SessionError::Credentials(AuthError::CredentialTooLong {
            max: 30,
            actual: 31,
            ..
        }))
    ));
    assert!(events.is_empty());
}

#[tokio::test]
async fn refused_connection_returns_error() {
    let (listener, url) = bind().await;
    drop(listener);

    let (session, _handle) = FeedSession::new(config(&url));
    let (result, events) = run_to_end(session).await;

    assert!(matches!(result, Err(SessionError::Connection(_))));
    assert_eq!(
        states(&events),
        vec![SessionState::Connecting, SessionState::Disconnected]
    );
    assert!(!events.iter().any(|e| matches!(e, FeedEvent::Closed(_))));
}

#[tokio::test]
async fn stalled_handshake_times_out() {
    let (listener, url) = bind().await;

    // Accept the TCP connection but never answer the upgrade request.
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(TEST_TIMEOUT).await;
        drop(stream);
    });

    let mut config = config(&url);
    config.connect_timeout = Duration::from_millis(100);
    let (session, _handle) = FeedSession::new(config);
    let (result, events) = run_to_end(session).await;
    server.abort();

    match result {
        Err(SessionError::Connection(message)) => {
            assert!(message.contains("timed out"), "{message}");
        }
        other => panic!("expected connection timeout, got {other:?}"),
    }
    assert_eq!(
        states(&events),
        vec![SessionState::Connecting, SessionState::Disconnected]
    );
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn quiet_subscription_moves_to_streaming_after_timeout() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        next_request(&mut ws).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        ws.send(frame(&ticker(11536, 88.0))).await.unwrap();
        ws.send(frame(&disconnect(807))).await.unwrap();
        drain(ws).await;
    });

    let mut config = config(&url);
    config.subscribe_timeout = Duration::from_millis(50);
    let (session, _handle) = FeedSession::new(config);
    let (result, events) = run_to_end(session).await;
    server.await.unwrap();

    let reason = CloseReason::ServerDisconnect(DisconnectReason::TokenExpired);
    assert_eq!(result.unwrap(), reason.clone());
    assert_eq!(
        states(&events),
        vec![
            SessionState::Connecting,
            SessionState::Subscribing,
            SessionState::Streaming,
            SessionState::Closed(reason),
        ]
    );

    let streaming = events
        .iter()
        .position(|e| *e == FeedEvent::StateChanged(SessionState::Streaming))
        .unwrap();
    let first_market = events
        .iter()
        .position(|e| matches!(e, FeedEvent::Market(_)))
        .unwrap();
    assert!(streaming < first_market);
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        next_request(&mut ws).await;
        ws.send(Message::Ping(b"hb".to_vec().into())).await.unwrap();

        let pong = loop {
            let message = timeout(TEST_TIMEOUT, ws.next())
                .await
                .expect("timed out waiting for pong")
                .expect("client went away")
                .unwrap();
            if let Message::Pong(payload) = message {
                break payload.to_vec();
            }
        };

        ws.send(frame(&disconnect(807))).await.unwrap();
        drain(ws).await;
        pong
    });

    let (session, _handle) = FeedSession::new(config(&url));
    let (result, events) = run_to_end(session).await;
    let pong = server.await.unwrap();

    assert_eq!(pong, b"hb".to_vec());
    assert_eq!(
        result.unwrap(),
        CloseReason::ServerDisconnect(DisconnectReason::TokenExpired)
    );
    assert!(!events.iter().any(|e| matches!(e, FeedEvent::FrameRejected { .. })));
}

#[tokio::test]
async fn stray_text_frame_is_ignored() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        next_request(&mut ws).await;
        ws.send(Message::text(r#"{"status":"ok"}"#)).await.unwrap();
        ws.send(frame(&ticker(11536, 42.5))).await.unwrap();
        ws.send(frame(&disconnect(807))).await.unwrap();
        drain(ws).await;
    });

    let (session, _handle) = FeedSession::new(config(&url));
    let (result, events) = run_to_end(session).await;
    server.await.unwrap();

    assert!(!events.iter().any(|e| matches!(e, FeedEvent::FrameRejected { .. })));
    assert_eq!(
        market(&events),
        vec![ticker(11536, 42.5), disconnect(807)]
    );
    assert_eq!(
        result.unwrap(),
        CloseReason::ServerDisconnect(DisconnectReason::TokenExpired)
    );
}

#[tokio::test]
async fn bad_frames_are_reported_and_skipped() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        next_request(&mut ws).await;

        let mut unknown = vec![0_u8; 16];
        unknown[0] = 99;
        ws.send(Message::binary(unknown)).await.unwrap();
        ws.send(Message::binary(vec![2_u8, 16, 0])).await.unwrap();
        ws.send(frame(&ticker(11536, 99.25))).await.unwrap();
        ws.send(frame(&disconnect(805))).await.unwrap();
        drain(ws).await;
    });

    let (session, _handle) = FeedSession::new(config(&url));
    let (result, events) = run_to_end(session).await;
    server.await.unwrap();

    let rejected: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            FeedEvent::FrameRejected { frame_len, error } => Some((*frame_len, *error)),
            _ => None,
        })
        .collect();
    assert_eq!(
        rejected,
        vec![
            (16, DecodeError::UnknownPacketType(99)),
            (
                3,
                DecodeError::TruncatedFrame {
                    packet_type: None,
                    needed: 8,
                    actual: 3,
                }
            ),
        ]
    );
    assert_eq!(
        market(&events),
        vec![ticker(11536, 99.25), disconnect(805)]
    );
    assert_eq!(
        result.unwrap(),
        CloseReason::ServerDisconnect(DisconnectReason::ConnectionLimitExceeded)
    );
}

#[tokio::test]
async fn repeated_short_frames_close_with_desync() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        next_request(&mut ws).await;
        let short = encode_event(&ticker(11536, 1.0))[..12].to_vec();
        for _ in 0..3 {
            ws.send(Message::binary(short.clone())).await.unwrap();
        }
        drain(ws).await;
    });

    let (session, _handle) = FeedSession::new(config(&url));
    let (result, events) = run_to_end(session).await;
    server.await.unwrap();

    let reason = CloseReason::ProtocolDesync {
        frame_len: 12,
        occurrences: 3,
    };
    assert_eq!(result.unwrap(), reason);
    let rejected = events
        .iter()
        .filter(|e| matches!(e, FeedEvent::FrameRejected { .. }))
        .count();
    assert_eq!(rejected, 3);
    assert_eq!(events.last(), Some(&FeedEvent::Closed(reason)));
}

#[tokio::test]
async fn dropped_sink_ends_session() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        next_request(&mut ws).await;
        // Keep ticking until the client hangs up.
        while ws.send(frame(&ticker(11536, 1.0))).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    let (session, _handle) = FeedSession::new(config(&url));
    let (tx, mut rx) = mpsc::channel(16);
    let task = tokio::spawn(session.run(tx));

    // Stop listening once the session is connected.
    while let Some(event) = rx.recv().await {
        if event == FeedEvent::StateChanged(SessionState::Subscribing) {
            break;
        }
    }
    drop(rx);

    let result = timeout(TEST_TIMEOUT, task).await.unwrap().unwrap();
    assert_eq!(result.unwrap(), CloseReason::SinkClosed);
    server.await.unwrap();
}

// =============================================================================
// Control
// =============================================================================

#[tokio::test]
async fn shutdown_sends_close_and_reports_cancelled() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        next_request(&mut ws).await;
        next_data(&mut ws).await
    });

    let (session, handle) = FeedSession::new(config(&url));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(session.run(tx));

    while let Some(event) = rx.recv().await {
        if event == FeedEvent::StateChanged(SessionState::Subscribing) {
            break;
        }
    }
    handle.shutdown();

    let result = timeout(TEST_TIMEOUT, task).await.unwrap().unwrap();
    assert_eq!(result.unwrap(), CloseReason::Cancelled);
    assert!(server.await.unwrap().is_close());

    let mut rest = Vec::new();
    while let Some(event) = rx.recv().await {
        rest.push(event);
    }
    assert_eq!(rest.last(), Some(&FeedEvent::Closed(CloseReason::Cancelled)));
}

#[tokio::test]
async fn runtime_subscription_changes_send_deltas() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let initial = next_request(&mut ws).await;
        let added = next_request(&mut ws).await;
        let removed = next_request(&mut ws).await;
        drain(ws).await;
        (initial, added, removed)
    });

    let (session, handle) = FeedSession::new(config(&url));
    let (tx, _rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(session.run(tx));

    handle
        .subscribe(vec![
            Instrument::new(ExchangeSegment::NseEquity, "11536"),
            Instrument::new(ExchangeSegment::NseFno, "49081"),
        ])
        .unwrap();
    handle
        .unsubscribe(vec![Instrument::new(ExchangeSegment::NseEquity, "11536")])
        .unwrap();

    let server_task = async {
        // Give the session time to send both deltas before closing.
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown();
        server.await.unwrap()
    };
    let (initial, added, removed) = timeout(TEST_TIMEOUT, server_task).await.unwrap();
    let result = timeout(TEST_TIMEOUT, task).await.unwrap().unwrap();

    assert_eq!(initial.instrument_count, 1);

    assert_eq!(added.request_code, 15);
    assert_eq!(added.instrument_count, 1);
    assert_eq!(added.instrument_list[0].security_id, "49081");
    assert_eq!(added.instrument_list[0].exchange_segment, ExchangeSegment::NseFno);

    assert_eq!(removed.request_code, 16);
    assert_eq!(removed.instrument_list[0].security_id, "11536");

    assert_eq!(result.unwrap(), CloseReason::Cancelled);
}

#[tokio::test]
async fn reconnects_after_socket_close() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        next_request(&mut first).await;
        first.close(None).await.unwrap();
        drop(first);

        let mut second = accept(&listener).await;
        next_request(&mut second).await;
        second.send(frame(&ticker(11536, 250.0))).await.unwrap();
        second.send(frame(&disconnect(807))).await.unwrap();
        drain(second).await;
    });

    let backoff = ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        jitter_factor: 0.0,
        max_attempts: 3,
        ..ReconnectConfig::default()
    };
    let (session, _handle) =
        FeedSession::new(config(&url).with_reconnect(ReconnectStrategy::Backoff(backoff)));
    let (result, events) = run_to_end(session).await;
    server.await.unwrap();

    assert!(events.contains(&FeedEvent::Reconnecting {
        attempt: 1,
        delay: Duration::from_millis(10),
    }));
    assert_eq!(market(&events)[0], ticker(11536, 250.0));
    assert_eq!(
        result.unwrap(),
        CloseReason::ServerDisconnect(DisconnectReason::TokenExpired)
    );
    let closes = events
        .iter()
        .filter(|e| matches!(e, FeedEvent::Closed(_)))
        .count();
    assert_eq!(closes, 1);
}

#[tokio::test]
async fn reconnect_gives_up_after_max_attempts() {
    let (listener, url) = bind().await;
    drop(listener);

    let backoff = ReconnectConfig {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        jitter_factor: 0.0,
        max_attempts: 2,
        ..ReconnectConfig::default()
    };
    let (session, _handle) =
        FeedSession::new(config(&url).with_reconnect(ReconnectStrategy::Backoff(backoff)));
    let (result, events) = run_to_end(session).await;

    assert_eq!(
        result.unwrap(),
        CloseReason::ReconnectExhausted { attempts: 2 }
    );
    let attempts = events
        .iter()
        .filter(|e| matches!(e, FeedEvent::Reconnecting { .. }))
        .count();
    assert_eq!(attempts, 2);
}

#[tokio::test]
async fn silent_connections_still_use_up_attempts() {
    let (listener, url) = bind().await;
    let connections = Arc::new(AtomicUsize::new(0));

    // Every connection subscribes, hears nothing, then gets closed.
    let counter = Arc::clone(&connections);
    let server = tokio::spawn(async move {
        loop {
            let mut ws = accept(&listener).await;
            counter.fetch_add(1, Ordering::SeqCst);
            next_request(&mut ws).await;
            tokio::time::sleep(Duration::from_millis(40)).await;
            let _ = ws.close(None).await;
        }
    });

    let backoff = ReconnectConfig {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        jitter_factor: 0.0,
        max_attempts: 2,
        ..ReconnectConfig::default()
    };
    let mut config = config(&url).with_reconnect(ReconnectStrategy::Backoff(backoff));
    config.subscribe_timeout = Duration::from_millis(10);
    let (session, _handle) = FeedSession::new(config);
    let (result, events) = run_to_end(session).await;
    server.abort();

    assert_eq!(
        result.unwrap(),
        CloseReason::ReconnectExhausted { attempts: 2 }
    );
    assert_eq!(connections.load(Ordering::SeqCst), 3);
    assert!(states(&events).contains(&SessionState::Streaming));
    assert!(market(&events).is_empty());
}

//! Dhan Feed Binary
//!
//! Connects to the Dhan live market feed and logs every decoded event.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin dhan-feed
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DHAN_CLIENT_ID`: Dhan client id
//! - `DHAN_ACCESS_TOKEN`: Dhan access token
//! - `DHAN_INSTRUMENTS`: comma separated `SEGMENT:SECURITY_ID` pairs,
//!   e.g. `NSE_EQ:11536,NSE_FNO:49081`
//!
//! ## Optional
//! - `DHAN_FEED_VERSION`: 1 | 2 (default: 2)
//! - `DHAN_FEED_MODE`: ticker | quote | depth | full (default: full)
//! - `DHAN_FEED_URL`: feed endpoint (default: wss://api-feed.dhan.co)
//! - `FEED_CONNECT_TIMEOUT_SECS`: connect timeout (default: 10)
//! - `FEED_SUBSCRIBE_TIMEOUT_SECS`: subscribe timeout (default: 5)
//! - `FEED_DESYNC_THRESHOLD`: repeated short frames before closing (default: 3)
//! - `FEED_STATUS_FLAG_OFFSET`: byte offset of the market-open flag
//! - `FEED_EVENT_BUFFER`: event channel capacity (default: 4096)
//! - `FEED_RECONNECT_ENABLED`: retry transport failures (default: false)
//! - `FEED_METRICS_PORT`: Prometheus port, 0 disables (default: 9090)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log filter (default: dhan_feed=info)

use dhan_feed::domain::market_data::MarketEvent;
use dhan_feed::infrastructure::telemetry;
use dhan_feed::{FeedConfig, FeedEvent, FeedSession, init_metrics};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting Dhan feed client");

    let config = FeedConfig::from_env()?;
    log_config(&config);

    if config.metrics_port != 0 {
        match init_metrics(config.metrics_port) {
            Ok(addr) => tracing::info!(addr = %addr, "Metrics endpoint listening"),
            Err(e) => tracing::warn!(error = %e, "Metrics disabled"),
        }
    }

    let shutdown_token = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let (tx, mut rx) = mpsc::channel::<FeedEvent>(config.session.event_buffer);
    let (session, _handle) =
        FeedSession::with_cancellation(config.session_config()?, shutdown_token.child_token());
    let session_task = tokio::spawn(session.run(tx));

    while let Some(event) = rx.recv().await {
        log_event(&event);
    }

    match session_task.await? {
        Ok(reason) => tracing::info!(reason = %reason, "Dhan feed client stopped"),
        Err(e) => {
            tracing::error!(error = %e, "Dhan feed client failed");
            return Err(e.into());
        }
    }
    Ok(())
}

/// Log one session event.
fn log_event(event: &FeedEvent) {
    match event {
        FeedEvent::StateChanged(state) => {
            tracing::info!(state = state.as_str(), "Session state changed");
        }
        FeedEvent::Market(market) => log_market(market),
        FeedEvent::FrameRejected { frame_len, error } => {
            tracing::warn!(frame_len, error = %error, "Frame rejected");
        }
        FeedEvent::Reconnecting { attempt, delay } => {
            tracing::info!(attempt, delay_ms = delay.as_millis(), "Reconnecting");
        }
        FeedEvent::Closed(reason) => {
            tracing::info!(reason = %reason, "Session closed");
        }
    }
}

fn log_market(event: &MarketEvent) {
    let security_id = event.security_id();
    match event {
        MarketEvent::Ticker(p) => tracing::info!(
            security_id,
            ltp = %format_price(p.last_traded_price),
            "Ticker"
        ),
        MarketEvent::Quote(p) => tracing::info!(
            security_id,
            ltp = %format_price(p.last_traded_price),
            volume = p.volume,
            "Quote"
        ),
        MarketEvent::MarketDepth(p) => tracing::info!(
            security_id,
            ltp = %format_price(p.last_traded_price),
            best_bid = %format_price(p.levels[0].bid_price),
            best_ask = %format_price(p.levels[0].ask_price),
            "Market depth"
        ),
        MarketEvent::OpenInterest(p) => {
            tracing::info!(security_id, open_interest = p.open_interest, "Open interest");
        }
        MarketEvent::PreviousClose(p) => tracing::info!(
            security_id,
            prev_close = %format_price(p.prev_close),
            prev_open_interest = p.prev_open_interest,
            "Previous close"
        ),
        MarketEvent::Status(p) => {
            tracing::info!(security_id, market_open = ?p.market_open, "Market status");
        }
        MarketEvent::Full(p) => tracing::info!(
            security_id,
            ltp = %format_price(p.last_traded_price),
            volume = p.volume,
            open_interest = p.open_interest,
            "Full"
        ),
        MarketEvent::Disconnect(p) => {
            tracing::warn!(security_id, reason = %p.reason, "Disconnect notice");
        }
    }
}

fn format_price(price: f32) -> String {
    format!("{price:.2}")
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        client_id = config.credentials.client_id(),
        version = %config.version,
        mode = config.mode.as_str(),
        instruments = config.instruments.len(),
        reconnect = config.reconnect.enabled,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(url = %config.url, "Feed endpoint");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}

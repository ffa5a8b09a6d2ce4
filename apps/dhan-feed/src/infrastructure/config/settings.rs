//! Feed Configuration Settings
//!
//! Configuration types for the feed client, loaded from environment
//! variables. Numeric values that fail to parse fall back to their defaults.

use std::time::Duration;

use crate::domain::subscription::{
    Instrument, SubscriptionError, SubscriptionMode, parse_instruments,
};
use crate::infrastructure::dhan::auth::{AuthError, Credentials, ProtocolVersion};
use crate::infrastructure::dhan::codec::DecoderOptions;
use crate::infrastructure::dhan::reconnect::{ReconnectConfig, ReconnectError, ReconnectStrategy};
use crate::infrastructure::dhan::session::{DEFAULT_FEED_URL, SessionConfig};

/// Session timing and decoder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Limit for opening the socket.
    pub connect_timeout: Duration,
    /// Time in `Subscribing` before assuming the stream is live.
    pub subscribe_timeout: Duration,
    /// Consecutive same-length truncated frames that close the session.
    pub desync_threshold: u32,
    /// Byte offset of the market-open flag in status frames.
    pub status_flag_offset: Option<usize>,
    /// Capacity of the event channel between session and consumer.
    pub event_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(5),
            desync_threshold: 3,
            status_flag_offset: None,
            event_buffer: 4096,
        }
    }
}

/// Reconnection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectSettings {
    /// Whether transport failures are retried.
    pub enabled: bool,
    /// Initial reconnection delay.
    pub delay_initial: Duration,
    /// Maximum reconnection delay.
    pub delay_max: Duration,
    /// Delay multiplier for exponential backoff.
    pub delay_multiplier: f64,
    /// Attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_initial: Duration::from_millis(500),
            delay_max: Duration::from_secs(30),
            delay_multiplier: 2.0,
            max_attempts: 0,
        }
    }
}

impl ReconnectSettings {
    /// Strategy these settings describe.
    ///
    /// # Errors
    ///
    /// Returns `ReconnectError::InvalidConfig` if enabled with inconsistent
    /// delays.
    pub fn strategy(&self) -> Result<ReconnectStrategy, ReconnectError> {
        if !self.enabled {
            return Ok(ReconnectStrategy::Never);
        }
        let config = ReconnectConfig {
            initial_delay: self.delay_initial,
            max_delay: self.delay_max,
            multiplier: self.delay_multiplier,
            max_attempts: self.max_attempts,
            ..ReconnectConfig::default()
        };
        config.validate()?;
        Ok(ReconnectStrategy::Backoff(config))
    }
}

/// Complete feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Client id and access token.
    pub credentials: Credentials,
    /// Protocol version.
    pub version: ProtocolVersion,
    /// Feed base URL.
    pub url: String,
    /// Delivery mode.
    pub mode: SubscriptionMode,
    /// Instruments to subscribe on connect.
    pub instruments: Vec<Instrument>,
    /// Session settings.
    pub session: SessionSettings,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Prometheus exporter port (0 = disabled).
    pub metrics_port: u16,
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty, or if
    /// the instrument list, version, mode or reconnect settings are invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`FeedConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let client_id = env.required("DHAN_CLIENT_ID")?;
        let access_token = env.required("DHAN_ACCESS_TOKEN")?;
        let instruments = parse_instruments(&env.required("DHAN_INSTRUMENTS")?)?;

        let version = env
            .get("DHAN_FEED_VERSION")
            .map(|v| v.parse::<ProtocolVersion>())
            .transpose()?
            .unwrap_or_default();

        let mode = env
            .get("DHAN_FEED_MODE")
            .map(|v| v.parse::<SubscriptionMode>())
            .transpose()?
            .unwrap_or_default();

        let url = env
            .get("DHAN_FEED_URL")
            .unwrap_or_else(|| DEFAULT_FEED_URL.to_string());

        let defaults = SessionSettings::default();
        let session = SessionSettings {
            connect_timeout: env.duration_secs("FEED_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            subscribe_timeout: env
                .duration_secs("FEED_SUBSCRIBE_TIMEOUT_SECS", defaults.subscribe_timeout),
            desync_threshold: env.parse_or("FEED_DESYNC_THRESHOLD", defaults.desync_threshold),
            status_flag_offset: env
                .get("FEED_STATUS_FLAG_OFFSET")
                .and_then(|v| v.parse().ok()),
            event_buffer: env.parse_or("FEED_EVENT_BUFFER", defaults.event_buffer).max(1),
        };

        let defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            enabled: env.flag("FEED_RECONNECT_ENABLED", defaults.enabled),
            delay_initial: env
                .duration_millis("FEED_RECONNECT_DELAY_INITIAL_MS", defaults.delay_initial),
            delay_max: env.duration_secs("FEED_RECONNECT_DELAY_MAX_SECS", defaults.delay_max),
            delay_multiplier: env
                .parse_or("FEED_RECONNECT_DELAY_MULTIPLIER", defaults.delay_multiplier),
            max_attempts: env.parse_or("FEED_MAX_RECONNECT_ATTEMPTS", defaults.max_attempts),
        };
        reconnect.strategy()?;

        Ok(Self {
            credentials: Credentials::new(client_id, access_token)?,
            version,
            url,
            mode,
            instruments,
            session,
            reconnect,
            metrics_port: env.parse_or("FEED_METRICS_PORT", 9090),
        })
    }

    /// Session configuration for these settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Reconnect` if the reconnect settings are
    /// inconsistent.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let mut config = SessionConfig::new(self.credentials.clone(), self.instruments.clone())
            .with_url(self.url.clone())
            .with_version(self.version)
            .with_mode(self.mode)
            .with_reconnect(self.reconnect.strategy()?);
        config.connect_timeout = self.session.connect_timeout;
        config.subscribe_timeout = self.session.subscribe_timeout;
        config.desync_threshold = self.session.desync_threshold;
        config.decoder = DecoderOptions {
            status_flag_offset: self.session.status_flag_offset,
        };
        Ok(config)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Credentials are unusable.
    #[error(transparent)]
    Credentials(#[from] AuthError),
    /// Instrument list or mode could not be parsed.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    /// Reconnect settings are inconsistent.
    #[error(transparent)]
    Reconnect(#[from] ReconnectError),
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = self
            .get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value.trim().to_string())
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.get(key).map_or(default, |v| {
            matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
        })
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

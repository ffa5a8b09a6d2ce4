//! Configuration Module
//!
//! Feed configuration loaded from environment variables.

mod settings;

pub use settings::{ConfigError, FeedConfig, ReconnectSettings, SessionSettings};

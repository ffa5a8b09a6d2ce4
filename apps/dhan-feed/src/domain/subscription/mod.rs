//! Subscription Tracking
//!
//! Instruments are identified by an exchange segment and an opaque
//! security id. The subscription list preserves the order instruments were
//! added in and ignores duplicates, so the request sent to the feed always
//! lists instruments in caller order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::market_data::{ExchangeSegment, UnknownSegment};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while parsing instruments or delivery modes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// Instrument text was not `SEGMENT:ID`.
    #[error("invalid instrument '{0}': expected SEGMENT:SECURITY_ID")]
    InvalidInstrument(String),

    /// Segment name was not recognised.
    #[error(transparent)]
    UnknownSegment(#[from] UnknownSegment),

    /// Delivery mode was not recognised.
    #[error("unknown subscription mode: {0}")]
    UnknownMode(String),
}

// =============================================================================
// Subscription Mode
// =============================================================================

/// Delivery mode requested for a set of instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionMode {
    /// Ticker packets only.
    Ticker,
    /// Quote packets.
    Quote,
    /// Market depth packets.
    Depth,
    /// Full packets.
    #[default]
    Full,
}

impl SubscriptionMode {
    /// Request code used to subscribe in this mode.
    #[must_use]
    pub const fn subscribe_code(self) -> u8 {
        match self {
            Self::Ticker => 15,
            Self::Quote => 17,
            Self::Depth => 19,
            Self::Full => 21,
        }
    }

    /// Request code used to unsubscribe in this mode.
    #[must_use]
    pub const fn unsubscribe_code(self) -> u8 {
        self.subscribe_code() + 1
    }

    /// Mode name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Quote => "quote",
            Self::Depth => "depth",
            Self::Full => "full",
        }
    }
}

impl FromStr for SubscriptionMode {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ticker" => Ok(Self::Ticker),
            "quote" => Ok(Self::Quote),
            "depth" => Ok(Self::Depth),
            "full" => Ok(Self::Full),
            other => Err(SubscriptionError::UnknownMode(other.to_string())),
        }
    }
}

// =============================================================================
// Instrument
// =============================================================================

/// A tradable instrument on a given segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Exchange segment.
    pub segment: ExchangeSegment,
    /// Opaque security identifier.
    pub security_id: String,
}

impl Instrument {
    /// Create an instrument.
    #[must_use]
    pub fn new(segment: ExchangeSegment, security_id: impl Into<String>) -> Self {
        Self {
            segment,
            security_id: security_id.into(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.security_id)
    }
}

impl FromStr for Instrument {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (segment, id) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| SubscriptionError::InvalidInstrument(s.to_string()))?;

        let id = id.trim();
        if id.is_empty() {
            return Err(SubscriptionError::InvalidInstrument(s.to_string()));
        }

        Ok(Self::new(segment.parse()?, id))
    }
}

/// Parse a comma separated list of `SEGMENT:ID` entries.
///
/// # Errors
///
/// Returns the first entry that fails to parse.
pub fn parse_instruments(text: &str) -> Result<Vec<Instrument>, SubscriptionError> {
    text.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::parse)
        .collect()
}

// =============================================================================
// Subscription List
// =============================================================================

/// Ordered, duplicate-free set of instruments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionList {
    instruments: Vec<Instrument>,
}

impl SubscriptionList {
    /// Create an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            instruments: Vec::new(),
        }
    }

    /// Add instruments, returning the ones that were not already present.
    pub fn add<I>(&mut self, instruments: I) -> Vec<Instrument>
    where
        I: IntoIterator<Item = Instrument>,
    {
        let mut added = Vec::new();
        for instrument in instruments {
            if !self.instruments.contains(&instrument) {
                self.instruments.push(instrument.clone());
                added.push(instrument);
            }
        }
        added
    }

    /// Remove instruments, returning the ones that were present.
    pub fn remove(&mut self, instruments: &[Instrument]) -> Vec<Instrument> {
        let removed: Vec<Instrument> = self
            .instruments
            .iter()
            .filter(|i| instruments.contains(i))
            .cloned()
            .collect();
        self.instruments.retain(|i| !instruments.contains(i));
        removed
    }

    /// Check whether an instrument is subscribed.
    #[must_use]
    pub fn contains(&self, instrument: &Instrument) -> bool {
        self.instruments.contains(instrument)
    }

    /// Subscribed instruments, in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Number of instruments.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Check if the list is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

impl FromIterator<Instrument> for SubscriptionList {
    fn from_iter<T: IntoIterator<Item = Instrument>>(iter: T) -> Self {
        let mut list = Self::new();
        list.add(iter);
        list
    }
}

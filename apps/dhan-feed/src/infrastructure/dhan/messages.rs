//! Dhan Feed Control Messages
//!
//! Subscriptions are requested with a JSON text frame:
//!
//! ```json
//! {"RequestCode":21,"InstrumentCount":1,
//!  "InstrumentList":[{"ExchangeSegment":"NSE_EQ","SecurityId":"11536"}]}
//! ```
//!
//! The request code selects the delivery mode; unsubscribing uses the same
//! mode's code plus one.

use serde::{Deserialize, Serialize};

use crate::domain::market_data::ExchangeSegment;
use crate::domain::subscription::{Instrument, SubscriptionMode};

/// One entry of `InstrumentList`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstrumentEntry {
    /// Segment name, e.g. `NSE_EQ`.
    pub exchange_segment: ExchangeSegment,
    /// Security id as text.
    pub security_id: String,
}

impl From<&Instrument> for InstrumentEntry {
    fn from(instrument: &Instrument) -> Self {
        Self {
            exchange_segment: instrument.segment,
            security_id: instrument.security_id.clone(),
        }
    }
}

/// Subscribe or unsubscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionRequest {
    /// Mode request code.
    pub request_code: u8,
    /// Number of entries in `instrument_list`.
    pub instrument_count: usize,
    /// Instruments, in caller order.
    pub instrument_list: Vec<InstrumentEntry>,
}

impl SubscriptionRequest {
    fn with_code(request_code: u8, instruments: &[Instrument]) -> Self {
        let instrument_list: Vec<InstrumentEntry> =
            instruments.iter().map(InstrumentEntry::from).collect();
        Self {
            request_code,
            instrument_count: instrument_list.len(),
            instrument_list,
        }
    }

    /// Subscribe `instruments` in `mode`.
    #[must_use]
    pub fn subscribe(mode: SubscriptionMode, instruments: &[Instrument]) -> Self {
        Self::with_code(mode.subscribe_code(), instruments)
    }

    /// Unsubscribe `instruments` from `mode`.
    #[must_use]
    pub fn unsubscribe(mode: SubscriptionMode, instruments: &[Instrument]) -> Self {
        Self::with_code(mode.unsubscribe_code(), instruments)
    }

    /// Serialize to the text frame payload.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

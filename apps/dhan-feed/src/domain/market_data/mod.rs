//! Market Data Events
//!
//! Typed records for every packet the Dhan live feed delivers. Values are
//! kept exactly as they arrive on the wire (`f32` prices, `u32` quantities);
//! rounding for display is left to consumers.
//!
//! # Packet Kinds
//!
//! | Code | Kind            | Frame bytes |
//! |------|-----------------|-------------|
//! | 2    | Ticker          | 16          |
//! | 3    | Market depth    | 112         |
//! | 4    | Quote           | 50          |
//! | 5    | Open interest   | 12          |
//! | 6    | Previous close  | 16          |
//! | 7    | Market status   | 8           |
//! | 8    | Full            | 162         |
//! | 50   | Disconnect      | 10          |

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of book levels carried in a depth block.
pub const DEPTH_LEVELS: usize = 5;

/// Five best-first order book levels, in wire order.
pub type DepthBook = [DepthLevel; DEPTH_LEVELS];

// =============================================================================
// Exchange Segment
// =============================================================================

/// Exchange segment codes used in packet headers and subscription requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeSegment {
    /// Index values.
    #[serde(rename = "IDX_I")]
    Index,
    /// NSE equity cash.
    #[serde(rename = "NSE_EQ")]
    NseEquity,
    /// NSE futures and options.
    #[serde(rename = "NSE_FNO")]
    NseFno,
    /// NSE currency derivatives.
    #[serde(rename = "NSE_CURRENCY")]
    NseCurrency,
    /// BSE equity cash.
    #[serde(rename = "BSE_EQ")]
    BseEquity,
    /// MCX commodities.
    #[serde(rename = "MCX_COMM")]
    McxCommodity,
    /// BSE currency derivatives.
    #[serde(rename = "BSE_CURRENCY")]
    BseCurrency,
    /// BSE futures and options.
    #[serde(rename = "BSE_FNO")]
    BseFno,
}

impl ExchangeSegment {
    /// All segments, in code order.
    pub const ALL: [Self; 8] = [
        Self::Index,
        Self::NseEquity,
        Self::NseFno,
        Self::NseCurrency,
        Self::BseEquity,
        Self::McxCommodity,
        Self::BseCurrency,
        Self::BseFno,
    ];

    /// Map a wire code to a segment. Code 6 is unassigned.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Index),
            1 => Some(Self::NseEquity),
            2 => Some(Self::NseFno),
            3 => Some(Self::NseCurrency),
            4 => Some(Self::BseEquity),
            5 => Some(Self::McxCommodity),
            7 => Some(Self::BseCurrency),
            8 => Some(Self::BseFno),
            _ => None,
        }
    }

    /// Numeric code carried in packet headers.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Index => 0,
            Self::NseEquity => 1,
            Self::NseFno => 2,
            Self::NseCurrency => 3,
            Self::BseEquity => 4,
            Self::McxCommodity => 5,
            Self::BseCurrency => 7,
            Self::BseFno => 8,
        }
    }

    /// Name used in subscription requests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "IDX_I",
            Self::NseEquity => "NSE_EQ",
            Self::NseFno => "NSE_FNO",
            Self::NseCurrency => "NSE_CURRENCY",
            Self::BseEquity => "BSE_EQ",
            Self::McxCommodity => "MCX_COMM",
            Self::BseCurrency => "BSE_CURRENCY",
            Self::BseFno => "BSE_FNO",
        }
    }
}

impl fmt::Display for ExchangeSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a segment name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown exchange segment: {0}")]
pub struct UnknownSegment(pub String);

impl FromStr for ExchangeSegment {
    type Err = UnknownSegment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|segment| segment.as_str() == upper)
            .ok_or_else(|| UnknownSegment(s.to_string()))
    }
}

// =============================================================================
// Packet Type & Header
// =============================================================================

/// Packet discriminant, the first byte of every inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    /// Last traded price and time.
    Ticker,
    /// Last traded price with five levels of depth.
    MarketDepth,
    /// Trade summary with OHLC.
    Quote,
    /// Open interest.
    OpenInterest,
    /// Previous session close.
    PreviousClose,
    /// Market status notice.
    Status,
    /// Quote, open interest and depth combined.
    Full,
    /// Server-initiated disconnect.
    Disconnect,
}

impl PacketType {
    /// Map a discriminant byte to a packet type.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            2 => Some(Self::Ticker),
            3 => Some(Self::MarketDepth),
            4 => Some(Self::Quote),
            5 => Some(Self::OpenInterest),
            6 => Some(Self::PreviousClose),
            7 => Some(Self::Status),
            8 => Some(Self::Full),
            50 => Some(Self::Disconnect),
            _ => None,
        }
    }

    /// Discriminant byte.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Ticker => 2,
            Self::MarketDepth => 3,
            Self::Quote => 4,
            Self::OpenInterest => 5,
            Self::PreviousClose => 6,
            Self::Status => 7,
            Self::Full => 8,
            Self::Disconnect => 50,
        }
    }

    /// Fixed number of bytes a frame of this type occupies.
    #[must_use]
    pub const fn frame_len(self) -> usize {
        match self {
            Self::Ticker | Self::PreviousClose => 16,
            Self::MarketDepth => 112,
            Self::Quote => 50,
            Self::OpenInterest => 12,
            Self::Status => 8,
            Self::Full => 162,
            Self::Disconnect => 10,
        }
    }

    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::MarketDepth => "market_depth",
            Self::Quote => "quote",
            Self::OpenInterest => "open_interest",
            Self::PreviousClose => "previous_close",
            Self::Status => "status",
            Self::Full => "full",
            Self::Disconnect => "disconnect",
        }
    }
}

/// The 8-byte prefix shared by every inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    /// Discriminant byte, repeated from the dispatch byte.
    pub packet_type: u8,
    /// Length declared by the server.
    pub message_length: u16,
    /// Raw exchange segment code.
    pub exchange_segment: u8,
    /// Exchange security identifier.
    pub security_id: u32,
}

impl PacketHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 8;

    /// Typed exchange segment, if the code is known.
    #[must_use]
    pub const fn segment(&self) -> Option<ExchangeSegment> {
        ExchangeSegment::from_code(self.exchange_segment)
    }
}

// =============================================================================
// Depth
// =============================================================================

/// One level of the order book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Quantity bid at this level.
    pub bid_qty: u32,
    /// Quantity offered at this level.
    pub ask_qty: u32,
    /// Number of bid orders.
    pub bid_orders: u16,
    /// Number of ask orders.
    pub ask_orders: u16,
    /// Bid price.
    pub bid_price: f32,
    /// Ask price.
    pub ask_price: f32,
}

impl DepthLevel {
    /// Encoded size in bytes.
    pub const SIZE: usize = 20;
}

// =============================================================================
// Packets
// =============================================================================

fn millis_to_utc(millis: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(i64::from(millis))
}

/// Last traded price and time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickerPacket {
    /// Shared header.
    pub header: PacketHeader,
    /// Last traded price.
    pub last_traded_price: f32,
    /// Last trade time, epoch milliseconds.
    pub last_traded_time: u32,
}

impl TickerPacket {
    /// Last trade time as a UTC timestamp.
    #[must_use]
    pub fn last_traded_at(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.last_traded_time)
    }
}

/// Trade summary with the session OHLC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotePacket {
    /// Shared header.
    pub header: PacketHeader,
    /// Last traded price.
    pub last_traded_price: f32,
    /// Last traded quantity.
    pub last_traded_qty: u16,
    /// Last trade time, epoch milliseconds.
    pub last_traded_time: u32,
    /// Volume weighted average price.
    pub avg_price: f32,
    /// Traded volume.
    pub volume: u32,
    /// Total pending sell quantity.
    pub total_sell_qty: u32,
    /// Total pending buy quantity.
    pub total_buy_qty: u32,
    /// Session open.
    pub open: f32,
    /// Previous close as reported in the quote.
    pub close: f32,
    /// Session high.
    pub high: f32,
    /// Session low.
    pub low: f32,
}

impl QuotePacket {
    /// Last trade time as a UTC timestamp.
    #[must_use]
    pub fn last_traded_at(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.last_traded_time)
    }
}

/// Last traded price with five levels of depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketDepthPacket {
    /// Shared header.
    pub header: PacketHeader,
    /// Last traded price.
    pub last_traded_price: f32,
    /// Book levels, best first.
    pub levels: DepthBook,
}

/// Open interest update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenInterestPacket {
    /// Shared header.
    pub header: PacketHeader,
    /// Open interest.
    pub open_interest: u32,
}

/// Previous session close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreviousClosePacket {
    /// Shared header.
    pub header: PacketHeader,
    /// Previous close price.
    pub prev_close: f32,
    /// Previous session open interest.
    pub prev_open_interest: u32,
}

/// Market status notice.
///
/// `market_open` is only populated when the decoder has been told where
/// the flag lives; the byte offset is not part of the documented layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPacket {
    /// Shared header.
    pub header: PacketHeader,
    /// Whether the market is open, when known.
    pub market_open: Option<bool>,
}

/// Quote, open interest and depth in one packet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FullPacket {
    /// Shared header.
    pub header: PacketHeader,
    /// Last traded price.
    pub last_traded_price: f32,
    /// Last traded quantity.
    pub last_traded_qty: u16,
    /// Last trade time, epoch milliseconds.
    pub last_traded_time: u32,
    /// Volume weighted average price.
    pub avg_price: f32,
    /// Traded volume.
    pub volume: u32,
    /// Total pending sell quantity.
    pub total_sell_qty: u32,
    /// Total pending buy quantity.
    pub total_buy_qty: u32,
    /// Open interest.
    pub open_interest: u32,
    /// Highest open interest of the day.
    pub oi_day_high: u32,
    /// Lowest open interest of the day.
    pub oi_day_low: u32,
    /// Session open.
    pub open: f32,
    /// Previous close as reported in the packet.
    pub close: f32,
    /// Session high.
    pub high: f32,
    /// Session low.
    pub low: f32,
    /// Book levels, best first.
    pub levels: DepthBook,
}

impl FullPacket {
    /// Last trade time as a UTC timestamp.
    #[must_use]
    pub fn last_traded_at(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.last_traded_time)
    }
}

/// Reason attached to a server disconnect packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// 805: too many active WebSocket connections.
    ConnectionLimitExceeded,
    /// 806: the account is not subscribed to the data APIs.
    NotSubscribedToDataApi,
    /// 807: the access token has expired.
    TokenExpired,
    /// 808: the client id is invalid.
    InvalidClientId,
    /// 809: authentication failed.
    AuthenticationFailed,
    /// Any other code.
    Unknown(u16),
}

impl DisconnectReason {
    /// Map a raw reason code.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            805 => Self::ConnectionLimitExceeded,
            806 => Self::NotSubscribedToDataApi,
            807 => Self::TokenExpired,
            808 => Self::InvalidClientId,
            809 => Self::AuthenticationFailed,
            other => Self::Unknown(other),
        }
    }

    /// Raw reason code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::ConnectionLimitExceeded => 805,
            Self::NotSubscribedToDataApi => 806,
            Self::TokenExpired => 807,
            Self::InvalidClientId => 808,
            Self::AuthenticationFailed => 809,
            Self::Unknown(code) => code,
        }
    }

    /// Human readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ConnectionLimitExceeded => "connection limit exceeded",
            Self::NotSubscribedToDataApi => "not subscribed to data API",
            Self::TokenExpired => "token expired",
            Self::InvalidClientId => "invalid client id",
            Self::AuthenticationFailed => "authentication failed",
            Self::Unknown(_) => "unknown disconnect reason",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// Server-initiated disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectPacket {
    /// Shared header.
    pub header: PacketHeader,
    /// Mapped reason.
    pub reason: DisconnectReason,
}

// =============================================================================
// Decode Errors
// =============================================================================

/// Why a frame could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Frame is shorter than its layout.
    #[error("truncated frame: need {needed} bytes, got {actual}")]
    TruncatedFrame {
        /// Discriminant, once the header was readable.
        packet_type: Option<u8>,
        /// Bytes the layout needs.
        needed: usize,
        /// Bytes received.
        actual: usize,
    },

    /// Discriminant is not a known packet type.
    #[error("unknown packet type: {0}")]
    UnknownPacketType(u8),

    /// Depth region is not exactly 100 bytes.
    #[error("malformed depth block: {len} bytes")]
    MalformedDepthBlock {
        /// Length of the region.
        len: usize,
    },
}

impl DecodeError {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TruncatedFrame { .. } => "truncated_frame",
            Self::UnknownPacketType(_) => "unknown_packet_type",
            Self::MalformedDepthBlock { .. } => "malformed_depth_block",
        }
    }
}

// =============================================================================
// Market Event
// =============================================================================

/// One decoded inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    /// Ticker packet.
    Ticker(TickerPacket),
    /// Market depth packet.
    MarketDepth(MarketDepthPacket),
    /// Quote packet.
    Quote(QuotePacket),
    /// Open interest packet.
    OpenInterest(OpenInterestPacket),
    /// Previous close packet.
    PreviousClose(PreviousClosePacket),
    /// Market status packet.
    Status(StatusPacket),
    /// Full packet.
    Full(FullPacket),
    /// Disconnect notice.
    Disconnect(DisconnectPacket),
}

impl MarketEvent {
    /// Header of the underlying packet.
    #[must_use]
    pub const fn header(&self) -> &PacketHeader {
        match self {
            Self::Ticker(p) => &p.header,
            Self::MarketDepth(p) => &p.header,
            Self::Quote(p) => &p.header,
            Self::OpenInterest(p) => &p.header,
            Self::PreviousClose(p) => &p.header,
            Self::Status(p) => &p.header,
            Self::Full(p) => &p.header,
            Self::Disconnect(p) => &p.header,
        }
    }

    /// Packet type of this event.
    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        match self {
            Self::Ticker(_) => PacketType::Ticker,
            Self::MarketDepth(_) => PacketType::MarketDepth,
            Self::Quote(_) => PacketType::Quote,
            Self::OpenInterest(_) => PacketType::OpenInterest,
            Self::PreviousClose(_) => PacketType::PreviousClose,
            Self::Status(_) => PacketType::Status,
            Self::Full(_) => PacketType::Full,
            Self::Disconnect(_) => PacketType::Disconnect,
        }
    }

    /// Security id from the header.
    #[must_use]
    pub const fn security_id(&self) -> u32 {
        self.header().security_id
    }

    /// Disconnect reason, if this is a disconnect notice.
    #[must_use]
    pub const fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            Self::Disconnect(p) => Some(p.reason),
            _ => None,
        }
    }
}

//! Packet Decoder
//!
//! Turns one inbound binary frame into a [`MarketEvent`].
//!
//! Every frame starts with the 8-byte header
//! `packet_type u8, message_length u16, exchange_segment u8, security_id u32`.
//! The first byte selects the payload layout; each layout has a fixed
//! length and bytes past it are ignored.
//!
//! Decode failures are per-frame. The caller decides whether to keep
//! reading; the session drops the frame and carries on.

pub use crate::domain::market_data::DecodeError;

use crate::domain::market_data::{
    DisconnectPacket, DisconnectReason, FullPacket, MarketDepthPacket, MarketEvent,
    OpenInterestPacket, PacketHeader, PacketType, PreviousClosePacket, QuotePacket, StatusPacket,
    TickerPacket,
};

use super::depth::{DEPTH_BLOCK_LEN, decode_depth, write_depth};
use super::wire::{Field, WireError, WireReader, WireWriter, layout_width};

/// Field layout of the shared header.
pub const HEADER_LAYOUT: [Field; 4] = [Field::U8, Field::U16, Field::U8, Field::U32];

const _: () = assert!(layout_width(&HEADER_LAYOUT) == PacketHeader::SIZE);

/// Status byte value meaning the market is open.
const MARKET_OPEN: u8 = 1;

// =============================================================================
// Decoder
// =============================================================================

/// Optional decoder behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Byte offset of the market-open flag in status frames.
    ///
    /// The flag's position is not part of the documented layout, so it is
    /// only read when set. `None` leaves `StatusPacket::market_open` empty.
    pub status_flag_offset: Option<usize>,
}

/// Stateless frame decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketDecoder {
    options: DecoderOptions,
}

impl PacketDecoder {
    /// Create a decoder.
    #[must_use]
    pub const fn new(options: DecoderOptions) -> Self {
        Self { options }
    }

    /// Options in effect.
    #[must_use]
    pub const fn options(&self) -> DecoderOptions {
        self.options
    }

    /// Decode one frame.
    ///
    /// # Errors
    ///
    /// - `TruncatedFrame` if the frame is shorter than the header or than
    ///   its packet type's fixed length.
    /// - `UnknownPacketType` for an unrecognised discriminant.
    /// - `MalformedDepthBlock` if a depth region is the wrong size.
    pub fn decode(&self, frame: &[u8]) -> Result<MarketEvent, DecodeError> {
        let Some(&code) = frame.first().filter(|_| frame.len() >= PacketHeader::SIZE) else {
            return Err(DecodeError::TruncatedFrame {
                packet_type: None,
                needed: PacketHeader::SIZE,
                actual: frame.len(),
            });
        };

        let kind = PacketType::from_code(code).ok_or(DecodeError::UnknownPacketType(code))?;

        let needed = kind.frame_len();
        let truncated = DecodeError::TruncatedFrame {
            packet_type: Some(code),
            needed,
            actual: frame.len(),
        };
        let body = frame.get(..needed).ok_or(truncated)?;

        let mut reader = WireReader::new(body);
        let header = read_header(&mut reader).map_err(|_| truncated)?;

        let event = match kind {
            PacketType::Ticker => MarketEvent::Ticker(TickerPacket {
                header,
                last_traded_price: reader.read_f32().map_err(|_| truncated)?,
                last_traded_time: reader.read_u32().map_err(|_| truncated)?,
            }),
            PacketType::MarketDepth => {
                let last_traded_price = reader.read_f32().map_err(|_| truncated)?;
                let levels = decode_depth(
                    reader
                        .read_bytes(DEPTH_BLOCK_LEN)
                        .map_err(|_| truncated)?,
                )?;
                MarketEvent::MarketDepth(MarketDepthPacket {
                    header,
                    last_traded_price,
                    levels,
                })
            }
            PacketType::Quote => {
                MarketEvent::Quote(read_quote(header, &mut reader).map_err(|_| truncated)?)
            }
            PacketType::OpenInterest => MarketEvent::OpenInterest(OpenInterestPacket {
                header,
                open_interest: reader.read_u32().map_err(|_| truncated)?,
            }),
            PacketType::PreviousClose => MarketEvent::PreviousClose(PreviousClosePacket {
                header,
                prev_close: reader.read_f32().map_err(|_| truncated)?,
                prev_open_interest: reader.read_u32().map_err(|_| truncated)?,
            }),
            PacketType::Status => MarketEvent::Status(StatusPacket {
                header,
                market_open: self
                    .options
                    .status_flag_offset
                    .and_then(|offset| frame.get(offset))
                    .map(|flag| *flag == MARKET_OPEN),
            }),
            PacketType::Full => {
                MarketEvent::Full(read_full(header, &mut reader).map_err(|_| truncated)??)
            }
            PacketType::Disconnect => MarketEvent::Disconnect(DisconnectPacket {
                header,
                reason: DisconnectReason::from_code(reader.read_u16().map_err(|_| truncated)?),
            }),
        };

        Ok(event)
    }
}

fn read_header(reader: &mut WireReader<'_>) -> Result<PacketHeader, WireError> {
    let [packet_type, message_length, exchange_segment, security_id] =
        reader.read_layout(&HEADER_LAYOUT)?;
    Ok(PacketHeader {
        packet_type: packet_type.as_u8()?,
        message_length: message_length.as_u16()?,
        exchange_segment: exchange_segment.as_u8()?,
        security_id: security_id.as_u32()?,
    })
}

fn read_quote(header: PacketHeader, reader: &mut WireReader<'_>) -> Result<QuotePacket, WireError> {
    Ok(QuotePacket {
        header,
        last_traded_price: reader.read_f32()?,
        last_traded_qty: reader.read_u16()?,
        last_traded_time: reader.read_u32()?,
        avg_price: reader.read_f32()?,
        volume: reader.read_u32()?,
        total_sell_qty: reader.read_u32()?,
        total_buy_qty: reader.read_u32()?,
        open: reader.read_f32()?,
        close: reader.read_f32()?,
        high: reader.read_f32()?,
        low: reader.read_f32()?,
    })
}

// The outer error is a short read, the inner one a bad depth block.
fn read_full(
    header: PacketHeader,
    reader: &mut WireReader<'_>,
) -> Result<Result<FullPacket, DecodeError>, WireError> {
    let last_traded_price = reader.read_f32()?;
    let last_traded_qty = reader.read_u16()?;
    let last_traded_time = reader.read_u32()?;
    let avg_price = reader.read_f32()?;
    let volume = reader.read_u32()?;
    let total_sell_qty = reader.read_u32()?;
    let total_buy_qty = reader.read_u32()?;
    // OI fields come before OHLC on the wire.
    let open_interest = reader.read_u32()?;
    let oi_day_high = reader.read_u32()?;
    let oi_day_low = reader.read_u32()?;
    let open = reader.read_f32()?;
    let close = reader.read_f32()?;
    let high = reader.read_f32()?;
    let low = reader.read_f32()?;
    let block = reader.read_bytes(DEPTH_BLOCK_LEN)?;

    Ok(decode_depth(block).map(|levels| FullPacket {
        header,
        last_traded_price,
        last_traded_qty,
        last_traded_time,
        avg_price,
        volume,
        total_sell_qty,
        total_buy_qty,
        open_interest,
        oi_day_high,
        oi_day_low,
        open,
        close,
        high,
        low,
        levels,
    }))
}

// =============================================================================
// Encoder
// =============================================================================

fn write_header(writer: &mut WireWriter, header: &PacketHeader) {
    writer
        .put_u8(header.packet_type)
        .put_u16(header.message_length)
        .put_u8(header.exchange_segment)
        .put_u32(header.security_id);
}

/// Encode an event as the frame the server would send.
///
/// The header is written as stored, so `decode(encode_event(e)) == e` for
/// any event the decoder produced. A status packet's `market_open` is not
/// written; its position is not part of the layout.
#[must_use]
pub fn encode_event(event: &MarketEvent) -> Vec<u8> {
    let mut writer = WireWriter::with_capacity(event.packet_type().frame_len());
    write_header(&mut writer, event.header());

    match event {
        MarketEvent::Ticker(p) => {
            writer.put_f32(p.last_traded_price).put_u32(p.last_traded_time);
        }
        MarketEvent::MarketDepth(p) => {
            writer.put_f32(p.last_traded_price);
            write_depth(&mut writer, &p.levels);
        }
        MarketEvent::Quote(p) => {
            writer
                .put_f32(p.last_traded_price)
                .put_u16(p.last_traded_qty)
                .put_u32(p.last_traded_time)
                .put_f32(p.avg_price)
                .put_u32(p.volume)
                .put_u32(p.total_sell_qty)
                .put_u32(p.total_buy_qty)
                .put_f32(p.open)
                .put_f32(p.close)
                .put_f32(p.high)
                .put_f32(p.low);
        }
        MarketEvent::OpenInterest(p) => {
            writer.put_u32(p.open_interest);
        }
        MarketEvent::PreviousClose(p) => {
            writer.put_f32(p.prev_close).put_u32(p.prev_open_interest);
        }
        MarketEvent::Status(_) => {}
        MarketEvent::Full(p) => {
            writer
                .put_f32(p.last_traded_price)
                .put_u16(p.last_traded_qty)
                .put_u32(p.last_traded_time)
                .put_f32(p.avg_price)
                .put_u32(p.volume)
                .put_u32(p.total_sell_qty)
                .put_u32(p.total_buy_qty)
                .put_u32(p.open_interest)
                .put_u32(p.oi_day_high)
                .put_u32(p.oi_day_low)
                .put_f32(p.open)
                .put_f32(p.close)
                .put_f32(p.high)
                .put_f32(p.low);
            write_depth(&mut writer, &p.levels);
        }
        MarketEvent::Disconnect(p) => {
            writer.put_u16(p.reason.code());
        }
    }

    writer.into_bytes()
}

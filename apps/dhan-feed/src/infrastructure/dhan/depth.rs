//! Five-level order book block shared by depth and full packets.
//!
//! Levels are laid out back to back, best first, each as
//! `bid_qty u32, ask_qty u32, bid_orders u16, ask_orders u16, bid_price f32, ask_price f32`.
//! Wire order is kept as-is.

use crate::domain::market_data::{DEPTH_LEVELS, DecodeError, DepthBook, DepthLevel};

use super::wire::{Field, WireError, WireReader, WireWriter, layout_width};

/// Field layout of one level.
pub const DEPTH_LEVEL_LAYOUT: [Field; 6] = [
    Field::U32,
    Field::U32,
    Field::U16,
    Field::U16,
    Field::F32,
    Field::F32,
];

/// Size of the whole block in bytes.
pub const DEPTH_BLOCK_LEN: usize = DEPTH_LEVELS * DepthLevel::SIZE;

const _: () = assert!(layout_width(&DEPTH_LEVEL_LAYOUT) == DepthLevel::SIZE);

fn read_level(reader: &mut WireReader<'_>) -> Result<DepthLevel, WireError> {
    let [bid_qty, ask_qty, bid_orders, ask_orders, bid_price, ask_price] =
        reader.read_layout(&DEPTH_LEVEL_LAYOUT)?;
    Ok(DepthLevel {
        bid_qty: bid_qty.as_u32()?,
        ask_qty: ask_qty.as_u32()?,
        bid_orders: bid_orders.as_u16()?,
        ask_orders: ask_orders.as_u16()?,
        bid_price: bid_price.as_f32()?,
        ask_price: ask_price.as_f32()?,
    })
}

/// Decode a depth block.
///
/// # Errors
///
/// Returns `DecodeError::MalformedDepthBlock` unless `block` is exactly
/// `DEPTH_BLOCK_LEN` bytes.
pub fn decode_depth(block: &[u8]) -> Result<DepthBook, DecodeError> {
    let malformed = DecodeError::MalformedDepthBlock { len: block.len() };
    if block.len() != DEPTH_BLOCK_LEN {
        return Err(malformed);
    }

    let mut reader = WireReader::new(block);
    let mut levels = [DepthLevel::default(); DEPTH_LEVELS];
    for level in &mut levels {
        *level = read_level(&mut reader).map_err(|_| malformed)?;
    }
    Ok(levels)
}

/// Append a depth block to `writer`.
pub fn write_depth(writer: &mut WireWriter, levels: &DepthBook) {
    for level in levels {
        writer
            .put_u32(level.bid_qty)
            .put_u32(level.ask_qty)
            .put_u16(level.bid_orders)
            .put_u16(level.ask_orders)
            .put_f32(level.bid_price)
            .put_f32(level.ask_price);
    }
}

/// Encode a depth block.
#[must_use]
pub fn encode_depth(levels: &DepthBook) -> [u8; DEPTH_BLOCK_LEN] {
    let mut writer = WireWriter::with_capacity(DEPTH_BLOCK_LEN);
    write_depth(&mut writer, levels);

    let mut block = [0u8; DEPTH_BLOCK_LEN];
    block.copy_from_slice(&writer.into_bytes());
    block
}

//! Fixed-Width Little-Endian Primitives
//!
//! Every Dhan packet is a packed little-endian struct. This module provides
//! the byte-level building blocks the packet codec is written in:
//!
//! - `decode_field` / `decode_layout`: decode scalars against a declared
//!   field layout, returning the next offset.
//! - `WireReader`: a bounds-checked cursor with typed and layout reads.
//! - `WireWriter`: the encoding counterpart, including zero padding.
//!
//! Reads never index past the end of the buffer; a short buffer yields
//! `WireError::TruncatedFrame`.

use byteorder::{ByteOrder, LittleEndian};

/// Errors from wire-level reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Not enough bytes left for the requested field.
    #[error("truncated frame: need {needed} bytes at offset {offset}, have {available}")]
    TruncatedFrame {
        /// Offset the read started at.
        offset: usize,
        /// Bytes the field needs.
        needed: usize,
        /// Total buffer length.
        available: usize,
    },

    /// Value does not fit in its fixed-width slot.
    #[error("value of {actual} bytes exceeds field width {width}")]
    Overflow {
        /// Width of the slot.
        width: usize,
        /// Length of the value.
        actual: usize,
    },

    /// A decoded scalar was read as the wrong type.
    #[error("expected {expected:?} field, found {found:?}")]
    FieldType {
        /// Type the caller asked for.
        expected: Field,
        /// Type the layout declared.
        found: Field,
    },
}

/// Declared type of one field in a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Unsigned byte.
    U8,
    /// Signed byte.
    I8,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 32-bit integer.
    I32,
    /// IEEE-754 single precision float.
    F32,
}

impl Field {
    /// Width in bytes.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
        }
    }
}

/// Total width of a layout.
#[must_use]
pub const fn layout_width(layout: &[Field]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < layout.len() {
        total += layout[i].width();
        i += 1;
    }
    total
}

/// A decoded scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    /// Unsigned byte.
    U8(u8),
    /// Signed byte.
    I8(i8),
    /// Unsigned 16-bit integer.
    U16(u16),
    /// Signed 16-bit integer.
    I16(i16),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Signed 32-bit integer.
    I32(i32),
    /// Single precision float.
    F32(f32),
}

impl Scalar {
    /// Field type this value was decoded as.
    #[must_use]
    pub const fn field(self) -> Field {
        match self {
            Self::U8(_) => Field::U8,
            Self::I8(_) => Field::I8,
            Self::U16(_) => Field::U16,
            Self::I16(_) => Field::I16,
            Self::U32(_) => Field::U32,
            Self::I32(_) => Field::I32,
            Self::F32(_) => Field::F32,
        }
    }

    const fn mismatch(self, expected: Field) -> WireError {
        WireError::FieldType {
            expected,
            found: self.field(),
        }
    }

    /// The value as `u8`.
    ///
    /// # Errors
    ///
    /// Returns `WireError::FieldType` for any other field type.
    pub const fn as_u8(self) -> Result<u8, WireError> {
        match self {
            Self::U8(v) => Ok(v),
            other => Err(other.mismatch(Field::U8)),
        }
    }

    /// The value as `u16`.
    ///
    /// # Errors
    ///
    /// Returns `WireError::FieldType` for any other field type.
    pub const fn as_u16(self) -> Result<u16, WireError> {
        match self {
            Self::U16(v) => Ok(v),
            other => Err(other.mismatch(Field::U16)),
        }
    }

    /// The value as `u32`.
    ///
    /// # Errors
    ///
    /// Returns `WireError::FieldType` for any other field type.
    pub const fn as_u32(self) -> Result<u32, WireError> {
        match self {
            Self::U32(v) => Ok(v),
            other => Err(other.mismatch(Field::U32)),
        }
    }

    /// The value as `f32`.
    ///
    /// # Errors
    ///
    /// Returns `WireError::FieldType` for any other field type.
    pub const fn as_f32(self) -> Result<f32, WireError> {
        match self {
            Self::F32(v) => Ok(v),
            other => Err(other.mismatch(Field::F32)),
        }
    }
}

fn window(buf: &[u8], offset: usize, width: usize) -> Result<&[u8], WireError> {
    let truncated = WireError::TruncatedFrame {
        offset,
        needed: width,
        available: buf.len(),
    };
    let end = offset.checked_add(width).ok_or(truncated)?;
    buf.get(offset..end).ok_or(truncated)
}

/// Decode one field at `offset`, returning the value and the next offset.
///
/// # Errors
///
/// Returns `WireError::TruncatedFrame` if the field extends past the buffer.
pub fn decode_field(buf: &[u8], offset: usize, field: Field) -> Result<(Scalar, usize), WireError> {
    let bytes = window(buf, offset, field.width())?;
    let value = match field {
        Field::U8 => Scalar::U8(bytes[0]),
        Field::I8 => Scalar::I8(i8::from_le_bytes([bytes[0]])),
        Field::U16 => Scalar::U16(LittleEndian::read_u16(bytes)),
        Field::I16 => Scalar::I16(LittleEndian::read_i16(bytes)),
        Field::U32 => Scalar::U32(LittleEndian::read_u32(bytes)),
        Field::I32 => Scalar::I32(LittleEndian::read_i32(bytes)),
        Field::F32 => Scalar::F32(LittleEndian::read_f32(bytes)),
    };
    Ok((value, offset + field.width()))
}

/// Decode a whole layout starting at `offset`.
///
/// # Errors
///
/// Returns `WireError::TruncatedFrame` at the first field that does not fit.
pub fn decode_layout<const N: usize>(
    buf: &[u8],
    offset: usize,
    layout: &[Field; N],
) -> Result<([Scalar; N], usize), WireError> {
    let mut values = [Scalar::U8(0); N];
    let mut cursor = offset;
    for (slot, field) in values.iter_mut().zip(layout) {
        let (value, next) = decode_field(buf, cursor, *field)?;
        *slot = value;
        cursor = next;
    }
    Ok((values, cursor))
}

// =============================================================================
// Reader
// =============================================================================

/// Bounds-checked little-endian cursor.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    /// Start reading at the beginning of `buf`.
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Current offset.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left after the cursor.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    fn take(&mut self, width: usize) -> Result<&'a [u8], WireError> {
        let bytes = window(self.buf, self.offset, width)?;
        self.offset += width;
        Ok(bytes)
    }

    /// Read an unsigned byte.
    ///
    /// # Errors
    ///
    /// Returns `WireError::TruncatedFrame` past the end of the buffer.
    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    /// Read a signed byte.
    ///
    /// # Errors
    ///
    /// Returns `WireError::TruncatedFrame` past the end of the buffer.
    pub fn read_i8(&mut self) -> Result<i8, WireError> {
        Ok(i8::from_le_bytes([self.read_u8()?]))
    }

    /// Read a little-endian `u16`.
    ///
    /// # Errors
    ///
    /// Returns `WireError::TruncatedFrame` past the end of the buffer.
    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    /// Read a little-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns `WireError::TruncatedFrame` past the end of the buffer.
    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Read a little-endian `f32`.
    ///
    /// # Errors
    ///
    /// Returns `WireError::TruncatedFrame` past the end of the buffer.
    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    /// Read a whole layout and advance past it.
    ///
    /// # Errors
    ///
    /// Returns `WireError::TruncatedFrame` if the layout runs past the end
    /// of the buffer. The cursor does not move in that case.
    pub fn read_layout<const N: usize>(
        &mut self,
        layout: &[Field; N],
    ) -> Result<[Scalar; N], WireError> {
        let (values, next) = decode_layout(self.buf, self.offset, layout)?;
        self.offset = next;
        Ok(values)
    }

    /// Borrow the next `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns `WireError::TruncatedFrame` past the end of the buffer.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        self.take(len)
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Little-endian frame builder.
#[derive(Debug, Clone, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Create a writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append an unsigned byte.
    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    /// Append a signed byte.
    pub fn put_i8(&mut self, value: i8) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Append a little-endian `u16`.
    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
        self
    }

    /// Append a little-endian `u32`.
    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
        self
    }

    /// Append a little-endian `f32`.
    pub fn put_f32(&mut self, value: f32) -> &mut Self {
        let mut bytes = [0u8; 4];
        LittleEndian::write_f32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
        self
    }

    /// Append raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Append `value` in a zero-filled slot of exactly `width` bytes.
    ///
    /// # Errors
    ///
    /// Returns `WireError::Overflow` if `value` is longer than `width`;
    /// nothing is written in that case.
    pub fn put_padded(&mut self, value: &[u8], width: usize) -> Result<&mut Self, WireError> {
        if value.len() > width {
            return Err(WireError::Overflow {
                width,
                actual: value.len(),
            });
        }
        self.buf.extend_from_slice(value);
        self.buf.resize(self.buf.len() + (width - value.len()), 0);
        Ok(self)
    }

    /// Append `width` zero bytes.
    pub fn put_zeros(&mut self, width: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + width, 0);
        self
    }

    /// Finish and return the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn field_widths() {
        assert_eq!(Field::U8.width(), 1);
        assert_eq!(Field::I16.width(), 2);
        assert_eq!(Field::F32.width(), 4);
        assert_eq!(
            layout_width(&[Field::U8, Field::U16, Field::U8, Field::U32]),
            8
        );
    }

    #[test]
    fn decode_field_little_endian() {
        let buf = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let (value, next) = decode_field(&buf, 0, Field::U16).unwrap();
        assert_eq!(value, Scalar::U16(0x1234));
        assert_eq!(next, 2);

        let (value, next) = decode_field(&buf, 2, Field::U32).unwrap();
        assert_eq!(value, Scalar::U32(0x1234_5678));
        assert_eq!(next, 6);
    }

    #[test]
    fn decode_field_signed_and_float() {
        let buf = [0xFF, 0xFE, 0xFF];
        assert_eq!(decode_field(&buf, 0, Field::I8).unwrap().0, Scalar::I8(-1));
        assert_eq!(decode_field(&buf, 1, Field::I16).unwrap().0, Scalar::I16(-2));

        let float = 1_234.5_f32.to_le_bytes();
        assert_eq!(
            decode_field(&float, 0, Field::F32).unwrap().0,
            Scalar::F32(1_234.5)
        );
    }

    #[test]
    fn decode_field_truncated() {
        let buf = [1, 2, 3];
        let err = decode_field(&buf, 1, Field::U32).unwrap_err();
        assert_eq!(
            err,
            WireError::TruncatedFrame {
                offset: 1,
                needed: 4,
                available: 3
            }
        );
        assert!(decode_field(&buf, usize::MAX, Field::U8).is_err());
    }

    #[test]
    fn decode_layout_advances() {
        let buf = [2, 16, 0, 1, 0x10, 0x2D, 0, 0];
        let layout = [Field::U8, Field::U16, Field::U8, Field::U32];
        let (values, next) = decode_layout(&buf, 0, &layout).unwrap();
        assert_eq!(next, 8);
        assert_eq!(
            values,
            [
                Scalar::U8(2),
                Scalar::U16(16),
                Scalar::U8(1),
                Scalar::U32(11_536)
            ]
        );
    }

    #[test]
    fn reader_reads_in_sequence() {
        let mut writer = WireWriter::default();
        writer
            .put_u8(7)
            .put_u16(513)
            .put_u32(70_000)
            .put_f32(-3.25)
            .put_i8(-5);
        let bytes = writer.into_bytes();

        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_u16().unwrap(), 513);
        assert_eq!(reader.read_u32().unwrap(), 70_000);
        assert_eq!(reader.read_f32().unwrap(), -3.25);
        assert_eq!(reader.read_i8().unwrap(), -5);
        assert_eq!(reader.remaining(), 0);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn reader_failed_read_does_not_advance() {
        let bytes = [1, 2];
        let mut reader = WireReader::new(&bytes);
        assert!(reader.read_u32().is_err());
        assert_eq!(reader.offset(), 0);
        assert_eq!(reader.read_u16().unwrap(), 0x0201);
    }

    #[test]
    fn reader_reads_layout_and_advances() {
        let buf = [2, 16, 0, 1, 0x10, 0x2D, 0, 0, 0xAA];
        let mut reader = WireReader::new(&buf);
        let [kind, len, segment, id] = reader
            .read_layout(&[Field::U8, Field::U16, Field::U8, Field::U32])
            .unwrap();
        assert_eq!(kind.as_u8().unwrap(), 2);
        assert_eq!(len.as_u16().unwrap(), 16);
        assert_eq!(segment.as_u8().unwrap(), 1);
        assert_eq!(id.as_u32().unwrap(), 11_536);
        assert_eq!(reader.offset(), 8);
        assert_eq!(reader.read_u8().unwrap(), 0xAA);
    }

    #[test]
    fn reader_short_layout_does_not_advance() {
        let buf = [1, 2, 3];
        let mut reader = WireReader::new(&buf);
        assert!(reader.read_layout(&[Field::U8, Field::U32]).is_err());
        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn scalar_accessor_rejects_other_types() {
        assert_eq!(Scalar::F32(1.5).as_f32().unwrap(), 1.5);
        assert_eq!(
            Scalar::U16(7).as_u32(),
            Err(WireError::FieldType {
                expected: Field::U32,
                found: Field::U16
            })
        );
        assert!(Scalar::I8(-1).as_u8().is_err());
    }

    #[test]
    fn writer_pads_with_zeros() {
        let mut writer = WireWriter::default();
        writer.put_padded(b"abc", 6).unwrap();
        assert_eq!(writer.into_bytes(), b"abc\0\0\0");
    }

    #[test]
    fn writer_rejects_oversize_values() {
        let mut writer = WireWriter::default();
        let err = writer.put_padded(b"abcdef", 4).unwrap_err();
        assert_eq!(err, WireError::Overflow { width: 4, actual: 6 });
        assert!(writer.is_empty());
    }

    proptest! {
        #[test]
        fn decode_field_never_panics(buf in proptest::collection::vec(any::<u8>(), 0..16), offset in 0usize..32) {
            for field in [Field::U8, Field::I8, Field::U16, Field::I16, Field::U32, Field::I32, Field::F32] {
                let result = decode_field(&buf, offset, field);
                prop_assert_eq!(result.is_ok(), offset + field.width() <= buf.len());
            }
        }

        #[test]
        fn u32_writer_reader_agree(value in any::<u32>()) {
            let mut writer = WireWriter::default();
            writer.put_u32(value);
            let bytes = writer.into_bytes();
            prop_assert_eq!(WireReader::new(&bytes).read_u32().unwrap(), value);
        }
    }
}

use bytes::{Buf, BufMut};

#[cfg(not(feature = "no-recursion-limit"))]
use crate::error::DecodeErrorKind::RecursionLimitReached;
use crate::error::DecodeErrorKind::{
    IntOverflow, InvalidLength, MalformedTag, UnexpectedEof, UnsupportedGroupEncoding,
};
use crate::DecodeError;

mod decode;
mod encode;
mod size;
/// Tools for scanning raw encoded fields, such as a record's unknown-field buffer.
pub mod unknown;

pub use decode::unmarshal_into;
pub use encode::{marshal, marshal_into_slice};
pub use size::size;
pub use unknown::{reject_unknown_fields, RawField, RawFields, RawValue};

/// The largest field number a tag can carry.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// The longest a varint encoding of a `u64` can be.
pub const MAX_VARINT_LEN: usize = 10;

/// Encodes an integer value into LEB128 variable length format, and writes it to the buffer. The
/// buffer must have enough remaining space (maximum 10 bytes).
#[inline]
pub fn encode_varint<B: BufMut + ?Sized>(mut value: u64, buf: &mut B) {
    while value >= 0x80 {
        buf.put_u8(((value & 0x7F) | 0x80) as u8);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Writes the varint encoding of `value` so that it ends just before `end`, returning the index
/// of its first byte.
///
/// Panics if fewer than `encoded_len_varint(value)` bytes precede `end`.
#[inline]
pub fn encode_varint_before(buf: &mut [u8], end: usize, mut value: u64) -> usize {
    let start = end - encoded_len_varint(value);
    let mut pos = start;
    while value >= 0x80 {
        buf[pos] = ((value & 0x7F) | 0x80) as u8;
        value >>= 7;
        pos += 1;
    }
    buf[pos] = value as u8;
    start
}

/// Decodes a LEB128-encoded variable length integer from the buffer.
///
/// Bits beyond the 64th are discarded, as other implementations of the format do.
pub fn decode_varint<B: Buf + ?Sized>(buf: &mut B) -> Result<u64, DecodeError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    while shift < 64 {
        if !buf.has_remaining() {
            return Err(DecodeError::new(UnexpectedEof));
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7F) << shift;
        if byte < 0x80 {
            return Ok(value);
        }
        shift += 7;
    }
    Err(DecodeError::new(IntOverflow))
}

/// Decodes a varint starting at `pos`, returning the value and the position just past it.
///
/// Errors carry `pos` as their offset.
#[inline]
pub fn decode_varint_at(buf: &[u8], pos: usize) -> Result<(u64, usize), DecodeError> {
    // Fast path for single-byte values, which covers nearly every tag.
    if let Some(&byte) = buf.get(pos) {
        if byte < 0x80 {
            return Ok((u64::from(byte), pos + 1));
        }
    }
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut index = pos;
    loop {
        if shift >= 64 {
            return Err(DecodeError::at(IntOverflow, pos));
        }
        let Some(&byte) = buf.get(index) else {
            return Err(DecodeError::at(UnexpectedEof, pos));
        };
        index += 1;
        value |= u64::from(byte & 0x7F) << shift;
        if byte < 0x80 {
            return Ok((value, index));
        }
        shift += 7;
    }
}

/// Returns the encoded length of the value in LEB128 variable length format.
/// The returned value will be between 1 and 10, inclusive.
#[inline]
pub fn encoded_len_varint(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

/// The wire types a field key can name, apart from the unsupported group delimiters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    /// Returns the payload size of fixed-width wire types.
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            WireType::Fixed64 => Some(8),
            WireType::Fixed32 => Some(4),
            WireType::Varint | WireType::LengthDelimited => None,
        }
    }
}

/// Returns the encoded length of the key for the given field number.
#[inline]
pub fn key_len(number: u32) -> usize {
    encoded_len_varint(u64::from(number) << 3)
}

/// Encodes a field key into the buffer.
#[inline]
pub fn encode_key<B: BufMut + ?Sized>(number: u32, wire_type: WireType, buf: &mut B) {
    debug_assert!((1..=MAX_FIELD_NUMBER).contains(&number));
    encode_varint((u64::from(number) << 3) | wire_type as u64, buf);
}

/// Writes a field key ending just before `end`, returning the index of its first byte.
#[inline]
pub fn encode_key_before(buf: &mut [u8], end: usize, number: u32, wire_type: WireType) -> usize {
    encode_varint_before(buf, end, (u64::from(number) << 3) | wire_type as u64)
}

/// Decodes a field key starting at `pos`, returning the field number, the wire type and the
/// position just past the key.
///
/// Group wire types are refused before the field number is validated. Both delimiters are refused,
/// for declared and undeclared fields alike, so an unknown field encoded as a group fails the
/// decode with `UnsupportedGroupEncoding` rather than being skipped and preserved as some other
/// protobuf runtimes do.
#[inline]
pub fn decode_key_at(buf: &[u8], pos: usize) -> Result<(u32, WireType, usize), DecodeError> {
    let (key, next) = decode_varint_at(buf, pos)?;
    let wire_type = match key & 0b111 {
        0 => WireType::Varint,
        1 => WireType::Fixed64,
        2 => WireType::LengthDelimited,
        3 | 4 => return Err(DecodeError::at(UnsupportedGroupEncoding, pos)),
        5 => WireType::Fixed32,
        _ => return Err(DecodeError::at(MalformedTag, pos)),
    };
    let number = key >> 3;
    if number == 0 || number > u64::from(MAX_FIELD_NUMBER) {
        return Err(DecodeError::at(MalformedTag, pos));
    }
    Ok((number as u32, wire_type, next))
}

/// Reads a length prefix at `pos` and checks that the region it describes ends at or before
/// `buf.len()`. Returns the region's bounds.
#[inline]
pub(crate) fn decode_length_at(buf: &[u8], pos: usize) -> Result<(usize, usize), DecodeError> {
    let (len, start) = decode_varint_at(buf, pos)?;
    let len = usize::try_from(len)
        .ok()
        .filter(|&len| len <= isize::MAX as usize)
        .ok_or_else(|| DecodeError::at(InvalidLength, pos))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| DecodeError::at(InvalidLength, pos))?;
    if end > buf.len() {
        return Err(DecodeError::at(UnexpectedEof, pos));
    }
    Ok((start, end))
}

/// Skips the payload of a field whose key has already been read, returning the position just
/// past the field.
pub fn skip_field_at(buf: &[u8], pos: usize, wire_type: WireType) -> Result<usize, DecodeError> {
    match wire_type {
        WireType::Varint => decode_varint_at(buf, pos).map(|(_, next)| next),
        WireType::LengthDelimited => decode_length_at(buf, pos).map(|(_, end)| end),
        WireType::Fixed64 | WireType::Fixed32 => {
            let end = pos + wire_type.fixed_size().unwrap_or_default();
            if end > buf.len() {
                return Err(DecodeError::at(UnexpectedEof, pos));
            }
            Ok(end)
        }
    }
}

/// Runtime decoding options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Drop unrecognized fields instead of preserving them in the record's unknown-field buffer.
    pub discard_unknown: bool,
    /// How deeply nested messages may be decoded. Ignored when the crate is built with the
    /// `no-recursion-limit` feature.
    pub recursion_limit: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            discard_unknown: false,
            recursion_limit: crate::RECURSION_LIMIT,
        }
    }
}

impl DecodeOptions {
    /// Returns options that drop unrecognized fields.
    pub fn discarding_unknown() -> Self {
        DecodeOptions {
            discard_unknown: true,
            ..Default::default()
        }
    }
}

/// Additional information passed to every decode function.
///
/// The context should be passed by value and can be freely copied. When passing
/// to a function which is decoding a nested object, then use `enter_recursion`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DecodeContext {
    pub(crate) discard_unknown: bool,
    /// How many times we can recurse in the current decode stack before we hit
    /// the recursion limit.
    #[cfg(not(feature = "no-recursion-limit"))]
    recurse_count: u32,
}

impl DecodeContext {
    pub(crate) fn new(options: &DecodeOptions) -> DecodeContext {
        DecodeContext {
            discard_unknown: options.discard_unknown,
            #[cfg(not(feature = "no-recursion-limit"))]
            recurse_count: options.recursion_limit,
        }
    }

    /// Call this function before recursively decoding. Fails if the recursion limit has been
    /// reached; `offset` is the start of the nested region.
    ///
    /// There is no `exit` function since this function creates a new `DecodeContext`
    /// to be used at the next level of recursion. Continue to use the old context
    /// at the previous level of recursion.
    #[inline]
    #[allow(clippy::unnecessary_wraps)] // needed in other features
    #[cfg_attr(feature = "no-recursion-limit", allow(unused_variables))]
    pub(crate) fn enter_recursion(&self, offset: usize) -> Result<DecodeContext, DecodeError> {
        #[cfg(not(feature = "no-recursion-limit"))]
        if self.recurse_count == 0 {
            return Err(DecodeError::at(RecursionLimitReached, offset));
        }
        Ok(DecodeContext {
            discard_unknown: self.discard_unknown,
            #[cfg(not(feature = "no-recursion-limit"))]
            recurse_count: self.recurse_count - 1,
        })
    }
}

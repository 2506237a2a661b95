use bytes::BufMut;
use tracing::debug;

use crate::descriptor::MessageDescriptor;
use crate::encoding::{
    decode_key_at, decode_length_at, decode_varint_at, encode_key, encode_varint,
    encoded_len_varint, key_len, skip_field_at, DecodeContext, DecodeOptions, WireType,
};
use crate::error::DecodeErrorKind::{
    InvalidUtf8, UnknownField, UnresolvedAnyType, WireTypeMismatch,
};
use crate::registry::Registry;
use crate::DecodeError;

/// Field numbers with this bit set mark fields a reader may safely ignore.
pub const NON_CRITICAL_BIT: u32 = 1 << 10;

/// Represents an opaque field value. Can represent any valid encoded value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawValue<'a> {
    Varint(u64),
    Fixed64([u8; 8]),
    LengthDelimited(&'a [u8]),
    Fixed32([u8; 4]),
}
use RawValue::*;

impl<'a> RawValue<'a> {
    pub fn varint_i64(value: i64) -> Self {
        Varint(value as u64)
    }

    pub fn fixed_u64(value: u64) -> Self {
        Fixed64(value.to_le_bytes())
    }

    pub fn fixed_u32(value: u32) -> Self {
        Fixed32(value.to_le_bytes())
    }

    pub fn wire_type(&self) -> WireType {
        match self {
            Varint(_) => WireType::Varint,
            Fixed64(_) => WireType::Fixed64,
            LengthDelimited(_) => WireType::LengthDelimited,
            Fixed32(_) => WireType::Fixed32,
        }
    }

    /// Encodes the value behind a key for the given field number.
    pub fn encode<B: BufMut + ?Sized>(&self, number: u32, buf: &mut B) {
        encode_key(number, self.wire_type(), buf);
        match self {
            Varint(value) => encode_varint(*value, buf),
            Fixed64(value) => buf.put_slice(value),
            LengthDelimited(value) => {
                encode_varint(value.len() as u64, buf);
                buf.put_slice(value);
            }
            Fixed32(value) => buf.put_slice(value),
        }
    }

    /// Returns the encoded length of the value behind a key for the given field number.
    pub fn encoded_len(&self, number: u32) -> usize {
        key_len(number)
            + match self {
                Varint(value) => encoded_len_varint(*value),
                Fixed64(_) => 8,
                LengthDelimited(value) => encoded_len_varint(value.len() as u64) + value.len(),
                Fixed32(_) => 4,
            }
    }
}

/// One field read from an encoded buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawField<'a> {
    pub number: u32,
    pub value: RawValue<'a>,
    /// The field's complete encoding, key included.
    pub span: &'a [u8],
    /// Where the field starts in the scanned buffer.
    pub offset: usize,
}

/// Iterates the fields of an encoded buffer without interpreting them, such as the contents of a
/// record's unknown-field buffer. Iteration stops after the first error.
#[derive(Clone, Debug)]
pub struct RawFields<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> RawFields<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::starting_at(buf, 0)
    }

    /// Scans from `pos` to the end of `buf`, reporting offsets relative to the start of `buf`.
    fn starting_at(buf: &'a [u8], pos: usize) -> Self {
        RawFields {
            buf,
            pos,
            failed: false,
        }
    }

    fn read_field(&self) -> Result<RawField<'a>, DecodeError> {
        let buf = self.buf;
        let offset = self.pos;
        let (number, wire_type, next) = decode_key_at(buf, offset)?;
        let (value, end) = match wire_type {
            WireType::Varint => {
                let (value, end) = decode_varint_at(buf, next)?;
                (Varint(value), end)
            }
            WireType::LengthDelimited => {
                let (start, end) = decode_length_at(buf, next)?;
                (LengthDelimited(&buf[start..end]), end)
            }
            WireType::Fixed64 => {
                let end = skip_field_at(buf, next, wire_type)?;
                let mut value = [0u8; 8];
                value.copy_from_slice(&buf[next..end]);
                (Fixed64(value), end)
            }
            WireType::Fixed32 => {
                let end = skip_field_at(buf, next, wire_type)?;
                let mut value = [0u8; 4];
                value.copy_from_slice(&buf[next..end]);
                (Fixed32(value), end)
            }
        };
        Ok(RawField {
            number,
            value,
            span: &buf[offset..end],
            offset,
        })
    }
}

impl<'a> Iterator for RawFields<'a> {
    type Item = Result<RawField<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        let result = self.read_field();
        match &result {
            Ok(field) => self.pos += field.span.len(),
            Err(_) => self.failed = true,
        }
        Some(result)
    }
}

/// The full name of the well-known record that packs another encoded record with its type URL.
pub const ANY_TYPE_NAME: &str = "google.protobuf.Any";

/// Checks an encoded buffer against a descriptor without decoding it, failing on the first field
/// the descriptor (or the descriptor of an enclosing nested field) does not declare.
///
/// Unknown fields whose number has [`NON_CRITICAL_BIT`] set are let through when
/// `allow_non_critical` is true. Returns whether any such field was seen.
///
/// When a `registry` is given, the records packed inside `google.protobuf.Any` values are checked
/// as well: the type named by the `type_url` is looked up in the registry, and a type it does not
/// know fails with [`UnresolvedAnyType`](crate::DecodeErrorKind::UnresolvedAnyType). Without a
/// registry only the `Any` envelope itself is checked. `descriptor` may itself be the `Any`
/// descriptor.
pub fn reject_unknown_fields(
    buf: &[u8],
    descriptor: &'static MessageDescriptor,
    allow_non_critical: bool,
    registry: Option<&Registry>,
) -> Result<bool, DecodeError> {
    Rejector {
        allow_non_critical,
        registry,
    }
    .reject_record(buf, 0, descriptor, DecodeContext::new(&DecodeOptions::default()))
}

struct Rejector<'r> {
    allow_non_critical: bool,
    registry: Option<&'r Registry>,
}

impl Rejector<'_> {
    fn reject_in(
        &self,
        fields: RawFields<'_>,
        descriptor: &'static MessageDescriptor,
        ctx: DecodeContext,
    ) -> Result<bool, DecodeError> {
        let buf = fields.buf;
        let mut saw_non_critical = false;
        for raw in fields {
            let raw = raw?;
            let Some(field) = descriptor.field_by_number(raw.number) else {
                let non_critical = raw.number & NON_CRITICAL_BIT != 0;
                saw_non_critical |= non_critical;
                if non_critical && self.allow_non_critical {
                    continue;
                }
                debug!(
                    message = descriptor.full_name(),
                    number = raw.number,
                    "rejecting unknown field"
                );
                return Err(DecodeError::at(
                    UnknownField { number: raw.number },
                    raw.offset,
                ));
            };
            let wire_type = raw.value.wire_type();
            if wire_type != field.wire_type() {
                return Err(DecodeError::at(
                    WireTypeMismatch {
                        field: field.full_name(),
                        expected: field.wire_type(),
                        actual: wire_type,
                    },
                    raw.offset,
                ));
            }
            let (Some(nested), LengthDelimited(payload)) = (field.kind().message_type(), raw.value)
            else {
                continue;
            };
            let end = raw.offset + raw.span.len();
            let start = end - payload.len();
            saw_non_critical |= ctx
                .enter_recursion(start)
                .and_then(|ctx| self.reject_record(&buf[..end], start, nested.descriptor(), ctx))
                .map_err(|mut error| {
                    error.push(descriptor.full_name(), field.name());
                    error
                })?;
        }
        Ok(saw_non_critical)
    }

    /// Checks the record occupying `buf[start..]`, and the record it packs if it is an `Any`.
    fn reject_record(
        &self,
        buf: &[u8],
        start: usize,
        descriptor: &'static MessageDescriptor,
        ctx: DecodeContext,
    ) -> Result<bool, DecodeError> {
        let mut saw_non_critical =
            self.reject_in(RawFields::starting_at(buf, start), descriptor, ctx)?;
        let Some(registry) = self.registry else {
            return Ok(saw_non_critical);
        };
        if descriptor.full_name() != ANY_TYPE_NAME {
            return Ok(saw_non_critical);
        }

        // The envelope was checked above, so fields 1 and 2 are the type URL and the value.
        let mut type_url = (&[][..], start);
        let mut value = None;
        for raw in RawFields::starting_at(buf, start) {
            let raw = raw?;
            match (raw.number, raw.value) {
                (1, LengthDelimited(url)) => type_url = (url, raw.offset),
                (2, LengthDelimited(payload)) => {
                    let end = raw.offset + raw.span.len();
                    value = Some((end - payload.len(), end));
                }
                _ => {}
            }
        }
        let (url, url_offset) = type_url;
        let url = std::str::from_utf8(url).map_err(|_| DecodeError::at(InvalidUtf8, url_offset))?;
        let type_name = url.rsplit_once('/').map_or(url, |(_, name)| name);
        let Some(packed) = registry.descriptor(type_name) else {
            debug!(type_url = url, "rejecting unresolvable Any type");
            return Err(DecodeError::at(UnresolvedAnyType, url_offset));
        };
        if let Some((value_start, value_end)) = value {
            saw_non_critical |= ctx
                .enter_recursion(value_start)
                .and_then(|ctx| self.reject_record(&buf[..value_end], value_start, packed, ctx))
                .map_err(|mut error| {
                    error.push(ANY_TYPE_NAME, "value");
                    error
                })?;
        }
        Ok(saw_non_critical)
    }
}

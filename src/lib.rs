#![doc = include_str!("../README.md")]

// Lets the derive macro's `::reflectwire::` paths resolve inside this crate's own tests.
extern crate self as reflectwire;

/// Re-export of the bytes crate for use within derived code.
pub use bytes;
/// Re-export of once_cell for the descriptor singletons in derived code.
#[doc(hidden)]
pub use once_cell;

#[cfg(feature = "derive")]
pub use reflectwire_derive::Record;

mod descriptor;
mod error;
mod message;
mod record;
pub mod reflect;
mod registry;

pub mod encoding;

#[cfg(all(test, feature = "derive"))]
mod derived_record_tests;

pub use crate::descriptor::{
    FieldDescriptor, LogicalKind, MessageDescriptor, MessageDescriptorBuilder, MessageType,
    OneofDescriptor, ScalarKind,
};
pub use crate::encoding::{marshal, size, unmarshal_into, DecodeOptions};
pub use crate::error::{
    DecodeError, DecodeErrorKind, DescriptorError, EncodeError, ReflectError, ReflectErrorKind,
};
pub use crate::message::Message;
pub use crate::record::{
    FieldMut, FieldRef, MemberSlot, MessageContainer, MessageSlot, RawRecord, RepeatedRecords,
};
pub use crate::reflect::{ListRef, ListView, MessageView, MutableValue, Reflect, Value, ValueRef};
pub use crate::registry::{descriptor_for, Registry, RegistryBuilder};

use bytes::{Buf, BufMut};

use crate::encoding::{decode_varint, encode_varint, encoded_len_varint};

// See `encoding::DecodeContext` for more info.
// 100 is the default recursion limit in the C++ implementation.
const RECURSION_LIMIT: u32 = 100;

/// Encodes a length delimiter to the buffer.
///
/// See [Message::encode_length_delimited] for more info.
///
/// An error will be returned if the buffer does not have sufficient capacity to encode the
/// delimiter.
#[inline]
pub fn encode_length_delimiter<B>(length: usize, buf: &mut B) -> Result<(), EncodeError>
where
    B: BufMut,
{
    let length = length as u64;
    let required = encoded_len_varint(length);
    let remaining = buf.remaining_mut();
    if required > remaining {
        return Err(EncodeError::new(required, remaining));
    }
    encode_varint(length, buf);
    Ok(())
}

/// Returns the encoded length of a length delimiter.
///
/// Applications may use this method to ensure sufficient buffer capacity before calling
/// `encode_length_delimiter`. The returned size will be between 1 and 10, inclusive.
#[inline(always)]
pub fn length_delimiter_len(length: usize) -> usize {
    encoded_len_varint(length as u64)
}

/// Decodes a length delimiter from the buffer.
///
/// This method allows the length delimiter to be decoded independently of the message, when the
/// message is encoded with [Message::encode_length_delimited].
///
/// An error may be returned in two cases:
///
///  * If the supplied buffer ends inside the delimiter, then an error indicates that more
///    input is required to decode the full delimiter.
///  * If the delimiter runs past ten bytes or does not fit in a `usize`, the buffer contains an
///    invalid delimiter, and typically the buffer should be considered corrupt.
#[inline(always)]
pub fn decode_length_delimiter<B: Buf>(mut buf: B) -> Result<usize, DecodeError> {
    decode_varint(&mut buf)?
        .try_into()
        .map_err(|_| DecodeError::new(DecodeErrorKind::InvalidLength))
}

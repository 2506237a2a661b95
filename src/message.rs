use bytes::{Buf, BufMut, Bytes};

use crate::encoding::{
    encode_varint, encoded_len_varint, marshal, marshal_into_slice, size, unmarshal_into,
    DecodeOptions,
};
use crate::error::DecodeErrorKind::UnexpectedEof;
use crate::reflect::{MessageView, Reflect};
use crate::{decode_length_delimiter, DecodeError, EncodeError, RawRecord};

/// Runs `f` over the buffer's remaining bytes as one contiguous slice, then consumes them.
fn with_contiguous<B, F, R>(buf: &mut B, f: F) -> R
where
    B: Buf + ?Sized,
    F: FnOnce(&[u8]) -> R,
{
    let len = buf.remaining();
    if buf.chunk().len() == len {
        let result = f(buf.chunk());
        buf.advance(len);
        result
    } else {
        let bytes = buf.copy_to_bytes(len);
        f(&bytes)
    }
}

/// Writes the record's encoding, which is `len` bytes long, into the buffer. The record is filled
/// in place when the buffer's current chunk can hold all of it, and staged in a temporary buffer
/// otherwise.
fn put_record<B: BufMut + ?Sized>(record: &dyn RawRecord, len: usize, buf: &mut B) {
    let chunk = buf.chunk_mut();
    if chunk.len() < len {
        let mut staged = vec![0u8; len];
        marshal_into_slice(record, &mut staged);
        buf.put_slice(&staged);
        return;
    }
    let chunk = &mut chunk[..len];
    for index in 0..len {
        chunk.write_byte(index, 0);
    }
    // SAFETY: all `len` bytes of the chunk were initialized just above.
    let filled = unsafe { std::slice::from_raw_parts_mut(chunk.as_mut_ptr(), len) };
    marshal_into_slice(record, filled);
    // SAFETY: the first `len` bytes of the chunk are initialized.
    unsafe { buf.advance_mut(len) };
}

/// A record. Provides basic encoding and decoding functionality for record types, and the entry
/// points to reflection.
///
/// `Message` is implemented as a usability layer on top of the basic functionality afforded by
/// `RawRecord`; every derived record type implements it.
pub trait Message: RawRecord + Default {
    /// Returns the encoded length of the message without a length delimiter.
    fn encoded_len(&self) -> usize;

    /// Encodes the message to a buffer.
    ///
    /// An error will be returned if the buffer does not have sufficient capacity.
    fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) -> Result<(), EncodeError>;

    /// Encodes the message to a newly allocated buffer.
    fn encode_to_vec(&self) -> Vec<u8>;

    /// Encodes the message to a `Bytes` buffer.
    fn encode_to_bytes(&self) -> Bytes;

    /// Encodes the message with a length-delimiter to a buffer.
    ///
    /// An error will be returned if the buffer does not have sufficient capacity.
    fn encode_length_delimited<B: BufMut + ?Sized>(&self, buf: &mut B) -> Result<(), EncodeError>;

    /// Encodes the message with a length-delimiter to a newly allocated buffer.
    fn encode_length_delimited_to_vec(&self) -> Vec<u8>;

    /// Decodes an instance of the message from a buffer.
    ///
    /// The entire buffer will be consumed.
    fn decode<B: Buf>(buf: B) -> Result<Self, DecodeError>;

    /// Decodes an instance of the message from a buffer with the given options.
    fn decode_with_options<B: Buf>(buf: B, options: &DecodeOptions) -> Result<Self, DecodeError>;

    /// Decodes a length-delimited instance of the message from the buffer.
    fn decode_length_delimited<B: Buf>(buf: B) -> Result<Self, DecodeError>;

    /// Decodes the buffer and merges it into `self`. Repeated fields accumulate, so merging the
    /// same bytes twice is not idempotent.
    fn merge<B: Buf>(&mut self, buf: B) -> Result<(), DecodeError>;

    /// Clears `self` and decodes the buffer into it. On error `self` is left cleared.
    fn replace_from<B: Buf>(&mut self, buf: B) -> Result<(), DecodeError>;

    /// Returns a mutable reflection handle aliasing `self`.
    fn reflect(&mut self) -> Reflect<'_>;

    /// Returns a read-only reflection view of `self`.
    fn view(&self) -> MessageView<'_>;
}

impl<T> Message for T
where
    T: RawRecord + Default,
{
    fn encoded_len(&self) -> usize {
        size(self)
    }

    fn encode<B: BufMut + ?Sized>(&self, buf: &mut B) -> Result<(), EncodeError> {
        let required = self.encoded_len();
        let remaining = buf.remaining_mut();
        if required > remaining {
            return Err(EncodeError::new(required, remaining));
        }
        put_record(self, required, buf);
        Ok(())
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        marshal(self)
    }

    fn encode_to_bytes(&self) -> Bytes {
        Bytes::from(marshal(self))
    }

    fn encode_length_delimited<B: BufMut + ?Sized>(&self, buf: &mut B) -> Result<(), EncodeError> {
        let len = self.encoded_len();
        let required = len + encoded_len_varint(len as u64);
        let remaining = buf.remaining_mut();
        if required > remaining {
            return Err(EncodeError::new(required, remaining));
        }
        encode_varint(len as u64, buf);
        put_record(self, len, buf);
        Ok(())
    }

    fn encode_length_delimited_to_vec(&self) -> Vec<u8> {
        let len = self.encoded_len();
        let prefix = encoded_len_varint(len as u64);
        let mut buf = Vec::with_capacity(prefix + len);
        encode_varint(len as u64, &mut buf);
        buf.resize(prefix + len, 0);
        marshal_into_slice(self, &mut buf[prefix..]);
        buf
    }

    fn decode<B: Buf>(buf: B) -> Result<Self, DecodeError> {
        Self::decode_with_options(buf, &DecodeOptions::default())
    }

    fn decode_with_options<B: Buf>(
        mut buf: B,
        options: &DecodeOptions,
    ) -> Result<Self, DecodeError> {
        let mut message = Self::default();
        with_contiguous(&mut buf, |bytes| unmarshal_into(&mut message, bytes, options))?;
        Ok(message)
    }

    fn decode_length_delimited<B: Buf>(mut buf: B) -> Result<Self, DecodeError> {
        let len = decode_length_delimiter(&mut buf)?;
        if len > buf.remaining() {
            return Err(DecodeError::new(UnexpectedEof));
        }
        Self::decode(buf.take(len))
    }

    fn merge<B: Buf>(&mut self, mut buf: B) -> Result<(), DecodeError> {
        with_contiguous(&mut buf, |bytes| {
            unmarshal_into(self, bytes, &DecodeOptions::default())
        })
    }

    fn replace_from<B: Buf>(&mut self, buf: B) -> Result<(), DecodeError> {
        RawRecord::clear(self);
        self.merge(buf).map_err(|err| {
            RawRecord::clear(self);
            err
        })
    }

    fn reflect(&mut self) -> Reflect<'_> {
        Reflect::new(self)
    }

    fn view(&self) -> MessageView<'_> {
        MessageView::new(self)
    }
}

use crate::encoding::{encode_key_before, encode_varint_before, size, WireType};
use crate::record::{declared_field, FieldRef, RawRecord};

/// Encodes the record into a newly allocated buffer of exactly `size(record)` bytes.
pub fn marshal(record: &dyn RawRecord) -> Vec<u8> {
    let mut buf = vec![0u8; size(record)];
    marshal_into_slice(record, &mut buf);
    buf
}

/// Fills `buf` with the record's encoding, writing from the end toward the start so that each
/// nested record's length is known by the time its prefix is written.
///
/// Panics unless `buf` is exactly `size(record)` bytes long.
pub fn marshal_into_slice(record: &dyn RawRecord, buf: &mut [u8]) {
    let start = fill_backward(record, buf, buf.len());
    assert_eq!(
        start,
        0,
        "encoding of {} did not fill its buffer",
        record.descriptor().full_name()
    );
}

/// Writes the record so that it ends just before `end`, returning where it starts.
///
/// The unknown-field buffer goes first, so it lands after every known field; known fields follow
/// in descending number order, so they land in ascending order.
fn fill_backward(record: &dyn RawRecord, buf: &mut [u8], end: usize) -> usize {
    let mut end = copy_before(buf, end, record.unknown_fields());
    for field in record.descriptor().fields_descending() {
        let number = field.number();
        match declared_field(record, number) {
            FieldRef::Message(None) => {}
            FieldRef::Message(Some(inner)) => end = nested_before(buf, end, number, inner),
            FieldRef::Repeated(list) => {
                for index in (0..list.len()).rev() {
                    if let Some(element) = list.get(index) {
                        end = nested_before(buf, end, number, element);
                    }
                }
            }
            scalar if !scalar.is_present(field) => {}
            scalar => {
                if let Some(value) = scalar.as_varint() {
                    end = encode_varint_before(buf, end, value);
                    end = encode_key_before(buf, end, number, WireType::Varint);
                } else if let Some(bytes) = scalar.as_bytes() {
                    end = copy_before(buf, end, bytes);
                    end = encode_varint_before(buf, end, bytes.len() as u64);
                    end = encode_key_before(buf, end, number, WireType::LengthDelimited);
                }
            }
        }
    }
    end
}

fn nested_before(buf: &mut [u8], end: usize, number: u32, inner: &dyn RawRecord) -> usize {
    let start = fill_backward(inner, buf, end);
    let start = encode_varint_before(buf, start, (end - start) as u64);
    encode_key_before(buf, start, number, WireType::LengthDelimited)
}

#[inline]
fn copy_before(buf: &mut [u8], end: usize, bytes: &[u8]) -> usize {
    let start = end - bytes.len();
    buf[start..end].copy_from_slice(bytes);
    start
}

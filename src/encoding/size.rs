use crate::encoding::{encoded_len_varint, key_len};
use crate::descriptor::FieldDescriptor;
use crate::record::{declared_field, FieldRef, RawRecord};

/// Returns the exact encoded length of the record, without a length delimiter.
///
/// Nested records are measured recursively; the unknown-field buffer counts at its raw length.
pub fn size(record: &dyn RawRecord) -> usize {
    record
        .descriptor()
        .fields()
        .iter()
        .map(|field| field_len(field, declared_field(record, field.number())))
        .sum::<usize>()
        + record.unknown_fields().len()
}

fn field_len(field: &FieldDescriptor, value: FieldRef<'_>) -> usize {
    let number = field.number();
    match value {
        FieldRef::Message(None) => 0,
        FieldRef::Message(Some(inner)) => delimited_len(number, size(inner)),
        FieldRef::Repeated(list) => (0..list.len())
            .filter_map(|index| list.get(index))
            .map(|element| delimited_len(number, size(element)))
            .sum(),
        scalar if !scalar.is_present(field) => 0,
        scalar => match (scalar.as_varint(), scalar.as_bytes()) {
            (Some(value), _) => key_len(number) + encoded_len_varint(value),
            (None, Some(bytes)) => delimited_len(number, bytes.len()),
            (None, None) => 0,
        },
    }
}

#[inline]
fn delimited_len(number: u32, len: usize) -> usize {
    key_len(number) + encoded_len_varint(len as u64) + len
}

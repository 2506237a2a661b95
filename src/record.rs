use std::any::Any;
use std::fmt;

use crate::descriptor::{FieldDescriptor, MessageDescriptor, MessageType};

/// Trait implemented by record types, giving the codec and the reflection API integer-keyed access
/// to their fields. The methods of this trait are meant to be used through `Message`, the free
/// `size`/`marshal`/`unmarshal_into` functions and the reflection handles.
///
/// Implementations are generated by `#[derive(Record)]`. The trait is object safe; everything
/// type-independent in the codec works on `&dyn RawRecord`.
pub trait RawRecord: Any + fmt::Debug {
    /// Returns the descriptor for this record type, building it on first use.
    fn static_descriptor() -> &'static MessageDescriptor
    where
        Self: Sized;

    fn descriptor(&self) -> &'static MessageDescriptor;

    /// Borrows the field with the given number, or `None` if the record declares no such field.
    fn field(&self, number: u32) -> Option<FieldRef<'_>>;

    /// Mutably borrows the field with the given number.
    fn field_mut(&mut self, number: u32) -> Option<FieldMut<'_>>;

    /// The encoded bytes of every field the record did not recognize when decoded.
    fn unknown_fields(&self) -> &[u8];

    fn unknown_fields_mut(&mut self) -> &mut Vec<u8>;

    /// Clears the record, resetting all fields and the unknown-field buffer.
    fn clear(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Takes a boxed record of this type back out of a `Box<dyn RawRecord>`. A record of another
    /// type is handed back.
    fn from_boxed(value: Box<dyn RawRecord>) -> Result<Self, Box<dyn RawRecord>>
    where
        Self: Sized,
    {
        value.downcast::<Self>().map(|value| *value)
    }
}

/// Nested fields may be boxed, which allows record types to contain themselves.
impl<T: RawRecord> RawRecord for Box<T> {
    fn static_descriptor() -> &'static MessageDescriptor {
        T::static_descriptor()
    }

    fn descriptor(&self) -> &'static MessageDescriptor {
        (**self).descriptor()
    }

    fn field(&self, number: u32) -> Option<FieldRef<'_>> {
        (**self).field(number)
    }

    fn field_mut(&mut self, number: u32) -> Option<FieldMut<'_>> {
        (**self).field_mut(number)
    }

    fn unknown_fields(&self) -> &[u8] {
        (**self).unknown_fields()
    }

    fn unknown_fields_mut(&mut self) -> &mut Vec<u8> {
        (**self).unknown_fields_mut()
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn as_any(&self) -> &dyn Any {
        (**self).as_any()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        (**self).as_any_mut()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        T::into_any(*self)
    }

    fn from_boxed(value: Box<dyn RawRecord>) -> Result<Self, Box<dyn RawRecord>> {
        value.downcast::<T>()
    }
}

impl dyn RawRecord {
    pub fn downcast_ref<T: RawRecord>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: RawRecord>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }

    pub fn downcast<T: RawRecord>(self: Box<Self>) -> Result<Box<T>, Box<dyn RawRecord>> {
        if self.as_any().is::<T>() {
            // The check above guarantees the downcast succeeds.
            Ok(self.into_any().downcast().unwrap_or_else(|_| unreachable!()))
        } else {
            Err(self)
        }
    }
}

/// A borrowed field value.
#[derive(Clone, Copy, Debug)]
pub enum FieldRef<'a> {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    String(&'a str),
    Bytes(&'a [u8]),
    /// A nested record, or `None` when unset.
    Message(Option<&'a dyn RawRecord>),
    Repeated(&'a dyn RepeatedRecords),
    /// A scalar oneof member that is not selected.
    Unset,
}

impl<'a> FieldRef<'a> {
    /// Returns whether the field counts as present. Members of a oneof group are present whenever
    /// they are selected, even when they hold zero. Other scalars are present when not zero or
    /// empty, messages when set regardless of their contents, and repeated fields when not empty.
    pub fn is_present(&self, field: &FieldDescriptor) -> bool {
        match *self {
            FieldRef::Unset => false,
            FieldRef::Message(value) => value.is_some(),
            FieldRef::Repeated(list) => !list.is_empty(),
            _ if field.oneof_index().is_some() => true,
            FieldRef::Bool(value) => value,
            FieldRef::Int32(value) => value != 0,
            FieldRef::Int64(value) => value != 0,
            FieldRef::Uint32(value) => value != 0,
            FieldRef::Uint64(value) => value != 0,
            FieldRef::String(value) => !value.is_empty(),
            FieldRef::Bytes(value) => !value.is_empty(),
        }
    }

    /// Returns the value of a varint-typed scalar as it is written to the wire. Negative 32-bit
    /// values are sign-extended.
    pub fn as_varint(&self) -> Option<u64> {
        match *self {
            FieldRef::Bool(value) => Some(u64::from(value)),
            FieldRef::Int32(value) => Some(i64::from(value) as u64),
            FieldRef::Int64(value) => Some(value as u64),
            FieldRef::Uint32(value) => Some(u64::from(value)),
            FieldRef::Uint64(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the payload of a length-delimited scalar.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            FieldRef::String(value) => Some(value.as_bytes()),
            FieldRef::Bytes(value) => Some(value),
            _ => None,
        }
    }
}

/// A mutably borrowed field.
pub enum FieldMut<'a> {
    Bool(&'a mut bool),
    Int32(&'a mut i32),
    Int64(&'a mut i64),
    Uint32(&'a mut u32),
    Uint64(&'a mut u64),
    String(&'a mut String),
    Bytes(&'a mut Vec<u8>),
    Message(&'a mut dyn MessageSlot),
    Repeated(&'a mut dyn RepeatedRecords),
    /// A scalar oneof member, which may not be selected.
    Member(&'a mut dyn MemberSlot),
}

impl<'a> FieldMut<'a> {
    /// Selects a scalar oneof member, storing its zero value if it was not selected, and borrows
    /// its value. Other fields are returned as they are.
    pub fn select(self) -> FieldMut<'a> {
        match self {
            FieldMut::Member(slot) => slot.select(),
            other => other,
        }
    }

    /// Resets the field to its absent state.
    pub fn clear(self) {
        match self {
            FieldMut::Bool(value) => *value = false,
            FieldMut::Int32(value) => *value = 0,
            FieldMut::Int64(value) => *value = 0,
            FieldMut::Uint32(value) => *value = 0,
            FieldMut::Uint64(value) => *value = 0,
            FieldMut::String(value) => value.clear(),
            FieldMut::Bytes(value) => value.clear(),
            FieldMut::Message(slot) => slot.clear(),
            FieldMut::Repeated(list) => list.truncate(0),
            FieldMut::Member(slot) => slot.clear(),
        }
    }

    /// Stores a decoded varint into a varint-typed scalar, truncating to the field's width as the
    /// wire format prescribes. Returns `false` for other field kinds.
    pub fn set_varint(self, raw: u64) -> bool {
        match self {
            FieldMut::Bool(value) => *value = raw != 0,
            FieldMut::Int32(value) => *value = raw as i32,
            FieldMut::Int64(value) => *value = raw as i64,
            FieldMut::Uint32(value) => *value = raw as u32,
            FieldMut::Uint64(value) => *value = raw,
            FieldMut::Member(slot) => return slot.select().set_varint(raw),
            _ => return false,
        }
        true
    }
}

/// Storage for an optional nested record: `Option<T>`, where `T` may itself be a `Box`.
pub trait MessageSlot {
    fn get(&self) -> Option<&dyn RawRecord>;

    fn get_mut(&mut self) -> Option<&mut dyn RawRecord>;

    /// Returns the nested record, first storing an empty one if it is unset.
    fn get_or_insert_default(&mut self) -> &mut dyn RawRecord;

    /// Replaces the nested record. A record of the wrong type is handed back.
    fn set(&mut self, value: Box<dyn RawRecord>) -> Result<(), Box<dyn RawRecord>>;

    fn clear(&mut self);

    fn message_type(&self) -> MessageType;
}

impl<T: RawRecord + Default> MessageSlot for Option<T> {
    fn get(&self) -> Option<&dyn RawRecord> {
        self.as_ref().map(|value| value as &dyn RawRecord)
    }

    fn get_mut(&mut self) -> Option<&mut dyn RawRecord> {
        self.as_mut().map(|value| value as &mut dyn RawRecord)
    }

    fn get_or_insert_default(&mut self) -> &mut dyn RawRecord {
        self.get_or_insert_with(T::default)
    }

    fn set(&mut self, value: Box<dyn RawRecord>) -> Result<(), Box<dyn RawRecord>> {
        *self = Some(T::from_boxed(value)?);
        Ok(())
    }

    fn clear(&mut self) {
        *self = None;
    }

    fn message_type(&self) -> MessageType {
        MessageType::of::<T>()
    }
}

/// Storage for a scalar oneof member: `Option<T>`, which is `None` while another member or no
/// member of the group is selected.
pub trait MemberSlot {
    /// Borrows the member's value, or `FieldRef::Unset` when it is not selected.
    fn get(&self) -> FieldRef<'_>;

    /// Selects the member, storing its zero value if it was not selected.
    fn select(&mut self) -> FieldMut<'_>;

    fn clear(&mut self);
}

macro_rules! member_slot {
    ($($ty:ty => $variant:ident($($deref:tt)?)),* $(,)?) => {$(
        impl MemberSlot for Option<$ty> {
            fn get(&self) -> FieldRef<'_> {
                match self {
                    Some(value) => FieldRef::$variant($($deref)? value),
                    None => FieldRef::Unset,
                }
            }

            fn select(&mut self) -> FieldMut<'_> {
                FieldMut::$variant(self.get_or_insert_with(Default::default))
            }

            fn clear(&mut self) {
                *self = None;
            }
        }
    )*};
}

member_slot!(
    bool => Bool(*),
    i32 => Int32(*),
    i64 => Int64(*),
    u32 => Uint32(*),
    u64 => Uint64(*),
    String => String(),
    Vec<u8> => Bytes(),
);

/// Storage for a repeated nested-record field.
pub trait RepeatedRecords: fmt::Debug {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<&dyn RawRecord>;

    fn get_mut(&mut self, index: usize) -> Option<&mut dyn RawRecord>;

    /// Replaces the element at `index`, which must be in bounds. A record of the wrong type is
    /// handed back.
    fn set(&mut self, index: usize, value: Box<dyn RawRecord>) -> Result<(), Box<dyn RawRecord>>;

    /// Appends an element. A record of the wrong type is handed back.
    fn push(&mut self, value: Box<dyn RawRecord>) -> Result<(), Box<dyn RawRecord>>;

    /// Appends an empty element and returns it.
    fn push_default(&mut self) -> &mut dyn RawRecord;

    fn truncate(&mut self, len: usize);

    /// Creates an empty record of the element type, not attached to the list.
    fn new_element(&self) -> Box<dyn RawRecord>;

    fn message_type(&self) -> MessageType;
}

impl<T: RawRecord + Default> RepeatedRecords for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, index: usize) -> Option<&dyn RawRecord> {
        <[T]>::get(self, index).map(|value| value as &dyn RawRecord)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut dyn RawRecord> {
        <[T]>::get_mut(self, index).map(|value| value as &mut dyn RawRecord)
    }

    fn set(&mut self, index: usize, value: Box<dyn RawRecord>) -> Result<(), Box<dyn RawRecord>> {
        self[index] = T::from_boxed(value)?;
        Ok(())
    }

    fn push(&mut self, value: Box<dyn RawRecord>) -> Result<(), Box<dyn RawRecord>> {
        Vec::push(self, T::from_boxed(value)?);
        Ok(())
    }

    fn push_default(&mut self) -> &mut dyn RawRecord {
        Vec::push(self, T::default());
        let last = Vec::len(self) - 1;
        &mut self[last]
    }

    fn truncate(&mut self, len: usize) {
        Vec::truncate(self, len)
    }

    fn new_element(&self) -> Box<dyn RawRecord> {
        Box::<T>::default()
    }

    fn message_type(&self) -> MessageType {
        MessageType::of::<T>()
    }
}

/// Names the record type held by a message or repeated-message field's storage. Used by the
/// derive macro to describe nested fields.
pub trait MessageContainer {
    type Record: RawRecord + Default;
}

impl<T: RawRecord + Default> MessageContainer for Option<T> {
    type Record = T;
}

impl<T: RawRecord + Default> MessageContainer for Vec<T> {
    type Record = T;
}

#[cold]
#[track_caller]
fn undeclared(descriptor: &MessageDescriptor, number: u32) -> ! {
    panic!(
        "record type for {} does not expose its declared field {}",
        descriptor.full_name(),
        number
    )
}

/// Borrows a field the record's descriptor declares.
///
/// Panics if the `RawRecord` implementation disagrees with its own descriptor.
pub(crate) fn declared_field(record: &dyn RawRecord, number: u32) -> FieldRef<'_> {
    match record.field(number) {
        Some(field) => field,
        None => undeclared(record.descriptor(), number),
    }
}

/// Mutably borrows a field the record's descriptor declares.
///
/// Panics if the `RawRecord` implementation disagrees with its own descriptor.
pub(crate) fn declared_field_mut(record: &mut dyn RawRecord, number: u32) -> FieldMut<'_> {
    let descriptor = record.descriptor();
    match record.field_mut(number) {
        Some(field) => field,
        None => undeclared(descriptor, number),
    }
}

/// Clears every other member of the oneof group `field` belongs to.
pub(crate) fn clear_oneof_siblings(record: &mut dyn RawRecord, field: &FieldDescriptor) {
    let descriptor = record.descriptor();
    let Some(oneof) = descriptor.oneof_of(field) else {
        return;
    };
    for &number in oneof.field_numbers() {
        if number != field.number() {
            declared_field_mut(record, number).clear();
        }
    }
}

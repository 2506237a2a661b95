//! Generic, descriptor-driven access to any record's fields.
//!
//! [`MessageView`] borrows a record immutably and [`Reflect`] borrows it mutably; both are thin
//! wrappers pairing the record with its descriptor, so changes made through a handle are changes
//! to the record itself. Fields are named by [`FieldDescriptor`]s, which must come from the
//! record's own descriptor.

use crate::descriptor::{FieldDescriptor, LogicalKind, MessageDescriptor, MessageType, ScalarKind};
use crate::error::ReflectErrorKind::{
    ExtensionsUnsupported, NotMutable, TypeMismatch, UnknownField, UnknownOneof,
};
use crate::record::{
    clear_oneof_siblings, declared_field, declared_field_mut, FieldMut, FieldRef, RawRecord,
};
use crate::ReflectError;

mod list;

pub use list::{ListRef, ListView};

/// An owned value that can be assigned to a field.
#[derive(Debug)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    String(String),
    Bytes(Vec<u8>),
    Message(Box<dyn RawRecord>),
    List(Vec<Box<dyn RawRecord>>),
}

impl Value {
    pub fn message<R: RawRecord>(record: R) -> Value {
        Value::Message(Box::new(record))
    }

    /// The zero value of a scalar kind.
    pub fn zero(kind: ScalarKind) -> Value {
        match kind {
            ScalarKind::Bool => Value::Bool(false),
            ScalarKind::Int32 => Value::Int32(0),
            ScalarKind::Int64 => Value::Int64(0),
            ScalarKind::Uint32 => Value::Uint32(0),
            ScalarKind::Uint64 => Value::Uint64(0),
            ScalarKind::String => Value::String(String::new()),
            ScalarKind::Bytes => Value::Bytes(Vec::new()),
        }
    }

    fn fits(&self, kind: LogicalKind) -> bool {
        match (kind, self) {
            (LogicalKind::Scalar(ScalarKind::Bool), Value::Bool(_))
            | (LogicalKind::Scalar(ScalarKind::Int32), Value::Int32(_))
            | (LogicalKind::Scalar(ScalarKind::Int64), Value::Int64(_))
            | (LogicalKind::Scalar(ScalarKind::Uint32), Value::Uint32(_))
            | (LogicalKind::Scalar(ScalarKind::Uint64), Value::Uint64(_))
            | (LogicalKind::Scalar(ScalarKind::String), Value::String(_))
            | (LogicalKind::Scalar(ScalarKind::Bytes), Value::Bytes(_)) => true,
            (LogicalKind::Message(ty), Value::Message(record)) => is_of_type(ty, &**record),
            (LogicalKind::RepeatedMessage(ty), Value::List(records)) => {
                records.iter().all(|record| is_of_type(ty, &**record))
            }
            _ => false,
        }
    }
}

fn is_of_type(ty: MessageType, record: &dyn RawRecord) -> bool {
    std::ptr::eq(ty.descriptor(), record.descriptor())
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Value {
                    Value::$variant(value.into())
                }
            }
        )*
    };
}

value_from!(
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    u32 => Uint32,
    u64 => Uint64,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    &[u8] => Bytes,
);

/// A borrowed field value.
#[derive(Clone, Copy, Debug)]
pub enum ValueRef<'a> {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    String(&'a str),
    Bytes(&'a [u8]),
    /// A nested record. Unset fields read as an empty, read-only view of the field's type.
    Message(MessageView<'a>),
    List(ListRef<'a>),
}

impl<'a> ValueRef<'a> {
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            ValueRef::Bool(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            ValueRef::Int32(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ValueRef::Int64(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            ValueRef::Uint32(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            ValueRef::Uint64(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match *self {
            ValueRef::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            ValueRef::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<MessageView<'a>> {
        match *self {
            ValueRef::Message(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<ListRef<'a>> {
        match *self {
            ValueRef::List(list) => Some(list),
            _ => None,
        }
    }
}

/// Returns the record type of a message or repeated-message field.
///
/// Panics for scalar fields; callers only ask once the record has produced a nested value.
fn nested_type(field: &FieldDescriptor) -> MessageType {
    match field.kind().message_type() {
        Some(ty) => ty,
        None => panic!("field {} is not a message field", field.full_name()),
    }
}

fn value_ref<'a>(field: &FieldDescriptor, value: FieldRef<'a>) -> ValueRef<'a> {
    match value {
        FieldRef::Bool(value) => ValueRef::Bool(value),
        FieldRef::Int32(value) => ValueRef::Int32(value),
        FieldRef::Int64(value) => ValueRef::Int64(value),
        FieldRef::Uint32(value) => ValueRef::Uint32(value),
        FieldRef::Uint64(value) => ValueRef::Uint64(value),
        FieldRef::String(value) => ValueRef::String(value),
        FieldRef::Bytes(value) => ValueRef::Bytes(value),
        FieldRef::Message(Some(record)) => ValueRef::Message(MessageView::new(record)),
        FieldRef::Message(None) => {
            ValueRef::Message(MessageView::empty(nested_type(field).descriptor()))
        }
        FieldRef::Repeated(list) => ValueRef::List(ListRef::new(list)),
        FieldRef::Unset => zero_ref(field),
    }
}

/// The value every field reads as in an empty view.
fn zero_ref(field: &FieldDescriptor) -> ValueRef<'static> {
    match field.kind() {
        LogicalKind::Scalar(ScalarKind::Bool) => ValueRef::Bool(false),
        LogicalKind::Scalar(ScalarKind::Int32) => ValueRef::Int32(0),
        LogicalKind::Scalar(ScalarKind::Int64) => ValueRef::Int64(0),
        LogicalKind::Scalar(ScalarKind::Uint32) => ValueRef::Uint32(0),
        LogicalKind::Scalar(ScalarKind::Uint64) => ValueRef::Uint64(0),
        LogicalKind::Scalar(ScalarKind::String) => ValueRef::String(""),
        LogicalKind::Scalar(ScalarKind::Bytes) => ValueRef::Bytes(&[]),
        LogicalKind::Message(ty) => ValueRef::Message(MessageView::empty(ty.descriptor())),
        LogicalKind::RepeatedMessage(ty) => ValueRef::List(ListRef::empty(ty.descriptor())),
    }
}

/// Maps a caller's field descriptor to the message's own, or explains why it does not belong.
fn resolve(
    descriptor: &'static MessageDescriptor,
    field: &FieldDescriptor,
) -> Result<&'static FieldDescriptor, ReflectError> {
    match descriptor.resolve(field) {
        Some(own) => Ok(own),
        None if field.is_extension() => {
            Err(ReflectError::new(ExtensionsUnsupported, field.full_name()))
        }
        None => Err(ReflectError::new(UnknownField, field.full_name())),
    }
}

/// A read-only view of a record, or of an unset nested record of a known type.
#[derive(Clone, Copy, Debug)]
pub struct MessageView<'a> {
    record: Option<&'a dyn RawRecord>,
    descriptor: &'static MessageDescriptor,
}

impl<'a> MessageView<'a> {
    pub fn new(record: &'a dyn RawRecord) -> Self {
        MessageView {
            record: Some(record),
            descriptor: record.descriptor(),
        }
    }

    /// A view of no record at all: every field reads as absent.
    pub fn empty(descriptor: &'static MessageDescriptor) -> Self {
        MessageView {
            record: None,
            descriptor,
        }
    }

    pub fn descriptor(&self) -> &'static MessageDescriptor {
        self.descriptor
    }

    /// Returns whether the view is backed by a record.
    pub fn is_valid(&self) -> bool {
        self.record.is_some()
    }

    pub fn record(&self) -> Option<&'a dyn RawRecord> {
        self.record
    }

    pub fn downcast_ref<T: RawRecord>(&self) -> Option<&'a T> {
        self.record?.downcast_ref()
    }

    /// Returns whether the field is populated. Scalars are populated when not zero or empty,
    /// nested records when set and repeated fields when not empty. A selected oneof member is
    /// populated even when it holds zero.
    pub fn has(&self, field: &FieldDescriptor) -> Result<bool, ReflectError> {
        let field = resolve(self.descriptor, field)?;
        Ok(self
            .record
            .is_some_and(|record| declared_field(record, field.number()).is_present(field)))
    }

    /// Returns the field's value. Unset nested records read as empty views, never as nothing.
    pub fn get(&self, field: &FieldDescriptor) -> Result<ValueRef<'a>, ReflectError> {
        let field = resolve(self.descriptor, field)?;
        Ok(match self.record {
            Some(record) => value_ref(field, declared_field(record, field.number())),
            None => zero_ref(field),
        })
    }

    /// Visits every populated field in declaration order until `visit` returns false.
    pub fn range<F>(&self, mut visit: F)
    where
        F: FnMut(&'static FieldDescriptor, ValueRef<'a>) -> bool,
    {
        let Some(record) = self.record else {
            return;
        };
        for field in self.descriptor.fields() {
            let value = declared_field(record, field.number());
            if value.is_present(field) && !visit(field, value_ref(field, value)) {
                return;
            }
        }
    }

    /// Returns the populated member of the named oneof group. The name may be given short or
    /// fully qualified.
    pub fn which_oneof(&self, name: &str) -> Result<Option<&'static FieldDescriptor>, ReflectError> {
        let descriptor = self.descriptor;
        let short = name
            .strip_prefix(descriptor.full_name())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(name);
        let oneof = descriptor
            .oneof_by_name(short)
            .ok_or_else(|| ReflectError::new(UnknownOneof, name))?;
        let Some(record) = self.record else {
            return Ok(None);
        };
        Ok(oneof
            .field_numbers()
            .iter()
            .filter_map(|&number| descriptor.field_by_number(number))
            .find(|field| declared_field(record, field.number()).is_present(field)))
    }

    /// The raw bytes of every unrecognized field.
    pub fn get_unknown(&self) -> &'a [u8] {
        self.record.map_or(&[], |record| record.unknown_fields())
    }
}

/// A handle to a nested record field or a repeated field, borrowed mutably.
#[derive(Debug)]
pub enum MutableValue<'a> {
    Message(Reflect<'a>),
    List(ListView<'a>),
}

impl<'a> MutableValue<'a> {
    pub fn into_message(self) -> Option<Reflect<'a>> {
        match self {
            MutableValue::Message(message) => Some(message),
            MutableValue::List(_) => None,
        }
    }

    pub fn into_list(self) -> Option<ListView<'a>> {
        match self {
            MutableValue::List(list) => Some(list),
            MutableValue::Message(_) => None,
        }
    }
}

/// A mutable reflection handle aliasing one record.
#[derive(Debug)]
pub struct Reflect<'a> {
    record: &'a mut dyn RawRecord,
}

impl<'a> Reflect<'a> {
    pub fn new(record: &'a mut dyn RawRecord) -> Self {
        Reflect { record }
    }

    pub fn descriptor(&self) -> &'static MessageDescriptor {
        self.record.descriptor()
    }

    pub fn view(&self) -> MessageView<'_> {
        MessageView::new(&*self.record)
    }

    /// Gives up mutable access for a view that lives as long as the original borrow.
    pub fn into_view(self) -> MessageView<'a> {
        MessageView::new(self.record)
    }

    pub fn downcast_mut<T: RawRecord>(&mut self) -> Option<&mut T> {
        self.record.downcast_mut()
    }

    pub fn has(&self, field: &FieldDescriptor) -> Result<bool, ReflectError> {
        self.view().has(field)
    }

    pub fn get(&self, field: &FieldDescriptor) -> Result<ValueRef<'_>, ReflectError> {
        self.view().get(field)
    }

    pub fn range<F>(&self, visit: F)
    where
        F: FnMut(&'static FieldDescriptor, ValueRef<'_>) -> bool,
    {
        self.view().range(visit)
    }

    pub fn which_oneof(&self, name: &str) -> Result<Option<&'static FieldDescriptor>, ReflectError> {
        self.view().which_oneof(name)
    }

    pub fn get_unknown(&self) -> &[u8] {
        self.record.unknown_fields()
    }

    /// Replaces the unknown-field buffer. The bytes are not validated.
    pub fn set_unknown(&mut self, bytes: impl Into<Vec<u8>>) {
        *self.record.unknown_fields_mut() = bytes.into();
    }

    /// Overwrites the field. Nested records replace the current one; lists replace the whole
    /// repeated field. Setting a oneof member clears the other members.
    pub fn set(&mut self, field: &FieldDescriptor, value: Value) -> Result<(), ReflectError> {
        let field = resolve(self.descriptor(), field)?;
        let mismatch = || ReflectError::new(TypeMismatch, field.full_name());
        if !value.fits(field.kind()) {
            return Err(mismatch());
        }
        clear_oneof_siblings(&mut *self.record, field);
        match (declared_field_mut(&mut *self.record, field.number()).select(), value) {
            (FieldMut::Bool(slot), Value::Bool(value)) => *slot = value,
            (FieldMut::Int32(slot), Value::Int32(value)) => *slot = value,
            (FieldMut::Int64(slot), Value::Int64(value)) => *slot = value,
            (FieldMut::Uint32(slot), Value::Uint32(value)) => *slot = value,
            (FieldMut::Uint64(slot), Value::Uint64(value)) => *slot = value,
            (FieldMut::String(slot), Value::String(value)) => *slot = value,
            (FieldMut::Bytes(slot), Value::Bytes(value)) => *slot = value,
            (FieldMut::Message(slot), Value::Message(record)) => {
                slot.set(record).map_err(|_| mismatch())?
            }
            (FieldMut::Repeated(list), Value::List(records)) => {
                list.truncate(0);
                for record in records {
                    list.push(record).map_err(|_| mismatch())?;
                }
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    /// Returns a mutable handle to a nested record field, storing an empty record first if it is
    /// unset, or to a repeated field. Scalar fields are not mutable.
    pub fn mutable(&mut self, field: &FieldDescriptor) -> Result<MutableValue<'_>, ReflectError> {
        let field = resolve(self.descriptor(), field)?;
        if let LogicalKind::Scalar(_) = field.kind() {
            return Err(ReflectError::new(NotMutable, field.full_name()));
        }
        clear_oneof_siblings(&mut *self.record, field);
        match declared_field_mut(&mut *self.record, field.number()) {
            FieldMut::Message(slot) => Ok(MutableValue::Message(Reflect::new(
                slot.get_or_insert_default(),
            ))),
            FieldMut::Repeated(list) => Ok(MutableValue::List(ListView::new(list, field))),
            _ => Err(ReflectError::new(NotMutable, field.full_name())),
        }
    }

    /// Resets the field to absent.
    pub fn clear(&mut self, field: &FieldDescriptor) -> Result<(), ReflectError> {
        let field = resolve(self.descriptor(), field)?;
        declared_field_mut(&mut *self.record, field.number()).clear();
        Ok(())
    }

    /// Returns a new value assignable to the field: a scalar zero, an empty record or an empty
    /// list.
    pub fn new_field(&self, field: &FieldDescriptor) -> Result<Value, ReflectError> {
        let field = resolve(self.descriptor(), field)?;
        Ok(match field.kind() {
            LogicalKind::Scalar(kind) => Value::zero(kind),
            LogicalKind::Message(ty) => Value::Message(ty.new_record()),
            LogicalKind::RepeatedMessage(_) => Value::List(Vec::new()),
        })
    }
}

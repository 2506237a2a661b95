use crate::descriptor::{FieldDescriptor, MessageDescriptor};
use crate::error::ReflectErrorKind::{IndexOutOfRange, TypeMismatch};
use crate::record::{RawRecord, RepeatedRecords};
use crate::reflect::{MessageView, Reflect, Value};
use crate::ReflectError;

/// A read-only view of a repeated record field.
#[derive(Clone, Copy, Debug)]
pub struct ListRef<'a> {
    list: Option<&'a dyn RepeatedRecords>,
    descriptor: &'static MessageDescriptor,
}

impl<'a> ListRef<'a> {
    pub(crate) fn new(list: &'a dyn RepeatedRecords) -> Self {
        ListRef {
            list: Some(list),
            descriptor: list.message_type().descriptor(),
        }
    }

    pub(crate) fn empty(descriptor: &'static MessageDescriptor) -> Self {
        ListRef {
            list: None,
            descriptor,
        }
    }

    /// Returns whether the view is backed by a record's field.
    pub fn is_valid(&self) -> bool {
        self.list.is_some()
    }

    /// The descriptor of the element type.
    pub fn element_descriptor(&self) -> &'static MessageDescriptor {
        self.descriptor
    }

    pub fn len(&self) -> usize {
        self.list.map_or(0, |list| list.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<MessageView<'a>, ReflectError> {
        self.list
            .and_then(|list| list.get(index))
            .map(MessageView::new)
            .ok_or_else(|| out_of_range(self.descriptor.full_name(), index, self.len()))
    }

    pub fn iter(&self) -> impl 'a + Iterator<Item = MessageView<'a>> {
        let list = self.list;
        (0..self.len()).filter_map(move |index| list?.get(index).map(MessageView::new))
    }
}

fn out_of_range(subject: &str, index: usize, len: usize) -> ReflectError {
    ReflectError::new(
        IndexOutOfRange,
        format!("{subject}[{index}] (length {len})"),
    )
}

/// A mutable handle to a repeated record field. Changes apply to the record's own list.
#[derive(Debug)]
pub struct ListView<'a> {
    list: &'a mut dyn RepeatedRecords,
    field: &'static FieldDescriptor,
}

impl<'a> ListView<'a> {
    pub(crate) fn new(list: &'a mut dyn RepeatedRecords, field: &'static FieldDescriptor) -> Self {
        ListView { list, field }
    }

    /// The repeated field this list belongs to.
    pub fn field(&self) -> &'static FieldDescriptor {
        self.field
    }

    pub fn element_descriptor(&self) -> &'static MessageDescriptor {
        self.list.message_type().descriptor()
    }

    pub fn as_list_ref(&self) -> ListRef<'_> {
        ListRef::new(&*self.list)
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<MessageView<'_>, ReflectError> {
        match self.list.get(index) {
            Some(record) => Ok(MessageView::new(record)),
            None => Err(self.out_of_range(index)),
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Result<Reflect<'_>, ReflectError> {
        let len = self.list.len();
        match self.list.get_mut(index) {
            Some(record) => Ok(Reflect::new(record)),
            None => Err(out_of_range(self.field.full_name(), index, len)),
        }
    }

    /// Replaces the element at `index`.
    pub fn set(&mut self, index: usize, value: Value) -> Result<(), ReflectError> {
        if index >= self.list.len() {
            return Err(self.out_of_range(index));
        }
        let record = self.element(value)?;
        self.list
            .set(index, record)
            .map_err(|_| self.mismatch())
    }

    pub fn append(&mut self, value: Value) -> Result<(), ReflectError> {
        let record = self.element(value)?;
        self.list.push(record).map_err(|_| self.mismatch())
    }

    /// Appends an empty element and returns a handle to it.
    pub fn append_mutable(&mut self) -> Reflect<'_> {
        Reflect::new(self.list.push_default())
    }

    /// Shortens the list to `len` elements. Growing a list this way is an error.
    pub fn truncate(&mut self, len: usize) -> Result<(), ReflectError> {
        if len > self.list.len() {
            return Err(self.out_of_range(len));
        }
        self.list.truncate(len);
        Ok(())
    }

    /// Creates an empty element, not attached to the list.
    pub fn new_element(&self) -> Value {
        Value::Message(self.list.new_element())
    }

    fn element(&self, value: Value) -> Result<Box<dyn RawRecord>, ReflectError> {
        match value {
            Value::Message(record)
                if std::ptr::eq(record.descriptor(), self.element_descriptor()) =>
            {
                Ok(record)
            }
            _ => Err(self.mismatch()),
        }
    }

    fn mismatch(&self) -> ReflectError {
        ReflectError::new(TypeMismatch, self.field.full_name())
    }

    fn out_of_range(&self, index: usize) -> ReflectError {
        out_of_range(self.field.full_name(), index, self.list.len())
    }
}

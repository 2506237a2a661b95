//! Static per-type metadata: fields, their numbers, kinds and names.

use std::fmt;

use hashbrown::HashMap;

use crate::encoding::{WireType, MAX_FIELD_NUMBER};
use crate::error::DescriptorError;
use crate::record::RawRecord;

/// Scalar field kinds. All of them use the varint wire type except `String` and `Bytes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int32,
    Int64,
    Uint32,
    Uint64,
    String,
    Bytes,
}

impl ScalarKind {
    pub const fn wire_type(self) -> WireType {
        match self {
            ScalarKind::String | ScalarKind::Bytes => WireType::LengthDelimited,
            _ => WireType::Varint,
        }
    }
}

/// Handle to a record type: its descriptor and a constructor for empty instances.
///
/// Holding function pointers rather than the descriptor itself lets record types refer to each
/// other, and to themselves, before any descriptor is built.
#[derive(Clone, Copy)]
pub struct MessageType {
    descriptor: fn() -> &'static MessageDescriptor,
    new: fn() -> Box<dyn RawRecord>,
}

fn new_boxed<R: RawRecord + Default>() -> Box<dyn RawRecord> {
    Box::<R>::default()
}

impl MessageType {
    pub fn of<R: RawRecord + Default>() -> MessageType {
        MessageType {
            descriptor: R::static_descriptor,
            new: new_boxed::<R>,
        }
    }

    pub fn descriptor(&self) -> &'static MessageDescriptor {
        (self.descriptor)()
    }

    /// Creates an empty record of this type.
    pub fn new_record(&self) -> Box<dyn RawRecord> {
        (self.new)()
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageType")
            .field(&self.descriptor().full_name())
            .finish()
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor().full_name() == other.descriptor().full_name()
    }
}

/// What a field holds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LogicalKind {
    Scalar(ScalarKind),
    /// An optional, exclusively owned nested record.
    Message(MessageType),
    /// An ordered sequence of nested records, one wire field per element.
    RepeatedMessage(MessageType),
}

impl LogicalKind {
    pub const fn wire_type(&self) -> WireType {
        match self {
            LogicalKind::Scalar(scalar) => scalar.wire_type(),
            LogicalKind::Message(_) | LogicalKind::RepeatedMessage(_) => WireType::LengthDelimited,
        }
    }

    /// Returns the record type of message and repeated-message fields.
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            LogicalKind::Scalar(_) => None,
            LogicalKind::Message(ty) | LogicalKind::RepeatedMessage(ty) => Some(*ty),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    number: u32,
    name: String,
    full_name: String,
    kind: LogicalKind,
    oneof: Option<usize>,
    extension: bool,
}

impl FieldDescriptor {
    /// Describes an extension field. Declared messages never contain extensions, so reflection
    /// refuses these descriptors.
    pub fn extension(number: u32, full_name: impl Into<String>, kind: LogicalKind) -> Self {
        let full_name = full_name.into();
        let name = full_name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_string();
        FieldDescriptor {
            number,
            name,
            full_name,
            kind,
            oneof: None,
            extension: true,
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The message's full name and the field name, joined by a dot.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn kind(&self) -> LogicalKind {
        self.kind
    }

    pub fn wire_type(&self) -> WireType {
        self.kind.wire_type()
    }

    pub fn is_extension(&self) -> bool {
        self.extension
    }

    pub fn is_repeated(&self) -> bool {
        matches!(self.kind, LogicalKind::RepeatedMessage(_))
    }

    /// Index of the field's oneof group in its message's `oneofs()`.
    pub fn oneof_index(&self) -> Option<usize> {
        self.oneof
    }
}

impl PartialEq for FieldDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
            && self.extension == other.extension
            && self.full_name == other.full_name
    }
}

/// A named group of mutually exclusive fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OneofDescriptor {
    name: String,
    full_name: String,
    numbers: Vec<u32>,
}

impl OneofDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Numbers of the member fields, in declaration order.
    pub fn field_numbers(&self) -> &[u32] {
        &self.numbers
    }
}

/// Describes one record type.
///
/// Fields are kept in declaration order; lookups by number and by name are hash lookups. Built
/// once per type and immutable afterwards.
#[derive(Clone, Debug)]
pub struct MessageDescriptor {
    full_name: String,
    fields: Vec<FieldDescriptor>,
    /// Indices into `fields`, by descending field number. This is serialization order.
    descending: Vec<usize>,
    by_number: HashMap<u32, usize>,
    by_name: HashMap<String, usize>,
    oneofs: Vec<OneofDescriptor>,
}

impl MessageDescriptor {
    pub fn builder(full_name: impl Into<String>) -> MessageDescriptorBuilder {
        MessageDescriptorBuilder {
            full_name: full_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// The last component of the full name.
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.full_name)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Fields in descending field-number order.
    pub fn fields_descending(&self) -> impl '_ + Iterator<Item = &FieldDescriptor> {
        self.descending.iter().map(|&i| &self.fields[i])
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Looks a field up by its full name, `<message full name>.<field name>`.
    pub fn field_by_full_name(&self, full_name: &str) -> Option<&FieldDescriptor> {
        full_name
            .strip_prefix(self.full_name.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .and_then(|name| self.field_by_name(name))
    }

    pub fn oneofs(&self) -> &[OneofDescriptor] {
        &self.oneofs
    }

    pub fn oneof_by_name(&self, name: &str) -> Option<&OneofDescriptor> {
        self.oneofs.iter().find(|oneof| oneof.name == name)
    }

    /// Returns the oneof group the field belongs to, if any.
    pub fn oneof_of(&self, field: &FieldDescriptor) -> Option<&OneofDescriptor> {
        field.oneof.and_then(|i| self.oneofs.get(i))
    }

    /// Returns this message's own descriptor for `field`, if `field` describes one of its fields.
    pub fn resolve(&self, field: &FieldDescriptor) -> Option<&FieldDescriptor> {
        self.field_by_number(field.number)
            .filter(|own| *own == field)
    }
}

/// Collects fields for a [`MessageDescriptor`] and validates them on `build`.
#[derive(Debug)]
pub struct MessageDescriptorBuilder {
    full_name: String,
    fields: Vec<(u32, String, LogicalKind, Option<String>)>,
}

impl MessageDescriptorBuilder {
    pub fn field(mut self, number: u32, name: impl Into<String>, kind: LogicalKind) -> Self {
        self.fields.push((number, name.into(), kind, None));
        self
    }

    /// Adds a field belonging to the named oneof group. Groups are declared by their first
    /// member.
    pub fn oneof_field(
        mut self,
        number: u32,
        name: impl Into<String>,
        kind: LogicalKind,
        oneof: impl Into<String>,
    ) -> Self {
        self.fields
            .push((number, name.into(), kind, Some(oneof.into())));
        self
    }

    pub fn build(self) -> Result<MessageDescriptor, DescriptorError> {
        let message = self.full_name;
        let mut fields = Vec::with_capacity(self.fields.len());
        let mut by_number = HashMap::with_capacity(self.fields.len());
        let mut by_name = HashMap::with_capacity(self.fields.len());
        let mut oneofs = Vec::<OneofDescriptor>::new();

        for (index, (number, name, kind, oneof)) in self.fields.into_iter().enumerate() {
            if number == 0 || number > MAX_FIELD_NUMBER {
                return Err(DescriptorError::InvalidFieldNumber {
                    message: message.clone(),
                    number,
                });
            }
            if by_number.insert(number, index).is_some() {
                return Err(DescriptorError::DuplicateFieldNumber {
                    message: message.clone(),
                    number,
                });
            }
            if by_name.insert(name.clone(), index).is_some() {
                return Err(DescriptorError::DuplicateFieldName {
                    message: message.clone(),
                    name,
                });
            }
            let oneof = oneof.map(|group| {
                match oneofs.iter().position(|existing| existing.name == group) {
                    Some(i) => {
                        oneofs[i].numbers.push(number);
                        i
                    }
                    None => {
                        oneofs.push(OneofDescriptor {
                            full_name: format!("{}.{}", message, group),
                            name: group,
                            numbers: vec![number],
                        });
                        oneofs.len() - 1
                    }
                }
            });
            fields.push(FieldDescriptor {
                number,
                full_name: format!("{}.{}", message, name),
                name,
                kind,
                oneof,
                extension: false,
            });
        }

        let mut descending: Vec<usize> = (0..fields.len()).collect();
        descending.sort_unstable_by_key(|&i| std::cmp::Reverse(fields[i].number));

        Ok(MessageDescriptor {
            full_name: message,
            fields,
            descending,
            by_number,
            by_name,
            oneofs,
        })
    }
}

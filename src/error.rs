//! Encoding, decoding, reflection and descriptor errors.

use std::fmt;

use crate::encoding::WireType;

/// Message decoding error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DecodeErrorKind {
    /// A varint ran past ten bytes without terminating.
    IntOverflow,
    /// Decoded data was truncated.
    UnexpectedEof,
    /// A field key encoded field number zero, a field number out of range, or an unassigned wire
    /// type.
    MalformedTag,
    /// A field key used the deprecated start-group or end-group wire types.
    UnsupportedGroupEncoding,
    /// A declared field was encoded with a wire type other than the one its kind requires.
    WireTypeMismatch {
        field: &'static str,
        expected: WireType,
        actual: WireType,
    },
    /// A length prefix cannot describe a region on this platform.
    InvalidLength,
    /// A string field held bytes that are not UTF-8.
    InvalidUtf8,
    /// Recursion limit was reached when parsing.
    RecursionLimitReached,
    /// An unrecognized field was encountered while rejecting unknown fields.
    UnknownField { number: u32 },
    /// The type URL of a `google.protobuf.Any` named a type the registry does not know, while
    /// rejecting unknown fields.
    UnresolvedAnyType,
}

use DecodeErrorKind::*;

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntOverflow => f.write_str("integer overflow"),
            UnexpectedEof => f.write_str("unexpected end of input"),
            MalformedTag => f.write_str("malformed field tag"),
            UnsupportedGroupEncoding => f.write_str("group encoding is not supported"),
            WireTypeMismatch {
                field,
                expected,
                actual,
            } => write!(
                f,
                "wrong wire type {:?} for field {} (expected {:?})",
                actual, field, expected
            ),
            InvalidLength => f.write_str("invalid length prefix"),
            InvalidUtf8 => f.write_str("string field is not valid UTF-8"),
            RecursionLimitReached => f.write_str("recursion limit reached"),
            UnknownField { number } => write!(f, "unknown field {}", number),
            UnresolvedAnyType => f.write_str("Any holds a type that cannot be resolved"),
        }
    }
}

/// A message decoding error.
///
/// `DecodeError` names what went wrong and the byte offset, relative to the start of the buffer
/// handed to the decoder, of the element that could not be read.
///
/// With the "detailed-errors" feature enabled the error also records the path of (message, field)
/// names leading to the nested field that failed.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    offset: usize,
    #[cfg(feature = "detailed-errors")]
    /// A stack of (message, field) name pairs, innermost first.
    stack: thin_vec::ThinVec<(&'static str, &'static str)>,
}

impl DecodeError {
    /// Creates a new `DecodeError` at offset zero.
    #[cold]
    pub fn new(kind: DecodeErrorKind) -> DecodeError {
        DecodeError::at(kind, 0)
    }

    /// Creates a new `DecodeError` for the element starting at `offset`.
    #[cold]
    pub fn at(kind: DecodeErrorKind, offset: usize) -> DecodeError {
        DecodeError {
            kind,
            offset,
            #[cfg(feature = "detailed-errors")]
            stack: Default::default(),
        }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> DecodeErrorKind {
        self.kind
    }

    /// Returns the byte offset of the element that failed to decode.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Pushes a (message, field) name location pair on to the location stack.
    #[doc(hidden)]
    pub fn push(&mut self, message: &'static str, field: &'static str) {
        #[cfg(feature = "detailed-errors")]
        self.stack.push((message, field));
        _ = (message, field);
    }

    /// Returns the (message, field) path to the failing field, innermost first.
    #[cfg(feature = "detailed-errors")]
    pub fn path(&self) -> &[(&'static str, &'static str)] {
        &self.stack
    }
}

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DecodeError");
        s.field("description", &self.kind);
        s.field("offset", &self.offset);
        #[cfg(feature = "detailed-errors")]
        s.field("stack", &self.stack);
        s.finish()
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to decode message at offset {}: ", self.offset)?;
        #[cfg(feature = "detailed-errors")]
        for (message, field) in self.stack.iter().rev() {
            write!(f, "{}.{}: ", message, field)?;
        }
        self.kind.fmt(f)
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for std::io::Error {
    fn from(error: DecodeError) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::InvalidData, error)
    }
}

/// A message encoding error.
///
/// `EncodeError` always indicates that a message failed to encode because the
/// provided buffer had insufficient capacity. Message encoding is otherwise
/// infallible.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EncodeError {
    required: usize,
    remaining: usize,
}

impl EncodeError {
    pub(crate) fn new(required: usize, remaining: usize) -> EncodeError {
        EncodeError {
            required,
            remaining,
        }
    }

    /// Returns the required buffer capacity to encode the message.
    pub fn required_capacity(&self) -> usize {
        self.required
    }

    /// Returns the remaining length in the provided buffer at the time of encoding.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to encode message; insufficient buffer capacity \
            (required: {}, remaining: {})",
            self.required, self.remaining
        )
    }
}

impl std::error::Error for EncodeError {}

impl From<EncodeError> for std::io::Error {
    fn from(error: EncodeError) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, error)
    }
}

/// Reflection error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ReflectErrorKind {
    /// The field descriptor does not belong to the message.
    UnknownField,
    /// The message declares no oneof group with the given name.
    UnknownOneof,
    /// The field descriptor describes an extension field.
    ExtensionsUnsupported,
    /// The field holds a scalar and has no mutable handle.
    NotMutable,
    /// A list index was outside the list.
    IndexOutOfRange,
    /// A value of the wrong kind or record type was assigned to a field.
    TypeMismatch,
}

impl fmt::Display for ReflectErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReflectErrorKind::UnknownField => "message does not contain field",
            ReflectErrorKind::UnknownOneof => "message does not contain oneof",
            ReflectErrorKind::ExtensionsUnsupported => {
                "declared messages do not support extensions"
            }
            ReflectErrorKind::NotMutable => "field is not mutable",
            ReflectErrorKind::IndexOutOfRange => "list index out of range",
            ReflectErrorKind::TypeMismatch => "value does not match field type",
        })
    }
}

/// An error from the reflection API, naming the field, oneof or index it concerns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReflectError {
    kind: ReflectErrorKind,
    subject: String,
}

impl ReflectError {
    #[cold]
    pub(crate) fn new(kind: ReflectErrorKind, subject: impl Into<String>) -> ReflectError {
        ReflectError {
            kind,
            subject: subject.into(),
        }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ReflectErrorKind {
        self.kind
    }

    /// Returns the name of the field or oneof, or the index, the error concerns.
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl fmt::Display for ReflectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.subject)
    }
}

impl std::error::Error for ReflectError {}

/// An invalid message descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum DescriptorError {
    /// A field number was zero or greater than the largest representable field number.
    InvalidFieldNumber { message: String, number: u32 },
    /// Two fields share a number.
    DuplicateFieldNumber { message: String, number: u32 },
    /// Two fields share a name.
    DuplicateFieldName { message: String, name: String },
    /// Two different record types were registered under one full name.
    ConflictingMessage { message: String },
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::InvalidFieldNumber { message, number } => {
                write!(f, "message {} has invalid field number {}", message, number)
            }
            DescriptorError::DuplicateFieldNumber { message, number } => {
                write!(f, "message {} has duplicate field number {}", message, number)
            }
            DescriptorError::DuplicateFieldName { message, name } => {
                write!(f, "message {} has duplicate field name {}", message, name)
            }
            DescriptorError::ConflictingMessage { message } => {
                write!(f, "message {} is registered by two record types", message)
            }
        }
    }
}

impl std::error::Error for DescriptorError {}

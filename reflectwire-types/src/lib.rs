//! Common record types implemented alongside the [`reflectwire`] crate: a signed [`Duration`], the
//! [`Any`] envelope for records whose type is only known at runtime, and the pagination records
//! in [`query`].

use std::fmt;
use std::time;

use reflectwire::{unmarshal_into, DecodeError, DecodeOptions, Message, RawRecord, Record, Registry};

pub mod query;

/// A signed span of time with nanosecond resolution.
///
/// Unlike `std::time::Duration` this type can be negative; `From` conversions are defined in both
/// directions and fail where the ranges differ.
#[derive(Clone, Debug, Default, PartialEq, Eq, Record)]
#[reflect(name = "google.protobuf.Duration")]
pub struct Duration {
    #[reflect(number = 1)]
    pub seconds: i64,
    #[reflect(number = 2)]
    pub nanos: i32,
    #[reflect(unknown_fields)]
    pub unknown_fields: Vec<u8>,
}

const NANOS_PER_SECOND: i32 = 1_000_000_000;
const NANOS_MAX: i32 = NANOS_PER_SECOND - 1;

impl Duration {
    pub fn new(seconds: i64, nanos: i32) -> Duration {
        Duration {
            seconds,
            nanos,
            unknown_fields: Vec::new(),
        }
    }

    /// Normalizes the duration so that `nanos` lies within one second and carries the same sign as
    /// `seconds`. Values out of range saturate at the largest normal magnitude.
    pub fn normalize(&mut self) {
        if self.nanos <= -NANOS_PER_SECOND || self.nanos >= NANOS_PER_SECOND {
            match self
                .seconds
                .checked_add((self.nanos / NANOS_PER_SECOND) as i64)
            {
                Some(seconds) => {
                    self.seconds = seconds;
                    self.nanos %= NANOS_PER_SECOND;
                }
                None if self.nanos < 0 => {
                    self.seconds = i64::MIN;
                    self.nanos = -NANOS_MAX;
                }
                None => {
                    self.seconds = i64::MAX;
                    self.nanos = NANOS_MAX;
                }
            }
        }

        if self.seconds < 0 && self.nanos > 0 {
            match self.seconds.checked_add(1) {
                Some(seconds) => {
                    self.seconds = seconds;
                    self.nanos -= NANOS_PER_SECOND;
                }
                None => self.nanos = NANOS_MAX,
            }
        } else if self.seconds > 0 && self.nanos < 0 {
            match self.seconds.checked_sub(1) {
                Some(seconds) => {
                    self.seconds = seconds;
                    self.nanos += NANOS_PER_SECOND;
                }
                None => self.nanos = -NANOS_MAX,
            }
        }
    }
}

impl TryFrom<time::Duration> for Duration {
    type Error = DurationError;

    /// Converts a `std::time::Duration`, failing if it is too large.
    fn try_from(duration: time::Duration) -> Result<Duration, DurationError> {
        let seconds = i64::try_from(duration.as_secs()).map_err(|_| DurationError::OutOfRange)?;
        let mut duration = Duration::new(seconds, duration.subsec_nanos() as i32);
        duration.normalize();
        Ok(duration)
    }
}

impl TryFrom<Duration> for time::Duration {
    type Error = DurationError;

    /// Converts to a `std::time::Duration`, failing if the duration is negative.
    fn try_from(mut duration: Duration) -> Result<time::Duration, DurationError> {
        duration.normalize();
        if duration.seconds >= 0 && duration.nanos >= 0 {
            Ok(time::Duration::new(
                duration.seconds as u64,
                duration.nanos as u32,
            ))
        } else {
            Err(DurationError::NegativeDuration(time::Duration::new(
                duration.seconds.unsigned_abs(),
                duration.nanos.unsigned_abs(),
            )))
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = self.clone();
        d.normalize();
        if d.seconds < 0 || d.nanos < 0 {
            f.write_str("-")?;
        }
        write!(f, "{}", d.seconds.unsigned_abs())?;

        let nanos = d.nanos.unsigned_abs();
        if nanos == 0 {
            f.write_str("s")
        } else if nanos % 1_000_000 == 0 {
            write!(f, ".{:03}s", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            write!(f, ".{:06}s", nanos / 1_000)
        } else {
            write!(f, ".{:09}s", nanos)
        }
    }
}

/// A duration conversion error.
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub enum DurationError {
    /// The duration is negative. Holds its magnitude.
    NegativeDuration(time::Duration),
    /// The duration does not fit.
    OutOfRange,
}

impl fmt::Display for DurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationError::NegativeDuration(duration) => {
                write!(f, "failed to convert negative duration: {:?}", duration)
            }
            DurationError::OutOfRange => f.write_str("failed to convert duration out of range"),
        }
    }
}

impl std::error::Error for DurationError {}

const TYPE_URL_PREFIX: &str = "type.googleapis.com/";

/// An encoded record together with a URL naming its type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Record)]
#[reflect(name = "google.protobuf.Any")]
pub struct Any {
    pub type_url: String,
    pub value: Vec<u8>,
    #[reflect(unknown_fields)]
    pub unknown_fields: Vec<u8>,
}

impl Any {
    /// Encodes `record` into a new envelope.
    pub fn pack<R: Message>(record: &R) -> Any {
        Any {
            type_url: format!("{}{}", TYPE_URL_PREFIX, record.descriptor().full_name()),
            value: record.encode_to_vec(),
            unknown_fields: Vec::new(),
        }
    }

    /// The full message name the type URL ends with.
    pub fn type_name(&self) -> &str {
        match self.type_url.rsplit_once('/') {
            Some((_, name)) => name,
            None => &self.type_url,
        }
    }

    pub fn is<R: RawRecord>(&self) -> bool {
        self.type_name() == R::static_descriptor().full_name()
    }

    /// Decodes the contents as an `R`.
    pub fn unpack<R: Message>(&self) -> Result<R, AnyError> {
        if !self.is::<R>() {
            return Err(AnyError::TypeMismatch {
                expected: R::static_descriptor().full_name().to_owned(),
                actual: self.type_name().to_owned(),
            });
        }
        Ok(R::decode(self.value.as_slice())?)
    }

    /// Decodes the contents as whichever record type the registry knows by the envelope's type
    /// name.
    pub fn unpack_with(&self, registry: &Registry) -> Result<Box<dyn RawRecord>, AnyError> {
        let mut record = registry
            .new_record(self.type_name())
            .ok_or_else(|| AnyError::UnknownType(self.type_name().to_owned()))?;
        unmarshal_into(&mut *record, &self.value, &DecodeOptions::default())?;
        Ok(record)
    }
}

/// An error unpacking an [`Any`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnyError {
    /// The envelope holds a different record type than the one asked for.
    TypeMismatch { expected: String, actual: String },
    /// The registry has no record type by the envelope's type name.
    UnknownType(String),
    Decode(DecodeError),
}

impl fmt::Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyError::TypeMismatch { expected, actual } => {
                write!(f, "expected an Any holding {}, found {}", expected, actual)
            }
            AnyError::UnknownType(name) => write!(f, "no registered record type {}", name),
            AnyError::Decode(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for AnyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnyError::Decode(error) => Some(error),
            _ => None,
        }
    }
}

impl From<DecodeError> for AnyError {
    fn from(error: DecodeError) -> Self {
        AnyError::Decode(error)
    }
}

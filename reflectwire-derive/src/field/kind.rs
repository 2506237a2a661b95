use anyhow::{bail, Error};
use quote::{quote, ToTokens};
use syn::{GenericArgument, Meta, PathArguments, PathSegment, Type};

use crate::attrs::{set_option, word_attr};

/// What a record field holds, mirroring `reflectwire::LogicalKind`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Int32,
    Int64,
    Uint32,
    Uint64,
    String,
    Bytes,
    Message,
    Repeated,
}

const WORDS: [(&str, Kind); 9] = [
    ("bool", Kind::Bool),
    ("int32", Kind::Int32),
    ("int64", Kind::Int64),
    ("uint32", Kind::Uint32),
    ("uint64", Kind::Uint64),
    ("string", Kind::String),
    ("bytes", Kind::Bytes),
    ("message", Kind::Message),
    ("repeated", Kind::Repeated),
];

impl Kind {
    /// Reads a kind word such as `uint64` or `message`, setting `kind` if it is one.
    pub fn from_attr(attr: &Meta, kind: &mut Option<Kind>) -> Result<bool, Error> {
        match WORDS.iter().find(|(word, _)| word_attr(attr, word)) {
            Some(&(_, found)) => {
                set_option(kind, found, "conflicting field kinds")?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Infers the kind from the field's Rust type. `Option<T>` is a message unless `T` is a
    /// scalar type, which makes it a scalar oneof member.
    pub fn infer(ty: &Type) -> Result<Kind, Error> {
        if let Some(inner) = option_inner(ty) {
            return Ok(Kind::infer_scalar(inner).unwrap_or(Kind::Message));
        }
        if let Some(kind) = Kind::infer_scalar(ty) {
            return Ok(kind);
        }
        match last_segment(ty) {
            Some(last) if last.ident == "Vec" => Ok(Kind::Repeated),
            _ => bail!(
                "cannot infer a field kind for type {}; add one of {}",
                ty.to_token_stream(),
                WORDS.map(|(word, _)| word).join(", ")
            ),
        }
    }

    fn infer_scalar(ty: &Type) -> Option<Kind> {
        let last = last_segment(ty)?;
        Some(match last.ident.to_string().as_str() {
            "bool" => Kind::Bool,
            "i32" => Kind::Int32,
            "i64" => Kind::Int64,
            "u32" => Kind::Uint32,
            "u64" => Kind::Uint64,
            "String" => Kind::String,
            "Vec" if single_argument(last).is_some_and(is_u8) => Kind::Bytes,
            _ => return None,
        })
    }

    pub fn is_repeated(self) -> bool {
        self == Kind::Repeated
    }

    pub fn is_scalar(self) -> bool {
        !matches!(self, Kind::Message | Kind::Repeated)
    }
}

fn last_segment(ty: &Type) -> Option<&PathSegment> {
    match ty {
        Type::Path(path) => path.path.segments.last(),
        _ => None,
    }
}

fn single_argument(segment: &PathSegment) -> Option<&Type> {
    match &segment.arguments {
        PathArguments::AngleBracketed(args) if args.args.len() == 1 => match args.args.first() {
            Some(GenericArgument::Type(ty)) => Some(ty),
            _ => None,
        },
        _ => None,
    }
}

fn is_u8(ty: &Type) -> bool {
    matches!(ty, Type::Path(path) if path.path.is_ident("u8"))
}

/// Returns `T` when the type is spelled `Option<T>`.
pub fn option_inner(ty: &Type) -> Option<&Type> {
    let last = last_segment(ty)?;
    if last.ident != "Option" {
        return None;
    }
    single_argument(last)
}


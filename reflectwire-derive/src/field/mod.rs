mod kind;

use anyhow::{bail, Error};
use proc_macro2::{Ident, TokenStream};
use quote::quote;
use syn::{Attribute, Type};

use crate::attrs::{number_attr, reflect_attrs, set_bool, set_option, string_attr, word_attr};

pub use kind::{option_inner, Kind};

/// A declared record field.
#[derive(Clone)]
pub struct Field {
    pub ident: Ident,
    pub ty: Type,
    pub number: u32,
    pub kind: Kind,
    pub oneof: Option<String>,
}

/// What the derive should do with one struct field.
pub enum Parsed {
    Field(Field),
    UnknownFields(Ident),
}

impl Field {
    /// Creates a new `Field` from the struct field's attributes. Fields without a number attribute
    /// are numbered one past the previous field.
    pub fn parse(
        ident: Ident,
        ty: Type,
        attrs: &[Attribute],
        inferred_number: u32,
    ) -> Result<Parsed, Error> {
        let mut number = None;
        let mut kind = None;
        let mut oneof = None;
        let mut unknown_fields = false;
        let mut unknown_attrs = Vec::new();

        for attr in reflect_attrs(attrs)? {
            if let Some(n) = number_attr(&attr)? {
                set_option(&mut number, n, "duplicate number attributes")?;
            } else if let Some(group) = string_attr(&attr, "oneof")? {
                set_option(&mut oneof, group, "duplicate oneof attributes")?;
            } else if word_attr(&attr, "unknown_fields") {
                set_bool(&mut unknown_fields, "duplicate unknown_fields attributes")?;
            } else if !Kind::from_attr(&attr, &mut kind)? {
                unknown_attrs.push(attr);
            }
        }

        if !unknown_attrs.is_empty() {
            bail!(
                "unknown attribute(s) for field: {}",
                quote!(#(#unknown_attrs),*)
            )
        }

        if unknown_fields {
            if number.is_some() || kind.is_some() || oneof.is_some() {
                bail!("the unknown_fields field takes no other attributes");
            }
            return Ok(Parsed::UnknownFields(ident));
        }

        let kind = match kind {
            Some(kind) => kind,
            None => Kind::infer(&ty)?,
        };
        if kind.is_repeated() && oneof.is_some() {
            bail!("repeated fields cannot be oneof members");
        }
        if kind.is_scalar() && option_inner(&ty).is_some() != oneof.is_some() {
            if oneof.is_some() {
                bail!("scalar oneof members must be declared as Option<_>");
            }
            bail!("optional scalars are only supported as oneof members");
        }
        let number = number.unwrap_or(inferred_number);
        if number == 0 {
            bail!("field numbers start at 1");
        }
        if number > MAX_FIELD_NUMBER {
            bail!("field number {} is too large", number);
        }

        Ok(Parsed::Field(Field {
            ident,
            ty,
            number,
            kind,
            oneof,
        }))
    }

    /// The name the field is known by in its descriptor.
    pub fn name(&self) -> String {
        let name = self.ident.to_string();
        match name.strip_prefix("r#") {
            Some(raw) => raw.to_owned(),
            None => name,
        }
    }

    /// Returns an expression naming the field's `reflectwire::LogicalKind`.
    pub fn logical_kind(&self) -> TokenStream {
        let ty = &self.ty;
        let scalar = |kind: TokenStream| {
            quote!(::reflectwire::LogicalKind::Scalar(::reflectwire::ScalarKind::#kind))
        };
        let record =
            quote!(::reflectwire::MessageType::of::<<#ty as ::reflectwire::MessageContainer>::Record>());
        match self.kind {
            Kind::Bool => scalar(quote!(Bool)),
            Kind::Int32 => scalar(quote!(Int32)),
            Kind::Int64 => scalar(quote!(Int64)),
            Kind::Uint32 => scalar(quote!(Uint32)),
            Kind::Uint64 => scalar(quote!(Uint64)),
            Kind::String => scalar(quote!(String)),
            Kind::Bytes => scalar(quote!(Bytes)),
            Kind::Message => quote!(::reflectwire::LogicalKind::Message(#record)),
            Kind::Repeated => quote!(::reflectwire::LogicalKind::RepeatedMessage(#record)),
        }
    }

    /// Returns a builder method call declaring the field.
    pub fn declare(&self) -> TokenStream {
        let number = self.number;
        let name = self.name();
        let kind = self.logical_kind();
        match &self.oneof {
            None => quote!(.field(#number, #name, #kind)),
            Some(group) => quote!(.oneof_field(#number, #name, #kind, #group)),
        }
    }

    /// Returns whether the field is a scalar oneof member, stored as an `Option`.
    fn is_member(&self) -> bool {
        self.kind.is_scalar() && self.oneof.is_some()
    }

    /// Returns a match arm borrowing the field as a `reflectwire::FieldRef`.
    pub fn field_ref(&self) -> TokenStream {
        let number = self.number;
        let ident = &self.ident;
        if self.is_member() {
            return quote! {
                #number => ::core::option::Option::Some(
                    ::reflectwire::MemberSlot::get(&self.#ident)
                ),
            };
        }
        let value = match self.kind {
            Kind::Bool => quote!(Bool(self.#ident)),
            Kind::Int32 => quote!(Int32(self.#ident)),
            Kind::Int64 => quote!(Int64(self.#ident)),
            Kind::Uint32 => quote!(Uint32(self.#ident)),
            Kind::Uint64 => quote!(Uint64(self.#ident)),
            Kind::String => quote!(String(&self.#ident)),
            Kind::Bytes => quote!(Bytes(&self.#ident)),
            Kind::Message => quote!(Message(::reflectwire::MessageSlot::get(&self.#ident))),
            Kind::Repeated => quote!(Repeated(&self.#ident)),
        };
        quote!(#number => ::core::option::Option::Some(::reflectwire::FieldRef::#value),)
    }

    /// Returns a match arm mutably borrowing the field as a `reflectwire::FieldMut`.
    pub fn field_mut(&self) -> TokenStream {
        let number = self.number;
        let ident = &self.ident;
        if self.is_member() {
            return quote! {
                #number => ::core::option::Option::Some(
                    ::reflectwire::FieldMut::Member(&mut self.#ident)
                ),
            };
        }
        let variant = match self.kind {
            Kind::Bool => quote!(Bool),
            Kind::Int32 => quote!(Int32),
            Kind::Int64 => quote!(Int64),
            Kind::Uint32 => quote!(Uint32),
            Kind::Uint64 => quote!(Uint64),
            Kind::String => quote!(String),
            Kind::Bytes => quote!(Bytes),
            Kind::Message => quote!(Message),
            Kind::Repeated => quote!(Repeated),
        };
        quote! {
            #number => ::core::option::Option::Some(
                ::reflectwire::FieldMut::#variant(&mut self.#ident)
            ),
        }
    }

    /// Returns a statement resetting the field.
    pub fn clear(&self) -> TokenStream {
        let ident = &self.ident;
        quote!(self.#ident = ::core::default::Default::default();)
    }
}

const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

// The `quote!` macro requires deep recursion.
#![recursion_limit = "4096"]

extern crate proc_macro;

use anyhow::{bail, Context, Error};
use itertools::Itertools;
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DataStruct, DeriveInput, Fields, FieldsNamed};

use crate::attrs::{reflect_attrs, string_attr};
use crate::field::{Field, Parsed};

mod attrs;
mod field;

fn try_record(input: TokenStream) -> Result<TokenStream, Error> {
    let input: DeriveInput = syn::parse2(input)?;

    let ident = input.ident;

    let mut full_name = None;
    for attr in reflect_attrs(&input.attrs)? {
        match string_attr(&attr, "name")? {
            Some(name) => attrs::set_option(&mut full_name, name, "duplicate name attributes")?,
            None => bail!("unknown attribute for record {}: {}", ident, quote!(#attr)),
        }
    }
    let full_name = full_name.unwrap_or_else(|| ident.to_string());

    let variant_data = match input.data {
        Data::Struct(variant_data) => variant_data,
        Data::Enum(..) => bail!("Record can not be derived for an enum"),
        Data::Union(..) => bail!("Record can not be derived for a union"),
    };

    if !input.generics.params.is_empty() {
        bail!("Record can not be derived for generic struct {}", ident);
    }

    let raw_fields = match variant_data {
        DataStruct {
            fields: Fields::Named(FieldsNamed { named: fields, .. }),
            ..
        } => fields,
        _ => bail!("Record can only be derived for structs with named fields"),
    };

    let mut next_number: u32 = 1;
    let mut fields: Vec<Field> = Vec::new();
    let mut unknown_fields = None;
    for field in raw_fields {
        let Some(field_ident) = field.ident else {
            bail!("Record can only be derived for structs with named fields");
        };
        let parsed = Field::parse(field_ident.clone(), field.ty, &field.attrs, next_number)
            .with_context(|| format!("invalid record field {}.{}", ident, field_ident))?;
        match parsed {
            Parsed::Field(field) => {
                next_number = field.number.saturating_add(1);
                fields.push(field);
            }
            Parsed::UnknownFields(field_ident) => {
                attrs::set_option(
                    &mut unknown_fields,
                    field_ident,
                    "record has more than one unknown_fields field",
                )?;
            }
        }
    }
    let Some(unknown_fields) = unknown_fields else {
        bail!(
            "record {} needs a `#[reflect(unknown_fields)]` field of type Vec<u8>",
            ident
        );
    };

    if let Some((duplicate, _)) = fields
        .iter()
        .map(|field| field.number)
        .sorted_unstable()
        .tuple_windows()
        .find(|(a, b)| a == b)
    {
        bail!("record {} has duplicate field number {}", ident, duplicate);
    }

    let declarations = fields.iter().map(Field::declare);
    let field_refs = fields.iter().map(Field::field_ref);
    let field_muts = fields.iter().map(Field::field_mut);
    let clears = fields.iter().map(Field::clear);

    let expanded = quote! {
        impl ::reflectwire::RawRecord for #ident {
            fn static_descriptor() -> &'static ::reflectwire::MessageDescriptor {
                static DESCRIPTOR: ::reflectwire::once_cell::sync::OnceCell<
                    ::reflectwire::MessageDescriptor,
                > = ::reflectwire::once_cell::sync::OnceCell::new();
                DESCRIPTOR.get_or_init(|| {
                    match ::reflectwire::MessageDescriptor::builder(#full_name)
                        #(#declarations)*
                        .build()
                    {
                        ::core::result::Result::Ok(descriptor) => descriptor,
                        ::core::result::Result::Err(error) => ::core::panic!("{}", error),
                    }
                })
            }

            #[inline]
            fn descriptor(&self) -> &'static ::reflectwire::MessageDescriptor {
                <Self as ::reflectwire::RawRecord>::static_descriptor()
            }

            fn field(&self, number: u32) -> ::core::option::Option<::reflectwire::FieldRef<'_>> {
                match number {
                    #(#field_refs)*
                    _ => ::core::option::Option::None,
                }
            }

            fn field_mut(
                &mut self,
                number: u32,
            ) -> ::core::option::Option<::reflectwire::FieldMut<'_>> {
                match number {
                    #(#field_muts)*
                    _ => ::core::option::Option::None,
                }
            }

            #[inline]
            fn unknown_fields(&self) -> &[u8] {
                &self.#unknown_fields
            }

            #[inline]
            fn unknown_fields_mut(&mut self) -> &mut ::std::vec::Vec<u8> {
                &mut self.#unknown_fields
            }

            fn clear(&mut self) {
                #(#clears)*
                self.#unknown_fields.clear();
            }

            fn as_any(&self) -> &dyn ::core::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::core::any::Any {
                self
            }

            fn into_any(
                self: ::std::boxed::Box<Self>,
            ) -> ::std::boxed::Box<dyn ::core::any::Any> {
                self
            }
        }
    };

    Ok(expanded)
}

/// Derives `reflectwire::RawRecord` for a struct with named fields.
///
/// Every field but one is a record field; its kind is inferred from its type or given as a word
/// (`bool`, `int32`, `int64`, `uint32`, `uint64`, `string`, `bytes`, `message`, `repeated`).
/// Field numbers default to one past the previous field's, starting at 1, and may be given with
/// `number = N`. Fields marked `oneof = "group"` form a oneof group; scalar members are declared
/// as `Option<T>` so that a selected member holding zero stays selected. The remaining field is marked
/// `#[reflect(unknown_fields)]` and holds a `Vec<u8>`. The message's full name defaults to the
/// struct name and may be given with `#[reflect(name = "pkg.Type")]` on the struct.
#[proc_macro_derive(Record, attributes(reflect))]
pub fn record(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    match try_record(input.into()) {
        Ok(tokens) => tokens.into(),
        Err(error) => {
            let message = format!("{:#}", error);
            quote!(::core::compile_error!(#message);).into()
        }
    }
}

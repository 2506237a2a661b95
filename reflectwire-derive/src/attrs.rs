use std::fmt;

use anyhow::{bail, Error};
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{Attribute, Expr, Lit, LitInt, LitStr, Meta, MetaNameValue, Token};

/// Get the items belonging to the 'reflect' list attribute, e.g. `#[reflect(foo, bar="baz")]`.
pub fn reflect_attrs(attrs: &[Attribute]) -> Result<Vec<Meta>, Error> {
    let mut result = Vec::new();
    for attr in attrs {
        if let Meta::List(meta_list) = &attr.meta {
            if meta_list.path.is_ident("reflect") {
                result.extend(
                    meta_list.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?,
                )
            }
        }
    }
    Ok(result)
}

pub fn number_attr(attr: &Meta) -> Result<Option<u32>, Error> {
    if !attr.path().is_ident("number") {
        return Ok(None);
    }
    match attr {
        // number(1)
        Meta::List(meta_list) => Ok(Some(meta_list.parse_args::<LitInt>()?.base10_parse()?)),
        Meta::NameValue(MetaNameValue {
            value: Expr::Lit(expr),
            ..
        }) => match &expr.lit {
            // number = "1"
            Lit::Str(lit) => lit.value().parse::<u32>().map_err(Error::from).map(Some),
            // number = 1
            Lit::Int(lit) => Ok(Some(lit.base10_parse()?)),
            _ => bail!("invalid number attribute: {}", quote!(#attr)),
        },
        _ => bail!("invalid number attribute: {}", quote!(#attr)),
    }
}

/// Reads a string-valued attribute, as in `name = "pkg.Type"` or `name("pkg.Type")`.
pub fn string_attr(attr: &Meta, attr_name: &str) -> Result<Option<String>, Error> {
    if !attr.path().is_ident(attr_name) {
        return Ok(None);
    }
    match attr {
        Meta::List(meta_list) => Ok(Some(meta_list.parse_args::<LitStr>()?.value())),
        Meta::NameValue(MetaNameValue {
            value: Expr::Lit(expr),
            ..
        }) => match &expr.lit {
            Lit::Str(lit) => Ok(Some(lit.value())),
            _ => bail!("invalid {attr_name} attribute: {}", quote!(#attr)),
        },
        _ => bail!("invalid {attr_name} attribute: {}", quote!(#attr)),
    }
}

/// Checks if an attribute matches a word.
pub fn word_attr(attr: &Meta, key: &str) -> bool {
    if let Meta::Path(ref path) = *attr {
        path.is_ident(key)
    } else {
        false
    }
}

pub fn set_option<T>(option: &mut Option<T>, value: T, message: &str) -> Result<(), Error>
where
    T: fmt::Debug,
{
    if let Some(existing) = option {
        bail!("{}: {:?} and {:?}", message, existing, value);
    }
    *option = Some(value);
    Ok(())
}

pub fn set_bool(b: &mut bool, message: &str) -> Result<(), Error> {
    if *b {
        bail!("{}", message);
    }
    *b = true;
    Ok(())
}

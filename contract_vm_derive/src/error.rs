//! Derive macro for error enums.
//!
//! ```ignore
//! use contract_vm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum MachineError {
//!     #[error("stack underflow: needed {needed}, had {depth}")]
//!     StackUnderflow { needed: usize, depth: usize },
//!
//!     #[error("decode failed: {0}")]
//!     Decode(#[from] CodecError),
//!
//!     #[error("program halted")]
//!     Halted,
//! }
//! ```
//!
//! Messages interpolate tuple fields positionally (`{0}`) and struct fields by
//! name (`{depth}`). A tuple variant with exactly one field tagged `#[from]`
//! also gets a `From` impl for that field's type.

use proc_macro::TokenStream;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data_enum) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "Error derive only supports enums; wrap struct errors in a single-variant enum",
        ));
    };

    let mut display_arms = Vec::with_capacity(data_enum.variants.len());
    let mut from_impls = Vec::new();

    for variant in &data_enum.variants {
        let variant_name = &variant.ident;
        let message = message_of(&variant.attrs, variant_name)?;

        let arm = match &variant.fields {
            Fields::Unit => quote! {
                Self::#variant_name => write!(f, #message),
            },
            Fields::Unnamed(fields) => {
                let bindings: Vec<_> = (0..fields.unnamed.len())
                    .map(|i| format_ident!("f{}", i))
                    .collect();
                let message = rename_positional(&message, bindings.len());

                let marked: Vec<_> = fields
                    .unnamed
                    .iter()
                    .filter(|field| field.attrs.iter().any(|a| a.path().is_ident("from")))
                    .collect();
                if !marked.is_empty() {
                    if fields.unnamed.len() != 1 {
                        return Err(syn::Error::new_spanned(
                            variant,
                            "#[from] requires a variant with exactly one field",
                        ));
                    }
                    let source_ty = &marked[0].ty;
                    from_impls.push(quote! {
                        impl #impl_generics ::std::convert::From<#source_ty> for #name #ty_generics #where_clause {
                            fn from(source: #source_ty) -> Self {
                                Self::#variant_name(source)
                            }
                        }
                    });
                }

                quote! {
                    Self::#variant_name(#(#bindings),*) => write!(f, #message, #(#bindings = #bindings),*),
                }
            }
            Fields::Named(fields) => {
                let names: Vec<_> = fields.named.iter().map(|field| &field.ident).collect();
                // Only bind the fields the message mentions so unused ones don't warn.
                let used: Vec<_> = names
                    .iter()
                    .filter(|ident| {
                        ident
                            .as_ref()
                            .map(|i| {
                                message.contains(&format!("{{{}}}", i))
                                    || message.contains(&format!("{{{}:", i))
                            })
                            .unwrap_or(false)
                    })
                    .collect();
                quote! {
                    Self::#variant_name { #(#used,)* .. } => write!(f, #message, #(#used = #used),*),
                }
            }
        };
        display_arms.push(arm);
    }

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#display_arms)*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}

        #(#from_impls)*
    })
}

/// Reads the string literal out of the `#[error("...")]` attribute.
fn message_of<T: ToTokens>(attrs: &[syn::Attribute], target: &T) -> syn::Result<String> {
    let Some(attr) = attrs.iter().find(|a| a.path().is_ident("error")) else {
        return Err(syn::Error::new_spanned(
            target,
            "missing #[error(\"...\")] attribute; every variant needs a display message",
        ));
    };

    let Meta::List(list) = &attr.meta else {
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")]",
        ));
    };

    match syn::parse2::<Lit>(list.tokens.clone()) {
        Ok(Lit::Str(lit)) => Ok(lit.value()),
        _ => Err(syn::Error::new_spanned(
            &attr.meta,
            "the #[error] message must be a single string literal",
        )),
    }
}

/// Rewrites `{0}`, `{1:?}` ... into `{f0}`, `{f1:?}` so they bind to named arguments.
fn rename_positional(message: &str, count: usize) -> String {
    let mut out = message.to_string();
    for i in (0..count).rev() {
        out = out
            .replace(&format!("{{{}}}", i), &format!("{{f{}}}", i))
            .replace(&format!("{{{}:", i), &format!("{{f{}:", i));
    }
    out
}

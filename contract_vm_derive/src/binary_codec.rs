//! Derive macro for the crate's binary codec.
//!
//! Generates `Encode` and `Decode` impls against `crate::types::encoding`.
//! Supported shapes:
//!
//! - structs with named fields, encoded in declaration order
//! - tuple structs, encoded by position
//! - fieldless enums, encoded as a single `u8` discriminant
//!
//! The derived impls are only valid inside the `contract_vm` crate since they
//! name the codec traits through `crate::`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DataEnum, DeriveInput, Fields, parse_macro_input};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (encode_body, decode_body) = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => {
                let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                (
                    quote! {
                        #( crate::types::encoding::Encode::encode(&self.#names, out); )*
                    },
                    quote! {
                        Ok(Self {
                            #( #names: crate::types::encoding::Decode::decode(input)?, )*
                        })
                    },
                )
            }
            Fields::Unnamed(fields) => {
                let indices: Vec<_> = (0..fields.unnamed.len()).map(syn::Index::from).collect();
                let decoders = indices
                    .iter()
                    .map(|_| quote! { crate::types::encoding::Decode::decode(input)? });
                (
                    quote! {
                        #( crate::types::encoding::Encode::encode(&self.#indices, out); )*
                    },
                    quote! {
                        Ok(Self( #( #decoders ),* ))
                    },
                )
            }
            Fields::Unit => (quote! {}, quote! { Ok(Self) }),
        },
        Data::Enum(data) => match enum_bodies(data) {
            Ok(bodies) => bodies,
            Err(err) => return err.to_compile_error().into(),
        },
        Data::Union(_) => {
            return syn::Error::new_spanned(&input, "BinaryCodec cannot be derived for unions")
                .to_compile_error()
                .into();
        }
    };

    TokenStream::from(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    })
}

/// Builds encode/decode bodies for a fieldless enum.
///
/// Discriminants follow Rust's rules: explicit literals are honored and
/// implicit ones continue from the previous variant.
fn enum_bodies(data: &DataEnum) -> syn::Result<(proc_macro2::TokenStream, proc_macro2::TokenStream)> {
    let mut next: u8 = 0;
    let mut encode_arms = Vec::new();
    let mut decode_arms = Vec::new();

    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "BinaryCodec only supports fieldless enum variants",
            ));
        }

        let tag = match &variant.discriminant {
            Some((_, syn::Expr::Lit(syn::ExprLit { lit: syn::Lit::Int(int), .. }))) => {
                int.base10_parse::<u8>()?
            }
            Some((_, expr)) => {
                return Err(syn::Error::new_spanned(
                    expr,
                    "enum discriminants must be u8 integer literals",
                ));
            }
            None => next,
        };
        next = tag.wrapping_add(1);

        let ident = &variant.ident;
        encode_arms.push(quote! { Self::#ident => #tag, });
        decode_arms.push(quote! { #tag => Ok(Self::#ident), });
    }

    Ok((
        quote! {
            let tag: u8 = match self { #(#encode_arms)* };
            crate::types::encoding::Encode::encode(&tag, out);
        },
        quote! {
            let tag: u8 = crate::types::encoding::Decode::decode(input)?;
            match tag {
                #(#decode_arms)*
                _ => Err(crate::types::encoding::DecodeError::InvalidValue),
            }
        },
    ))
}

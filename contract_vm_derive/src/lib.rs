//! Derive macros for the `contract_vm` crate.
//!
//! Provides:
//! - `#[derive(BinaryCodec)]` - deterministic binary encoding for program containers
//! - `#[derive(Error)]` - `Display`/`Error`/`From` boilerplate for error enums

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `Encode` and `Decode` from `crate::types::encoding`.
#[proc_macro_derive(BinaryCodec)]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::derive_binary_codec(input)
}

/// Implements `Display` and `Error` from `#[error("...")]` attributes, and
/// `From<T>` for single-field variants marked `#[from]`.
#[proc_macro_derive(Error, attributes(error, from))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}

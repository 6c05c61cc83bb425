//! Reference-counted byte buffer used for call data and invocation output.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use alloy_primitives::hex;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A reference-counted, immutable byte buffer.
///
/// Cloning shares the allocation; mutation goes through copy-on-write, so a
/// call-data buffer handed to several invocations is never copied.
#[derive(Default, Eq, PartialEq)]
pub struct Bytes(Arc<Vec<u8>>);

impl Bytes {
    /// Creates a new buffer from any type convertible to `Vec<u8>`.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(data.into()))
    }

    pub fn from_vec(v: Vec<u8>) -> Self {
        Self(Arc::new(v))
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self(Arc::new(Vec::with_capacity(cap)))
    }

    /// Parses a hex string, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(s.trim()).map(Self::from_vec)
    }

    /// Renders the buffer as `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode_prefixed(self.as_slice())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Returns a mutable reference to the underlying vector, cloning it if shared.
    pub fn make_mut(&mut self) -> &mut Vec<u8> {
        Arc::make_mut(&mut self.0)
    }

    pub fn extend_from_slice(&mut self, s: &[u8]) {
        self.make_mut().extend_from_slice(s);
    }
}

impl Clone for Bytes {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Deref for Bytes {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes({})", self.to_hex())
    }
}

impl Encode for Bytes {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        out.write(self.as_slice());
    }
}

impl Decode for Bytes {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Vec::<u8>::decode(input).map(Self::from_vec)
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self::from_vec(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(s: &[u8]) -> Self {
        Self::new(s)
    }
}

impl<const N: usize> From<[u8; N]> for Bytes {
    fn from(arr: [u8; N]) -> Self {
        Self::new(arr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_allocation_until_mutated() {
        let a = Bytes::from(vec![1, 2, 3]);
        let mut b = a.clone();
        assert!(Arc::ptr_eq(&a.0, &b.0));
        b.extend_from_slice(&[4]);
        assert_eq!(a.as_slice(), &[1, 2, 3]);
        assert_eq!(b.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn hex_accepts_optional_prefix() {
        assert_eq!(Bytes::from_hex("0x0a0b").unwrap().as_slice(), &[0x0a, 0x0b]);
        assert_eq!(Bytes::from_hex("0a0b").unwrap().as_slice(), &[0x0a, 0x0b]);
        assert!(Bytes::from_hex("0xzz").is_err());
    }

    #[test]
    fn hex_rendering_is_prefixed() {
        assert_eq!(Bytes::from([0xde, 0xad]).to_hex(), "0xdead");
        assert_eq!(Bytes::default().to_hex(), "0x");
    }

    #[test]
    fn codec_uses_length_prefix() {
        let bytes = Bytes::from([9u8, 8]);
        let encoded = bytes.to_bytes();
        assert_eq!(encoded.len(), 8 + 2);
        assert_eq!(Bytes::from_bytes(&encoded).unwrap(), bytes);
    }
}

//! Shared value types.
//!
//! - `Word`: the 256-bit machine word and its conversions
//! - `Bytes`: shared byte buffer for call data and output
//! - `Encode` / `Decode`: deterministic binary codec for serialized programs

pub mod bytes;
pub mod encoding;
pub mod word;

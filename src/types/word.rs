//! The machine word: a 256-bit integer.
//!
//! Every stack slot, memory word, storage key and storage value is one
//! [`Word`]. The same bit pattern is read as unsigned or as two's-complement
//! signed depending on the instruction.

use alloy_primitives::U256;

/// 256-bit machine word.
pub type Word = U256;

/// Width of a word in bytes.
pub const WORD_BYTES: usize = 32;

/// Width of a word in bits.
pub const WORD_BITS: usize = 256;

/// Converts a word to `usize`, or `None` if it does not fit.
pub fn to_usize(word: Word) -> Option<usize> {
    let limbs = word.as_limbs();
    if limbs[1..].iter().any(|&l| l != 0) {
        return None;
    }
    usize::try_from(limbs[0]).ok()
}

/// Maps a boolean to the canonical 0 / 1 word.
pub fn from_bool(b: bool) -> Word {
    if b { Word::from(1u64) } else { Word::ZERO }
}

/// Two's-complement negation.
pub fn negate(word: Word) -> Word {
    (!word).wrapping_add(Word::from(1u64))
}

/// True when the sign bit is set under the signed reading.
pub fn is_negative(word: Word) -> bool {
    word.bit(WORD_BITS - 1)
}

/// Encodes a signed integer as its two's-complement word.
pub fn from_i64(value: i64) -> Word {
    let magnitude = Word::from(value.unsigned_abs());
    if value < 0 { negate(magnitude) } else { magnitude }
}

/// Parses a decimal or `0x`-prefixed hex literal.
pub fn parse(literal: &str) -> Option<Word> {
    if let Some(hex) = literal
        .strip_prefix("0x")
        .or_else(|| literal.strip_prefix("0X"))
    {
        if hex.is_empty() || hex.len() > 64 {
            return None;
        }
        return Word::from_str_radix(hex, 16).ok();
    }
    if literal.is_empty() || !literal.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Word::from_str_radix(literal, 10).ok()
}

/// `2^bits`, or zero when `bits` is at least the word width.
pub fn pow2(bits: usize) -> Word {
    if bits >= WORD_BITS {
        Word::ZERO
    } else {
        Word::from(1u64) << bits
    }
}

/// Mask with the low `bits` bits set.
pub fn low_mask(bits: usize) -> Word {
    if bits >= WORD_BITS {
        Word::MAX
    } else {
        pow2(bits).wrapping_sub(Word::from(1u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_usize_rejects_wide_values() {
        assert_eq!(to_usize(Word::from(42u64)), Some(42));
        assert_eq!(to_usize(Word::MAX), None);
        assert_eq!(to_usize(pow2(64)), None);
    }

    #[test]
    fn from_i64_uses_twos_complement() {
        assert_eq!(from_i64(-1), Word::MAX);
        assert_eq!(from_i64(5), Word::from(5u64));
        assert_eq!(negate(from_i64(-4)), Word::from(4u64));
        assert!(is_negative(from_i64(-4)));
        assert!(!is_negative(from_i64(4)));
    }

    #[test]
    fn parse_accepts_decimal_and_hex() {
        assert_eq!(parse("42"), Some(Word::from(42u64)));
        assert_eq!(parse("0x2a"), Some(Word::from(42u64)));
        assert_eq!(parse(&format!("0x{}", "f".repeat(64))), Some(Word::MAX));
        assert_eq!(parse("0x"), None);
        assert_eq!(parse("-1"), None);
        assert_eq!(parse("abc"), None);
        assert_eq!(parse(&format!("0x1{}", "0".repeat(64))), None);
    }

    #[test]
    fn masks_and_powers() {
        assert_eq!(low_mask(8), Word::from(0xffu64));
        assert_eq!(low_mask(256), Word::MAX);
        assert_eq!(pow2(256), Word::ZERO);
        assert_eq!(pow2(3), Word::from(8u64));
    }
}

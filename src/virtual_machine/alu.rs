//! Word arithmetic.
//!
//! Pure, total functions over [`Word`]. Arithmetic wraps modulo 2^256 and
//! division or remainder by zero yields zero. Binary functions take their
//! operands in stack order: `a` is the top of the stack.

use crate::types::word::{WORD_BITS, WORD_BYTES, Word, from_bool, is_negative, negate, to_usize};

pub fn add(a: Word, b: Word) -> Word {
    a.wrapping_add(b)
}

pub fn sub(a: Word, b: Word) -> Word {
    a.wrapping_sub(b)
}

pub fn mul(a: Word, b: Word) -> Word {
    a.wrapping_mul(b)
}

pub fn div(a: Word, b: Word) -> Word {
    if b.is_zero() { Word::ZERO } else { a / b }
}

pub fn rem(a: Word, b: Word) -> Word {
    if b.is_zero() { Word::ZERO } else { a % b }
}

/// Absolute value under the signed reading, with its sign.
fn split_sign(w: Word) -> (bool, Word) {
    let neg = is_negative(w);
    (neg, if neg { negate(w) } else { w })
}

/// Signed division truncating toward zero. `MIN / -1` wraps to `MIN`.
pub fn sdiv(a: Word, b: Word) -> Word {
    if b.is_zero() {
        return Word::ZERO;
    }
    let (a_neg, a_abs) = split_sign(a);
    let (b_neg, b_abs) = split_sign(b);
    let q = a_abs / b_abs;
    if a_neg != b_neg { negate(q) } else { q }
}

/// Signed remainder; the result takes the sign of the dividend.
pub fn smod(a: Word, b: Word) -> Word {
    if b.is_zero() {
        return Word::ZERO;
    }
    let (a_neg, a_abs) = split_sign(a);
    let (_, b_abs) = split_sign(b);
    let r = a_abs % b_abs;
    if a_neg { negate(r) } else { r }
}

/// `base ** exponent` modulo 2^256.
pub fn exp(base: Word, exponent: Word) -> Word {
    base.wrapping_pow(exponent)
}

pub fn lt(a: Word, b: Word) -> Word {
    from_bool(a < b)
}

pub fn gt(a: Word, b: Word) -> Word {
    from_bool(a > b)
}

fn signed_lt(a: Word, b: Word) -> bool {
    match (is_negative(a), is_negative(b)) {
        (true, false) => true,
        (false, true) => false,
        // Same sign: two's-complement order matches unsigned order.
        _ => a < b,
    }
}

pub fn slt(a: Word, b: Word) -> Word {
    from_bool(signed_lt(a, b))
}

pub fn sgt(a: Word, b: Word) -> Word {
    from_bool(signed_lt(b, a))
}

pub fn eq(a: Word, b: Word) -> Word {
    from_bool(a == b)
}

pub fn is_zero(a: Word) -> Word {
    from_bool(a.is_zero())
}

pub fn and(a: Word, b: Word) -> Word {
    a & b
}

pub fn or(a: Word, b: Word) -> Word {
    a | b
}

pub fn xor(a: Word, b: Word) -> Word {
    a ^ b
}

pub fn not(a: Word) -> Word {
    !a
}

/// The `index`-th byte of `value`, counting from the most significant.
pub fn byte(index: Word, value: Word) -> Word {
    match to_usize(index) {
        Some(i) if i < WORD_BYTES => Word::from(value.to_be_bytes::<WORD_BYTES>()[i]),
        _ => Word::ZERO,
    }
}

/// Shift amount, or `None` when it clears the whole word.
fn shift_amount(shift: Word) -> Option<usize> {
    to_usize(shift).filter(|&s| s < WORD_BITS)
}

pub fn shl(shift: Word, value: Word) -> Word {
    shift_amount(shift).map_or(Word::ZERO, |s| value << s)
}

pub fn shr(shift: Word, value: Word) -> Word {
    shift_amount(shift).map_or(Word::ZERO, |s| value >> s)
}

pub fn sar(shift: Word, value: Word) -> Word {
    let negative = is_negative(value);
    match shift_amount(shift) {
        Some(s) if negative => !((!value) >> s),
        Some(s) => value >> s,
        None if negative => Word::MAX,
        None => Word::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::word::from_i64;
    use crate::utils::test_utils::utils::word;
    use proptest::prelude::*;

    #[test]
    fn sdiv_produces_negative_quotient() {
        assert_eq!(sdiv(from_i64(-4), word(2)), from_i64(-2));
        assert_ne!(div(from_i64(-4), word(2)), from_i64(-2));
        assert_eq!(sdiv(from_i64(-7), from_i64(-2)), word(3));
        assert_eq!(sdiv(word(7), from_i64(-2)), from_i64(-3));
    }

    #[test]
    fn sdiv_min_by_minus_one_wraps() {
        let min = Word::from(1u64) << 255;
        assert_eq!(sdiv(min, from_i64(-1)), min);
    }

    #[test]
    fn division_by_zero_is_zero() {
        assert_eq!(div(word(5), Word::ZERO), Word::ZERO);
        assert_eq!(sdiv(from_i64(-5), Word::ZERO), Word::ZERO);
        assert_eq!(rem(word(5), Word::ZERO), Word::ZERO);
        assert_eq!(smod(word(5), Word::ZERO), Word::ZERO);
    }

    #[test]
    fn smod_follows_dividend_sign() {
        assert_eq!(smod(from_i64(-7), word(3)), from_i64(-1));
        assert_eq!(smod(word(7), from_i64(-3)), word(1));
    }

    #[test]
    fn arithmetic_wraps() {
        assert_eq!(add(Word::MAX, word(1)), Word::ZERO);
        assert_eq!(sub(Word::ZERO, word(1)), Word::MAX);
        assert_eq!(exp(word(2), word(256)), Word::ZERO);
        assert_eq!(exp(word(256), word(2)), word(65536));
        assert_eq!(exp(word(0), word(0)), word(1));
    }

    #[test]
    fn signed_comparisons() {
        assert_eq!(slt(from_i64(-1), word(0)), word(1));
        assert_eq!(lt(from_i64(-1), word(0)), word(0));
        assert_eq!(sgt(word(1), from_i64(-5)), word(1));
        assert_eq!(slt(from_i64(-5), from_i64(-1)), word(1));
    }

    #[test]
    fn byte_indexes_from_most_significant() {
        let value = word(0xAB);
        assert_eq!(byte(word(31), value), word(0xAB));
        assert_eq!(byte(word(0), value), Word::ZERO);
        assert_eq!(byte(word(32), value), Word::ZERO);
    }

    #[test]
    fn shifts() {
        assert_eq!(shl(word(4), word(1)), word(16));
        assert_eq!(shr(word(4), word(16)), word(1));
        assert_eq!(shl(word(256), word(1)), Word::ZERO);
        assert_eq!(sar(word(1), from_i64(-4)), from_i64(-2));
        assert_eq!(sar(word(300), from_i64(-4)), Word::MAX);
        assert_eq!(sar(word(300), word(4)), Word::ZERO);
    }

    proptest! {
        #[test]
        fn div_matches_native(a in any::<u128>(), b in 1u128..) {
            prop_assert_eq!(div(Word::from(a), Word::from(b)), Word::from(a / b));
            prop_assert_eq!(rem(Word::from(a), Word::from(b)), Word::from(a % b));
        }

        #[test]
        fn sdiv_matches_native(a in any::<i32>(), b in any::<i32>().prop_filter("nonzero", |b| *b != 0)) {
            let (a, b) = (i64::from(a), i64::from(b));
            prop_assert_eq!(sdiv(from_i64(a), from_i64(b)), from_i64(a / b));
            prop_assert_eq!(smod(from_i64(a), from_i64(b)), from_i64(a % b));
        }

        #[test]
        fn signed_compare_matches_native(a in any::<i64>(), b in any::<i64>()) {
            prop_assert_eq!(slt(from_i64(a), from_i64(b)), from_bool(a < b));
            prop_assert_eq!(sgt(from_i64(a), from_i64(b)), from_bool(a > b));
        }
    }
}

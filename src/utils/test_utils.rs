//! Test utilities for VM testing.

#[cfg(test)]
pub mod utils {
    use crate::types::bytes::Bytes;
    use crate::types::word::{WORD_BYTES, Word};

    /// Shorthand for a small word literal.
    pub fn word(value: u64) -> Word {
        Word::from(value)
    }

    /// Interprets a 32-byte invocation output as a word.
    pub fn output_word(output: &Bytes) -> Word {
        assert_eq!(output.len(), WORD_BYTES, "output is not a single word");
        Word::from_be_slice(output.as_slice())
    }

    /// Assembly snippet that stores the top of the stack at memory 0 and
    /// returns it as a single word.
    pub const RETURN_TOP: &str = "PUSH 0\nMSTORE\nPUSH 32\nPUSH 0\nRETURN\n";
}

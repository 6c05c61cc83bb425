use crate::types::word::{WORD_BYTES, Word, to_usize};
use crate::virtual_machine::errors::VMError;

/// Byte-addressable scratch memory for one invocation.
///
/// Memory starts empty and grows in whole words to cover every accessed
/// range. Growth is zero-filled and monotonic; zero-length accesses never
/// grow it.
#[derive(Debug)]
pub(super) struct Memory {
    data: Vec<u8>,
    limit: usize,
}

impl Memory {
    /// Creates empty memory that may grow to at most `limit` bytes.
    pub(super) fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
        }
    }

    /// Current size in bytes (always a multiple of the word size).
    pub(super) fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns `[offset, offset + len)` as a mutable slice, growing memory to
    /// cover it.
    pub(super) fn range_mut(&mut self, offset: Word, len: Word) -> Result<&mut [u8], VMError> {
        if len.is_zero() {
            return Ok(&mut []);
        }
        let exceeded = || VMError::MemoryLimitExceeded {
            offset: offset.to_string(),
            len: len.to_string(),
            limit: self.limit,
        };
        let start = to_usize(offset).ok_or_else(exceeded)?;
        let size = to_usize(len).ok_or_else(exceeded)?;
        let end = start.checked_add(size).ok_or_else(exceeded)?;
        if end > self.data.len() {
            let grown = end
                .div_ceil(WORD_BYTES)
                .checked_mul(WORD_BYTES)
                .filter(|&grown| grown <= self.limit)
                .ok_or_else(exceeded)?;
            self.data.resize(grown, 0);
        }
        Ok(&mut self.data[start..end])
    }

    pub(super) fn load(&mut self, offset: Word) -> Result<Word, VMError> {
        let bytes = self.range_mut(offset, Word::from(WORD_BYTES))?;
        Ok(Word::from_be_slice(bytes))
    }

    pub(super) fn store(&mut self, offset: Word, value: Word) -> Result<(), VMError> {
        self.range_mut(offset, Word::from(WORD_BYTES))?
            .copy_from_slice(&value.to_be_bytes::<WORD_BYTES>());
        Ok(())
    }

    /// Writes the least significant byte of `value`.
    pub(super) fn store8(&mut self, offset: Word, value: Word) -> Result<(), VMError> {
        let low = value.to_be_bytes::<WORD_BYTES>()[WORD_BYTES - 1];
        self.range_mut(offset, Word::from(1u64))?[0] = low;
        Ok(())
    }

    /// Copies `[offset, offset + len)` out of memory.
    pub(super) fn read(&mut self, offset: Word, len: Word) -> Result<Vec<u8>, VMError> {
        Ok(self.range_mut(offset, len)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::word;

    #[test]
    fn grows_in_whole_words() {
        let mut memory = Memory::new(1024);
        memory.store8(word(0), word(0xFF)).unwrap();
        assert_eq!(memory.size(), 32);
        memory.load(word(20)).unwrap();
        assert_eq!(memory.size(), 64);
    }

    #[test]
    fn zero_length_access_does_not_grow() {
        let mut memory = Memory::new(1024);
        assert!(memory.read(word(500), Word::ZERO).unwrap().is_empty());
        assert!(memory.read(Word::MAX, Word::ZERO).unwrap().is_empty());
        assert_eq!(memory.size(), 0);
    }

    #[test]
    fn unaligned_store_and_load() {
        let mut memory = Memory::new(1024);
        memory.store(word(5), word(0x1234)).unwrap();
        assert_eq!(memory.load(word(5)).unwrap(), word(0x1234));
        assert_eq!(memory.load(word(0)).unwrap(), Word::ZERO);
        assert_eq!(memory.read(word(35), word(2)).unwrap(), vec![0x12, 0x34]);
    }

    #[test]
    fn store8_keeps_low_byte() {
        let mut memory = Memory::new(64);
        memory.store8(word(31), word(0xABCD)).unwrap();
        assert_eq!(memory.load(word(0)).unwrap(), word(0xCD));
    }

    #[test]
    fn limit_is_enforced() {
        let mut memory = Memory::new(64);
        memory.store(word(32), word(1)).unwrap();
        assert!(matches!(
            memory.store(word(33), word(1)),
            Err(VMError::MemoryLimitExceeded { limit: 64, .. })
        ));
        assert!(matches!(
            memory.load(Word::MAX),
            Err(VMError::MemoryLimitExceeded { .. })
        ));
        assert_eq!(memory.size(), 64);
    }

    #[test]
    fn growth_never_passes_an_unaligned_limit() {
        let mut memory = Memory::new(40);
        memory.store8(word(31), word(1)).unwrap();
        assert!(matches!(
            memory.store8(word(39), word(1)),
            Err(VMError::MemoryLimitExceeded { limit: 40, .. })
        ));
        assert_eq!(memory.size(), 32);
    }
}

use crate::types::bytes::Bytes;
use crate::types::word::{WORD_BYTES, Word, to_usize};

/// Length of the method selector that prefixes call data by convention.
pub const SELECTOR_LEN: usize = 4;

/// Read-only input buffer of one invocation.
///
/// Reads past the end are zero-padded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallData(Bytes);

impl CallData {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    /// Starts building selector-prefixed call data.
    pub fn builder() -> CallDataBuilder {
        CallDataBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// The leading method selector, if the buffer is long enough to hold one.
    pub fn selector(&self) -> Option<[u8; SELECTOR_LEN]> {
        self.0.get(..SELECTOR_LEN)?.try_into().ok()
    }

    /// Fills `dst` with call data starting at `offset`, zero-padding past the end.
    pub fn copy_into(&self, offset: Word, dst: &mut [u8]) {
        let data = self.0.as_slice();
        let start = to_usize(offset).unwrap_or(usize::MAX).min(data.len());
        let available = (data.len() - start).min(dst.len());
        dst[..available].copy_from_slice(&data[start..start + available]);
        dst[available..].fill(0);
    }

    /// The 32 bytes starting at `offset` as a big-endian word.
    pub fn load(&self, offset: Word) -> Word {
        let mut buf = [0u8; WORD_BYTES];
        self.copy_into(offset, &mut buf);
        Word::from_be_bytes(buf)
    }
}

impl From<Bytes> for CallData {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for CallData {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

#[derive(Clone, Debug)]
enum Arg {
    Word(Word),
    Array(Vec<Word>),
}

/// Encodes a selector followed by word-sized arguments.
///
/// Static arguments occupy one head word each. A dynamic array puts, in its
/// head word, the offset of its tail (relative to the end of the selector);
/// the tail holds the length word followed by the elements at 32-byte strides.
#[derive(Clone, Debug, Default)]
pub struct CallDataBuilder {
    selector: [u8; SELECTOR_LEN],
    args: Vec<Arg>,
}

impl CallDataBuilder {
    pub fn selector(mut self, selector: [u8; SELECTOR_LEN]) -> Self {
        self.selector = selector;
        self
    }

    pub fn word(mut self, value: Word) -> Self {
        self.args.push(Arg::Word(value));
        self
    }

    pub fn array(mut self, values: &[Word]) -> Self {
        self.args.push(Arg::Array(values.to_vec()));
        self
    }

    pub fn build(self) -> CallData {
        let head_len = self.args.len() * WORD_BYTES;
        let mut head = Vec::with_capacity(head_len);
        let mut tail = Vec::new();
        for arg in &self.args {
            match arg {
                Arg::Word(value) => head.extend_from_slice(&value.to_be_bytes::<WORD_BYTES>()),
                Arg::Array(values) => {
                    let at = Word::from(head_len + tail.len());
                    head.extend_from_slice(&at.to_be_bytes::<WORD_BYTES>());
                    tail.extend_from_slice(&Word::from(values.len()).to_be_bytes::<WORD_BYTES>());
                    for value in values {
                        tail.extend_from_slice(&value.to_be_bytes::<WORD_BYTES>());
                    }
                }
            }
        }

        let mut out = Vec::with_capacity(SELECTOR_LEN + head.len() + tail.len());
        out.extend_from_slice(&self.selector);
        out.extend_from_slice(&head);
        out.extend_from_slice(&tail);
        CallData::from(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::word;

    #[test]
    fn load_zero_pads_past_end() {
        let data = CallData::new(vec![0xAA, 0xBB]);
        let loaded = data.load(Word::ZERO).to_be_bytes::<32>();
        assert_eq!(&loaded[..2], &[0xAA, 0xBB]);
        assert!(loaded[2..].iter().all(|&b| b == 0));
        assert_eq!(data.load(word(1000)), Word::ZERO);
        assert_eq!(data.load(Word::MAX), Word::ZERO);
    }

    #[test]
    fn builder_places_words_after_selector() {
        let data = CallData::builder()
            .selector([1, 2, 3, 4])
            .word(word(4))
            .word(word(7))
            .build();
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(data.selector(), Some([1, 2, 3, 4]));
        assert_eq!(data.load(word(4)), word(4));
        assert_eq!(data.load(word(36)), word(7));
    }

    #[test]
    fn builder_encodes_dynamic_array() {
        let data = CallData::builder()
            .word(word(9))
            .array(&[word(10), word(20)])
            .build();
        // head: [9][offset], tail: [len][10][20]
        assert_eq!(data.len(), 4 + 5 * 32);
        let offset = data.load(word(36));
        assert_eq!(offset, word(64));
        let base = 4 + 64;
        assert_eq!(data.load(word(base)), word(2));
        assert_eq!(data.load(word(base + 32)), word(10));
        assert_eq!(data.load(word(base + 64)), word(20));
    }

    #[test]
    fn short_buffer_has_no_selector() {
        assert_eq!(CallData::new(vec![1, 2]).selector(), None);
    }
}

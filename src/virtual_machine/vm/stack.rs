use crate::types::word::Word;
use crate::virtual_machine::errors::VMError;

/// Operand stack of words.
///
/// Every accessor takes the bytecode offset of the executing instruction so
/// failures point at the instruction that caused them.
#[derive(Debug)]
pub(super) struct Stack {
    items: Vec<Word>,
    limit: usize,
}

impl Stack {
    /// Creates an empty stack holding at most `limit` words.
    pub(super) fn new(limit: usize) -> Self {
        Self {
            items: Vec::with_capacity(limit.min(64)),
            limit,
        }
    }

    pub(super) fn depth(&self) -> usize {
        self.items.len()
    }

    /// Words from bottom to top.
    pub(super) fn as_slice(&self) -> &[Word] {
        &self.items
    }

    /// Fails with [`VMError::StackUnderflow`] unless at least `needed` words are present.
    pub(super) fn require(&self, needed: usize, offset: usize) -> Result<(), VMError> {
        if self.items.len() < needed {
            return Err(VMError::StackUnderflow {
                offset,
                needed,
                depth: self.items.len(),
            });
        }
        Ok(())
    }

    pub(super) fn push(&mut self, value: Word, offset: usize) -> Result<(), VMError> {
        if self.items.len() >= self.limit {
            return Err(VMError::StackOverflow {
                offset,
                limit: self.limit,
            });
        }
        self.items.push(value);
        Ok(())
    }

    pub(super) fn pop(&mut self, offset: usize) -> Result<Word, VMError> {
        self.require(1, offset)?;
        Ok(self.items.pop().unwrap_or_default())
    }

    /// Copies the `n`-th item (top = 1) onto the top.
    pub(super) fn dup(&mut self, n: u8, offset: usize) -> Result<(), VMError> {
        if n == 0 {
            return Err(VMError::InvalidStackOperand {
                instruction: "DUP",
                n,
                offset,
            });
        }
        let n = n as usize;
        self.require(n, offset)?;
        let value = self.items[self.items.len() - n];
        self.push(value, offset)
    }

    /// Exchanges the top with the `(n + 1)`-th item.
    pub(super) fn swap(&mut self, n: u8, offset: usize) -> Result<(), VMError> {
        if n == 0 {
            return Err(VMError::InvalidStackOperand {
                instruction: "SWAP",
                n,
                offset,
            });
        }
        let n = n as usize;
        self.require(n + 1, offset)?;
        let top = self.items.len() - 1;
        self.items.swap(top, top - n);
        Ok(())
    }
}

//! Packed storage field layout.
//!
//! A [`StorageLayout`] names sub-word fields inside storage slots. Each field
//! is a bit range `[offset, offset + width)` of one slot, and no two fields
//! overlap. The layout reads and writes fields from host code and emits the
//! mask-and-multiply instruction sequences that do the same inside a program.

use crate::types::word::{WORD_BITS, Word, low_mask, pow2};
use crate::virtual_machine::assembler::AsmInstr;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::state::State;

/// Position of one field: a bit range inside a storage slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    /// Storage key holding the field.
    pub slot: Word,
    /// Bit offset from the least significant end of the slot.
    pub offset: usize,
    /// Width in bits.
    pub width: usize,
}

impl FieldLayout {
    /// Field value bits, unshifted.
    fn value_mask(&self) -> Word {
        low_mask(self.width)
    }

    /// Multiplier moving a value into position.
    fn factor(&self) -> Word {
        pow2(self.offset)
    }

    /// Mask covering the field's bits within the slot.
    pub fn mask(&self) -> Word {
        self.value_mask() << self.offset
    }

    /// Reads the field out of a slot value.
    pub fn extract(&self, slot_value: Word) -> Word {
        (slot_value >> self.offset) & self.value_mask()
    }

    /// Replaces the field inside a slot value. Bits of `value` above the field
    /// width are dropped.
    pub fn insert(&self, slot_value: Word, value: Word) -> Word {
        (slot_value & !self.mask()) | ((value & self.value_mask()) << self.offset)
    }

    fn overlaps(&self, other: &FieldLayout) -> bool {
        self.slot == other.slot
            && self.offset < other.offset + other.width
            && other.offset < self.offset + self.width
    }
}

/// True when bits `[offset, offset + width)` lie inside one word.
fn fits(offset: usize, width: usize) -> bool {
    offset.checked_add(width).is_some_and(|end| end <= WORD_BITS)
}

/// Named fields packed into storage slots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageLayout {
    fields: Vec<(String, FieldLayout)>,
}

impl StorageLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places fields one after another starting at slot 0, bit 0.
    ///
    /// A field that does not fit in the rest of the current slot starts a new
    /// slot.
    pub fn pack_sequential<'a>(
        fields: impl IntoIterator<Item = (&'a str, usize)>,
    ) -> Result<Self, VMError> {
        let mut layout = Self::new();
        let mut slot = 0u64;
        let mut offset = 0usize;
        for (name, width) in fields {
            if !fits(offset, width) {
                slot += 1;
                offset = 0;
            }
            layout.add_field(name, Word::from(slot), offset, width)?;
            offset += width;
        }
        Ok(layout)
    }

    /// Adds a field at an explicit position.
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        slot: Word,
        offset: usize,
        width: usize,
    ) -> Result<(), VMError> {
        let name = name.into();
        if width == 0 || !fits(offset, width) {
            return Err(VMError::InvalidFieldBounds {
                name,
                offset,
                width,
            });
        }
        if self.fields.iter().any(|(n, _)| *n == name) {
            return Err(VMError::DuplicateField { name });
        }

        let field = FieldLayout {
            slot,
            offset,
            width,
        };
        if let Some((other, _)) = self.fields.iter().find(|(_, f)| f.overlaps(&field)) {
            return Err(VMError::FieldOverlap {
                name,
                other: other.clone(),
            });
        }
        self.fields.push((name, field));
        Ok(())
    }

    pub fn field(&self, name: &str) -> Result<&FieldLayout, VMError> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
            .ok_or_else(|| VMError::UnknownField {
                name: name.to_string(),
            })
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldLayout)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Reads a field from storage.
    pub fn read(&self, state: &impl State, name: &str) -> Result<Word, VMError> {
        let field = self.field(name)?;
        let slot_value = state.get(field.slot).unwrap_or(Word::ZERO);
        Ok(field.extract(slot_value))
    }

    /// Writes a field to storage, leaving the other fields of its slot intact.
    pub fn write(&self, state: &mut impl State, name: &str, value: Word) -> Result<(), VMError> {
        let field = self.field(name)?;
        let slot_value = state.get(field.slot).unwrap_or(Word::ZERO);
        let updated = field.insert(slot_value, value);
        if updated.is_zero() {
            state.delete(field.slot);
        } else {
            state.set(field.slot, updated);
        }
        Ok(())
    }

    /// Instructions that push the value of `name`.
    ///
    /// `(sload(slot) / 2^offset) & (2^width - 1)`
    pub fn emit_load(&self, name: &str) -> Result<Vec<AsmInstr>, VMError> {
        let field = self.field(name)?;
        Ok(vec![
            AsmInstr::push(field.value_mask()),
            AsmInstr::push(field.factor()),
            AsmInstr::push(field.slot),
            AsmInstr::SLoad {},
            AsmInstr::Div {},
            AsmInstr::And {},
        ])
    }

    /// Instructions that pop the top of the stack into `name`.
    ///
    /// `sstore(slot, or(mul(and(v, 2^width - 1), 2^offset), and(sload(slot), not(mask))))`
    pub fn emit_store(&self, name: &str) -> Result<Vec<AsmInstr>, VMError> {
        let field = self.field(name)?;
        Ok(vec![
            AsmInstr::push(field.value_mask()),
            AsmInstr::And {},
            AsmInstr::push(field.factor()),
            AsmInstr::Mul {},
            AsmInstr::push(!field.mask()),
            AsmInstr::push(field.slot),
            AsmInstr::SLoad {},
            AsmInstr::And {},
            AsmInstr::Or {},
            AsmInstr::push(field.slot),
            AsmInstr::SStore {},
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::word;
    use crate::virtual_machine::assembler::{Item, link};
    use crate::virtual_machine::state::MemoryState;
    use crate::virtual_machine::verifier::verify;
    use crate::virtual_machine::vm::{CallData, VM, VmConfig};

    fn token_layout() -> StorageLayout {
        StorageLayout::pack_sequential([("owner", 160), ("decimals", 8), ("paused", 1), ("supply", 128)])
            .unwrap()
    }

    #[test]
    fn pack_sequential_opens_new_slot_when_full() {
        let layout = token_layout();
        assert_eq!(
            *layout.field("decimals").unwrap(),
            FieldLayout {
                slot: word(0),
                offset: 160,
                width: 8
            }
        );
        assert_eq!(layout.field("paused").unwrap().offset, 168);
        assert_eq!(
            *layout.field("supply").unwrap(),
            FieldLayout {
                slot: word(1),
                offset: 0,
                width: 128
            }
        );
    }

    #[test]
    fn oversized_bounds_are_rejected_not_overflowed() {
        let mut layout = StorageLayout::new();
        assert!(matches!(
            layout.add_field("x", word(0), usize::MAX, 1),
            Err(VMError::InvalidFieldBounds { .. })
        ));
        assert!(matches!(
            layout.add_field("y", word(0), 1, usize::MAX),
            Err(VMError::InvalidFieldBounds { .. })
        ));
        assert_eq!(
            StorageLayout::pack_sequential([("a", 8), ("b", usize::MAX)]),
            Err(VMError::InvalidFieldBounds {
                name: "b".to_string(),
                offset: 0,
                width: usize::MAX
            })
        );
    }

    #[test]
    fn add_field_rejects_bad_bounds_duplicates_and_overlap() {
        let mut layout = StorageLayout::new();
        assert!(matches!(
            layout.add_field("zero", word(0), 0, 0),
            Err(VMError::InvalidFieldBounds { .. })
        ));
        assert!(matches!(
            layout.add_field("wide", word(0), 200, 64),
            Err(VMError::InvalidFieldBounds { .. })
        ));

        layout.add_field("a", word(0), 0, 16).unwrap();
        assert_eq!(
            layout.add_field("a", word(1), 0, 16),
            Err(VMError::DuplicateField {
                name: "a".to_string()
            })
        );
        assert_eq!(
            layout.add_field("b", word(0), 8, 16),
            Err(VMError::FieldOverlap {
                name: "b".to_string(),
                other: "a".to_string()
            })
        );
        layout.add_field("c", word(0), 16, 16).unwrap();
        layout.add_field("d", word(1), 8, 16).unwrap();
        assert_eq!(layout.fields().count(), 3);
    }

    #[test]
    fn unknown_field_is_reported() {
        assert_eq!(
            token_layout().field("nope"),
            Err(VMError::UnknownField {
                name: "nope".to_string()
            })
        );
    }

    #[test]
    fn host_writes_keep_neighbouring_fields() {
        let layout = token_layout();
        let mut state = MemoryState::new();
        layout.write(&mut state, "owner", Word::MAX).unwrap();
        layout.write(&mut state, "decimals", word(18)).unwrap();
        layout.write(&mut state, "paused", word(1)).unwrap();

        assert_eq!(layout.read(&state, "owner").unwrap(), low_mask(160));
        assert_eq!(layout.read(&state, "decimals").unwrap(), word(18));
        assert_eq!(layout.read(&state, "paused").unwrap(), word(1));

        layout.write(&mut state, "decimals", word(0x1ff)).unwrap();
        assert_eq!(layout.read(&state, "decimals").unwrap(), word(0xff));
        assert_eq!(layout.read(&state, "paused").unwrap(), word(1));
    }

    #[test]
    fn clearing_every_field_deletes_the_slot() {
        let layout = token_layout();
        let mut state = MemoryState::new();
        layout.write(&mut state, "supply", word(7)).unwrap();
        assert_eq!(state.len(), 1);
        layout.write(&mut state, "supply", word(0)).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn emitted_code_matches_host_access() {
        let layout = token_layout();
        let mut items = vec![Item::Instr(AsmInstr::push(word(42)))];
        items.extend(layout.emit_store("decimals").unwrap().into_iter().map(Item::Instr));
        items.push(Item::Instr(AsmInstr::push(word(1))));
        items.extend(layout.emit_store("paused").unwrap().into_iter().map(Item::Instr));
        items.extend(layout.emit_load("decimals").unwrap().into_iter().map(Item::Instr));
        let program = link(&items).unwrap();
        verify(&program).unwrap();

        let mut state = MemoryState::new();
        layout.write(&mut state, "owner", word(0xbeef)).unwrap();
        let mut vm = VM::new(&program, CallData::default(), VmConfig::default());
        vm.run(&mut state).unwrap();

        assert_eq!(vm.stack(), &[word(42)]);
        assert_eq!(layout.read(&state, "owner").unwrap(), word(0xbeef));
        assert_eq!(layout.read(&state, "decimals").unwrap(), word(42));
        assert_eq!(layout.read(&state, "paused").unwrap(), word(1));
    }
}

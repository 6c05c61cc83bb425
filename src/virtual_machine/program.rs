//! Bytecode program representation and serialization.
//!
//! A [`Program`] is a flat bytecode sequence. It can be serialized with a
//! magic header and format version, decoded into an instruction listing,
//! scanned for jump destinations, and rendered back to assembly text.

use crate::types::bytes::Bytes;
use crate::types::encoding::{Decode, Encode};
use crate::types::word::{Word, to_usize};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, OperandKind};
use contract_vm_derive::BinaryCodec;
use std::collections::HashSet;
use std::fmt::{self, Write};

/// Magic bytes identifying a serialized VM program.
const MAGIC: &[u8; 4] = b"CVM\0";

/// Current bytecode format version.
const CURRENT_VERSION: Version = Version::new(1, 0, 0);

/// Semantic version for bytecode format compatibility.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, BinaryCodec)]
struct Version {
    major: u8,
    minor: u8,
    patch: u8,
}

impl Version {
    /// Creates a new version with the given components.
    const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

/// Decoded operand of one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    None,
    Word(Word),
    U8(u8),
    /// Absolute code offset of the jump destination.
    Label(u32),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Word(w) if to_usize(*w).is_some_and(|v| v <= u32::MAX as usize) => {
                write!(f, "{w}")
            }
            Operand::Word(w) => write!(f, "0x{w:x}"),
            Operand::U8(n) => write!(f, "{n}"),
            Operand::Label(target) => write!(f, "{}", label_name(*target as usize)),
        }
    }
}

/// One instruction of a decoded listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedInstr {
    /// Code offset of the opcode byte.
    pub offset: usize,
    pub instruction: Instruction,
    pub operand: Operand,
}

impl DecodedInstr {
    /// Offset of the following instruction.
    pub fn next_offset(&self) -> usize {
        self.offset + self.instruction.size()
    }
}

/// Name given to the label at `offset` in disassembly.
fn label_name(offset: usize) -> String {
    format!("L{offset:04}")
}

/// Decodes the instruction starting at `offset`.
pub(crate) fn decode_at(code: &[u8], offset: usize) -> Result<DecodedInstr, VMError> {
    let opcode = code[offset];
    let instruction = Instruction::try_from(opcode)
        .map_err(|_| VMError::InvalidInstruction { opcode, offset })?;
    let kind = instruction.operand_kind();
    let start = offset + 1;
    let bytes = code
        .get(start..start + kind.size())
        .ok_or(VMError::UnexpectedEndOfBytecode {
            ip: start,
            requested: kind.size(),
            available: code.len() - start,
        })?;

    let operand = match kind {
        OperandKind::None => Operand::None,
        OperandKind::Word => Operand::Word(Word::from_be_slice(bytes)),
        OperandKind::U8 => Operand::U8(bytes[0]),
        OperandKind::Label => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(bytes);
            Operand::Label(u32::from_le_bytes(buf))
        }
    };
    Ok(DecodedInstr {
        offset,
        instruction,
        operand,
    })
}

/// Compiled bytecode program.
#[derive(Debug, Clone, Default, PartialEq, Eq, BinaryCodec)]
pub struct Program {
    /// Instruction bytecode.
    pub code: Bytes,
}

impl Program {
    pub fn new(code: impl Into<Bytes>) -> Self {
        Self { code: code.into() }
    }

    /// Serializes the program to a portable binary format.
    ///
    /// The output includes a magic header and version for compatibility checking.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = Vec::new();
        MAGIC.encode(&mut out);
        CURRENT_VERSION.encode(&mut out);
        self.encode(&mut out);
        Bytes::from_vec(out)
    }

    /// Deserializes a program from its binary representation.
    ///
    /// Validates the magic header and version, rejecting programs from
    /// other bytecode formats.
    pub fn from_bytes(mut input: &[u8]) -> Result<Self, VMError> {
        if input.len() < MAGIC.len() {
            return Err(VMError::DecodeError {
                reason: "truncated".to_string(),
            });
        }

        if &<[u8; 4]>::decode(&mut input)? != MAGIC {
            return Err(VMError::DecodeError {
                reason: "bad magic".to_string(),
            });
        }

        if Version::decode(&mut input)? != CURRENT_VERSION {
            return Err(VMError::DecodeError {
                reason: "unsupported version".to_string(),
            });
        }

        let p = <Program as Decode>::decode(&mut input)?;
        if !input.is_empty() {
            return Err(VMError::DecodeError {
                reason: "trailing bytes".to_string(),
            });
        }
        Ok(p)
    }

    /// Decodes the whole program into an instruction listing.
    pub fn instructions(&self) -> Result<Vec<DecodedInstr>, VMError> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < self.code.len() {
            let instr = decode_at(&self.code, offset)?;
            offset = instr.next_offset();
            out.push(instr);
        }
        Ok(out)
    }

    /// Offsets of every `LABEL` marker at an instruction boundary.
    ///
    /// Operand bytes are skipped, so a `0x5B` inside a `PUSH` immediate is not
    /// a destination. Unknown opcodes are stepped over one byte at a time and
    /// the scan stops at a truncated operand; execution fails on either anyway.
    pub fn jump_targets(&self) -> HashSet<usize> {
        let mut targets = HashSet::new();
        let mut offset = 0;
        while offset < self.code.len() {
            match Instruction::try_from(self.code[offset]) {
                Ok(Instruction::Label) => {
                    targets.insert(offset);
                    offset += 1;
                }
                Ok(instr) => offset += instr.size(),
                Err(_) => offset += 1,
            }
        }
        targets
    }

    /// Renders the program as assembly text accepted by the assembler.
    ///
    /// `LABEL` markers become `Lnnnn:` definitions named after their offset.
    /// A jump operand that is not a `LABEL` offset is printed as the raw
    /// offset with a comment; such a listing does not reassemble.
    pub fn disassemble(&self) -> Result<String, VMError> {
        let targets = self.jump_targets();
        let mut out = String::new();
        for instr in self.instructions()? {
            let _ = match (instr.instruction, instr.operand) {
                (Instruction::Label, _) => writeln!(out, "{}:", label_name(instr.offset)),
                (i, Operand::Label(target)) if !targets.contains(&(target as usize)) => writeln!(
                    out,
                    "    {} {target}  # no LABEL at offset {target}",
                    i.mnemonic()
                ),
                (i, Operand::None) => writeln!(out, "    {}", i.mnemonic()),
                (i, operand) => writeln!(out, "    {} {operand}", i.mnemonic()),
            };
        }
        Ok(out)
    }
}

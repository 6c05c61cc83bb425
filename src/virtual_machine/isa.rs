//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the VM's instruction set. The [`for_each_instruction!`](crate::for_each_instruction) macro holds
//! the canonical instruction definitions and invokes a callback macro for code
//! generation. This enables multiple modules to generate instruction-related
//! code without duplicating definitions.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode mappings
//! - `TryFrom<u8>` for decoding opcodes
//! - Mnemonic lookup, stack effects and operand layout
//!
//! See [`assembler`](super::assembler) for assembly-related code generation
//! (`AsmInstr`, parsing, bytecode encoding).
//!
//! # Bytecode Format
//!
//! Instructions use variable-length encoding:
//! - Opcode: 1 byte
//! - Word immediate: 32 bytes (big-endian)
//! - U8 immediate: 1 byte (`DUP` / `SWAP` depth)
//! - Label operand: 4 bytes (little-endian absolute code offset of a `LABEL`)
//!
//! # Stack convention
//!
//! The first functional argument of an instruction is on top of the stack:
//! `SUB` computes `top - second`, `MSTORE` pops the address then the value.

use crate::virtual_machine::errors::VMError;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each entry reads `Name = opcode, "MNEMONIC" => [operands], pops, pushes`.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            /// STOP ; halt with empty output
            Stop = 0x00, "STOP" => [], 0, 0,
            // =========================
            // Arithmetic
            // =========================
            /// ADD ; a + b (wrapping)
            Add = 0x01, "ADD" => [], 2, 1,
            /// MUL ; a * b (wrapping)
            Mul = 0x02, "MUL" => [], 2, 1,
            /// SUB ; a - b (wrapping)
            Sub = 0x03, "SUB" => [], 2, 1,
            /// DIV ; a / b unsigned, 0 when b = 0
            Div = 0x04, "DIV" => [], 2, 1,
            /// SDIV ; a / b signed, truncating toward zero, 0 when b = 0
            SDiv = 0x05, "SDIV" => [], 2, 1,
            /// MOD ; a % b unsigned, 0 when b = 0
            Mod = 0x06, "MOD" => [], 2, 1,
            /// SMOD ; a % b signed (sign of a), 0 when b = 0
            SMod = 0x07, "SMOD" => [], 2, 1,
            /// EXP ; a ** b modulo 2^256
            Exp = 0x0A, "EXP" => [], 2, 1,
            // =========================
            // Comparison / bitwise
            // =========================
            /// LT ; a < b unsigned
            Lt = 0x10, "LT" => [], 2, 1,
            /// GT ; a > b unsigned
            Gt = 0x11, "GT" => [], 2, 1,
            /// SLT ; a < b signed
            SLt = 0x12, "SLT" => [], 2, 1,
            /// SGT ; a > b signed
            SGt = 0x13, "SGT" => [], 2, 1,
            /// EQ ; a == b
            Eq = 0x14, "EQ" => [], 2, 1,
            /// ISZERO ; a == 0
            IsZero = 0x15, "ISZERO" => [], 1, 1,
            /// AND ; a & b
            And = 0x16, "AND" => [], 2, 1,
            /// OR ; a | b
            Or = 0x17, "OR" => [], 2, 1,
            /// XOR ; a ^ b
            Xor = 0x18, "XOR" => [], 2, 1,
            /// NOT ; !a
            Not = 0x19, "NOT" => [], 1, 1,
            /// BYTE ; i-th byte of x counting from the most significant
            Byte = 0x1A, "BYTE" => [], 2, 1,
            /// SHL ; value << shift (shift on top)
            Shl = 0x1B, "SHL" => [], 2, 1,
            /// SHR ; value >> shift, logical
            Shr = 0x1C, "SHR" => [], 2, 1,
            /// SAR ; value >> shift, arithmetic
            Sar = 0x1D, "SAR" => [], 2, 1,
            // =========================
            // Call data
            // =========================
            /// CALLDATALOAD ; 32 bytes of call data at offset, zero-padded
            CallDataLoad = 0x35, "CALLDATALOAD" => [], 1, 1,
            /// CALLDATASIZE ; call data length in bytes
            CallDataSize = 0x36, "CALLDATASIZE" => [], 0, 1,
            /// CALLDATACOPY ; copy len bytes from call data offset to memory
            CallDataCopy = 0x37, "CALLDATACOPY" => [], 3, 0,
            // =========================
            // Stack, memory and storage
            // =========================
            /// POP ; discard the top word
            Pop = 0x50, "POP" => [], 1, 0,
            /// MLOAD ; word at memory address
            MLoad = 0x51, "MLOAD" => [], 1, 1,
            /// MSTORE ; write 32 bytes at memory address
            MStore = 0x52, "MSTORE" => [], 2, 0,
            /// MSTORE8 ; write the low byte of value at memory address
            MStore8 = 0x53, "MSTORE8" => [], 2, 0,
            /// SLOAD ; storage value at key, 0 when unset
            SLoad = 0x54, "SLOAD" => [], 1, 1,
            /// SSTORE ; set storage key to value
            SStore = 0x55, "SSTORE" => [], 2, 0,
            // =========================
            // Control flow
            // =========================
            /// JUMP target ; continue at LABEL target
            Jump = 0x56, "JUMP" => [target: Label], 0, 0,
            /// JUMPI target ; continue at LABEL target when the popped condition is nonzero
            JumpI = 0x57, "JUMPI" => [target: Label], 1, 0,
            /// MSIZE ; current memory size in bytes
            MSize = 0x59, "MSIZE" => [], 0, 1,
            /// LABEL ; jump destination marker, no-op when executed
            Label = 0x5B, "LABEL" => [], 0, 0,
            /// PUSH word ; push a literal word
            Push = 0x60, "PUSH" => [value: Word], 0, 1,
            /// DUP n ; copy the n-th item (top = 1) onto the top
            Dup = 0x80, "DUP" => [n: U8], 0, 1,
            /// SWAP n ; exchange the top with the (n+1)-th item
            Swap = 0x90, "SWAP" => [n: U8], 0, 0,
            /// RETURN ; halt with memory[offset, offset + len) as output
            Return = 0xF3, "RETURN" => [], 2, 0,
        }
    };
}

/// Operand layout following an opcode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    None,
    Word,
    U8,
    Label,
}

impl OperandKind {
    /// Encoded operand size in bytes.
    pub const fn size(self) -> usize {
        match self {
            OperandKind::None => 0,
            OperandKind::Word => 32,
            OperandKind::U8 => 1,
            OperandKind::Label => 4,
        }
    }
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $pops:expr, $pushes:expr
        ),* $(,)?
    ) => {
        // =========================
        // VM instruction enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::InvalidInstruction {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// Every instruction, in opcode order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name, )* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Looks up an instruction by its (uppercase) mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Instruction> {
                match name {
                    $( $mnemonic => Some(Instruction::$name), )*
                    _ => None,
                }
            }

            /// Number of words popped from the stack.
            pub const fn pops(&self) -> usize {
                match self {
                    $( Instruction::$name => $pops, )*
                }
            }

            /// Number of words pushed onto the stack.
            pub const fn pushes(&self) -> usize {
                match self {
                    $( Instruction::$name => $pushes, )*
                }
            }

            /// Layout of the operand that follows the opcode.
            pub const fn operand_kind(&self) -> OperandKind {
                match self {
                    $(
                        Instruction::$name => {
                            let kinds = [OperandKind::None $( , OperandKind::$kind )*];
                            kinds[kinds.len() - 1]
                        }
                    )*
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

impl Instruction {
    /// Encoded size in bytes: opcode plus operand.
    pub const fn size(&self) -> usize {
        1 + self.operand_kind().size()
    }

    /// True when control never falls through to the next instruction.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Instruction::Stop | Instruction::Return | Instruction::Jump
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_try_from_invalid() {
        assert!(matches!(
            Instruction::try_from(0xFF),
            Err(VMError::InvalidInstruction { opcode: 0xFF, .. })
        ));
    }

    #[test]
    fn opcodes_round_trip_through_try_from() {
        for &instr in Instruction::ALL {
            assert_eq!(Instruction::try_from(instr as u8).unwrap(), instr);
            assert_eq!(Instruction::from_mnemonic(instr.mnemonic()), Some(instr));
        }
    }

    #[test]
    fn operand_layout() {
        assert_eq!(Instruction::Push.operand_kind(), OperandKind::Word);
        assert_eq!(Instruction::Push.size(), 33);
        assert_eq!(Instruction::Dup.size(), 2);
        assert_eq!(Instruction::JumpI.size(), 5);
        assert_eq!(Instruction::Add.size(), 1);
    }

    #[test]
    fn stack_effects() {
        assert_eq!((Instruction::Add.pops(), Instruction::Add.pushes()), (2, 1));
        assert_eq!(Instruction::CallDataCopy.pops(), 3);
        assert_eq!(Instruction::JumpI.pops(), 1);
        assert_eq!(Instruction::Label.pushes(), 0);
    }

    #[test]
    fn mnemonic_lookup_is_case_sensitive() {
        assert_eq!(Instruction::from_mnemonic("ADD"), Some(Instruction::Add));
        assert_eq!(Instruction::from_mnemonic("add"), None);
    }
}

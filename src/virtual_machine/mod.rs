//! Stack-based bytecode virtual machine over 256-bit words.
//!
//! The VM runs one invocation at a time: a program, its call data and a view
//! of persistent storage go in; either the bytes a `RETURN` designates or an
//! abort come out.
//!
//! # Architecture
//!
//! - **Stack**: up to 1024 words by default; the first operand of an
//!   instruction is on top
//! - **Memory**: byte-addressable, zero-filled, grows in 32-byte words and
//!   never shrinks within an invocation
//! - **Storage**: word-to-word map that outlives the invocation; unset slots
//!   read as zero
//! - **Call data**: read-only input, conventionally a 4-byte selector
//!   followed by 32-byte arguments
//! - **Control flow**: `JUMP` / `JUMPI` may only land on `LABEL` markers
//!
//! # Modules
//!
//! - [`alu`]: Wrapping unsigned and two's-complement word arithmetic
//! - [`assembler`]: Assembly parsing, diagnostics, and bytecode generation
//! - [`errors`]: Assembly, compilation and execution error types
//! - [`invocation`]: Atomic run-and-commit against storage
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`lang`]: Structured front end with named locals
//! - [`layout`]: Packed storage field descriptors
//! - [`program`]: Bytecode container, serialization and disassembly
//! - [`state`]: Storage trait, write overlay and backends
//! - [`verifier`]: Static stack-depth verification
//! - [`vm`]: Interpreter, call data and configuration

pub mod alu;
pub mod assembler;
pub mod errors;
pub mod invocation;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod lang;
pub mod layout;
pub mod program;
pub mod state;
pub mod verifier;
pub mod vm;

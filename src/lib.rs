//! Contract virtual machine library.
//!
//! Provides a 256-bit word stack machine with memory, storage and call data,
//! plus its assembler, static verifier and a structured front end.

pub mod types;
pub mod utils;
pub mod virtual_machine;

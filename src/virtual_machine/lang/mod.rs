//! Structured front end with named local variables.
//!
//! Sources are written in a small block language modelled on inline
//! assembly:
//!
//! ```text
//! let total := 0
//! for { let i := 0 } lt(i, calldataload(4)) { i := add(i, 1) } {
//!     total := add(total, i)
//! }
//! mstore(0, total)
//! return(0, 32)
//! ```
//!
//! Builtins are the machine instructions by lowercase mnemonic, with the
//! first argument on top of the stack. `sget(field)` and `sset(field, v)`
//! access packed storage fields when a [`StorageLayout`] is supplied.
//! Locals are assigned stack slots at compile time, so no source program can
//! reach a label with an inconsistent stack.

pub mod codegen;
pub mod lexer;
pub mod parser;

use crate::virtual_machine::assembler::{Item, link, log_source_error, read_source};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::layout::StorageLayout;
use crate::virtual_machine::program::Program;
use codegen::Compiler;
use std::path::Path;

/// Compiles a structured source to its symbolic assembly.
pub fn compile_items(source: &str, layout: Option<&StorageLayout>) -> Result<Vec<Item>, VMError> {
    let stmts = parser::parse(source)?;
    Compiler::new(layout).compile(&stmts)
}

/// Compiles a structured source to bytecode.
pub fn compile_source(source: &str, layout: Option<&StorageLayout>) -> Result<Program, VMError> {
    compile_source_with_name(source, "<source>", layout)
}

/// [`compile_source`] with a file name for diagnostics, which are logged on
/// failure.
pub fn compile_source_with_name(
    source: &str,
    source_name: &str,
    layout: Option<&StorageLayout>,
) -> Result<Program, VMError> {
    let result = compile_items(source, layout).and_then(|items| link(&items));
    if let Err(err) = &result {
        log_source_error(source_name, source, err);
    }
    result
}

pub fn compile_file<P: AsRef<Path>>(
    path: P,
    layout: Option<&StorageLayout>,
) -> Result<Program, VMError> {
    let path = path.as_ref();
    let source = read_source(path)?;
    compile_source_with_name(&source, &path.display().to_string(), layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::bytes::Bytes;
    use crate::utils::test_utils::utils::{output_word, word};
    use crate::virtual_machine::invocation::invoke;
    use crate::virtual_machine::state::{MemoryState, State};
    use crate::virtual_machine::verifier::verify;
    use crate::virtual_machine::vm::{CallData, VmConfig};

    fn run(source: &str, calldata: CallData, state: &mut MemoryState) -> Bytes {
        let program = compile_source(source, None).unwrap();
        verify(&program).unwrap();
        invoke(&program, calldata, state, &VmConfig::default().with_label_check()).unwrap()
    }

    #[test]
    fn multiplication_by_repeated_addition() {
        let source = "
            let a := 5
            let b := 3
            let prod := 0
            let counter := 0
            for { } iszero(eq(counter, b)) { counter := add(counter, 1) } {
                prod := add(prod, a)
            }
            mstore(0, prod)
            mstore(32, counter)
            return(0, 64)
        ";
        let output = run(source, CallData::default(), &mut MemoryState::new());
        assert_eq!(output_word(&Bytes::from(&output[..32])), word(15));
        assert_eq!(output_word(&Bytes::from(&output[32..])), word(3));
    }

    #[test]
    fn calldata_arguments_are_added() {
        let source = "
            mstore(0, add(calldataload(4), calldataload(36)))
            return(0, 32)
        ";
        let calldata = CallData::builder()
            .selector([1, 2, 3, 4])
            .word(word(4))
            .word(word(7))
            .build();
        let output = run(source, calldata, &mut MemoryState::new());
        assert_eq!(output_word(&output), word(11));
    }

    #[test]
    fn dynamic_array_sum_with_break_and_continue() {
        // Sums the array elements, skipping 13 and stopping at 0.
        let source = "
            let base := add(calldataload(4), 4)
            let len := calldataload(base)
            let sum := 0
            for { let i := 0 } lt(i, len) { i := add(i, 1) } {
                let v := calldataload(add(base, mul(32, add(i, 1))))
                if iszero(v) { break }
                if eq(v, 13) { continue }
                sum := add(sum, v)
            }
            mstore(0, sum)
            return(0, 32)
        ";
        let calldata = CallData::builder()
            .selector([0; 4])
            .array(&[word(10), word(13), word(20), word(0), word(99)])
            .build();
        let output = run(source, calldata, &mut MemoryState::new());
        assert_eq!(output_word(&output), word(30));
    }

    #[test]
    fn switch_dispatches_on_selector() {
        let source = "
            let result := 0
            switch shr(224, calldataload(0))
            case 0x11111111 { result := 1 }
            case 0x22222222 { result := 2 }
            default { result := 99 }
            sstore(0, result)
        ";
        for (selector, expected) in [
            ([0x11; 4], 1u64),
            ([0x22; 4], 2),
            ([0x33; 4], 99),
        ] {
            let mut state = MemoryState::new();
            let calldata = CallData::builder().selector(selector).build();
            let output = run(source, calldata, &mut state);
            assert!(output.is_empty());
            assert_eq!(state.get(word(0)), Some(word(expected)));
        }
    }

    #[test]
    fn packed_fields_through_layout() {
        let layout =
            StorageLayout::pack_sequential([("count", 64), ("flag", 8), ("limit", 64)]).unwrap();
        let source = "
            sset(count, add(sget(count), 1))
            sset(flag, 1)
            mstore(0, add(sget(count), sget(limit)))
            return(0, 32)
        ";
        let program = compile_source(source, Some(&layout)).unwrap();
        verify(&program).unwrap();

        let mut state = MemoryState::new();
        layout.write(&mut state, "count", word(41)).unwrap();
        layout.write(&mut state, "limit", word(1000)).unwrap();
        let output = invoke(&program, CallData::default(), &mut state, &VmConfig::default())
            .unwrap();

        assert_eq!(output_word(&output), word(1042));
        assert_eq!(layout.read(&state, "count").unwrap(), word(42));
        assert_eq!(layout.read(&state, "flag").unwrap(), word(1));
        assert_eq!(layout.read(&state, "limit").unwrap(), word(1000));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn nested_loops_keep_every_label_consistent() {
        let source = "
            let total := 0
            for { let i := 0 } lt(i, 4) { i := add(i, 1) } {
                for { let j := 0 } lt(j, i) { j := add(j, 1) } {
                    let t := mul(i, j)
                    if gt(t, 4) { break }
                    total := add(total, t)
                }
            }
            sstore(1, total)
        ";
        let program = compile_source(source, None).unwrap();
        let depths = verify(&program).unwrap();
        assert!(!depths.is_empty());

        let mut state = MemoryState::new();
        invoke(
            &program,
            CallData::default(),
            &mut state,
            &VmConfig::default().with_label_check(),
        )
        .unwrap();
        // i=1: 0; i=2: 0+2; i=3: 0+3 (6 breaks)
        assert_eq!(state.get(word(1)), Some(word(5)));
    }

    #[test]
    fn parse_errors_carry_positions() {
        assert!(matches!(
            compile_source("let x := add(1,", None),
            Err(VMError::ParseError { line: 1, .. })
        ));
    }
}

//! Static stack-depth verification.
//!
//! Walks every path reachable from offset 0 and tracks the stack depth at
//! each instruction. Two edges arriving at the same `LABEL` with different
//! depths are rejected, as are jumps to offsets that are not `LABEL` markers
//! and instructions that would provably underflow.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::{Operand, Program, decode_at};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Verifies `program` and returns the stack depth at every reachable label,
/// keyed by the label's code offset.
///
/// Unreachable code is not inspected, and falling off the end of the code is
/// a normal halt.
pub fn verify(program: &Program) -> Result<BTreeMap<usize, usize>, VMError> {
    let code = program.code.as_slice();
    let targets = program.jump_targets();

    let mut depths: HashMap<usize, usize> = HashMap::new();
    let mut labels = BTreeMap::new();
    let mut queue = VecDeque::from([(0usize, 0usize)]);

    while let Some((offset, depth)) = queue.pop_front() {
        if offset >= code.len() {
            continue;
        }
        if let Some(&expected) = depths.get(&offset) {
            if expected != depth {
                return Err(VMError::StackInconsistency {
                    label: offset,
                    expected,
                    actual: depth,
                });
            }
            continue;
        }
        depths.insert(offset, depth);

        let decoded = decode_at(code, offset)?;
        let instruction = decoded.instruction;
        if instruction == Instruction::Label {
            labels.insert(offset, depth);
        }

        let needed = match (instruction, decoded.operand) {
            (Instruction::Dup | Instruction::Swap, Operand::U8(0)) => {
                return Err(VMError::InvalidStackOperand {
                    instruction: instruction.mnemonic(),
                    n: 0,
                    offset,
                });
            }
            (Instruction::Dup, Operand::U8(n)) => n as usize,
            (Instruction::Swap, Operand::U8(n)) => n as usize + 1,
            _ => instruction.pops(),
        };
        if depth < needed {
            return Err(VMError::StackUnderflow {
                offset,
                needed,
                depth,
            });
        }
        let after = depth - instruction.pops() + instruction.pushes();

        if let Operand::Label(target) = decoded.operand {
            let target = target as usize;
            if !targets.contains(&target) {
                return Err(VMError::InvalidJumpTarget { target, offset });
            }
            queue.push_back((target, after));
        }
        if !instruction.is_terminal() {
            queue.push_back((decoded.next_offset(), after));
        }
    }

    Ok(labels)
}

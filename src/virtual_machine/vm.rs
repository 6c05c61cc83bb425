//! Core virtual machine implementation.
//!
//! The VM executes bytecode on a stack of 256-bit words, with byte-addressable
//! memory, persistent key-value storage and a read-only call-data buffer. All
//! arithmetic wraps; every failure aborts the run.

mod calldata;
mod config;
mod memory;
mod stack;

pub use calldata::{CallData, CallDataBuilder, SELECTOR_LEN};
pub use config::{
    CHECK_LABELS_ENV, DEFAULT_MEMORY_LIMIT, DEFAULT_STACK_LIMIT, MEMORY_LIMIT_ENV,
    STACK_LIMIT_ENV, STEP_LIMIT_ENV, VmConfig,
};

use crate::types::bytes::Bytes;
use crate::types::word::Word;
use crate::virtual_machine::alu;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::Program;
use crate::virtual_machine::state::State;
use memory::Memory;
use stack::Stack;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        state = $state:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => exec_vm!(@call $vm, $state, $handler, $args),
            )*
        }
    }};

    // Pure word functions over the top operands
    (@call $vm:ident, $state:ident, binary, ($f:path)) => {{
        $vm.binary($f)
    }};

    (@call $vm:ident, $state:ident, unary, ($f:path)) => {{
        $vm.unary($f)
    }};

    // Handler with storage
    (@call $vm:ident, $state:ident, $handler:ident, (state)) => {{
        $vm.$handler($state)
    }};

    // Handler with decoded operands
    (@call $vm:ident, $state:ident, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $vm, $kind)?; )*
        $vm.$handler($( $field ),*)
    }};

    // Decode a 32-byte big-endian word
    (@read $vm:ident, Word) => {{
        $vm.read_exact(32).map(Word::from_be_slice)
    }};

    // Decode a u8 depth
    (@read $vm:ident, U8) => {{
        $vm.read_exact(1).map(|b| b[0])
    }};

    // Decode a label offset (little-endian, 4 bytes)
    (@read $vm:ident, Label) => {{
        $vm.read_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
    }};
}

/// Bytecode virtual machine.
///
/// Executes one invocation: instructions run sequentially from offset 0
/// until `STOP`, `RETURN`, the end of the code, or an error.
#[derive(Debug)]
pub struct VM {
    /// Bytecode to execute.
    code: Bytes,
    /// Offsets of `LABEL` markers, the only legal jump destinations.
    jump_targets: HashSet<usize>,
    /// Instruction pointer (next byte to decode).
    ip: usize,
    /// Offset of the instruction being executed.
    pc: usize,
    stack: Stack,
    memory: Memory,
    calldata: CallData,
    config: VmConfig,
    /// Instructions executed so far.
    steps: u64,
    /// Stack depth recorded at each label on first arrival.
    label_depths: HashMap<usize, usize>,
    /// Set when the program halts.
    output: Option<Bytes>,
}

impl VM {
    /// Creates a new VM instance for one invocation of `program`.
    pub fn new(program: &Program, calldata: CallData, config: VmConfig) -> Self {
        Self {
            code: program.code.clone(),
            jump_targets: program.jump_targets(),
            ip: 0,
            pc: 0,
            stack: Stack::new(config.stack_limit),
            memory: Memory::new(config.memory_limit),
            calldata,
            config,
            steps: 0,
            label_depths: HashMap::new(),
            output: None,
        }
    }

    /// Executes the bytecode until it halts or fails.
    ///
    /// Returns the output designated by `RETURN`, or empty output for `STOP`
    /// and for running off the end of the code.
    pub fn run<S: State>(&mut self, state: &mut S) -> Result<Bytes, VMError> {
        while self.ip < self.code.len() {
            if let Some(limit) = self.config.step_limit {
                if self.steps >= limit {
                    return Err(VMError::StepLimitExceeded { limit });
                }
            }
            self.steps += 1;

            self.pc = self.ip;
            let opcode = self.code[self.pc];
            self.ip += 1;
            let instr = Instruction::try_from(opcode).map_err(|_| VMError::InvalidInstruction {
                opcode,
                offset: self.pc,
            })?;
            self.stack.require(instr.pops(), self.pc)?;
            self.exec(instr, state)?;

            if let Some(output) = self.output.take() {
                return Ok(output);
            }
        }
        Ok(Bytes::default())
    }

    /// Stack contents from bottom to top.
    pub fn stack(&self) -> &[Word] {
        self.stack.as_slice()
    }

    /// Current memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.memory.size()
    }

    /// Number of instructions executed.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Reads exactly `count` bytes from the bytecode at the current IP.
    ///
    /// Advances the instruction pointer by `count` bytes.
    fn read_exact(&mut self, count: usize) -> Result<&[u8], VMError> {
        let start = self.ip;
        let end = start + count;
        let available = self.code.len().saturating_sub(start);

        let slice = self
            .code
            .get(start..end)
            .ok_or(VMError::UnexpectedEndOfBytecode {
                ip: start,
                requested: count,
                available,
            })?;

        self.ip = end;
        Ok(slice)
    }

    /// Executes a single instruction.
    fn exec<S: State>(&mut self, instruction: Instruction, state: &mut S) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            state = state,
            instr = instruction,
            {
                Stop => op_stop(),
                // Arithmetic
                Add => binary(alu::add),
                Mul => binary(alu::mul),
                Sub => binary(alu::sub),
                Div => binary(alu::div),
                SDiv => binary(alu::sdiv),
                Mod => binary(alu::rem),
                SMod => binary(alu::smod),
                Exp => binary(alu::exp),
                // Comparison / bitwise
                Lt => binary(alu::lt),
                Gt => binary(alu::gt),
                SLt => binary(alu::slt),
                SGt => binary(alu::sgt),
                Eq => binary(alu::eq),
                IsZero => unary(alu::is_zero),
                And => binary(alu::and),
                Or => binary(alu::or),
                Xor => binary(alu::xor),
                Not => unary(alu::not),
                Byte => binary(alu::byte),
                Shl => binary(alu::shl),
                Shr => binary(alu::shr),
                Sar => binary(alu::sar),
                // Call data
                CallDataLoad => op_calldataload(),
                CallDataSize => op_calldatasize(),
                CallDataCopy => op_calldatacopy(),
                // Stack, memory and storage
                Pop => op_pop(),
                MLoad => op_mload(),
                MStore => op_mstore(),
                MStore8 => op_mstore8(),
                SLoad => op_sload(state),
                SStore => op_sstore(state),
                // Control flow
                Jump => op_jump(target: Label),
                JumpI => op_jumpi(target: Label),
                MSize => op_msize(),
                Label => op_label(),
                Push => op_push(value: Word),
                Dup => op_dup(n: U8),
                Swap => op_swap(n: U8),
                Return => op_return(),
            }
        }
    }

    fn pop(&mut self) -> Result<Word, VMError> {
        self.stack.pop(self.pc)
    }

    fn push(&mut self, value: Word) -> Result<(), VMError> {
        self.stack.push(value, self.pc)
    }

    fn binary(&mut self, f: fn(Word, Word) -> Word) -> Result<(), VMError> {
        let a = self.pop()?;
        let b = self.pop()?;
        self.push(f(a, b))
    }

    fn unary(&mut self, f: fn(Word) -> Word) -> Result<(), VMError> {
        let a = self.pop()?;
        self.push(f(a))
    }

    fn op_stop(&mut self) -> Result<(), VMError> {
        self.output = Some(Bytes::default());
        Ok(())
    }

    fn op_calldataload(&mut self) -> Result<(), VMError> {
        let offset = self.pop()?;
        let value = self.calldata.load(offset);
        self.push(value)
    }

    fn op_calldatasize(&mut self) -> Result<(), VMError> {
        self.push(Word::from(self.calldata.len()))
    }

    fn op_calldatacopy(&mut self) -> Result<(), VMError> {
        let mem_offset = self.pop()?;
        let data_offset = self.pop()?;
        let len = self.pop()?;
        let dst = self.memory.range_mut(mem_offset, len)?;
        self.calldata.copy_into(data_offset, dst);
        Ok(())
    }

    fn op_pop(&mut self) -> Result<(), VMError> {
        self.pop().map(|_| ())
    }

    fn op_mload(&mut self) -> Result<(), VMError> {
        let offset = self.pop()?;
        let value = self.memory.load(offset)?;
        self.push(value)
    }

    fn op_mstore(&mut self) -> Result<(), VMError> {
        let offset = self.pop()?;
        let value = self.pop()?;
        self.memory.store(offset, value)
    }

    fn op_mstore8(&mut self) -> Result<(), VMError> {
        let offset = self.pop()?;
        let value = self.pop()?;
        self.memory.store8(offset, value)
    }

    fn op_msize(&mut self) -> Result<(), VMError> {
        self.push(Word::from(self.memory.size()))
    }

    fn op_sload<S: State>(&mut self, state: &mut S) -> Result<(), VMError> {
        let key = self.pop()?;
        self.push(state.get(key).unwrap_or(Word::ZERO))
    }

    fn op_sstore<S: State>(&mut self, state: &mut S) -> Result<(), VMError> {
        let key = self.pop()?;
        let value = self.pop()?;
        if value.is_zero() {
            state.delete(key);
        } else {
            state.set(key, value);
        }
        Ok(())
    }

    fn jump_to(&mut self, target: usize) -> Result<(), VMError> {
        if !self.jump_targets.contains(&target) {
            return Err(VMError::InvalidJumpTarget {
                target,
                offset: self.pc,
            });
        }
        self.ip = target;
        Ok(())
    }

    fn op_jump(&mut self, target: usize) -> Result<(), VMError> {
        self.jump_to(target)
    }

    fn op_jumpi(&mut self, target: usize) -> Result<(), VMError> {
        let condition = self.pop()?;
        if condition.is_zero() {
            return Ok(());
        }
        self.jump_to(target)
    }

    fn op_label(&mut self) -> Result<(), VMError> {
        if !self.config.check_label_depth {
            return Ok(());
        }
        let depth = self.stack.depth();
        match self.label_depths.entry(self.pc) {
            Entry::Vacant(e) => {
                e.insert(depth);
            }
            Entry::Occupied(e) if *e.get() != depth => {
                return Err(VMError::StackInconsistency {
                    label: self.pc,
                    expected: *e.get(),
                    actual: depth,
                });
            }
            Entry::Occupied(_) => {}
        }
        Ok(())
    }

    fn op_push(&mut self, value: Word) -> Result<(), VMError> {
        self.push(value)
    }

    fn op_dup(&mut self, n: u8) -> Result<(), VMError> {
        self.stack.dup(n, self.pc)
    }

    fn op_swap(&mut self, n: u8) -> Result<(), VMError> {
        self.stack.swap(n, self.pc)
    }

    fn op_return(&mut self) -> Result<(), VMError> {
        let offset = self.pop()?;
        let len = self.pop()?;
        let output = self.memory.read(offset, len)?;
        self.output = Some(Bytes::from_vec(output));
        Ok(())
    }
}

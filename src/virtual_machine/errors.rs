use crate::types::encoding::DecodeError;
use contract_vm_derive::Error;

/// Errors raised while assembling, compiling, verifying or executing a program.
///
/// Every execution error is fatal to the invocation that raised it: no output
/// is produced and buffered storage writes are discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VMError {
    // =========================
    // Execution
    // =========================
    /// An operation needed more stack items than were present.
    #[error("stack underflow at offset {offset}: needed {needed}, had {depth}")]
    StackUnderflow {
        offset: usize,
        needed: usize,
        depth: usize,
    },
    /// A push would exceed the configured stack limit.
    #[error("stack overflow at offset {offset}: limit is {limit}")]
    StackOverflow { offset: usize, limit: usize },
    /// `DUP 0` / `SWAP 0` have no meaning.
    #[error("invalid stack operand {n} for {instruction} at offset {offset}")]
    InvalidStackOperand {
        instruction: &'static str,
        n: u8,
        offset: usize,
    },
    /// A jump targeted an offset that is not a `LABEL` marker.
    #[error("invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget { target: usize, offset: usize },
    /// Two control-flow edges reached a label with different stack depths.
    #[error("inconsistent stack at label {label}: expected depth {expected}, got {actual}")]
    StackInconsistency {
        label: usize,
        expected: usize,
        actual: usize,
    },
    /// Unknown opcode encountered in bytecode.
    #[error("invalid instruction 0x{opcode:02x} at offset {offset}")]
    InvalidInstruction { opcode: u8, offset: usize },
    /// Bytecode ended in the middle of an instruction's operands.
    #[error("unexpected end of bytecode at {ip}: requested {requested}, available {available}")]
    UnexpectedEndOfBytecode {
        ip: usize,
        requested: usize,
        available: usize,
    },
    /// A memory access would grow memory past the configured limit.
    #[error("memory access [{offset}, +{len}) exceeds limit of {limit} bytes")]
    MemoryLimitExceeded {
        offset: String,
        len: String,
        limit: usize,
    },
    /// The configured step budget ran out.
    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: u64 },

    // =========================
    // Assembly
    // =========================
    /// Assembly error with source location.
    #[error("line {line}:{offset}: {source}")]
    AssemblyError {
        line: usize,
        offset: usize,
        source: String,
    },
    /// Malformed token or syntax.
    #[error("line {line}:{offset}: {message}")]
    ParseError {
        line: usize,
        offset: usize,
        message: String,
    },
    /// Unrecognized instruction mnemonic.
    #[error("unknown instruction: {name}")]
    InvalidInstructionName { name: String },
    /// Wrong number of operands for an instruction.
    #[error("operand count mismatch for {instruction}: expected {expected}, got {actual}")]
    ArityMismatch {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    /// Operand token could not be parsed.
    #[error("invalid immediate {token}: expected {expected}")]
    InvalidImmediate {
        token: String,
        expected: &'static str,
    },
    /// Label defined more than once.
    #[error("duplicate label: {label}")]
    DuplicateLabel { label: String },
    /// Reference to an undefined label.
    #[error("undefined label: {label}")]
    UndefinedLabel { label: String },

    // =========================
    // Structured compiler
    // =========================
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },
    #[error("variable {name} is already declared in a visible scope")]
    DuplicateVariable { name: String },
    /// A variable sits deeper than `DUP`/`SWAP` can reach.
    #[error("stack too deep: variable {name} is {distance} slots below the top")]
    StackTooDeep { name: String, distance: usize },
    #[error("unknown function: {name}")]
    UnknownFunction { name: String },
    /// An expression produced a different number of values than its context needs.
    #[error("{context}: expected {expected} value(s), got {actual}")]
    ValueCountMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },
    /// `break` or `continue` used outside a `for` body.
    #[error("{keyword} outside of a loop")]
    ControlOutsideLoop { keyword: &'static str },

    // =========================
    // Storage layout
    // =========================
    #[error("unknown storage field: {name}")]
    UnknownField { name: String },
    #[error("duplicate storage field: {name}")]
    DuplicateField { name: String },
    #[error("storage field {name} overlaps {other}")]
    FieldOverlap { name: String, other: String },
    #[error("storage field {name} has invalid bounds: offset {offset}, width {width}")]
    InvalidFieldBounds {
        name: String,
        offset: usize,
        width: usize,
    },

    // =========================
    // Program I/O
    // =========================
    /// Failed to decode a serialized program.
    #[error("decoding error: {reason}")]
    DecodeError { reason: String },
    /// Codec-level failure.
    #[error("codec error: {0}")]
    Codec(#[from] DecodeError),
    /// File I/O error.
    #[error("io error on {path}: {source}")]
    IoError { path: String, source: String },
}

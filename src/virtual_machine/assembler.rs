//! Assembly language parser and bytecode linker.
//!
//! Converts human-readable assembly source into executable bytecode.
//! Uses [`for_each_instruction!`](for_each_instruction) to generate:
//! - [`AsmInstr`], the symbolic instruction form shared with the structured compiler
//! - `parse_instruction` for tokenized input parsing
//!
//! # Syntax
//!
//! ```text
//! label:                 # defines a jump destination (emits a LABEL marker)
//! INSTRUCTION operand    # optional comment
//! ```
//!
//! - Instructions are uppercase (e.g., `PUSH`, `CALLDATALOAD`)
//! - Word immediates are decimal or `0x` hex (e.g., `42`, `0xff`)
//! - `DUP` / `SWAP` take a depth between 1 and 255
//! - `JUMP` / `JUMPI` take a label name
//! - Comments start with `#`; commas between operands are optional

use crate::error;
use crate::for_each_instruction;
use crate::types::word::{self, Word};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::Program;
use std::collections::HashMap;
use std::fmt::{self, Write};
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';

/// Return the line/column/message triple for assembly-related errors.
fn assembly_error_location(err: &VMError) -> Option<(usize, usize, String)> {
    match err {
        VMError::AssemblyError {
            line,
            offset,
            source,
        } => Some((*line, *offset, source.clone())),
        VMError::ParseError {
            line,
            offset,
            message,
        } => Some((*line, *offset, message.clone())),
        _ => None,
    }
}

/// Formats a compiler-style diagnostic for a located error.
pub fn render_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    offset: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Logs a diagnostic for a failed assembly or compilation.
pub fn log_source_error(file: &str, source: &str, err: &VMError) {
    if let Some((line, offset, message)) = assembly_error_location(err) {
        error!("{}", render_diagnostic(file, source, line, offset, &message));
    } else {
        error!("{file}: {err}");
    }
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - `#` starts a comment
/// - commas are ignored
/// - whitespace-separated tokens
fn tokenize(line: &str) -> Vec<Token<'_>> {
    let code = line.split(COMMENT_CHAR).next().unwrap_or("");
    let mut out = Vec::with_capacity(4);
    let mut start: Option<usize> = None;

    for (i, c) in code.char_indices() {
        if c == ',' || c.is_whitespace() {
            if let Some(s) = start.take() {
                out.push(Token {
                    text: &code[s..i],
                    offset: s + 1,
                });
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push(Token {
            text: &code[s..],
            offset: s + 1,
        });
    }
    out
}

/// True for `[A-Za-z_.$][A-Za-z0-9_.$]*`.
pub(crate) fn is_label_ident(name: &str) -> bool {
    let mut chars = name.chars();
    let valid = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$');
    chars
        .next()
        .is_some_and(|c| valid(c) && !c.is_ascii_digit())
        && chars.all(valid)
}

/// Parse a word immediate (decimal or `0x` hex).
pub(crate) fn parse_word(tok: &str) -> Result<Word, VMError> {
    word::parse(tok).ok_or_else(|| VMError::InvalidImmediate {
        token: tok.to_string(),
        expected: "decimal or 0x-prefixed hex word",
    })
}

/// Parse a stack depth operand for `DUP` / `SWAP`.
pub(crate) fn parse_depth(tok: &str) -> Result<u8, VMError> {
    match tok.parse::<u8>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(VMError::InvalidImmediate {
            token: tok.to_string(),
            expected: "stack depth between 1 and 255",
        }),
    }
}

/// Parse a label reference.
pub(crate) fn parse_label_ref(tok: &str) -> Result<String, VMError> {
    if is_label_ident(tok) {
        Ok(tok.to_string())
    } else {
        Err(VMError::InvalidImmediate {
            token: tok.to_string(),
            expected: "label name",
        })
    }
}

macro_rules! define_parse_instruction {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $pops:expr, $pushes:expr
        ),* $(,)?
    ) => {

        // =========================
        // Assembler IR
        // =========================

        /// Symbolic instruction: jump operands name a label instead of an offset.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum AsmInstr {
            $(
                $(#[$doc])*
                $name {
                    $( $field: define_parse_instruction!(@ty $kind) ),*
                },
            )*
        }

        impl AsmInstr {
            /// The opcode this instruction encodes to.
            pub fn instruction(&self) -> Instruction {
                match self {
                    $( AsmInstr::$name { .. } => Instruction::$name, )*
                }
            }

            /// The symbolic form of an instruction that takes no operand.
            pub fn plain(instr: Instruction) -> Option<AsmInstr> {
                match instr {
                    $( Instruction::$name => define_parse_instruction!(@plain $name $( $field )*), )*
                }
            }

            /// Encodes the instruction into bytecode, resolving label operands.
            pub fn assemble(
                &self,
                labels: &HashMap<String, usize>,
                out: &mut Vec<u8>,
            ) -> Result<(), VMError> {
                match self {
                    $(
                        AsmInstr::$name { $( $field ),* } => {
                            out.push($opcode);
                            $(
                                define_parse_instruction!(@emit out, labels, $kind, $field);
                            )*
                        }
                    ),*
                }
                Ok(())
            }
        }

        impl fmt::Display for AsmInstr {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(
                        AsmInstr::$name { $( $field ),* } => {
                            f.write_str($mnemonic)?;
                            $( write!(f, " {}", $field)?; )*
                            Ok(())
                        }
                    ),*
                }
            }
        }

        /// Parse one instruction from tokens into [`AsmInstr`].
        fn parse_instruction(tokens: &[Token]) -> Result<AsmInstr, VMError> {
            let Some(head) = tokens.first() else {
                return Err(VMError::ArityMismatch {
                    instruction: "<missing opcode>".to_string(),
                    expected: 1,
                    actual: 0,
                });
            };

            let instr = Instruction::from_mnemonic(head.text).ok_or_else(|| {
                VMError::InvalidInstructionName {
                    name: head.text.to_string(),
                }
            })?;

            match instr {
                $(
                    Instruction::$name => {
                        const EXPECTED: usize = 1 + define_parse_instruction!(@count $( $field ),*);
                        if tokens.len() != EXPECTED {
                            return Err(VMError::ArityMismatch {
                                instruction: head.text.to_string(),
                                expected: EXPECTED - 1,
                                actual: tokens.len() - 1,
                            });
                        }

                        define_parse_instruction!(@construct tokens; $name $( $field : $kind ),*)
                    }
                ),*
            }
        }
    };

    // ---------- types ----------
    (@ty Word)  => { Word };
    (@ty U8)    => { u8 };
    (@ty Label) => { String };

    // ---------- counting ----------
    (@count $( $x:ident ),* ) => {
        <[()]>::len(&[ $( define_parse_instruction!(@unit $x) ),* ])
    };

    (@unit $x:ident) => { () };

    (@plain $name:ident) => { Some(AsmInstr::$name {}) };
    (@plain $name:ident $( $field:ident )+) => { None };

    // ---------- encoding ----------
    (@emit $out:ident, $labels:ident, Word, $v:ident) => {
        $out.extend_from_slice(&$v.to_be_bytes::<{ word::WORD_BYTES }>());
    };

    (@emit $out:ident, $labels:ident, U8, $v:ident) => {
        $out.push(*$v);
    };

    (@emit $out:ident, $labels:ident, Label, $v:ident) => {{
        let target = $labels
            .get($v.as_str())
            .copied()
            .ok_or_else(|| VMError::UndefinedLabel { label: $v.clone() })?;
        let target = u32::try_from(target).map_err(|_| VMError::InvalidImmediate {
            token: $v.clone(),
            expected: "label within the first 4 GiB of code",
        })?;
        $out.extend_from_slice(&target.to_le_bytes());
    }};

    // ---------- parsing ----------
    (@construct $tokens:ident; $name:ident) => {
        Ok(AsmInstr::$name { })
    };

    (@construct $tokens:ident; $name:ident $( $field:ident : $kind:ident ),+ ) => {{
        let mut it = $tokens.iter().skip(1).map(|t| t.text);
        Ok(AsmInstr::$name {
            $(
                $field: define_parse_instruction!(
                    @parse_operand $kind, it.next().unwrap_or_default()
                )?,
            )*
        })
    }};

    (@parse_operand Word, $tok:expr) => { parse_word($tok) };
    (@parse_operand U8, $tok:expr) => { parse_depth($tok) };
    (@parse_operand Label, $tok:expr) => { parse_label_ref($tok) };
}

for_each_instruction!(define_parse_instruction);

impl AsmInstr {
    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        self.instruction().size()
    }

    /// Label named by a jump operand.
    pub fn label_ref(&self) -> Option<&str> {
        match self {
            AsmInstr::Jump { target } | AsmInstr::JumpI { target } => Some(target),
            _ => None,
        }
    }

    pub fn push(value: Word) -> AsmInstr {
        AsmInstr::Push { value }
    }
}

/// One element of a symbolic program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Instr(AsmInstr),
    /// Defines a jump destination; assembles to a `LABEL` marker.
    Label(String),
}

impl Item {
    fn size(&self) -> usize {
        match self {
            Item::Instr(instr) => instr.size(),
            Item::Label(_) => Instruction::Label.size(),
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Instr(instr) => write!(f, "    {instr}"),
            Item::Label(name) => write!(f, "{name}{LABEL_SUFFIX}"),
        }
    }
}

/// Renders a symbolic program as assembly text.
pub fn render_items(items: &[Item]) -> String {
    let mut out = String::new();
    for item in items {
        let _ = writeln!(out, "{item}");
    }
    out
}

/// Resolves labels and emits bytecode for a symbolic program.
///
/// Pass 1 records the code offset of every label definition. Pass 2 encodes
/// the instructions with jump operands resolved to those offsets.
pub fn link(items: &[Item]) -> Result<Program, VMError> {
    link_located(items, |_| None)
}

/// [`link`] with errors attributed to a source position by item index.
fn link_located(
    items: &[Item],
    locate: impl Fn(usize) -> Option<(usize, usize)>,
) -> Result<Program, VMError> {
    let at = |index: usize, err: VMError| match locate(index) {
        Some((line, offset)) => VMError::AssemblyError {
            line,
            offset,
            source: err.to_string(),
        },
        None => err,
    };

    let mut labels = HashMap::new();
    let mut size = 0usize;
    for (index, item) in items.iter().enumerate() {
        if let Item::Label(name) = item {
            if labels.insert(name.clone(), size).is_some() {
                return Err(at(
                    index,
                    VMError::DuplicateLabel {
                        label: name.clone(),
                    },
                ));
            }
        }
        size += item.size();
    }

    let mut code = Vec::with_capacity(size);
    for (index, item) in items.iter().enumerate() {
        match item {
            Item::Instr(instr) => instr
                .assemble(&labels, &mut code)
                .map_err(|e| at(index, e))?,
            Item::Label(_) => code.push(Instruction::Label as u8),
        }
    }
    Ok(Program::new(code))
}

/// Parses assembly source into symbolic items with their (line, column).
fn parse_source(source: &str) -> Result<Vec<(Item, (usize, usize))>, VMError> {
    let mut items = Vec::new();

    for (line_no, line) in source.lines().enumerate() {
        let line_no = line_no + 1;
        let mut tokens = tokenize(line);

        if let Some(first) = tokens.first() {
            if let Some(name) = first.text.strip_suffix(LABEL_SUFFIX) {
                if !is_label_ident(name) {
                    return Err(VMError::ParseError {
                        line: line_no,
                        offset: first.offset,
                        message: format!("invalid label name `{name}`"),
                    });
                }
                items.push((Item::Label(name.to_string()), (line_no, first.offset)));
                tokens.remove(0);
            }
        }

        if let Some(first) = tokens.first() {
            let instr = parse_instruction(&tokens).map_err(|e| VMError::AssemblyError {
                line: line_no,
                offset: first.offset,
                source: e.to_string(),
            })?;
            items.push((Item::Instr(instr), (line_no, first.offset)));
        }
    }

    Ok(items)
}

/// Assemble a full source string into bytecode.
///
/// Uses two-pass assembly:
/// 1. First pass: tokenize lines, record label positions
/// 2. Second pass: emit bytecode with label resolution
pub fn assemble_source(source: impl AsRef<str>) -> Result<Program, VMError> {
    assemble_source_with_name(source.as_ref(), "<source>")
}

/// Assembles source with an associated filename for error diagnostics.
///
/// Logs a compiler-style diagnostic on failure, including source location
/// information.
pub fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Program, VMError> {
    let result = parse_source(source).and_then(|located| {
        let (items, spans): (Vec<Item>, Vec<(usize, usize)>) = located.into_iter().unzip();
        link_located(&items, |i| spans.get(i).copied())
    });

    if let Err(err) = &result {
        log_source_error(source_name, source, err);
    }
    result
}

/// Convenience: assemble directly from file path
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Program, VMError> {
    let path_ref = path.as_ref();
    let source = read_source(path_ref)?;
    assemble_source_with_name(&source, &path_ref.display().to_string())
}

/// Reads a source file, mapping failures to [`VMError::IoError`].
pub fn read_source(path: &Path) -> Result<String, VMError> {
    fs::read_to_string(path).map_err(|e| VMError::IoError {
        path: path.display().to_string(),
        source: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::word;

    #[test]
    fn tokenize_ignores_commas_and_comments() {
        let tokens = tokenize("  SWAP 1, # swap");
        let texts: Vec<_> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["SWAP", "1"]);
        assert_eq!(tokens[0].offset, 3);
    }

    #[test]
    fn assemble_empty_source() {
        let program = assemble_source("").unwrap();
        assert!(program.code.is_empty());
    }

    #[test]
    fn assemble_comments_and_blank_lines() {
        let source = format!(
            r#"
            {COMMENT_CHAR} this is a comment

            {COMMENT_CHAR} another comment
        "#
        );
        let program = assemble_source(source).unwrap();
        assert!(program.code.is_empty());
    }

    #[test]
    fn assemble_push_encodes_big_endian_word() {
        let program = assemble_source("PUSH 0x0102 # two bytes").unwrap();
        assert_eq!(program.code.len(), 33);
        assert_eq!(program.code[0], Instruction::Push as u8);
        assert_eq!(&program.code[31..], &[0x01, 0x02]);
    }

    #[test]
    fn assemble_label_and_jump() {
        let program = assemble_source("top: PUSH 1\nJUMPI top").unwrap();
        assert_eq!(program.code[0], Instruction::Label as u8);
        assert_eq!(program.code[34], Instruction::JumpI as u8);
        assert_eq!(&program.code[35..39], &0u32.to_le_bytes());
    }

    #[test]
    fn forward_references_resolve() {
        let program = assemble_source("JUMP end\nSTOP\nend:").unwrap();
        assert_eq!(&program.code[1..5], &6u32.to_le_bytes());
        assert_eq!(program.code[6], Instruction::Label as u8);
    }

    #[test]
    fn assemble_invalid_instruction() {
        let err = assemble_source("INVALID 1").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { line: 1, offset: 1, ref source } if source.contains("unknown instruction")
        ));
    }

    #[test]
    fn assemble_wrong_arity() {
        let err = assemble_source("\nADD 1").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { line: 2, ref source, .. } if source.contains("operand count mismatch")
        ));
    }

    #[test]
    fn assemble_rejects_bad_immediates() {
        assert!(assemble_source("PUSH -1").is_err());
        assert!(assemble_source("DUP 0").is_err());
        assert!(assemble_source("SWAP 256").is_err());
        assert!(assemble_source("JUMP 12").is_err());
    }

    #[test]
    fn duplicate_label_is_reported_at_definition() {
        let err = assemble_source("a:\nPUSH 1\n  a:").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { line: 3, offset: 3, ref source } if source.contains("duplicate label")
        ));
    }

    #[test]
    fn undefined_label_is_reported_at_use() {
        let err = assemble_source("PUSH 1\nJUMP nowhere").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { line: 2, ref source, .. } if source.contains("undefined label: nowhere")
        ));
    }

    #[test]
    fn invalid_label_name() {
        assert!(matches!(
            assemble_source("1abc:").unwrap_err(),
            VMError::ParseError { line: 1, .. }
        ));
    }

    #[test]
    fn link_symbolic_items() {
        let items = vec![
            Item::Label("start".to_string()),
            Item::Instr(AsmInstr::push(word(1))),
            Item::Instr(AsmInstr::JumpI {
                target: "start".to_string(),
            }),
        ];
        let program = link(&items).unwrap();
        assert_eq!(program.code.len(), 1 + 33 + 5);
        assert_eq!(
            link(&[Item::Instr(AsmInstr::Jump {
                target: "x".to_string()
            })]),
            Err(VMError::UndefinedLabel {
                label: "x".to_string()
            })
        );
    }

    #[test]
    fn rendered_items_reassemble() {
        let items = vec![
            Item::Instr(AsmInstr::push(word(5))),
            Item::Label("l".to_string()),
            Item::Instr(AsmInstr::Dup { n: 1 }),
            Item::Instr(AsmInstr::plain(Instruction::Pop).unwrap()),
        ];
        let text = render_items(&items);
        assert_eq!(text, "    PUSH 5\nl:\n    DUP 1\n    POP\n");
        assert_eq!(assemble_source(&text).unwrap(), link(&items).unwrap());
    }

    #[test]
    fn plain_only_for_operandless_instructions() {
        assert_eq!(
            AsmInstr::plain(Instruction::Add),
            Some(AsmInstr::Add {})
        );
        assert_eq!(AsmInstr::plain(Instruction::Push), None);
        assert_eq!(AsmInstr::plain(Instruction::Jump), None);
    }

    #[test]
    fn assemble_file_missing() {
        assert!(matches!(
            assemble_file("/definitely/not/here.asm"),
            Err(VMError::IoError { .. })
        ));
    }
}

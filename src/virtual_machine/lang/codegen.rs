//! Lowering of the statement tree to symbolic assembly.
//!
//! Every local variable owns one stack slot, numbered from the bottom of the
//! frame. The compiler tracks the stack height at each point of the program,
//! so a read of slot `p` is `DUP (height - p)` and a write is
//! `SWAP (height - 1 - p)` followed by `POP`. Blocks pop their locals on
//! exit, and `break` / `continue` pop down to the loop's height before
//! jumping. Every label is therefore reached with the same height from every
//! edge.

use super::parser::{Block, Expr, Stmt};
use crate::types::word::Word;
use crate::virtual_machine::assembler::{AsmInstr, Item};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::layout::StorageLayout;

/// Largest distance reachable by `DUP` / `SWAP`.
const MAX_REACH: usize = u8::MAX as usize;

struct Local {
    name: String,
    slot: usize,
}

struct LoopTarget {
    break_label: String,
    continue_label: String,
    /// Stack height at loop entry; jumps out of the body unwind to it.
    height: usize,
}

/// Compiles statements into a symbolic program.
pub struct Compiler<'a> {
    layout: Option<&'a StorageLayout>,
    items: Vec<Item>,
    locals: Vec<Local>,
    height: usize,
    loops: Vec<LoopTarget>,
    next_label: usize,
}

impl<'a> Compiler<'a> {
    pub fn new(layout: Option<&'a StorageLayout>) -> Self {
        Self {
            layout,
            items: Vec::new(),
            locals: Vec::new(),
            height: 0,
            loops: Vec::new(),
            next_label: 0,
        }
    }

    /// Compiles top-level statements as one block.
    pub fn compile(mut self, stmts: &[Stmt]) -> Result<Vec<Item>, VMError> {
        self.block(stmts)?;
        Ok(self.items)
    }

    fn emit(&mut self, instr: AsmInstr) {
        let op = instr.instruction();
        self.height = self.height - op.pops() + op.pushes();
        self.items.push(Item::Instr(instr));
    }

    fn fresh_label(&mut self, hint: &str) -> String {
        let label = format!(".L{}_{hint}", self.next_label);
        self.next_label += 1;
        label
    }

    fn place_label(&mut self, label: &str) {
        self.items.push(Item::Label(label.to_string()));
    }

    fn jump(&mut self, label: &str) {
        self.emit(AsmInstr::Jump {
            target: label.to_string(),
        });
    }

    fn jump_if(&mut self, label: &str) {
        self.emit(AsmInstr::JumpI {
            target: label.to_string(),
        });
    }

    fn pop_to(&mut self, height: usize) {
        while self.height > height {
            self.emit(AsmInstr::Pop {});
        }
    }

    fn lookup(&self, name: &str) -> Result<usize, VMError> {
        self.locals
            .iter()
            .rev()
            .find(|l| l.name == name)
            .map(|l| l.slot)
            .ok_or_else(|| VMError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    fn reach(name: &str, distance: usize) -> Result<u8, VMError> {
        if distance == 0 || distance > MAX_REACH {
            return Err(VMError::StackTooDeep {
                name: name.to_string(),
                distance,
            });
        }
        Ok(distance as u8)
    }

    /// Runs `body` in a new scope and pops whatever it left on the stack.
    fn scoped(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<(), VMError>,
    ) -> Result<(), VMError> {
        let height = self.height;
        let locals = self.locals.len();
        body(self)?;
        self.pop_to(height);
        self.locals.truncate(locals);
        Ok(())
    }

    fn block(&mut self, stmts: &[Stmt]) -> Result<(), VMError> {
        self.scoped(|c| c.statements(stmts))
    }

    fn statements(&mut self, stmts: &[Stmt]) -> Result<(), VMError> {
        stmts.iter().try_for_each(|s| self.statement(s))
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), VMError> {
        match stmt {
            Stmt::Let { name, value } => {
                if self.locals.iter().any(|l| l.name == *name) {
                    return Err(VMError::DuplicateVariable { name: name.clone() });
                }
                match value {
                    Some(expr) => self.single_value(expr, || format!("initializer of `{name}`"))?,
                    None => self.emit(AsmInstr::push(Word::ZERO)),
                }
                self.locals.push(Local {
                    name: name.clone(),
                    slot: self.height - 1,
                });
            }
            Stmt::Assign { name, value } => {
                let slot = self.lookup(name)?;
                self.single_value(value, || format!("assignment to `{name}`"))?;
                let n = Self::reach(name, self.height - 1 - slot)?;
                self.emit(AsmInstr::Swap { n });
                self.emit(AsmInstr::Pop {});
            }
            Stmt::If { cond, body } => {
                let end = self.fresh_label("endif");
                self.single_value(cond, || "if condition".to_string())?;
                self.emit(AsmInstr::IsZero {});
                self.jump_if(&end);
                self.block(body)?;
                self.place_label(&end);
            }
            Stmt::For {
                init,
                cond,
                post,
                body,
            } => self.for_loop(init, cond, post, body)?,
            Stmt::Break => {
                let target = self.loops.last().ok_or(VMError::ControlOutsideLoop {
                    keyword: "break",
                })?;
                let (label, height) = (target.break_label.clone(), target.height);
                self.unwind_and_jump(height, &label);
            }
            Stmt::Continue => {
                let target = self.loops.last().ok_or(VMError::ControlOutsideLoop {
                    keyword: "continue",
                })?;
                let (label, height) = (target.continue_label.clone(), target.height);
                self.unwind_and_jump(height, &label);
            }
            Stmt::Switch {
                scrutinee,
                cases,
                default,
            } => self.switch(scrutinee, cases, default.as_deref())?,
            Stmt::Block(stmts) => self.block(stmts)?,
            Stmt::Expr(expr) => {
                let produced = self.expr(expr)?;
                if produced != 0 {
                    return Err(VMError::ValueCountMismatch {
                        context: "expression statement".to_string(),
                        expected: 0,
                        actual: produced,
                    });
                }
            }
        }
        Ok(())
    }

    /// Emits the pops and jump that leave a loop body, then restores the
    /// height tracked for the (unreachable) code that follows.
    fn unwind_and_jump(&mut self, height: usize, label: &str) {
        let current = self.height;
        self.pop_to(height);
        self.jump(label);
        self.height = current;
    }

    fn for_loop(
        &mut self,
        init: &[Stmt],
        cond: &Expr,
        post: &[Stmt],
        body: &[Stmt],
    ) -> Result<(), VMError> {
        self.scoped(|c| {
            c.statements(init)?;
            let start = c.fresh_label("loop");
            let next = c.fresh_label("next");
            let end = c.fresh_label("endloop");

            c.place_label(&start);
            c.single_value(cond, || "loop condition".to_string())?;
            c.emit(AsmInstr::IsZero {});
            c.jump_if(&end);

            c.loops.push(LoopTarget {
                break_label: end.clone(),
                continue_label: next.clone(),
                height: c.height,
            });
            let result = c.block(body);
            c.loops.pop();
            result?;

            c.place_label(&next);
            c.block(post)?;
            c.jump(&start);
            c.place_label(&end);
            Ok(())
        })
    }

    fn switch(
        &mut self,
        scrutinee: &Expr,
        cases: &[(Word, Block)],
        default: Option<&[Stmt]>,
    ) -> Result<(), VMError> {
        self.single_value(scrutinee, || "switch expression".to_string())?;
        let end = self.fresh_label("endswitch");
        let labels: Vec<String> = cases.iter().map(|_| self.fresh_label("case")).collect();

        for ((value, _), label) in cases.iter().zip(&labels) {
            self.emit(AsmInstr::Dup { n: 1 });
            self.emit(AsmInstr::push(*value));
            self.emit(AsmInstr::Eq {});
            self.jump_if(label);
        }

        // No case matched.
        self.emit(AsmInstr::Pop {});
        if let Some(body) = default {
            self.block(body)?;
        }
        self.jump(&end);

        for ((_, body), label) in cases.iter().zip(&labels) {
            // Each case starts with the scrutinee still on the stack.
            self.height += 1;
            self.place_label(label);
            self.emit(AsmInstr::Pop {});
            self.block(body)?;
            self.jump(&end);
        }
        self.place_label(&end);
        Ok(())
    }

    fn single_value(
        &mut self,
        expr: &Expr,
        context: impl FnOnce() -> String,
    ) -> Result<(), VMError> {
        let produced = self.expr(expr)?;
        if produced != 1 {
            return Err(VMError::ValueCountMismatch {
                context: context(),
                expected: 1,
                actual: produced,
            });
        }
        Ok(())
    }

    /// Emits code for `expr` and returns the number of values it pushes.
    fn expr(&mut self, expr: &Expr) -> Result<usize, VMError> {
        match expr {
            Expr::Literal(value) => {
                self.emit(AsmInstr::push(*value));
                Ok(1)
            }
            Expr::Var(name) => {
                let slot = self.lookup(name)?;
                let n = Self::reach(name, self.height - slot)?;
                self.emit(AsmInstr::Dup { n });
                Ok(1)
            }
            Expr::Call { name, args } => self.call(name, args),
        }
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> Result<usize, VMError> {
        match (name, self.layout) {
            ("sget", Some(layout)) => {
                let [field] = args else {
                    return Err(Self::arity(name, 1, args.len()));
                };
                for instr in layout.emit_load(field_name(field)?)? {
                    self.emit(instr);
                }
                return Ok(1);
            }
            ("sset", Some(layout)) => {
                let [field, value] = args else {
                    return Err(Self::arity(name, 2, args.len()));
                };
                let code = layout.emit_store(field_name(field)?)?;
                self.single_value(value, || format!("argument 2 of `{name}`"))?;
                for instr in code {
                    self.emit(instr);
                }
                return Ok(0);
            }
            _ => {}
        }

        let instr = builtin(name).ok_or_else(|| VMError::UnknownFunction {
            name: name.to_string(),
        })?;
        if args.len() != instr.instruction().pops() {
            return Err(Self::arity(name, instr.instruction().pops(), args.len()));
        }

        // Last argument first, so the first argument ends on top.
        for (index, arg) in args.iter().enumerate().rev() {
            self.single_value(arg, || format!("argument {} of `{name}`", index + 1))?;
        }
        let pushes = instr.instruction().pushes();
        self.emit(instr);
        Ok(pushes)
    }

    fn arity(name: &str, expected: usize, actual: usize) -> VMError {
        VMError::ValueCountMismatch {
            context: format!("arguments of `{name}`"),
            expected,
            actual,
        }
    }
}

/// Storage builtins name their field with a bare identifier.
fn field_name(expr: &Expr) -> Result<&str, VMError> {
    match expr {
        Expr::Var(name) => Ok(name),
        Expr::Literal(value) => Err(VMError::UnknownField {
            name: value.to_string(),
        }),
        Expr::Call { name, .. } => Err(VMError::UnknownField {
            name: format!("{name}(..)"),
        }),
    }
}

/// Instruction callable by its lowercase mnemonic. Stack shuffles, jumps and
/// labels are not exposed.
fn builtin(name: &str) -> Option<AsmInstr> {
    if name.bytes().any(|b| b.is_ascii_uppercase()) {
        return None;
    }
    let instr = Instruction::from_mnemonic(&name.to_ascii_uppercase())?;
    if instr == Instruction::Label {
        return None;
    }
    AsmInstr::plain(instr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::assembler::render_items;
    use crate::virtual_machine::lang::parser::parse;

    fn compile(source: &str) -> Result<Vec<Item>, VMError> {
        Compiler::new(None).compile(&parse(source).unwrap())
    }

    fn asm(source: &str) -> String {
        render_items(&compile(source).unwrap())
    }

    #[test]
    fn locals_resolve_to_dup_and_swap_distances() {
        let text = asm("let a := 1\nlet b := 2\na := b");
        assert_eq!(
            text,
            "    PUSH 1\n    PUSH 2\n    DUP 1\n    SWAP 2\n    POP\n    POP\n    POP\n"
        );
    }

    #[test]
    fn arguments_are_evaluated_last_first() {
        let text = asm("let x := sub(10, 3)");
        assert!(text.starts_with("    PUSH 3\n    PUSH 10\n    SUB\n"));
    }

    #[test]
    fn builtins_exclude_stack_and_jump_instructions() {
        for name in ["dup", "swap", "push", "jump", "jumpi", "label", "ADD"] {
            assert_eq!(
                compile(&format!("{name}()")),
                Err(VMError::UnknownFunction {
                    name: name.to_string()
                })
            );
        }
        assert!(builtin("pop").is_some());
        assert!(builtin("stop").is_some());
    }

    #[test]
    fn variable_errors() {
        assert_eq!(
            compile("x := 1"),
            Err(VMError::UndefinedVariable {
                name: "x".to_string()
            })
        );
        assert_eq!(
            compile("let x := 1\n{ let x := 2 }"),
            Err(VMError::DuplicateVariable {
                name: "x".to_string()
            })
        );
        // Scopes end, so the name is free again.
        assert!(compile("{ let x := 1 }\nlet x := 2").is_ok());
    }

    #[test]
    fn value_count_errors() {
        assert!(matches!(
            compile("add(1, 2)"),
            Err(VMError::ValueCountMismatch {
                expected: 0,
                actual: 1,
                ..
            })
        ));
        assert!(matches!(
            compile("let x := mstore(0, 1)"),
            Err(VMError::ValueCountMismatch {
                expected: 1,
                actual: 0,
                ..
            })
        ));
        assert!(matches!(
            compile("let x := add(1)"),
            Err(VMError::ValueCountMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn control_outside_loop() {
        assert_eq!(
            compile("break"),
            Err(VMError::ControlOutsideLoop { keyword: "break" })
        );
        assert_eq!(
            compile("if 1 { continue }"),
            Err(VMError::ControlOutsideLoop {
                keyword: "continue"
            })
        );
    }

    #[test]
    fn slots_beyond_reach_are_too_deep() {
        let mut source = String::from("let first := 0\n");
        for i in 0..255 {
            source.push_str(&format!("let v{i} := 0\n"));
        }
        source.push_str("let last := first");
        assert_eq!(
            compile(&source),
            Err(VMError::StackTooDeep {
                name: "first".to_string(),
                distance: 256
            })
        );
    }

    #[test]
    fn storage_builtins_need_a_layout() {
        assert_eq!(
            compile("let x := sget(owner)"),
            Err(VMError::UnknownFunction {
                name: "sget".to_string()
            })
        );
        let layout = StorageLayout::pack_sequential([("owner", 160)]).unwrap();
        let stmts = parse("sset(nobody, 1)").unwrap();
        assert_eq!(
            Compiler::new(Some(&layout)).compile(&stmts),
            Err(VMError::UnknownField {
                name: "nobody".to_string()
            })
        );
    }
}

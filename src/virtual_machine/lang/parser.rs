//! Recursive-descent parser producing the statement tree.

use super::lexer::{Token, TokenKind, tokenize};
use crate::types::word::{Word, from_bool};
use crate::virtual_machine::errors::VMError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Literal(Word),
    Var(String),
    Call { name: String, args: Vec<Expr> },
}

pub type Block = Vec<Stmt>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    /// `let x` (zero) or `let x := e`.
    Let { name: String, value: Option<Expr> },
    Assign { name: String, value: Expr },
    If { cond: Expr, body: Block },
    For {
        init: Block,
        cond: Expr,
        post: Block,
        body: Block,
    },
    Break,
    Continue,
    Switch {
        scrutinee: Expr,
        cases: Vec<(Word, Block)>,
        default: Option<Block>,
    },
    Block(Block),
    Expr(Expr),
}

/// Parses a whole source file into its top-level statements.
pub fn parse(source: &str) -> Result<Block, VMError> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        pos: 0,
    };
    let mut stmts = Vec::new();
    while parser.peek() != &TokenKind::Eof {
        stmts.push(parser.statement()?);
    }
    Ok(stmts)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        // The token list always ends with Eof and `next` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_second(&self) -> &TokenKind {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn next(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if kind != TokenKind::Eof {
            self.pos += 1;
        }
        kind
    }

    fn error(&self, message: impl Into<String>) -> VMError {
        let tok = self.current();
        VMError::ParseError {
            line: tok.line,
            offset: tok.col,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), VMError> {
        if *self.peek() != kind {
            return Err(self.error(format!("expected {kind}, found {}", self.peek())));
        }
        self.next();
        Ok(())
    }

    fn ident(&mut self) -> Result<String, VMError> {
        if let TokenKind::Ident(name) = self.peek() {
            let name = name.clone();
            self.next();
            return Ok(name);
        }
        Err(self.error(format!("expected identifier, found {}", self.peek())))
    }

    fn block(&mut self) -> Result<Block, VMError> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while *self.peek() != TokenKind::RBrace {
            if *self.peek() == TokenKind::Eof {
                return Err(self.error("unclosed block, expected `}`"));
            }
            stmts.push(self.statement()?);
        }
        self.next();
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, VMError> {
        match self.peek() {
            TokenKind::LBrace => Ok(Stmt::Block(self.block()?)),
            TokenKind::Let => {
                self.next();
                let name = self.ident()?;
                let value = if *self.peek() == TokenKind::Assign {
                    self.next();
                    Some(self.expr()?)
                } else {
                    None
                };
                Ok(Stmt::Let { name, value })
            }
            TokenKind::If => {
                self.next();
                let cond = self.expr()?;
                let body = self.block()?;
                Ok(Stmt::If { cond, body })
            }
            TokenKind::For => {
                self.next();
                let init = self.block()?;
                let cond = self.expr()?;
                let post = self.block()?;
                let body = self.block()?;
                Ok(Stmt::For {
                    init,
                    cond,
                    post,
                    body,
                })
            }
            TokenKind::Break => {
                self.next();
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.next();
                Ok(Stmt::Continue)
            }
            TokenKind::Switch => self.switch(),
            TokenKind::Ident(_) if *self.peek_second() == TokenKind::Assign => {
                let name = self.ident()?;
                self.next();
                let value = self.expr()?;
                Ok(Stmt::Assign { name, value })
            }
            _ => Ok(Stmt::Expr(self.expr()?)),
        }
    }

    fn switch(&mut self) -> Result<Stmt, VMError> {
        self.expect(TokenKind::Switch)?;
        let scrutinee = self.expr()?;
        let mut cases: Vec<(Word, Block)> = Vec::new();
        while *self.peek() == TokenKind::Case {
            self.next();
            let value = match self.peek() {
                TokenKind::Number(n) => *n,
                TokenKind::True => from_bool(true),
                TokenKind::False => from_bool(false),
                other => return Err(self.error(format!("expected case literal, found {other}"))),
            };
            if cases.iter().any(|(v, _)| *v == value) {
                return Err(self.error(format!("duplicate case `{value}`")));
            }
            self.next();
            cases.push((value, self.block()?));
        }
        let default = if *self.peek() == TokenKind::Default {
            self.next();
            Some(self.block()?)
        } else {
            None
        };
        if cases.is_empty() && default.is_none() {
            return Err(self.error("switch needs at least one `case` or `default`"));
        }
        Ok(Stmt::Switch {
            scrutinee,
            cases,
            default,
        })
    }

    fn expr(&mut self) -> Result<Expr, VMError> {
        match self.peek() {
            TokenKind::Number(n) => {
                let n = *n;
                self.next();
                Ok(Expr::Literal(n))
            }
            TokenKind::True | TokenKind::False => {
                let value = from_bool(self.next() == TokenKind::True);
                Ok(Expr::Literal(value))
            }
            TokenKind::Ident(_) => {
                let name = self.ident()?;
                if *self.peek() != TokenKind::LParen {
                    return Ok(Expr::Var(name));
                }
                self.next();
                let mut args = Vec::new();
                if *self.peek() != TokenKind::RParen {
                    loop {
                        args.push(self.expr()?);
                        if *self.peek() != TokenKind::Comma {
                            break;
                        }
                        self.next();
                    }
                }
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Call { name, args })
            }
            other => Err(self.error(format!("expected expression, found {other}"))),
        }
    }
}

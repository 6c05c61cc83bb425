//! Tokenizer for structured sources.

use crate::types::word::{self, Word};
use crate::virtual_machine::errors::VMError;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Number(Word),
    Let,
    If,
    For,
    Break,
    Continue,
    Switch,
    Case,
    Default,
    True,
    False,
    /// `:=`
    Assign,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Ident(name) => return write!(f, "`{name}`"),
            TokenKind::Number(n) => return write!(f, "`{n}`"),
            TokenKind::Let => "`let`",
            TokenKind::If => "`if`",
            TokenKind::For => "`for`",
            TokenKind::Break => "`break`",
            TokenKind::Continue => "`continue`",
            TokenKind::Switch => "`switch`",
            TokenKind::Case => "`case`",
            TokenKind::Default => "`default`",
            TokenKind::True => "`true`",
            TokenKind::False => "`false`",
            TokenKind::Assign => "`:=`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::Comma => "`,`",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}

/// A token with its 1-based source position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub col: usize,
}

fn keyword(ident: &str) -> Option<TokenKind> {
    Some(match ident {
        "let" => TokenKind::Let,
        "if" => TokenKind::If,
        "for" => TokenKind::For,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => return None,
    })
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.')
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    col: usize,
}

impl Cursor<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek().filter(|&c| pred(c)) {
            out.push(c);
            self.bump();
        }
        out
    }

    fn error(&self, line: usize, col: usize, message: impl Into<String>) -> VMError {
        VMError::ParseError {
            line,
            offset: col,
            message: message.into(),
        }
    }
}

/// Splits `source` into tokens, ending with [`TokenKind::Eof`].
///
/// Skips whitespace, `// line` comments and `/* block */` comments.
pub fn tokenize(source: &str) -> Result<Vec<Token>, VMError> {
    let mut cur = Cursor {
        chars: source.chars().peekable(),
        line: 1,
        col: 1,
    };
    let mut tokens = Vec::new();

    loop {
        let (line, col) = (cur.line, cur.col);
        let Some(c) = cur.peek() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                line,
                col,
            });
            return Ok(tokens);
        };

        let kind = match c {
            c if c.is_whitespace() => {
                cur.bump();
                continue;
            }
            '/' => {
                cur.bump();
                match cur.bump() {
                    Some('/') => {
                        cur.take_while(|c| c != '\n');
                    }
                    Some('*') => {
                        let mut prev = '\0';
                        loop {
                            match cur.bump() {
                                Some('/') if prev == '*' => break,
                                Some(c) => prev = c,
                                None => {
                                    return Err(cur.error(line, col, "unterminated block comment"));
                                }
                            }
                        }
                    }
                    _ => return Err(cur.error(line, col, "unexpected character `/`")),
                }
                continue;
            }
            ':' => {
                cur.bump();
                if cur.bump() != Some('=') {
                    return Err(cur.error(line, col, "expected `:=`"));
                }
                TokenKind::Assign
            }
            '{' | '}' | '(' | ')' | ',' => {
                cur.bump();
                match c {
                    '{' => TokenKind::LBrace,
                    '}' => TokenKind::RBrace,
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    _ => TokenKind::Comma,
                }
            }
            c if c.is_ascii_digit() => {
                let literal = cur.take_while(|c| c.is_ascii_alphanumeric());
                let value = word::parse(&literal).ok_or_else(|| {
                    cur.error(line, col, format!("invalid number literal `{literal}`"))
                })?;
                TokenKind::Number(value)
            }
            c if is_ident_start(c) => {
                let ident = cur.take_while(is_ident_char);
                keyword(&ident).unwrap_or(TokenKind::Ident(ident))
            }
            other => return Err(cur.error(line, col, format!("unexpected character `{other}`"))),
        };
        tokens.push(Token { kind, line, col });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_statements_and_literals() {
        assert_eq!(
            kinds("let x := add(0x10, 2)"),
            vec![
                TokenKind::Let,
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::Ident("add".into()),
                TokenKind::LParen,
                TokenKind::Number(Word::from(16u64)),
                TokenKind::Comma,
                TokenKind::Number(Word::from(2u64)),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_comments_and_tracks_positions() {
        let tokens = tokenize("// header\n  /* multi\nline */ if true {}").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::If);
        assert_eq!((tokens[0].line, tokens[0].col), (3, 9));
        assert_eq!(tokens[1].kind, TokenKind::True);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            tokenize("let x : 1"),
            Err(VMError::ParseError { line: 1, offset: 7, .. })
        ));
        assert!(matches!(
            tokenize("12ab"),
            Err(VMError::ParseError { offset: 1, .. })
        ));
        assert!(matches!(
            tokenize("/* open"),
            Err(VMError::ParseError { .. })
        ));
        assert!(matches!(
            tokenize("x @ y"),
            Err(VMError::ParseError { offset: 3, .. })
        ));
    }
}

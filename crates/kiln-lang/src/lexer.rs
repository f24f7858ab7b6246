//! Tokenizer for the Java subset

use crate::diagnostics::{CompileError, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Class,
    Public,
    Private,
    Protected,
    Static,
    Final,
    Void,
    Int,
    Boolean,
    If,
    Else,
    While,
    Do,
    For,
    Return,
    Break,
    Continue,
    True,
    False,
    Null,
    New,
    Throw,
    Import,
    Package,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Keyword> {
        Some(match word {
            "class" => Keyword::Class,
            "public" => Keyword::Public,
            "private" => Keyword::Private,
            "protected" => Keyword::Protected,
            "static" => Keyword::Static,
            "final" => Keyword::Final,
            "void" => Keyword::Void,
            "int" => Keyword::Int,
            "boolean" => Keyword::Boolean,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "do" => Keyword::Do,
            "for" => Keyword::For,
            "return" => Keyword::Return,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "null" => Keyword::Null,
            "new" => Keyword::New,
            "throw" => Keyword::Throw,
            "import" => Keyword::Import,
            "package" => Keyword::Package,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Keyword(Keyword),
    Int(u64),
    Str(String),
    Op(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}

// Longest first so that `+=` wins over `+`
const OPERATORS: &[&str] = &[
    "++", "--", "+=", "-=", "*=", "/=", "%=", "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*",
    "/", "%", "<", ">", "=", "!", "(", ")", "{", "}", "[", "]", ";", ",", ".", "?", ":",
];

struct Lexer<'a> {
    unit: &'a str,
    chars: Vec<char>,
    idx: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.idx + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.idx).copied()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn error(&self, pos: Position, message: impl Into<String>) -> CompileError {
        CompileError::new(self.unit, pos, message)
    }

    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => return Err(self.error(start, "unclosed comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn string(&mut self, start: Position) -> Result<TokenKind, CompileError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error(start, "unclosed string literal")),
                Some('"') => return Ok(TokenKind::Str(out)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some('\\') => '\\',
                        _ => return Err(self.error(self.pos(), "illegal escape character")),
                    };
                    out.push(escaped);
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, CompileError> {
        self.skip_trivia()?;
        let pos = self.pos();
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                pos,
            });
        };

        let kind = if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            let mut word = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                    word.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            match Keyword::lookup(&word) {
                Some(kw) => TokenKind::Keyword(kw),
                None => TokenKind::Ident(word),
            }
        } else if c.is_ascii_digit() {
            let mut value: u64 = 0;
            while let Some(d) = self.peek().and_then(|c| c.to_digit(10)) {
                value = value.saturating_mul(10).saturating_add(u64::from(d));
                self.bump();
            }
            if self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
                return Err(self.error(pos, "malformed number literal"));
            }
            TokenKind::Int(value)
        } else if c == '"' {
            self.string(pos)?
        } else {
            let rest: String = self.chars[self.idx..].iter().take(2).collect();
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .copied()
                .ok_or_else(|| self.error(pos, format!("illegal character '{c}'")))?;
            for _ in 0..op.len() {
                self.bump();
            }
            TokenKind::Op(op)
        };
        Ok(Token { kind, pos })
    }
}

/// Split a unit into tokens, ending with [`TokenKind::Eof`]
pub fn tokenize(unit: &str, source: &str) -> Result<Vec<Token>, CompileError> {
    let mut lexer = Lexer {
        unit,
        chars: source.chars().collect(),
        idx: 0,
        line: 1,
        col: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize("T.java", src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_statement() {
        assert_eq!(
            kinds("int a = 3;"),
            vec![
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Ident("a".into()),
                TokenKind::Op("="),
                TokenKind::Int(3),
                TokenKind::Op(";"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_compound_operators_and_comments() {
        assert_eq!(
            kinds("i += 1; // trailing\n/* block */ i++"),
            vec![
                TokenKind::Ident("i".into()),
                TokenKind::Op("+="),
                TokenKind::Int(1),
                TokenKind::Op(";"),
                TokenKind::Ident("i".into()),
                TokenKind::Op("++"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\n\"b\"""#),
            vec![TokenKind::Str("a\n\"b\"".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("T.java", "int a;\n  a = 1;").unwrap();
        assert_eq!(tokens[3].pos, Position::new(2, 3));
    }

    #[test]
    fn test_errors() {
        assert!(tokenize("T.java", "\"open").is_err());
        assert!(tokenize("T.java", "/* never closed").is_err());
        assert!(tokenize("T.java", "int # = 1;").is_err());
        let err = tokenize("T.java", "x = 12ab;").unwrap_err();
        assert_eq!(err.position, Position::new(1, 5));
    }
}

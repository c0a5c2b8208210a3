//! Tokenizer for CQL text

use geoquery_core::error::{GeoqueryError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word: a keyword, function name or field name
    Word(String),
    /// Double-quoted identifier
    QuotedIdent(String),
    /// Single-quoted string with `''` unescaped
    Str(String),
    /// Numeric literal as written
    Number(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token in the source
    pub offset: usize,
}

impl Token {
    /// `byte N ('text')` locator for error messages
    pub fn locator(&self) -> String {
        let text = match &self.kind {
            TokenKind::Word(w) => w.clone(),
            TokenKind::QuotedIdent(w) => format!("\"{}\"", w),
            TokenKind::Str(s) => format!("'{}'", s),
            TokenKind::Number(n) => n.clone(),
            TokenKind::Op(op) => (*op).to_string(),
            TokenKind::LParen => "(".into(),
            TokenKind::RParen => ")".into(),
            TokenKind::Comma => ",".into(),
            TokenKind::Eof => return format!("byte {} (end of input)", self.offset),
        };
        format!("byte {} ('{}')", self.offset, text)
    }

    /// Case-insensitive keyword test
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

/// On-demand lexer; the parser can also take raw balanced source slices for
/// embedded WKT
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> GeoqueryError {
        GeoqueryError::parse(message, format!("byte {}", offset))
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        let offset = self.pos;
        let rest = self.rest();
        let Some(c) = rest.chars().next() else {
            return Ok(Token { kind: TokenKind::Eof, offset });
        };

        let kind = match c {
            '(' => {
                self.pos += 1;
                TokenKind::LParen
            }
            ')' => {
                self.pos += 1;
                TokenKind::RParen
            }
            ',' => {
                self.pos += 1;
                TokenKind::Comma
            }
            '\'' => TokenKind::Str(self.quoted('\'')?),
            '"' => TokenKind::QuotedIdent(self.quoted('"')?),
            '=' => {
                self.pos += 1;
                TokenKind::Op("=")
            }
            '<' | '>' | '!' => {
                let op = if rest.starts_with("<=") {
                    "<="
                } else if rest.starts_with(">=") {
                    ">="
                } else if rest.starts_with("<>") || rest.starts_with("!=") {
                    "<>"
                } else if c == '<' {
                    "<"
                } else if c == '>' {
                    ">"
                } else {
                    return Err(self.error("Unexpected character '!'", offset));
                };
                self.pos += op.len();
                TokenKind::Op(op)
            }
            c if c.is_ascii_digit() || c == '.' || ((c == '-' || c == '+') && self.sign_starts_number()) => {
                TokenKind::Number(self.number())
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = rest
                    .find(|ch: char| !(ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == ':'))
                    .unwrap_or(rest.len());
                self.pos += len;
                TokenKind::Word(rest[..len].to_string())
            }
            other => return Err(self.error(format!("Unexpected character '{}'", other), offset)),
        };

        Ok(Token { kind, offset })
    }

    fn sign_starts_number(&self) -> bool {
        self.rest()[1..].chars().next().is_some_and(|c| c.is_ascii_digit() || c == '.')
    }

    fn number(&mut self) -> String {
        let rest = self.rest();
        let mut end = 0;
        let mut prev = '\0';
        for (i, c) in rest.char_indices() {
            let accepted = c.is_ascii_digit()
                || c == '.'
                || ((c == '-' || c == '+') && (i == 0 || prev == 'e' || prev == 'E'))
                || ((c == 'e' || c == 'E') && i > 0);
            if !accepted {
                break;
            }
            end = i + c.len_utf8();
            prev = c;
        }
        self.pos += end;
        rest[..end].to_string()
    }

    /// Quoted run with the quote character doubled as its escape
    fn quoted(&mut self, quote: char) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            let rest = self.rest();
            let Some(idx) = rest.find(quote) else {
                return Err(self.error("Unterminated quoted string", start));
            };
            value.push_str(&rest[..idx]);
            self.pos += idx + 1;
            if self.rest().starts_with(quote) {
                value.push(quote);
                self.pos += 1;
            } else {
                return Ok(value);
            }
        }
    }

    /// Raw source from `start` through the parenthesis that closes the first
    /// `(` after it; the lexer resumes after the slice
    pub fn balanced_from(&mut self, start: usize) -> Result<&'a str> {
        let source = self.source;
        let open = source[start..]
            .find('(')
            .map(|i| start + i)
            .ok_or_else(|| self.error("Expected '(' in geometry literal", start))?;

        let mut depth = 0usize;
        for (i, c) in source[open..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let end = open + i + 1;
                        self.pos = end;
                        return Ok(&source[start..end]);
                    }
                }
                _ => {}
            }
        }
        Err(self.error("Unbalanced parentheses in geometry literal", start))
    }
}

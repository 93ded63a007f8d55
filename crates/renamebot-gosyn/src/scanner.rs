//! Lexer for the Go subset, with automatic semicolon insertion.
//!
//! The scanner produces the full token stream for a file in one call. Line
//! comments and general comments are skipped; a newline (or a general comment
//! containing one) after a statement-ending token inserts a `;`, following
//! the language's insertion rules.

use renamebot_core::Span;
use thiserror::Error;

use crate::token::Token;

/// A token plus the byte span of its spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub token: Token,
    pub span: Span,
}

/// A scan failure at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scan error at offset {offset}: {message}")]
pub struct ScanError {
    pub offset: usize,
    pub message: String,
}

/// Tokenize an entire source file.
pub fn tokenize(src: &str) -> Result<Vec<Lexeme>, ScanError> {
    let mut scanner = Scanner::new(src);
    scanner.run()?;
    Ok(scanner.out)
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
    out: Vec<Lexeme>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Scanner {
            src: src.as_bytes(),
            pos: 0,
            out: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<(), ScanError> {
        loop {
            self.skip_blank()?;
            if self.pos >= self.src.len() {
                // A final partial line still terminates a statement.
                self.maybe_insert_semicolon(self.pos);
                let span = Span::new(self.pos, self.pos);
                self.out.push(Lexeme {
                    token: Token::Eof,
                    span,
                });
                return Ok(());
            }
            let lexeme = self.next_token()?;
            self.out.push(lexeme);
        }
    }

    fn peek(&self) -> u8 {
        if self.pos < self.src.len() {
            self.src[self.pos]
        } else {
            0
        }
    }

    fn peek_at(&self, n: usize) -> u8 {
        if self.pos + n < self.src.len() {
            self.src[self.pos + n]
        } else {
            0
        }
    }

    fn error(&self, message: impl Into<String>) -> ScanError {
        ScanError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn maybe_insert_semicolon(&mut self, at: usize) {
        if let Some(last) = self.out.last() {
            if last.token.ends_statement() {
                self.out.push(Lexeme {
                    token: Token::Semicolon,
                    span: Span::new(at, at),
                });
            }
        }
    }

    /// Skip whitespace and comments, inserting semicolons at newlines.
    fn skip_blank(&mut self) -> Result<(), ScanError> {
        loop {
            match self.peek() {
                b'\n' => {
                    self.maybe_insert_semicolon(self.pos);
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'/' if self.peek_at(1) == b'/' => {
                    while self.pos < self.src.len() && self.peek() != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    let start = self.pos;
                    self.pos += 2;
                    let mut has_newline = false;
                    loop {
                        if self.pos >= self.src.len() {
                            return Err(ScanError {
                                offset: start,
                                message: "unterminated comment".to_string(),
                            });
                        }
                        if self.peek() == b'\n' {
                            has_newline = true;
                        }
                        if self.peek() == b'*' && self.peek_at(1) == b'/' {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                    // A comment spanning lines acts like a newline.
                    if has_newline {
                        self.maybe_insert_semicolon(self.pos);
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Lexeme, ScanError> {
        let start = self.pos;
        let c = self.peek();

        if c.is_ascii_alphabetic() || c == b'_' || c >= 0x80 {
            return Ok(self.scan_ident(start));
        }
        if c.is_ascii_digit() || (c == b'.' && self.peek_at(1).is_ascii_digit()) {
            return self.scan_number(start);
        }

        match c {
            b'"' => self.scan_string(start),
            b'`' => self.scan_raw_string(start),
            b'\'' => self.scan_rune(start),
            _ => self.scan_operator(start),
        }
    }

    fn scan_ident(&mut self, start: usize) -> Lexeme {
        while self.pos < self.src.len() {
            let c = self.peek();
            if c.is_ascii_alphanumeric() || c == b'_' || c >= 0x80 {
                self.pos += 1;
            } else {
                break;
            }
        }
        let name = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap_or_default()
            .to_string();
        let token = Token::keyword(&name).unwrap_or(Token::Ident(name));
        Lexeme {
            token,
            span: Span::new(start, self.pos),
        }
    }

    fn scan_number(&mut self, start: usize) -> Result<Lexeme, ScanError> {
        let mut is_float = false;

        if self.peek() == b'0' && matches!(self.peek_at(1), b'x' | b'X' | b'b' | b'B' | b'o' | b'O')
        {
            self.pos += 2;
            while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
                self.pos += 1;
            }
        } else {
            while self.peek().is_ascii_digit() || self.peek() == b'_' {
                self.pos += 1;
            }
            if self.peek() == b'.' && !matches!(self.peek_at(1), b'.') {
                is_float = true;
                self.pos += 1;
                while self.peek().is_ascii_digit() || self.peek() == b'_' {
                    self.pos += 1;
                }
            }
            if matches!(self.peek(), b'e' | b'E') {
                is_float = true;
                self.pos += 1;
                if matches!(self.peek(), b'+' | b'-') {
                    self.pos += 1;
                }
                while self.peek().is_ascii_digit() {
                    self.pos += 1;
                }
            }
        }

        let imaginary = self.peek() == b'i';
        if imaginary {
            self.pos += 1;
        }

        let text = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| self.error("invalid number literal"))?
            .to_string();
        let token = if imaginary {
            Token::Imag(text)
        } else if is_float {
            Token::Float(text)
        } else {
            Token::Int(text)
        };
        Ok(Lexeme {
            token,
            span: Span::new(start, self.pos),
        })
    }

    fn scan_string(&mut self, start: usize) -> Result<Lexeme, ScanError> {
        self.pos += 1;
        loop {
            if self.pos >= self.src.len() || self.peek() == b'\n' {
                return Err(ScanError {
                    offset: start,
                    message: "unterminated string literal".to_string(),
                });
            }
            match self.peek() {
                b'"' => {
                    self.pos += 1;
                    break;
                }
                b'\\' => self.pos += 2,
                _ => self.pos += 1,
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap_or_default()
            .to_string();
        Ok(Lexeme {
            token: Token::Str(text),
            span: Span::new(start, self.pos),
        })
    }

    fn scan_raw_string(&mut self, start: usize) -> Result<Lexeme, ScanError> {
        self.pos += 1;
        loop {
            if self.pos >= self.src.len() {
                return Err(ScanError {
                    offset: start,
                    message: "unterminated raw string literal".to_string(),
                });
            }
            if self.peek() == b'`' {
                self.pos += 1;
                break;
            }
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap_or_default()
            .to_string();
        Ok(Lexeme {
            token: Token::Str(text),
            span: Span::new(start, self.pos),
        })
    }

    fn scan_rune(&mut self, start: usize) -> Result<Lexeme, ScanError> {
        self.pos += 1;
        loop {
            if self.pos >= self.src.len() || self.peek() == b'\n' {
                return Err(ScanError {
                    offset: start,
                    message: "unterminated rune literal".to_string(),
                });
            }
            match self.peek() {
                b'\'' => {
                    self.pos += 1;
                    break;
                }
                b'\\' => self.pos += 2,
                _ => self.pos += 1,
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap_or_default()
            .to_string();
        Ok(Lexeme {
            token: Token::Rune(text),
            span: Span::new(start, self.pos),
        })
    }

    fn scan_operator(&mut self, start: usize) -> Result<Lexeme, ScanError> {
        // Longest match first within each leading byte.
        let rest = &self.src[self.pos..];
        let table: &[(&[u8], Token)] = &[
            (b"...", Token::Ellipsis),
            (b"<<=", Token::ShlAssign),
            (b">>=", Token::ShrAssign),
            (b"&^=", Token::AndNotAssign),
            (b"&&", Token::LAnd),
            (b"||", Token::LOr),
            (b"<-", Token::Arrow),
            (b"++", Token::Inc),
            (b"--", Token::Dec),
            (b"==", Token::Eql),
            (b"!=", Token::Neq),
            (b"<=", Token::Leq),
            (b">=", Token::Geq),
            (b":=", Token::Define),
            (b"<<", Token::Shl),
            (b">>", Token::Shr),
            (b"&^", Token::AndNot),
            (b"+=", Token::AddAssign),
            (b"-=", Token::SubAssign),
            (b"*=", Token::MulAssign),
            (b"/=", Token::QuoAssign),
            (b"%=", Token::RemAssign),
            (b"&=", Token::AndAssign),
            (b"|=", Token::OrAssign),
            (b"^=", Token::XorAssign),
            (b"+", Token::Add),
            (b"-", Token::Sub),
            (b"*", Token::Mul),
            (b"/", Token::Quo),
            (b"%", Token::Rem),
            (b"&", Token::And),
            (b"|", Token::Or),
            (b"^", Token::Xor),
            (b"<", Token::Lss),
            (b">", Token::Gtr),
            (b"=", Token::Assign),
            (b"!", Token::Not),
            (b"(", Token::LParen),
            (b"[", Token::LBracket),
            (b"{", Token::LBrace),
            (b",", Token::Comma),
            (b".", Token::Period),
            (b")", Token::RParen),
            (b"]", Token::RBracket),
            (b"}", Token::RBrace),
            (b";", Token::Semicolon),
            (b":", Token::Colon),
            (b"~", Token::Tilde),
        ];
        for (text, token) in table {
            if rest.starts_with(text) {
                self.pos += text.len();
                return Ok(Lexeme {
                    token: token.clone(),
                    span: Span::new(start, self.pos),
                });
            }
        }
        Err(self.error(format!("unexpected character {:?}", self.peek() as char)))
    }
}

//! Core lowc lexer: converts source chunks to a token stream.
//!
//! Features:
//! - Integer literals in decimal, `0x` hex and `0b` binary with `_` separators
//! - Real literals with fraction and/or exponent
//! - Integers beyond `i64::MAX` become big-integer literals (up to `u128::MAX`)
//! - `//` and `/* */` comments
//! - Error recovery: collects up to 20 errors instead of stopping at the first
//! - Token positions survive chunk and file boundaries

use lowc_types::ast::Literal;
use lowc_types::{CompileErrors, Diagnostic, ErrorCode, Span};

use crate::chunk::{unescape, SourceChunk};
use crate::token::{Token, TokenKind};

/// Absolute position: byte offset, line, column.
type Loc = (u32, u32, u32);

/// The lowc lexer.
///
/// Converts a chunk stream into a vector of [`Token`]s, collecting up to
/// [`lowc_types::MAX_ERRORS`] errors along the way.
pub struct Lexer<'src> {
    chunks: &'src [SourceChunk],
    /// Bytes of the chunk being scanned.
    source: &'src [u8],
    /// File index of the chunk being scanned.
    file: u32,
    /// Chunk offset in its file.
    base: u32,
    /// Current byte offset into `source`.
    pos: usize,
    /// Current line number (1-based, absolute).
    line: u32,
    /// Current column number (1-based, absolute).
    col: u32,
    errors: CompileErrors,
}

/// Result of lexing: tokens + any errors collected.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    pub errors: CompileErrors,
}

/// Lex a single in-memory source as file `file`.
pub fn lex_source(source: &str, file: u32) -> LexResult {
    let chunks = [SourceChunk::whole(file, source)];
    Lexer::new(&chunks).lex()
}

impl<'src> Lexer<'src> {
    pub fn new(chunks: &'src [SourceChunk]) -> Self {
        Self {
            chunks,
            source: &[],
            file: 0,
            base: 0,
            pos: 0,
            line: 1,
            col: 1,
            errors: CompileErrors::empty(),
        }
    }

    /// Lex every chunk into one token stream.
    pub fn lex(mut self) -> LexResult {
        let mut tokens = Vec::new();

        for chunk in self.chunks {
            self.source = chunk.text.as_bytes();
            self.file = chunk.file;
            self.base = chunk.offset;
            self.pos = 0;
            self.line = chunk.line;
            self.col = chunk.column;

            while !self.errors.at_limit() {
                match self.scan_token() {
                    Some(token) => tokens.push(token),
                    None => break,
                }
            }
        }

        let end = self.loc();
        tokens.push(Token::new(TokenKind::Eof, Span::new(self.file, end, end)));

        tracing::trace!(
            tokens = tokens.len(),
            errors = self.errors.total_errors,
            "lexed {} chunk(s)",
            self.chunks.len()
        );

        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn loc(&self) -> Loc {
        (self.base + self.pos as u32, self.line, self.col)
    }

    fn span_from(&self, start: Loc) -> Span {
        Span::new(self.file, start, self.loc())
    }

    fn text_from(&self, start: Loc) -> &'src str {
        let from = (start.0 - self.base) as usize;
        std::str::from_utf8(&self.source[from..self.pos]).unwrap_or("")
    }

    fn emit_error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.errors.push(Diagnostic::new(code, message, span));
    }

    // ─────────────────────────────────────────────────────────────
    // Whitespace & comments
    // ─────────────────────────────────────────────────────────────

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(b' ' | b'\t' | b'\r' | b'\n'), _) => {
                    self.advance();
                }
                (Some(b'/'), Some(b'/')) => {
                    while let Some(ch) = self.peek() {
                        if ch == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                (Some(b'/'), Some(b'*')) => self.skip_block_comment(),
                _ => return,
            }
        }
    }

    fn skip_block_comment(&mut self) {
        let start = self.loc();
        self.advance();
        self.advance();
        loop {
            match self.peek() {
                None => {
                    let span = self.span_from(start);
                    self.emit_error(
                        ErrorCode::UNTERMINATED_COMMENT,
                        "unterminated block comment",
                        span,
                    );
                    return;
                }
                Some(b'*') if self.peek_at(1) == Some(b'/') => {
                    self.advance();
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Token scanning
    // ─────────────────────────────────────────────────────────────

    /// Scan one token, or `None` at the end of the current chunk.
    fn scan_token(&mut self) -> Option<Token> {
        loop {
            self.skip_trivia();
            let start = self.loc();
            let ch = self.peek()?;

            if ch.is_ascii_digit() {
                return Some(self.scan_number(start));
            }
            if ch.is_ascii_alphabetic() || ch == b'_' {
                return Some(self.scan_identifier(start));
            }
            if ch == b'"' {
                return Some(self.scan_string(start));
            }

            self.advance();
            let kind = match ch {
                b'+' => self.with_eq(TokenKind::Plus, TokenKind::PlusEq),
                b'-' => self.with_eq(TokenKind::Minus, TokenKind::MinusEq),
                b'*' => self.with_eq(TokenKind::Star, TokenKind::StarEq),
                b'/' => self.with_eq(TokenKind::Slash, TokenKind::SlashEq),
                b'%' => self.with_eq(TokenKind::Percent, TokenKind::PercentEq),
                b'&' => self.with_eq(TokenKind::Amp, TokenKind::AmpEq),
                b'|' => self.with_eq(TokenKind::Pipe, TokenKind::PipeEq),
                b'^' => self.with_eq(TokenKind::Caret, TokenKind::CaretEq),
                b'=' => self.with_eq(TokenKind::Eq, TokenKind::EqEq),
                b'!' => self.with_eq(TokenKind::Bang, TokenKind::BangEq),
                b'~' => TokenKind::Tilde,
                b'<' => {
                    if self.eat(b'<') {
                        self.with_eq(TokenKind::Shl, TokenKind::ShlEq)
                    } else {
                        self.with_eq(TokenKind::Less, TokenKind::LessEq)
                    }
                }
                b'>' => {
                    if self.eat(b'>') {
                        if self.eat(b'>') {
                            self.with_eq(TokenKind::ShrU, TokenKind::ShrUEq)
                        } else {
                            self.with_eq(TokenKind::Shr, TokenKind::ShrEq)
                        }
                    } else {
                        self.with_eq(TokenKind::Greater, TokenKind::GreaterEq)
                    }
                }
                b'?' => TokenKind::Question,
                b':' => TokenKind::Colon,
                b';' => TokenKind::Semicolon,
                b',' => TokenKind::Comma,
                b'.' => TokenKind::Dot,
                b'(' => TokenKind::LParen,
                b')' => TokenKind::RParen,
                b'[' => TokenKind::LBracket,
                b']' => TokenKind::RBracket,
                b'{' => TokenKind::LBrace,
                b'}' => TokenKind::RBrace,
                _ => {
                    // Skip the rest of a multi-byte character too.
                    while matches!(self.peek(), Some(0x80..=0xBF)) {
                        self.advance();
                    }
                    let span = self.span_from(start);
                    let text = self.text_from(start).to_string();
                    self.emit_error(
                        ErrorCode::UNEXPECTED_CHARACTER,
                        format!("unexpected character '{text}'"),
                        span,
                    );
                    if self.errors.at_limit() {
                        return None;
                    }
                    continue;
                }
            };
            return Some(Token::new(kind, self.span_from(start)));
        }
    }

    /// `plain` or, when followed by `=`, `with_eq`.
    fn with_eq(&mut self, plain: TokenKind, with_eq: TokenKind) -> TokenKind {
        if self.eat(b'=') {
            with_eq
        } else {
            plain
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Number literals
    // ─────────────────────────────────────────────────────────────

    fn scan_number(&mut self, start: Loc) -> Token {
        let radix = match (self.peek(), self.peek_at(1)) {
            (Some(b'0'), Some(b'x' | b'X')) => 16,
            (Some(b'0'), Some(b'b' | b'B')) => 2,
            _ => 10,
        };
        if radix != 10 {
            self.advance();
            self.advance();
        }
        let digits_start = self.pos;
        while let Some(ch) = self.peek() {
            if ch == b'_' || (ch as char).is_digit(radix) {
                self.advance();
            } else {
                break;
            }
        }
        let mut is_real = false;
        if radix == 10 {
            if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
                is_real = true;
                self.advance();
                self.skip_decimal_digits();
            }
            if matches!(self.peek(), Some(b'e' | b'E')) {
                let digit_at = if matches!(self.peek_at(1), Some(b'+' | b'-')) {
                    2
                } else {
                    1
                };
                if matches!(self.peek_at(digit_at), Some(b'0'..=b'9')) {
                    is_real = true;
                    for _ in 0..digit_at {
                        self.advance();
                    }
                    self.skip_decimal_digits();
                }
            }
        }
        let digits_end = self.pos;

        // Letters glued to a number (`12ab`, `0b102`) make it malformed.
        let mut malformed = false;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                malformed = true;
                self.advance();
            } else {
                break;
            }
        }

        let span = self.span_from(start);
        let digits: String = std::str::from_utf8(&self.source[digits_start..digits_end])
            .unwrap_or("")
            .chars()
            .filter(|&c| c != '_')
            .collect();

        if malformed || digits.is_empty() {
            let text = self.text_from(start).to_string();
            self.emit_error(
                ErrorCode::MALFORMED_NUMBER,
                format!("malformed numeric literal '{text}'"),
                span,
            );
            return Token::new(TokenKind::Number(Literal::Integer(0)), span);
        }

        if is_real {
            return match digits.parse::<f64>() {
                Ok(value) => Token::new(TokenKind::Number(Literal::Real(value)), span),
                Err(_) => {
                    self.emit_error(
                        ErrorCode::MALFORMED_NUMBER,
                        format!("malformed real literal '{digits}'"),
                        span,
                    );
                    Token::new(TokenKind::Number(Literal::Real(0.0)), span)
                }
            };
        }

        match u128::from_str_radix(&digits, radix) {
            Ok(value) => Token::new(TokenKind::Number(Literal::from_u128(value)), span),
            Err(_) => {
                let text = self.text_from(start).to_string();
                self.emit_error(
                    ErrorCode::LITERAL_TOO_LARGE,
                    format!("integer literal '{text}' does not fit in 128 bits"),
                    span,
                );
                Token::new(TokenKind::Number(Literal::Integer(0)), span)
            }
        }
    }

    fn skip_decimal_digits(&mut self) {
        while let Some(b'0'..=b'9' | b'_') = self.peek() {
            self.advance();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Identifiers & keywords
    // ─────────────────────────────────────────────────────────────

    fn scan_identifier(&mut self, start: Loc) -> Token {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = self.text_from(start);
        let kind =
            TokenKind::from_keyword(text).unwrap_or_else(|| TokenKind::Identifier(text.to_string()));
        Token::new(kind, self.span_from(start))
    }

    // ─────────────────────────────────────────────────────────────
    // String literals
    // ─────────────────────────────────────────────────────────────

    fn scan_string(&mut self, start: Loc) -> Token {
        self.advance(); // opening quote
        let body_start = self.loc();
        let from = self.pos;
        let mut terminated = false;
        while let Some(ch) = self.peek() {
            match ch {
                b'"' => {
                    terminated = true;
                    break;
                }
                b'\n' => break,
                b'\\' => {
                    self.advance();
                    if matches!(self.peek(), Some(b'\n') | None) {
                        break;
                    }
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
        let raw = std::str::from_utf8(&self.source[from..self.pos]).unwrap_or("");
        if terminated {
            self.advance();
        } else {
            let span = self.span_from(start);
            self.emit_error(
                ErrorCode::UNTERMINATED_STRING,
                "unterminated string literal",
                span,
            );
        }

        let bytes = match unescape(raw) {
            Ok(bytes) => bytes,
            Err(err) => {
                if terminated {
                    let at = err.offset as u32;
                    let len = err.sequence.len() as u32;
                    let span = Span::new(
                        self.file,
                        (body_start.0 + at, body_start.1, body_start.2 + at),
                        (body_start.0 + at + len, body_start.1, body_start.2 + at + len),
                    );
                    self.emit_error(
                        ErrorCode::INVALID_ESCAPE,
                        format!("invalid escape sequence '{}'", err.sequence),
                        span,
                    );
                }
                raw.as_bytes().to_vec()
            }
        };
        Token::new(TokenKind::Str(bytes), self.span_from(start))
    }
}

//! Core parser infrastructure: token cursor, error reporting, helpers.

use lowc_lexer::{lex_source, Token, TokenKind};
use lowc_types::ast::{Builtin, DeclarationTable, Ident};
use lowc_types::{CompileErrors, Diagnostic, ErrorCode, Span, MAX_ERRORS};

/// Maximum nesting of expressions and blocks.
pub const MAX_NESTING: u32 = 64;

/// How a parse function gave up.
///
/// In both cases the diagnostic has already been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The enclosing statement or declaration resynchronizes and parsing
    /// continues.
    Recovered(ErrorCode),
    /// Parsing stops.
    Fatal(ErrorCode),
}

impl ParseError {
    pub fn code(self) -> ErrorCode {
        match self {
            ParseError::Recovered(code) | ParseError::Fatal(code) => code,
        }
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, ParseError::Fatal(_))
    }
}

pub type PResult<T> = Result<T, ParseError>;

/// The lowc parser.
///
/// Consumes a token stream produced by the lexer and builds the
/// declaration table. Collects errors and recovers when possible.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: CompileErrors,
    /// Current expression + block nesting.
    depth: u32,
    /// Number of enclosing `while`/`do` bodies.
    pub(crate) loop_depth: u32,
    pub(crate) next_function_index: u32,
    pub(crate) next_data_index: u32,
}

/// Result of parsing.
pub struct ParseResult {
    pub declarations: DeclarationTable,
    pub errors: CompileErrors,
}

/// Lex and parse a single in-memory source. Lexer diagnostics come first.
pub fn parse_source(source: &str) -> ParseResult {
    let lexed = lex_source(source, 0);
    let mut result = Parser::new(lexed.tokens).parse();
    let mut errors = lexed.errors;
    errors.extend(result.errors);
    result.errors = errors;
    result
}

impl Parser {
    /// Create a new parser. An `Eof` token is appended when `tokens` does
    /// not already end with one.
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| &t.kind) != Some(&TokenKind::Eof) {
            let span = tokens
                .last()
                .map(|t| Span::point(t.span.file, t.span.end, t.span.end_line, t.span.end_col))
                .unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, span));
        }
        Self {
            tokens,
            pos: 0,
            errors: CompileErrors::empty(),
            depth: 0,
            loop_depth: 0,
            next_function_index: 0,
            next_data_index: 0,
        }
    }

    /// Diagnostics recorded so far.
    pub fn errors(&self) -> &CompileErrors {
        &self.errors
    }

    pub fn into_errors(self) -> CompileErrors {
        self.errors
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// Returns the previously consumed token's span.
    pub(crate) fn previous_span(&self) -> Span {
        match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some(token) => token.span,
            None => self.current_span(),
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a specific token, reporting `code` if it is missing.
    pub(crate) fn expect(&mut self, expected: &TokenKind, code: ErrorCode) -> PResult<Token> {
        if self.check(expected) {
            return Ok(self.advance());
        }
        let message = format!("expected '{}', got '{}'", expected, self.peek_kind());
        if code == ErrorCode::MISSING_SEMICOLON {
            // Point just past the previous token rather than at the next line.
            let prev = self.previous_span();
            let at = Span::point(prev.file, prev.end, prev.end_line, prev.end_col);
            return Err(self.fail_at(code, message, at));
        }
        Err(self.fail(code, message))
    }

    pub(crate) fn expect_semicolon(&mut self) -> PResult<Token> {
        self.expect(&TokenKind::Semicolon, ErrorCode::MISSING_SEMICOLON)
    }

    /// Expect an identifier token.
    pub(crate) fn expect_identifier(&mut self) -> PResult<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Ok(Ident::new(name, span))
            }
            other => Err(self.fail(
                ErrorCode::EXPECTED_IDENTIFIER,
                format!("expected identifier, got '{other}'"),
            )),
        }
    }

    /// Expect an identifier that introduces a new name. Builtin names are
    /// reserved; the error is reported and parsing continues.
    pub(crate) fn expect_declared_name(&mut self) -> PResult<Ident> {
        let ident = self.expect_identifier()?;
        if Builtin::from_name(&ident.name).is_some() {
            self.report(
                ErrorCode::RESERVED_NAME,
                format!("'{}' is a reserved builtin name", ident.name),
                ident.span,
            )?;
        }
        Ok(ident)
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    /// Record a diagnostic at the current token and return the error to
    /// propagate. At end of input the error is the fatal W026 instead.
    pub(crate) fn fail(&mut self, code: ErrorCode, message: impl Into<String>) -> ParseError {
        if self.at_end() {
            let message = format!("unexpected end of input: {}", message.into());
            let span = self.current_span();
            return self.fail_at(ErrorCode::UNEXPECTED_END_OF_INPUT, message, span);
        }
        let span = self.current_span();
        self.fail_at(code, message, span)
    }

    /// Record a diagnostic at `span` and return the error to propagate.
    pub(crate) fn fail_at(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
    ) -> ParseError {
        match self.report(code, message, span) {
            Err(fatal) => fatal,
            Ok(()) if code == ErrorCode::UNEXPECTED_END_OF_INPUT => ParseError::Fatal(code),
            Ok(()) => ParseError::Recovered(code),
        }
    }

    /// Record a diagnostic that does not interrupt parsing. Fails only
    /// when the error limit is reached.
    pub(crate) fn report(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
    ) -> PResult<()> {
        self.errors.push(Diagnostic::new(code, message, span));
        if self.errors.total_errors >= MAX_ERRORS - 1 {
            self.errors.push(Diagnostic::new(
                ErrorCode::TOO_MANY_ERRORS,
                format!("too many errors ({MAX_ERRORS}), stopping"),
                span,
            ));
            return Err(ParseError::Fatal(ErrorCode::TOO_MANY_ERRORS));
        }
        Ok(())
    }

    // ── Nesting ───────────────────────────────────────────────────────────────

    /// Enter one level of expression or block nesting.
    pub(crate) fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            self.depth -= 1;
            let span = self.current_span();
            self.report(
                ErrorCode::NESTING_TOO_DEEP,
                format!("nesting deeper than {MAX_NESTING} levels"),
                span,
            )?;
            return Err(ParseError::Fatal(ErrorCode::NESTING_TOO_DEEP));
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ── Synchronization ───────────────────────────────────────────────────────

    /// Skip to the next statement boundary: past a `;`, or up to a `}`
    /// or a statement keyword.
    pub(crate) fn synchronize(&mut self) {
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace
                | TokenKind::Var
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skip to the next top-level declaration keyword outside braces.
    pub(crate) fn synchronize_declaration(&mut self) {
        let mut braces = 0u32;
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::LBrace => braces += 1,
                TokenKind::RBrace => braces = braces.saturating_sub(1),
                TokenKind::Const
                | TokenKind::Global
                | TokenKind::Type
                | TokenKind::Table
                | TokenKind::Data
                | TokenKind::Import
                | TokenKind::Export
                | TokenKind::Inline
                | TokenKind::Func
                    if braces == 0 =>
                {
                    return
                }
                _ => {}
            }
            self.advance();
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the token stream into a declaration table.
    pub fn parse(mut self) -> ParseResult {
        let _span = tracing::debug_span!("parse", tokens = self.tokens.len()).entered();
        let declarations = self.parse_program();
        tracing::debug!(
            declarations = declarations.len(),
            errors = self.errors.total_errors,
            "parsed"
        );
        ParseResult {
            declarations,
            errors: self.errors,
        }
    }
}

//! Directive processing.
//!
//! A line whose first non-blank character is `#` is a directive:
//! `#define`, `#undef`, `#if`, `#elseif`, `#else`, `#endif`, `#include`.
//! Every other line is source text; each maximal run of source lines that
//! is active under all enclosing conditionals becomes one [`SourceChunk`].
//! Directive lines never reach the lexer, but chunks keep the original
//! offsets, lines and file indexes.

use std::collections::HashSet;

use lowc_lexer::{Lexer, SourceChunk, Token, TokenKind};
use lowc_types::{CompileErrors, Diagnostic, ErrorCode, Span};

use crate::condition::Condition;

/// Maximum `#include` nesting.
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Replacement text for an `#include`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedSource {
    pub source: String,
    /// Index used to tag positions inside the included text.
    pub file_index: u32,
}

/// Resolves an `#include` name to source text.
///
/// Returning `None` reports P008 at the directive.
pub trait IncludeResolver {
    fn resolve(&mut self, name: &str) -> Option<IncludedSource>;
}

impl<F> IncludeResolver for F
where
    F: FnMut(&str) -> Option<IncludedSource>,
{
    fn resolve(&mut self, name: &str) -> Option<IncludedSource> {
        self(name)
    }
}

/// One `#if` … `#endif` level.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Every enclosing frame is taking its branch.
    parent_active: bool,
    /// The current branch of this frame is being emitted.
    taking: bool,
    /// Some branch of this frame has already been taken.
    satisfied: bool,
    else_seen: bool,
    /// The opening `#if`, for P007.
    span: Span,
}

/// A source line being scanned.
struct Line<'s> {
    text: &'s str,
    file: u32,
    offset: u32,
    number: u32,
}

/// The lowc preprocessor.
///
/// Owns the defined-symbol set for the duration of its pass.
pub struct Preprocessor<'a> {
    symbols: HashSet<String>,
    includes: Option<&'a mut dyn IncludeResolver>,
    frames: Vec<Frame>,
    chunks: Vec<SourceChunk>,
    /// Source run not yet closed by a directive or end of file.
    pending: Option<SourceChunk>,
    errors: CompileErrors,
}

impl Default for Preprocessor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Preprocessor<'a> {
    pub fn new() -> Self {
        Self {
            symbols: HashSet::new(),
            includes: None,
            frames: Vec::new(),
            chunks: Vec::new(),
            pending: None,
            errors: CompileErrors::empty(),
        }
    }

    /// Predefine symbols, as if by `#define`.
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols.extend(symbols.into_iter().map(Into::into));
        self
    }

    pub fn with_includes(mut self, includes: &'a mut dyn IncludeResolver) -> Self {
        self.includes = Some(includes);
        self
    }

    pub fn define(&mut self, name: impl Into<String>) {
        self.symbols.insert(name.into());
    }

    pub fn undef(&mut self, name: &str) {
        self.symbols.remove(name);
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.symbols.contains(name)
    }

    /// Defined symbols, sorted.
    pub fn symbols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.symbols.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Diagnostics recorded so far.
    pub fn errors(&self) -> &CompileErrors {
        &self.errors
    }

    pub fn take_errors(&mut self) -> CompileErrors {
        std::mem::take(&mut self.errors)
    }

    /// Preprocess `source` as file `file_index`.
    ///
    /// Returns the surviving chunks, or `None` when any directive was
    /// malformed (the diagnostics stay in [`Preprocessor::errors`]).
    pub fn preprocess(&mut self, source: &str, file_index: u32) -> Option<Vec<SourceChunk>> {
        let _span = tracing::debug_span!("preprocess", file = file_index).entered();
        self.frames.clear();
        self.chunks.clear();
        let errors_before = self.errors.total_errors;

        self.process_file(source, file_index, 0);
        if let Some(frame) = self.frames.first().copied() {
            self.error(
                ErrorCode::UNTERMINATED_CONDITIONAL,
                "'#if' without matching '#endif'",
                frame.span,
            );
            self.frames.clear();
        }

        let chunks = std::mem::take(&mut self.chunks);
        tracing::debug!(chunks = chunks.len(), "preprocessed");
        if self.errors.total_errors > errors_before {
            None
        } else {
            Some(chunks)
        }
    }

    fn error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.errors.push(Diagnostic::new(code, message, span));
    }

    fn is_active(&self) -> bool {
        self.frames.iter().all(|f| f.taking)
    }

    fn flush(&mut self) {
        if let Some(chunk) = self.pending.take() {
            self.chunks.push(chunk);
        }
    }

    fn process_file(&mut self, source: &str, file: u32, depth: usize) {
        let mut offset = 0u32;
        for (i, text) in source.split_inclusive('\n').enumerate() {
            let line = Line {
                text,
                file,
                offset,
                number: i as u32 + 1,
            };
            offset += text.len() as u32;

            if text.trim_start().starts_with('#') {
                self.flush();
                self.directive(&line, depth);
            } else if self.is_active() {
                match &mut self.pending {
                    Some(chunk) => chunk.text.push_str(text),
                    None => {
                        self.pending = Some(SourceChunk {
                            file,
                            offset: line.offset,
                            line: line.number,
                            column: 1,
                            text: text.to_string(),
                        })
                    }
                }
            }
        }
        self.flush();
    }

    fn directive(&mut self, line: &Line<'_>, depth: usize) {
        let indent = line.text.len() - line.text.trim_start().len();
        let after_hash = &line.text[indent + 1..];
        let gap = after_hash.len() - after_hash.trim_start_matches([' ', '\t']).len();
        let name_start = indent + 1 + gap;
        let name_len = line.text[name_start..]
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        let name = &line.text[name_start..name_start + name_len];
        let rest_start = name_start + name_len;

        let span = Span::new(
            line.file,
            (line.offset + indent as u32, line.number, indent as u32 + 1),
            (
                line.offset + rest_start as u32,
                line.number,
                rest_start as u32 + 1,
            ),
        );
        let conditional = matches!(name, "if" | "elseif" | "else" | "endif");
        // Directives in skipped regions are only tracked for nesting.
        let evaluated = match name {
            "elseif" | "else" | "endif" => self.frames.last().is_none_or(|f| f.parent_active),
            _ => self.is_active(),
        };
        if !conditional && !evaluated {
            return;
        }
        let rest = self.lex_rest(line, rest_start, evaluated);

        match name {
            "if" => self.directive_if(&rest, span),
            "elseif" => self.directive_elseif(&rest, span),
            "else" => self.directive_else(&rest, span),
            "endif" => self.directive_endif(&rest, span),
            "define" => {
                if let Some(symbol) = self.expect_symbol(&rest, span, "#define") {
                    self.symbols.insert(symbol);
                }
            }
            "undef" => {
                if let Some(symbol) = self.expect_symbol(&rest, span, "#undef") {
                    self.symbols.remove(&symbol);
                }
            }
            "include" => self.directive_include(&rest, span, depth),
            _ => self.error(
                ErrorCode::UNKNOWN_DIRECTIVE,
                format!("unknown directive '#{name}'"),
                span,
            ),
        }
    }

    /// Tokenise the remainder of a directive line.
    fn lex_rest(&mut self, line: &Line<'_>, start: usize, report: bool) -> Vec<Token> {
        let chunk = [SourceChunk {
            file: line.file,
            offset: line.offset + start as u32,
            line: line.number,
            column: start as u32 + 1,
            text: line.text[start..].to_string(),
        }];
        let result = Lexer::new(&chunk).lex();
        if report {
            self.errors.extend(result.errors);
        }
        result.tokens
    }

    /// `#define NAME` / `#undef NAME`
    fn expect_symbol(&mut self, rest: &[Token], span: Span, directive: &str) -> Option<String> {
        match rest.first().map(|t| &t.kind) {
            Some(TokenKind::Identifier(name)) => {
                let name = name.clone();
                self.expect_end(&rest[1..], directive).then_some(name)
            }
            _ => {
                let at = rest.first().map_or(span, |t| t.span);
                self.error(
                    ErrorCode::EXPECTED_SYMBOL,
                    format!("'{directive}' expects an identifier"),
                    at,
                );
                None
            }
        }
    }

    /// Report trailing tokens. Returns `true` when there are none.
    fn expect_end(&mut self, rest: &[Token], directive: &str) -> bool {
        match rest.first() {
            Some(token) if token.kind != TokenKind::Eof => {
                self.error(
                    ErrorCode::TRAILING_DIRECTIVE_TOKENS,
                    format!("unexpected '{}' after '{directive}'", token.kind),
                    token.span,
                );
                false
            }
            _ => true,
        }
    }

    fn evaluate(&mut self, rest: &[Token]) -> bool {
        match Condition::evaluate(rest, &self.symbols) {
            Ok(value) => value,
            Err(diagnostic) => {
                self.errors.push(diagnostic);
                false
            }
        }
    }

    fn directive_if(&mut self, rest: &[Token], span: Span) {
        let parent_active = self.is_active();
        let taking = parent_active && self.evaluate(rest);
        self.frames.push(Frame {
            parent_active,
            taking,
            satisfied: taking || !parent_active,
            else_seen: false,
            span,
        });
    }

    fn directive_elseif(&mut self, rest: &[Token], span: Span) {
        let Some(frame) = self.frames.last().copied() else {
            self.error(
                ErrorCode::UNMATCHED_CONDITIONAL,
                "'#elseif' without '#if'",
                span,
            );
            return;
        };
        if frame.else_seen {
            self.error(ErrorCode::DUPLICATE_ELSE, "'#elseif' after '#else'", span);
            return;
        }
        let taking = !frame.satisfied && self.evaluate(rest);
        if let Some(top) = self.frames.last_mut() {
            top.taking = taking;
            top.satisfied |= taking;
        }
    }

    fn directive_else(&mut self, rest: &[Token], span: Span) {
        let Some(frame) = self.frames.last().copied() else {
            self.error(
                ErrorCode::UNMATCHED_CONDITIONAL,
                "'#else' without '#if'",
                span,
            );
            return;
        };
        if frame.else_seen {
            self.error(ErrorCode::DUPLICATE_ELSE, "duplicate '#else'", span);
            return;
        }
        self.expect_end(rest, "#else");
        if let Some(top) = self.frames.last_mut() {
            top.taking = top.parent_active && !top.satisfied;
            top.satisfied = true;
            top.else_seen = true;
        }
    }

    fn directive_endif(&mut self, rest: &[Token], span: Span) {
        if self.frames.pop().is_none() {
            self.error(
                ErrorCode::UNMATCHED_CONDITIONAL,
                "'#endif' without '#if'",
                span,
            );
            return;
        }
        self.expect_end(rest, "#endif");
    }

    fn directive_include(&mut self, rest: &[Token], span: Span, depth: usize) {
        let name = match rest.first().map(|t| &t.kind) {
            Some(TokenKind::Str(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
            _ => {
                let at = rest.first().map_or(span, |t| t.span);
                self.error(
                    ErrorCode::EXPECTED_STRING,
                    "'#include' expects a file name string",
                    at,
                );
                return;
            }
        };
        if !self.expect_end(&rest[1..], "#include") {
            return;
        }
        if depth + 1 > MAX_INCLUDE_DEPTH {
            self.error(
                ErrorCode::INCLUDE_TOO_DEEP,
                format!("'#include \"{name}\"' exceeds the nesting limit of {MAX_INCLUDE_DEPTH}"),
                span,
            );
            return;
        }
        let included = self.includes.as_mut().and_then(|r| r.resolve(&name));
        let Some(included) = included else {
            self.error(
                ErrorCode::INCLUDE_NOT_FOUND,
                format!("cannot include '{name}'"),
                span,
            );
            return;
        };

        tracing::debug!(name = %name, file = included.file_index, depth = depth + 1, "include");
        let frames_before = self.frames.len();
        self.process_file(&included.source, included.file_index, depth + 1);
        if self.frames.len() > frames_before {
            let open = self.frames[frames_before].span;
            self.error(
                ErrorCode::UNTERMINATED_CONDITIONAL,
                format!("'#if' in '{name}' without matching '#endif'"),
                open,
            );
            self.frames.truncate(frames_before);
        }
    }
}

use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of errors stored before the rest are only counted.
///
/// The parser also treats reaching this many errors as fatal.
pub const MAX_ERRORS: usize = 20;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Diagnostic category, determined by the code's stage prefix and range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Preprocessor,
    Lexical,
    Syntax,
    Context,
    Resolution,
    Semantic,
}

/// A stable diagnostic code: `P0xx` for the preprocessor, `W0xx`/`W1xx`
/// for everything after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ErrorCode {
    prefix: char,
    number: u16,
}

impl ErrorCode {
    const fn p(number: u16) -> Self {
        Self { prefix: 'P', number }
    }

    const fn w(number: u16) -> Self {
        Self { prefix: 'W', number }
    }

    // ── Preprocessor (P001–P099) ──
    pub const UNKNOWN_DIRECTIVE: Self = Self::p(1);
    pub const EXPECTED_SYMBOL: Self = Self::p(2);
    pub const TRAILING_DIRECTIVE_TOKENS: Self = Self::p(3);
    pub const MALFORMED_CONDITION: Self = Self::p(4);
    pub const UNMATCHED_CONDITIONAL: Self = Self::p(5);
    pub const DUPLICATE_ELSE: Self = Self::p(6);
    pub const UNTERMINATED_CONDITIONAL: Self = Self::p(7);
    pub const INCLUDE_NOT_FOUND: Self = Self::p(8);
    pub const INCLUDE_TOO_DEEP: Self = Self::p(9);
    pub const EXPECTED_STRING: Self = Self::p(10);

    // ── Lexical (W001–W019) ──
    pub const UNEXPECTED_CHARACTER: Self = Self::w(1);
    pub const MALFORMED_NUMBER: Self = Self::w(2);
    pub const UNTERMINATED_STRING: Self = Self::w(3);
    pub const INVALID_ESCAPE: Self = Self::w(4);
    pub const UNTERMINATED_COMMENT: Self = Self::w(5);
    pub const LITERAL_TOO_LARGE: Self = Self::w(6);

    // ── Syntax (W020–W089) ──
    pub const UNEXPECTED_TOKEN: Self = Self::w(20);
    pub const EXPECTED_IDENTIFIER: Self = Self::w(21);
    pub const EXPECTED_TYPE: Self = Self::w(22);
    pub const EXPECTED_EXPRESSION: Self = Self::w(23);
    pub const MISSING_SEMICOLON: Self = Self::w(24);
    pub const UNTERMINATED_ARGUMENT_LIST: Self = Self::w(25);
    pub const UNEXPECTED_END_OF_INPUT: Self = Self::w(26);
    pub const NESTING_TOO_DEEP: Self = Self::w(27);
    pub const INVALID_ASSIGNMENT_TARGET: Self = Self::w(28);
    pub const INVALID_EXPRESSION_STATEMENT: Self = Self::w(29);
    pub const TOO_MANY_ERRORS: Self = Self::w(30);
    pub const RESERVED_NAME: Self = Self::w(31);

    // ── Statement context (W090–W099) ──
    pub const JUMP_OUTSIDE_LOOP: Self = Self::w(90);

    // ── Resolution (W100–W129) ──
    pub const UNKNOWN_TYPE: Self = Self::w(100);
    pub const RECURSIVE_LAYOUT: Self = Self::w(101);
    pub const DUPLICATE_DECLARATION: Self = Self::w(102);
    pub const UNKNOWN_IDENTIFIER: Self = Self::w(103);
    pub const NOT_CONSTANT: Self = Self::w(104);
    pub const DIVISION_BY_ZERO: Self = Self::w(105);
    pub const CONSTANT_OUT_OF_RANGE: Self = Self::w(106);
    pub const INVALID_ARRAY_LENGTH: Self = Self::w(107);
    pub const DEPENDENCY_CYCLE: Self = Self::w(108);

    // ── Semantic (W130–W199) ──
    pub const TYPE_MISMATCH: Self = Self::w(130);
    pub const MISSING_RETURN: Self = Self::w(131);
    pub const UNKNOWN_FIELD: Self = Self::w(132);
    pub const INVALID_OPERAND: Self = Self::w(133);
    pub const AGGREGATE_IN_SLOT: Self = Self::w(134);
    pub const TABLE_SIGNATURE_MISMATCH: Self = Self::w(135);
    pub const WRONG_ARG_COUNT: Self = Self::w(136);
    pub const UNKNOWN_FUNCTION: Self = Self::w(137);
    pub const UNUSED_FUNCTION: Self = Self::w(140);
    /// The compiler itself failed; the program may be fine.
    pub const INTERNAL: Self = Self::w(199);

    /// The stage prefix (`'P'` or `'W'`).
    pub fn prefix(self) -> char {
        self.prefix
    }

    /// The numeric part of the code.
    pub fn number(self) -> u16 {
        self.number
    }

    /// Get the category for this code.
    pub fn category(self) -> ErrorCategory {
        if self.prefix == 'P' {
            return ErrorCategory::Preprocessor;
        }
        match self.number {
            0..=19 => ErrorCategory::Lexical,
            20..=89 => ErrorCategory::Syntax,
            90..=99 => ErrorCategory::Context,
            100..=129 => ErrorCategory::Resolution,
            _ => ErrorCategory::Semantic,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.prefix, self.number)
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.to_string()
    }
}

/// Returned when a string does not spell a diagnostic code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown diagnostic code '{0}'")]
pub struct UnknownErrorCode(pub String);

impl TryFrom<String> for ErrorCode {
    type Error = UnknownErrorCode;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        let mut chars = text.chars();
        let prefix = match chars.next() {
            Some(p @ ('P' | 'W')) => p,
            _ => return Err(UnknownErrorCode(text)),
        };
        match chars.as_str().parse::<u16>() {
            Ok(number) => Ok(Self { prefix, number }),
            Err(_) => Err(UnknownErrorCode(text)),
        }
    }
}

/// A structured compiler diagnostic.
///
/// The CLI and any tooling render these; they must not parse free-form
/// strings to find positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Diagnostic code (e.g., W090).
    pub code: ErrorCode,
    pub severity: Severity,
    /// Category (derived from code).
    pub category: ErrorCategory,
    /// Human-readable message.
    pub message: String,
    /// Source location of the triggering token or node.
    #[serde(flatten)]
    pub span: Span,
    /// Optional fix suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    /// Create a new error.
    pub fn new(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            severity: Severity::Error,
            category: code.category(),
            message: message.into(),
            span,
            suggestion: None,
        }
    }

    /// Create a new warning.
    pub fn warning(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::new(code, message, span)
        }
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}] {}",
            self.span, self.code, self.category, self.message
        )
    }
}

impl std::error::Error for Diagnostic {}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preprocessor => write!(f, "preprocessor"),
            Self::Lexical => write!(f, "lexical"),
            Self::Syntax => write!(f, "syntax"),
            Self::Context => write!(f, "context"),
            Self::Resolution => write!(f, "resolution"),
            Self::Semantic => write!(f, "semantic"),
        }
    }
}

/// An ordered diagnostics list, as collected by one stage or by a whole
/// compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompileErrors {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl CompileErrors {
    /// Create an empty list (no errors).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Returns `true` once the error limit has been reached.
    pub fn at_limit(&self) -> bool {
        self.total_errors >= MAX_ERRORS
    }

    /// Add a diagnostic, routing it by severity and respecting the
    /// MAX_ERRORS storage limit for errors.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => {
                if self.errors.len() < MAX_ERRORS {
                    self.errors.push(diagnostic);
                }
                self.total_errors += 1;
            }
            Severity::Warning => {
                self.warnings.push(diagnostic);
                self.total_warnings += 1;
            }
        }
    }

    /// Append every diagnostic of a later stage, keeping order.
    pub fn extend(&mut self, other: CompileErrors) {
        let dropped_errors = other.total_errors - other.errors.len();
        for diagnostic in other.errors.into_iter().chain(other.warnings) {
            self.push(diagnostic);
        }
        self.total_errors += dropped_errors;
    }

    /// Returns `true` if any stored error carries `code`.
    pub fn contains(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// Codes of the stored errors, in order.
    pub fn codes(&self) -> Vec<ErrorCode> {
        self.errors.iter().map(|e| e.code).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::new(0, (10, 2, 3), (14, 2, 7))
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(
            ErrorCode::UNKNOWN_DIRECTIVE.category(),
            ErrorCategory::Preprocessor
        );
        assert_eq!(
            ErrorCode::MALFORMED_NUMBER.category(),
            ErrorCategory::Lexical
        );
        assert_eq!(ErrorCode::UNEXPECTED_TOKEN.category(), ErrorCategory::Syntax);
        assert_eq!(ErrorCode::JUMP_OUTSIDE_LOOP.category(), ErrorCategory::Context);
        assert_eq!(ErrorCode::UNKNOWN_TYPE.category(), ErrorCategory::Resolution);
        assert_eq!(ErrorCode::TYPE_MISMATCH.category(), ErrorCategory::Semantic);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::UNKNOWN_DIRECTIVE.to_string(), "P001");
        assert_eq!(ErrorCode::UNTERMINATED_ARGUMENT_LIST.to_string(), "W025");
        assert_eq!(ErrorCode::JUMP_OUTSIDE_LOOP.to_string(), "W090");
        assert_eq!(ErrorCode::RECURSIVE_LAYOUT.to_string(), "W101");
    }

    #[test]
    fn test_error_code_parse() {
        assert_eq!(
            ErrorCode::try_from("W090".to_string()),
            Ok(ErrorCode::JUMP_OUTSIDE_LOOP)
        );
        assert!(ErrorCode::try_from("X001".to_string()).is_err());
        assert!(ErrorCode::try_from("W".to_string()).is_err());
    }

    #[test]
    fn test_diagnostic_json() {
        let d = Diagnostic::new(ErrorCode::UNKNOWN_TYPE, "unknown type 'Nod'", span())
            .with_suggestion("did you mean 'Node'?");
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"code\":\"W100\""));
        assert!(json.contains("\"line\":2"));
        assert!(json.contains("\"column\":3"));
        assert!(json.contains("\"category\":\"resolution\""));

        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, d.code);
        assert_eq!(back.span, d.span);
        assert_eq!(back.suggestion.as_deref(), Some("did you mean 'Node'?"));
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::new(ErrorCode::JUMP_OUTSIDE_LOOP, "'break' outside of a loop", span());
        assert_eq!(d.to_string(), "2:3: W090 [context] 'break' outside of a loop");
    }

    #[test]
    fn test_compile_errors_max_limit() {
        let mut errs = CompileErrors::empty();
        for i in 0..25 {
            errs.push(Diagnostic::new(
                ErrorCode::UNEXPECTED_TOKEN,
                format!("Error {i}"),
                Span::point(0, i, i + 1, 1),
            ));
        }
        assert_eq!(errs.errors.len(), 20);
        assert_eq!(errs.total_errors, 25);
        assert!(errs.at_limit());
    }

    #[test]
    fn test_compile_errors_warnings_do_not_count() {
        let mut errs = CompileErrors::empty();
        errs.push(Diagnostic::warning(ErrorCode::UNUSED_FUNCTION, "unused", span()));
        assert!(!errs.has_errors());
        assert_eq!(errs.total_warnings, 1);
    }

    #[test]
    fn test_compile_errors_extend_keeps_order_and_totals() {
        let mut first = CompileErrors::empty();
        first.push(Diagnostic::new(ErrorCode::UNKNOWN_DIRECTIVE, "a", span()));
        let mut second = CompileErrors::empty();
        second.push(Diagnostic::new(ErrorCode::UNEXPECTED_TOKEN, "b", span()));
        second.push(Diagnostic::new(ErrorCode::UNKNOWN_TYPE, "c", span()));
        first.extend(second);
        assert_eq!(
            first.codes(),
            vec![
                ErrorCode::UNKNOWN_DIRECTIVE,
                ErrorCode::UNEXPECTED_TOKEN,
                ErrorCode::UNKNOWN_TYPE
            ]
        );
        assert_eq!(first.total_errors, 3);
    }
}

//! Token types for the lowc lexer.
//!
//! Defines [`TokenKind`] covering every lexeme of the language and
//! [`Token`], which pairs a kind with a source [`Span`].

use lowc_types::ast::{Intrinsic, Literal};
use lowc_types::Span;
use std::fmt;

/// Reserved words. Intrinsic type names are reserved too and lex as
/// [`TokenKind::Intrinsic`].
pub const ALL_KEYWORDS: &[&str] = &[
    // Declarations
    "const", "global", "type", "table", "data", "import", "export", "inline", "func",
    // Statements
    "var", "if", "else", "while", "do", "break", "continue", "return",
    // Types & expressions
    "struct", "sizeof", "void",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

/// A single token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────

    /// Integer or real literal, already decoded.
    Number(Literal),
    /// String literal with escapes decoded. Not necessarily UTF-8.
    Str(Vec<u8>),

    // ── Identifiers ──────────────────────────────────────────

    Identifier(String),
    /// `i8` … `f64`
    Intrinsic(Intrinsic),

    // ── Keywords ─────────────────────────────────────────────

    Const,
    Global,
    Type,
    Table,
    Data,
    Import,
    Export,
    Inline,
    Func,
    Var,
    If,
    Else,
    While,
    Do,
    Break,
    Continue,
    Return,
    Struct,
    Sizeof,
    Void,

    // ── Operators ────────────────────────────────────────────

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `>>>`
    ShrU,
    EqEq,
    BangEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Question,
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    ShlEq,
    ShrEq,
    ShrUEq,

    // ── Punctuation ──────────────────────────────────────────

    Colon,
    Semicolon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

impl TokenKind {
    /// Look up a keyword or intrinsic type name.
    pub fn from_keyword(s: &str) -> Option<TokenKind> {
        if let Some(intrinsic) = Intrinsic::from_name(s) {
            return Some(TokenKind::Intrinsic(intrinsic));
        }
        Some(match s {
            "const" => TokenKind::Const,
            "global" => TokenKind::Global,
            "type" => TokenKind::Type,
            "table" => TokenKind::Table,
            "data" => TokenKind::Data,
            "import" => TokenKind::Import,
            "export" => TokenKind::Export,
            "inline" => TokenKind::Inline,
            "func" => TokenKind::Func,
            "var" => TokenKind::Var,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "return" => TokenKind::Return,
            "struct" => TokenKind::Struct,
            "sizeof" => TokenKind::Sizeof,
            "void" => TokenKind::Void,
            _ => return None,
        })
    }

    /// Returns `true` if this token is a reserved word.
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Intrinsic(_)
                | TokenKind::Const
                | TokenKind::Global
                | TokenKind::Type
                | TokenKind::Table
                | TokenKind::Data
                | TokenKind::Import
                | TokenKind::Export
                | TokenKind::Inline
                | TokenKind::Func
                | TokenKind::Var
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Return
                | TokenKind::Struct
                | TokenKind::Sizeof
                | TokenKind::Void
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(lit) => write!(f, "{lit}"),
            TokenKind::Str(bytes) => write!(f, "\"{}\"", String::from_utf8_lossy(bytes)),
            TokenKind::Identifier(s) => f.write_str(s),
            TokenKind::Intrinsic(i) => f.write_str(i.name()),
            TokenKind::Const => f.write_str("const"),
            TokenKind::Global => f.write_str("global"),
            TokenKind::Type => f.write_str("type"),
            TokenKind::Table => f.write_str("table"),
            TokenKind::Data => f.write_str("data"),
            TokenKind::Import => f.write_str("import"),
            TokenKind::Export => f.write_str("export"),
            TokenKind::Inline => f.write_str("inline"),
            TokenKind::Func => f.write_str("func"),
            TokenKind::Var => f.write_str("var"),
            TokenKind::If => f.write_str("if"),
            TokenKind::Else => f.write_str("else"),
            TokenKind::While => f.write_str("while"),
            TokenKind::Do => f.write_str("do"),
            TokenKind::Break => f.write_str("break"),
            TokenKind::Continue => f.write_str("continue"),
            TokenKind::Return => f.write_str("return"),
            TokenKind::Struct => f.write_str("struct"),
            TokenKind::Sizeof => f.write_str("sizeof"),
            TokenKind::Void => f.write_str("void"),
            TokenKind::Plus => f.write_str("+"),
            TokenKind::Minus => f.write_str("-"),
            TokenKind::Star => f.write_str("*"),
            TokenKind::Slash => f.write_str("/"),
            TokenKind::Percent => f.write_str("%"),
            TokenKind::Amp => f.write_str("&"),
            TokenKind::Pipe => f.write_str("|"),
            TokenKind::Caret => f.write_str("^"),
            TokenKind::Tilde => f.write_str("~"),
            TokenKind::Bang => f.write_str("!"),
            TokenKind::Shl => f.write_str("<<"),
            TokenKind::Shr => f.write_str(">>"),
            TokenKind::ShrU => f.write_str(">>>"),
            TokenKind::EqEq => f.write_str("=="),
            TokenKind::BangEq => f.write_str("!="),
            TokenKind::Less => f.write_str("<"),
            TokenKind::LessEq => f.write_str("<="),
            TokenKind::Greater => f.write_str(">"),
            TokenKind::GreaterEq => f.write_str(">="),
            TokenKind::Question => f.write_str("?"),
            TokenKind::Eq => f.write_str("="),
            TokenKind::PlusEq => f.write_str("+="),
            TokenKind::MinusEq => f.write_str("-="),
            TokenKind::StarEq => f.write_str("*="),
            TokenKind::SlashEq => f.write_str("/="),
            TokenKind::PercentEq => f.write_str("%="),
            TokenKind::AmpEq => f.write_str("&="),
            TokenKind::PipeEq => f.write_str("|="),
            TokenKind::CaretEq => f.write_str("^="),
            TokenKind::ShlEq => f.write_str("<<="),
            TokenKind::ShrEq => f.write_str(">>="),
            TokenKind::ShrUEq => f.write_str(">>>="),
            TokenKind::Colon => f.write_str(":"),
            TokenKind::Semicolon => f.write_str(";"),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Dot => f.write_str("."),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::LBracket => f.write_str("["),
            TokenKind::RBracket => f.write_str("]"),
            TokenKind::LBrace => f.write_str("{"),
            TokenKind::RBrace => f.write_str("}"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

//! lowc lexer: converts preprocessed source chunks into a token stream.

pub mod chunk;
pub mod lexer;
pub mod token;

pub use chunk::{unescape, EscapeError, SourceChunk};
pub use lexer::{lex_source, LexResult, Lexer};
pub use token::{Token, TokenKind, ALL_KEYWORDS};

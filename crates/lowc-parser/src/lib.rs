//! lowc parser: converts a token stream into a declaration table.

mod parse_decl;
mod parse_expr;
mod parse_stmt;
mod parse_type;
mod parser;

pub use parser::{parse_source, ParseError, ParseResult, Parser, PResult, MAX_NESTING};

//! `#if` / `#elseif` condition grammar.
//!
//! ```text
//! or    := xor { ("|" | "||") xor }
//! xor   := and { "^" and }
//! and   := not { ("&" | "&&") not }
//! not   := "!" not | group
//! group := "(" or ")" | IDENT | NUMBER
//! ```
//!
//! Undefined symbols are false. Numbers are true when non-zero. Doubled
//! operators must be written without space between them.

use std::collections::HashSet;

use lowc_lexer::{Token, TokenKind};
use lowc_types::ast::Literal;
use lowc_types::{Diagnostic, ErrorCode};

/// Deepest allowed nesting of `!` and `(` in one condition.
const MAX_CONDITION_DEPTH: u32 = 64;

pub(crate) struct Condition<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: u32,
    symbols: &'t HashSet<String>,
}

impl<'t> Condition<'t> {
    /// Evaluate a full condition. `tokens` must end with `Eof`.
    pub(crate) fn evaluate(
        tokens: &'t [Token],
        symbols: &'t HashSet<String>,
    ) -> lowc_types::Result<bool> {
        let mut cond = Condition {
            tokens,
            pos: 0,
            depth: 0,
            symbols,
        };
        let value = cond.parse_or()?;
        match cond.peek() {
            TokenKind::Eof => Ok(value),
            other => Err(cond.error(format!("unexpected '{other}' in condition"))),
        }
    }

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Consume `kind`, then a second adjacent `kind` if doubled (`&&`, `||`).
    fn eat_operator(&mut self, kind: &TokenKind) -> bool {
        if self.peek() != kind {
            return false;
        }
        let end = self.tokens[self.pos].span.end;
        self.advance();
        let doubled = self
            .tokens
            .get(self.pos)
            .is_some_and(|t| &t.kind == kind && t.span.start == end);
        if doubled {
            self.advance();
        }
        true
    }

    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> lowc_types::Result<bool>,
    ) -> lowc_types::Result<bool> {
        if self.depth >= MAX_CONDITION_DEPTH {
            return Err(self.error(format!(
                "condition nests deeper than {MAX_CONDITION_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn error(&self, message: String) -> Diagnostic {
        let span = self
            .tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_default();
        Diagnostic::new(ErrorCode::MALFORMED_CONDITION, message, span)
    }

    fn parse_or(&mut self) -> lowc_types::Result<bool> {
        let mut value = self.parse_xor()?;
        while self.eat_operator(&TokenKind::Pipe) {
            let rhs = self.parse_xor()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn parse_xor(&mut self) -> lowc_types::Result<bool> {
        let mut value = self.parse_and()?;
        while self.peek() == &TokenKind::Caret {
            self.advance();
            let rhs = self.parse_and()?;
            value ^= rhs;
        }
        Ok(value)
    }

    fn parse_and(&mut self) -> lowc_types::Result<bool> {
        let mut value = self.parse_not()?;
        while self.eat_operator(&TokenKind::Amp) {
            let rhs = self.parse_not()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn parse_not(&mut self) -> lowc_types::Result<bool> {
        if self.peek() == &TokenKind::Bang {
            self.advance();
            return self.nested(|c| c.parse_not().map(|v| !v));
        }
        self.parse_group()
    }

    fn parse_group(&mut self) -> lowc_types::Result<bool> {
        match self.peek().clone() {
            TokenKind::LParen => {
                self.advance();
                self.nested(|c| {
                    let value = c.parse_or()?;
                    if c.peek() != &TokenKind::RParen {
                        return Err(c.error("expected ')' in condition".to_string()));
                    }
                    c.advance();
                    Ok(value)
                })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(self.symbols.contains(&name))
            }
            TokenKind::Number(lit) => {
                self.advance();
                Ok(match lit {
                    Literal::Integer(v) => v != 0,
                    Literal::BigInteger(v) => v != 0,
                    Literal::Real(v) => v != 0.0,
                })
            }
            TokenKind::Eof => Err(self.error("condition ends unexpectedly".to_string())),
            other => Err(self.error(format!("unexpected '{other}' in condition"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lowc_lexer::lex_source;

    fn eval(text: &str, defined: &[&str]) -> Result<bool, ErrorCode> {
        let symbols: HashSet<String> = defined.iter().map(|s| s.to_string()).collect();
        let tokens = lex_source(text, 0).tokens;
        Condition::evaluate(&tokens, &symbols).map_err(|d| d.code)
    }

    #[test]
    fn test_identifier_lookup() {
        assert_eq!(eval("A", &["A"]), Ok(true));
        assert_eq!(eval("B", &["A"]), Ok(false));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        // A | (B & C)
        assert_eq!(eval("A | B & C", &["A"]), Ok(true));
        assert_eq!(eval("(A | B) & C", &["A"]), Ok(false));
    }

    #[test]
    fn test_xor_between_or_and_and() {
        // (A ^ B) | C
        assert_eq!(eval("A ^ B | C", &["A", "B"]), Ok(false));
        assert_eq!(eval("A ^ B | C", &["A", "B", "C"]), Ok(true));
        // A ^ (B & C)
        assert_eq!(eval("A ^ B & C", &["A", "B"]), Ok(true));
    }

    #[test]
    fn test_doubled_operators() {
        assert_eq!(eval("A && !B || C", &["A"]), Ok(true));
        assert_eq!(eval("!!A", &["A"]), Ok(true));
        assert_eq!(eval("A||B", &["B"]), Ok(true));
    }

    #[test]
    fn test_split_doubled_operator_is_malformed() {
        assert_eq!(eval("A & & B", &["A", "B"]), Err(ErrorCode::MALFORMED_CONDITION));
        assert_eq!(eval("A | | B", &["A"]), Err(ErrorCode::MALFORMED_CONDITION));
        assert_eq!(eval("A & !B", &["A"]), Ok(true));
    }

    #[test]
    fn test_nesting_depth_is_limited() {
        let deep = MAX_CONDITION_DEPTH as usize;
        let fits = format!("{}A{}", "(".repeat(deep), ")".repeat(deep));
        assert_eq!(eval(&fits, &["A"]), Ok(true));
        let nots = format!("{}A", "!".repeat(deep));
        assert_eq!(eval(&nots, &["A"]), Ok(true));

        let parens = format!("{}A{}", "(".repeat(100_000), ")".repeat(100_000));
        assert_eq!(eval(&parens, &["A"]), Err(ErrorCode::MALFORMED_CONDITION));
        let nots = format!("{}A", "!".repeat(100_000));
        assert_eq!(eval(&nots, &["A"]), Err(ErrorCode::MALFORMED_CONDITION));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(eval("0", &[]), Ok(false));
        assert_eq!(eval("1 & A", &["A"]), Ok(true));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(eval("", &[]), Err(ErrorCode::MALFORMED_CONDITION));
        assert_eq!(eval("(A", &[]), Err(ErrorCode::MALFORMED_CONDITION));
        assert_eq!(eval("A B", &[]), Err(ErrorCode::MALFORMED_CONDITION));
        assert_eq!(eval("A |", &[]), Err(ErrorCode::MALFORMED_CONDITION));
    }
}

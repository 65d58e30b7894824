//! Lexer tests: keywords, operators, numeric literal forms, strings,
//! comments, error recovery and literal-value properties.

use lowc_lexer::{lex_source, TokenKind, ALL_KEYWORDS};
use lowc_types::ast::{Intrinsic, Literal, LiteralForm};
use lowc_types::ErrorCode;
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Lex source text and return just the token kinds (excluding final Eof).
fn kinds(source: &str) -> Vec<TokenKind> {
    lex_source(source, 0)
        .tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

/// Lex a single literal and return it.
fn literal(source: &str) -> Literal {
    let result = lex_source(source, 0);
    assert!(
        !result.errors.has_errors(),
        "{source}: {:?}",
        result.errors.errors
    );
    match &result.tokens[0].kind {
        TokenKind::Number(lit) => *lit,
        other => panic!("expected number, got {other:?}"),
    }
}

/// Lex and return the codes of all errors.
fn error_codes(source: &str) -> Vec<ErrorCode> {
    lex_source(source, 0).errors.codes()
}

// ─────────────────────────────────────────────────────────────────────
// Keywords & identifiers
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_all_keywords() {
    for kw in ALL_KEYWORDS {
        let k = kinds(kw);
        assert_eq!(k.len(), 1, "{kw}");
        assert!(k[0].is_keyword(), "{kw} should lex as a keyword");
    }
}

#[test]
fn test_intrinsic_type_names() {
    assert_eq!(
        kinds("i8 u64 f32"),
        vec![
            TokenKind::Intrinsic(Intrinsic::I8),
            TokenKind::Intrinsic(Intrinsic::U64),
            TokenKind::Intrinsic(Intrinsic::F32),
        ]
    );
}

#[test]
fn test_identifiers_with_underscores_and_digits() {
    assert_eq!(
        kinds("_tmp x1 void_ptr"),
        vec![
            TokenKind::Identifier("_tmp".into()),
            TokenKind::Identifier("x1".into()),
            TokenKind::Identifier("void_ptr".into()),
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Numeric literals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_decimal_with_separators() {
    assert_eq!(
        literal("123_456_678_912_345"),
        Literal::Integer(123_456_678_912_345)
    );
}

#[test]
fn test_binary_all_ones_is_big_integer() {
    let lit = literal(
        "0b11111111_11111111_11111111_11111111_11111111_11111111_11111111_11111111",
    );
    assert_eq!(lit, Literal::BigInteger(0xffff_ffff_ffff_ffff));
    assert_eq!(lit.form(), LiteralForm::BigInteger);
}

#[test]
fn test_hex_literals() {
    assert_eq!(literal("0xff"), Literal::Integer(255));
    assert_eq!(literal("0XDEAD_BEEF"), Literal::Integer(0xdead_beef));
    assert_eq!(
        literal("0x8000_0000_0000_0000"),
        Literal::BigInteger(0x8000_0000_0000_0000)
    );
}

#[test]
fn test_i64_max_stays_native() {
    assert_eq!(
        literal("9223372036854775807"),
        Literal::Integer(i64::MAX)
    );
    assert_eq!(
        literal("9223372036854775808").form(),
        LiteralForm::BigInteger
    );
}

#[test]
fn test_real_literals() {
    assert_eq!(literal("3.25"), Literal::Real(3.25));
    assert_eq!(literal("1e3"), Literal::Real(1000.0));
    assert_eq!(literal("2.5E-1"), Literal::Real(0.25));
    assert_eq!(literal("1_000.000_5"), Literal::Real(1000.0005));
    assert_eq!(literal("6e+2"), Literal::Real(600.0));
}

#[test]
fn test_malformed_numbers() {
    assert_eq!(error_codes("0x"), vec![ErrorCode::MALFORMED_NUMBER]);
    assert_eq!(error_codes("0b102"), vec![ErrorCode::MALFORMED_NUMBER]);
    assert_eq!(error_codes("12abc"), vec![ErrorCode::MALFORMED_NUMBER]);
}

#[test]
fn test_literal_beyond_128_bits() {
    assert_eq!(
        error_codes("0x1_0000_0000_0000_0000_0000_0000_0000_0000"),
        vec![ErrorCode::LITERAL_TOO_LARGE]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Strings
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_string_escapes() {
    assert_eq!(
        kinds(r#""a\n\x01\"""#),
        vec![TokenKind::Str(vec![b'a', b'\n', 1, b'"'])]
    );
}

#[test]
fn test_invalid_escape_position() {
    let result = lex_source(r#"x = "ab\q";"#, 0);
    assert_eq!(result.errors.codes(), vec![ErrorCode::INVALID_ESCAPE]);
    let span = result.errors.errors[0].span;
    assert_eq!(span.start_col, 8);
    assert_eq!(span.end_col, 10);
}

#[test]
fn test_unterminated_string() {
    assert_eq!(
        error_codes("\"abc\nx"),
        vec![ErrorCode::UNTERMINATED_STRING]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Comments & error recovery
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unterminated_block_comment() {
    assert_eq!(
        error_codes("a /* never closed"),
        vec![ErrorCode::UNTERMINATED_COMMENT]
    );
}

#[test]
fn test_unexpected_characters_recover() {
    let result = lex_source("a @ b $ c", 0);
    assert_eq!(
        result.errors.codes(),
        vec![ErrorCode::UNEXPECTED_CHARACTER, ErrorCode::UNEXPECTED_CHARACTER]
    );
    let idents = result
        .tokens
        .iter()
        .filter(|t| matches!(t.kind, TokenKind::Identifier(_)))
        .count();
    assert_eq!(idents, 3);
}

#[test]
fn test_error_cap() {
    let source = "@ ".repeat(40);
    let result = lex_source(&source, 0);
    assert_eq!(result.errors.errors.len(), 20);
    assert_eq!(result.tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
}

#[test]
fn test_lexing_is_deterministic() {
    let source = "func f(a: i32): i32 { return a >>> 3 + 0x10; }";
    let first = lex_source(source, 0).tokens;
    for _ in 0..100 {
        assert_eq!(lex_source(source, 0).tokens, first);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Literal-value properties
// ─────────────────────────────────────────────────────────────────────

/// Insert `_` after every `group` digits.
fn with_separators(digits: &str, group: usize) -> String {
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && i % group == 0 {
            out.push('_');
        }
        out.push(c);
    }
    out
}

proptest! {
    #[test]
    fn prop_integer_literals_round_trip(value in any::<u128>(), group in 1usize..8) {
        let expected = Literal::from_u128(value);
        prop_assert_eq!(literal(&value.to_string()), expected);
        prop_assert_eq!(literal(&with_separators(&value.to_string(), group)), expected);
        prop_assert_eq!(literal(&format!("0x{value:x}")), expected);
        prop_assert_eq!(literal(&format!("0b{}", with_separators(&format!("{value:b}"), group))), expected);
    }

    #[test]
    fn prop_literal_form_follows_magnitude(value in any::<u64>()) {
        let form = literal(&value.to_string()).form();
        if value <= i64::MAX as u64 {
            prop_assert_eq!(form, LiteralForm::Integer);
        } else {
            prop_assert_eq!(form, LiteralForm::BigInteger);
        }
    }

    #[test]
    fn prop_real_literals_round_trip(value in 0.0f64..1.0e12) {
        let text = format!("{value:e}");
        prop_assert_eq!(literal(&text), Literal::Real(value));
    }
}

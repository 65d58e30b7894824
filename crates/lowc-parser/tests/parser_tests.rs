//! Parser integration tests: whole programs, error recovery and limits.

use lowc_parser::{parse_source, ParseResult};
use lowc_types::ast::{DeclKind, ExprKind, StmtKind, TypeSpecKind};
use lowc_types::{ErrorCode, MAX_ERRORS};
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn parse_ok(source: &str) -> ParseResult {
    let result = parse_source(source);
    assert!(
        !result.errors.has_errors(),
        "unexpected errors: {:?}",
        result.errors.errors
    );
    result
}

fn codes(source: &str) -> Vec<ErrorCode> {
    parse_source(source).errors.codes()
}

// ─────────────────────────────────────────────────────────────────────
// Programs
// ─────────────────────────────────────────────────────────────────────

const LIST: &str = r#"
type Node = struct {
    value: i32;
    next: Node*;
};

const LIMIT: u32 = 4 * 1024;
global count: i32 = 0;
table ops = [add, sub];
data 64: u16 = [1, 2, 3];

import "env" func log(v: i32);

func add(a: i32, b: i32): i32 { return a + b; }
func sub(a: i32, b: i32): i32 { return a - b; }

export func sum(list: Node*): i32 {
    var total: i32 = 0;
    while (list != 0) {
        total += list.value;
        list = list.next;
    }
    log(total);
    return ops[0](total, 1);
}
"#;

#[test]
fn test_full_program() {
    let result = parse_ok(LIST);
    let names: Vec<&str> = result
        .declarations
        .iter()
        .map(|d| d.name.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["Node", "LIMIT", "count", "ops", ".data0", "log", "add", "sub", "sum"]
    );

    let node = result.declarations.get("Node").unwrap();
    let DeclKind::Type { spec } = &node.kind else {
        panic!("expected type");
    };
    assert!(matches!(spec.kind, TypeSpecKind::Struct(ref fields) if fields.len() == 2));

    let sum = result.declarations.get("sum").unwrap().as_function().unwrap();
    assert!(sum.exported);
    assert_eq!(sum.body.len(), 4);
    let StmtKind::Return(Some(value)) = &sum.body[3].kind else {
        panic!("expected return");
    };
    assert!(matches!(
        value.kind,
        ExprKind::FunctionCall {
            dispatcher: Some(_),
            ..
        }
    ));
}

#[test]
fn test_declaration_spans() {
    let result = parse_ok("\n\nconst A = 1;");
    let decl = result.declarations.get("A").unwrap();
    assert_eq!(decl.span.start_line, 3);
    assert_eq!(decl.span.start_col, 1);
    assert_eq!(decl.span.end_col, 13);
}

#[test]
fn test_single_statement_function_body() {
    let result = parse_ok("func one(): i32 return 1;");
    let one = result.declarations.get("one").unwrap().as_function().unwrap();
    assert_eq!(one.body.len(), 1);
}

// ─────────────────────────────────────────────────────────────────────
// Diagnostics & recovery
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unterminated_call_reports_once() {
    assert_eq!(
        codes("func f() { myCall( }"),
        vec![ErrorCode::UNTERMINATED_ARGUMENT_LIST]
    );
}

#[test]
fn test_duplicate_declaration() {
    let result = parse_source("const a = 1;\nconst a = 2;");
    assert_eq!(result.errors.codes(), vec![ErrorCode::DUPLICATE_DECLARATION]);
    assert_eq!(result.errors.errors[0].span.start_line, 2);
    assert_eq!(result.declarations.len(), 1);
}

#[test]
fn test_reserved_builtin_names() {
    assert_eq!(codes("func sqrt() {}"), vec![ErrorCode::RESERVED_NAME]);
    assert_eq!(
        codes("func f() { var min = 1; }"),
        vec![ErrorCode::RESERVED_NAME]
    );
    assert_eq!(
        codes("func f(abs: i32) {}"),
        vec![ErrorCode::RESERVED_NAME]
    );
}

#[test]
fn test_bad_declaration_is_skipped() {
    let result = parse_source("const = 1; func ok() {} 42; func ok2() {}");
    assert_eq!(
        result.errors.codes(),
        vec![ErrorCode::EXPECTED_IDENTIFIER, ErrorCode::UNEXPECTED_TOKEN]
    );
    assert!(result.declarations.contains("ok"));
    assert!(result.declarations.contains("ok2"));
}

#[test]
fn test_missing_closing_brace_is_fatal() {
    assert_eq!(
        codes("func f() { x = 1;"),
        vec![ErrorCode::UNEXPECTED_END_OF_INPUT]
    );
}

#[test]
fn test_lexer_errors_come_first() {
    assert_eq!(
        codes("func f() { @ x = 1 }"),
        vec![ErrorCode::UNEXPECTED_CHARACTER, ErrorCode::MISSING_SEMICOLON]
    );
}

#[test]
fn test_too_many_errors_stops_parsing() {
    let body = "1; ".repeat(40);
    let result = parse_source(&format!("func f() {{ {body} }}"));
    assert_eq!(result.errors.errors.len(), MAX_ERRORS);
    assert_eq!(
        result.errors.errors.last().map(|e| e.code),
        Some(ErrorCode::TOO_MANY_ERRORS)
    );
    assert!(result.errors.errors[..MAX_ERRORS - 1]
        .iter()
        .all(|e| e.code == ErrorCode::INVALID_EXPRESSION_STATEMENT));
}

#[test]
fn test_deep_nesting_is_rejected() {
    let source = format!(
        "func f(): i32 {{ return {}1{}; }}",
        "(".repeat(300),
        ")".repeat(300)
    );
    assert_eq!(codes(&source), vec![ErrorCode::NESTING_TOO_DEEP]);
}

// ─────────────────────────────────────────────────────────────────────
// Loop context
// ─────────────────────────────────────────────────────────────────────

/// A `break` wrapped in `depth` nested `if`s, optionally inside a loop.
fn nested_break(depth: usize, in_loop: bool) -> String {
    let mut body = "break;".to_string();
    for _ in 0..depth {
        body = format!("if (x) {{ {body} }} else {{ }}");
    }
    if in_loop {
        body = format!("while (1) {{ {body} }}");
    }
    format!("func f(x: i32) {{ {body} }}")
}

proptest! {
    #[test]
    fn prop_jump_requires_enclosing_loop(depth in 0usize..12, in_loop in any::<bool>()) {
        let found = codes(&nested_break(depth, in_loop));
        if in_loop {
            prop_assert!(found.is_empty(), "{:?}", found);
        } else {
            prop_assert_eq!(found, vec![ErrorCode::JUMP_OUTSIDE_LOOP]);
        }
    }

    #[test]
    fn prop_loop_context_does_not_leak_into_next_function(depth in 0usize..6) {
        let source = format!(
            "{} func g() {{ continue; }}",
            nested_break(depth, true)
        );
        prop_assert_eq!(codes(&source), vec![ErrorCode::JUMP_OUTSIDE_LOOP]);
    }
}

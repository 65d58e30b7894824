//! Preprocessor tests: symbol definition, conditional inclusion, includes
//! and directive diagnostics.

use lowc_lexer::SourceChunk;
use lowc_preprocessor::{IncludedSource, Preprocessor, MAX_INCLUDE_DEPTH};
use lowc_types::ErrorCode;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Concatenated text of the surviving chunks.
fn output(source: &str, symbols: &[&str]) -> String {
    let mut pp = Preprocessor::new().with_symbols(symbols.iter().copied());
    let chunks = pp
        .preprocess(source, 0)
        .unwrap_or_else(|| panic!("unexpected errors: {:?}", pp.errors().errors));
    chunks.iter().map(|c| c.text.as_str()).collect()
}

/// Error codes produced for `source`.
fn codes(source: &str) -> Vec<ErrorCode> {
    let mut pp = Preprocessor::new();
    let result = pp.preprocess(source, 0);
    assert!(result.is_none() || !pp.errors().has_errors());
    pp.errors().codes()
}

// ─────────────────────────────────────────────────────────────────────
// Symbols
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_define_twice_is_idempotent() {
    let mut pp = Preprocessor::new();
    pp.preprocess("#define X\n#define X\n", 0).unwrap();
    assert_eq!(pp.symbols(), vec!["X"]);
    pp.preprocess("#undef X\n", 0).unwrap();
    assert!(!pp.is_defined("X"));
}

#[test]
fn test_undef_unknown_symbol_is_noop() {
    let mut pp = Preprocessor::new().with_symbols(["A"]);
    assert!(pp.preprocess("#undef NEVER\n", 0).is_some());
    assert!(!pp.errors().has_errors());
    assert_eq!(pp.symbols(), vec!["A"]);
}

#[test]
fn test_predefined_symbols() {
    assert_eq!(output("#if DEBUG\nlog();\n#endif\n", &["DEBUG"]), "log();\n");
    assert_eq!(output("#if DEBUG\nlog();\n#endif\n", &[]), "");
}

// ─────────────────────────────────────────────────────────────────────
// Conditionals
// ─────────────────────────────────────────────────────────────────────

const CHAIN: &str = "\
#if A
a
#elseif B
b
#elseif C
c
#else
none
#endif
";

#[test]
fn test_elseif_chain_takes_first_true_branch() {
    assert_eq!(output(CHAIN, &["A", "B"]), "a\n");
    assert_eq!(output(CHAIN, &["B", "C"]), "b\n");
    assert_eq!(output(CHAIN, &["C"]), "c\n");
    assert_eq!(output(CHAIN, &[]), "none\n");
}

#[test]
fn test_nested_conditionals() {
    let src = "#if A\n#if B\nab\n#else\na\n#endif\n#else\nnot_a\n#endif\n";
    assert_eq!(output(src, &["A", "B"]), "ab\n");
    assert_eq!(output(src, &["A"]), "a\n");
    assert_eq!(output(src, &["B"]), "not_a\n");
}

#[test]
fn test_define_inside_inactive_region_is_skipped() {
    let src = "#if NOPE\n#define X\n#endif\n#if X\nx\n#endif\n";
    assert_eq!(output(src, &[]), "");
}

#[test]
fn test_condition_operators() {
    let src = "#if (A || B) && !C\nyes\n#endif\n";
    assert_eq!(output(src, &["B"]), "yes\n");
    assert_eq!(output(src, &["B", "C"]), "");
}

#[test]
fn test_indented_directives_and_trailing_comment() {
    let src = "  #if A // feature A\nx\n  #endif\n";
    assert_eq!(output(src, &["A"]), "x\n");
}

#[test]
fn test_chunks_keep_positions() {
    let mut pp = Preprocessor::new();
    let src = "one\n#if 1\ntwo\n#endif\nthree\n";
    let chunks = pp.preprocess(src, 4).unwrap();
    let positions: Vec<(u32, u32, u32)> = chunks
        .iter()
        .map(|c| (c.file, c.line, c.offset))
        .collect();
    assert_eq!(positions, vec![(4, 1, 0), (4, 3, 10), (4, 5, 21)]);
}

// ─────────────────────────────────────────────────────────────────────
// Directive diagnostics
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_directive() {
    assert_eq!(codes("#pragma once\n"), vec![ErrorCode::UNKNOWN_DIRECTIVE]);
}

#[test]
fn test_define_requires_identifier() {
    assert_eq!(codes("#define\n"), vec![ErrorCode::EXPECTED_SYMBOL]);
    assert_eq!(codes("#define 12\n"), vec![ErrorCode::EXPECTED_SYMBOL]);
}

#[test]
fn test_define_rejects_trailing_tokens() {
    assert_eq!(
        codes("#define X Y\n"),
        vec![ErrorCode::TRAILING_DIRECTIVE_TOKENS]
    );
    assert_eq!(
        codes("#if X\n#endif X\n"),
        vec![ErrorCode::TRAILING_DIRECTIVE_TOKENS]
    );
}

#[test]
fn test_malformed_condition() {
    assert_eq!(
        codes("#if A &&\n#endif\n"),
        vec![ErrorCode::MALFORMED_CONDITION]
    );
}

#[test]
fn test_deeply_nested_condition_is_malformed() {
    let depth = 200_000;
    let source = format!("#if {}A{}\n#endif\n", "(".repeat(depth), ")".repeat(depth));
    assert_eq!(codes(&source), vec![ErrorCode::MALFORMED_CONDITION]);
    assert_eq!(
        codes("#if A & & B\n#endif\n"),
        vec![ErrorCode::MALFORMED_CONDITION]
    );
}

#[test]
fn test_dangling_conditionals() {
    assert_eq!(codes("#endif\n"), vec![ErrorCode::UNMATCHED_CONDITIONAL]);
    assert_eq!(codes("#else\n"), vec![ErrorCode::UNMATCHED_CONDITIONAL]);
    assert_eq!(codes("#elseif A\n"), vec![ErrorCode::UNMATCHED_CONDITIONAL]);
}

#[test]
fn test_else_after_else() {
    assert_eq!(
        codes("#if A\n#else\n#else\n#endif\n"),
        vec![ErrorCode::DUPLICATE_ELSE]
    );
    assert_eq!(
        codes("#if A\n#else\n#elseif B\n#endif\n"),
        vec![ErrorCode::DUPLICATE_ELSE]
    );
}

#[test]
fn test_missing_endif() {
    let mut pp = Preprocessor::new();
    assert!(pp.preprocess("x\n#if A\ny\n", 0).is_none());
    let err = &pp.errors().errors[0];
    assert_eq!(err.code, ErrorCode::UNTERMINATED_CONDITIONAL);
    assert_eq!(err.span.start_line, 2);
}

// ─────────────────────────────────────────────────────────────────────
// Includes
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_include_is_tagged_with_file_index() {
    let mut resolver = |name: &str| {
        (name == "lib.lc").then(|| IncludedSource {
            source: "lib_code\n".to_string(),
            file_index: 7,
        })
    };
    let mut pp = Preprocessor::new().with_includes(&mut resolver);
    let chunks = pp
        .preprocess("before\n#include \"lib.lc\"\nafter\n", 0)
        .unwrap();
    let summary: Vec<(u32, &str)> = chunks.iter().map(|c| (c.file, c.text.as_str())).collect();
    assert_eq!(
        summary,
        vec![(0, "before\n"), (7, "lib_code\n"), (0, "after\n")]
    );
}

#[test]
fn test_included_defines_are_visible() {
    let mut resolver = |_: &str| {
        Some(IncludedSource {
            source: "#define FROM_LIB\n".to_string(),
            file_index: 1,
        })
    };
    let mut pp = Preprocessor::new().with_includes(&mut resolver);
    let chunks: Vec<SourceChunk> = pp
        .preprocess("#include \"x\"\n#if FROM_LIB\nok\n#endif\n", 0)
        .unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "ok\n");
}

#[test]
fn test_include_not_found() {
    let mut resolver = |_: &str| -> Option<IncludedSource> { None };
    let mut pp = Preprocessor::new().with_includes(&mut resolver);
    assert!(pp.preprocess("#include \"missing.lc\"\n", 0).is_none());
    assert_eq!(pp.errors().codes(), vec![ErrorCode::INCLUDE_NOT_FOUND]);
}

#[test]
fn test_include_without_resolver() {
    assert_eq!(
        codes("#include \"a.lc\"\n"),
        vec![ErrorCode::INCLUDE_NOT_FOUND]
    );
}

#[test]
fn test_include_expects_string() {
    assert_eq!(codes("#include a\n"), vec![ErrorCode::EXPECTED_STRING]);
}

#[test]
fn test_recursive_include_hits_depth_limit() {
    let mut calls = 0usize;
    let mut resolver = |_: &str| {
        calls += 1;
        Some(IncludedSource {
            source: "#include \"self\"\n".to_string(),
            file_index: 1,
        })
    };
    let mut pp = Preprocessor::new().with_includes(&mut resolver);
    assert!(pp.preprocess("#include \"self\"\n", 0).is_none());
    assert_eq!(pp.errors().codes(), vec![ErrorCode::INCLUDE_TOO_DEEP]);
    drop(pp);
    assert_eq!(calls, MAX_INCLUDE_DEPTH);
}

#[test]
fn test_unbalanced_include_is_reported() {
    let mut resolver = |_: &str| {
        Some(IncludedSource {
            source: "#if A\n".to_string(),
            file_index: 1,
        })
    };
    let mut pp = Preprocessor::new().with_includes(&mut resolver);
    assert!(pp.preprocess("#include \"open\"\nx\n", 0).is_none());
    let err = &pp.errors().errors[0];
    assert_eq!(err.code, ErrorCode::UNTERMINATED_CONDITIONAL);
    assert_eq!(err.span.file, 1);
}

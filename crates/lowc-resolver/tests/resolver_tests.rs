//! Resolver integration tests: constants, data segments, emission order and
//! layout properties.

use lowc_resolver::{resolve, Ty, Types};
use lowc_types::ast::{ConstValue, DeclKind, DeclarationTable, TypeSpecKind};
use lowc_types::{CompileErrors, ErrorCode};
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn resolve_source(source: &str) -> (DeclarationTable, CompileErrors) {
    let mut parsed = lowc_parser::parse_source(source);
    assert!(
        !parsed.errors.has_errors(),
        "parse errors: {:?}",
        parsed.errors.errors
    );
    let errors = resolve(&mut parsed.declarations);
    (parsed.declarations, errors)
}

fn const_value(table: &DeclarationTable, name: &str) -> Option<ConstValue> {
    match &table.get(name)?.kind {
        DeclKind::Const { value, .. } => value.value,
        _ => None,
    }
}

fn codes(source: &str) -> Vec<ErrorCode> {
    resolve_source(source).1.codes()
}

// ─────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_typed_constants_fit_their_width() {
    let (table, errors) = resolve_source(
        "const A: u8 = -1;
         const B: i8 = 200;
         const C: u64 = 18446744073709551615;
         const D: f32 = 1 / 3.0;
         const E = 1 << 40;",
    );
    assert!(!errors.has_errors(), "{:?}", errors.errors);
    assert_eq!(const_value(&table, "A"), Some(ConstValue::Int(255)));
    assert_eq!(const_value(&table, "B"), Some(ConstValue::Int(-56)));
    assert_eq!(const_value(&table, "C"), Some(ConstValue::Int(u64::MAX as i128)));
    assert_eq!(
        const_value(&table, "D"),
        Some(ConstValue::Float((1.0f64 / 3.0) as f32 as f64))
    );
    assert_eq!(const_value(&table, "E"), Some(ConstValue::Int(1 << 40)));
}

#[test]
fn test_constant_out_of_range() {
    assert_eq!(codes("const A: u8 = 256;"), vec![ErrorCode::CONSTANT_OUT_OF_RANGE]);
    assert_eq!(codes("const A: i16 = -32769;"), vec![ErrorCode::CONSTANT_OUT_OF_RANGE]);
    assert_eq!(codes("const A: i32 = 1.5;"), vec![ErrorCode::TYPE_MISMATCH]);
}

#[test]
fn test_literal_wider_than_i128_is_out_of_range() {
    let (table, errors) = resolve_source("const X: u8 = 0xffffffff_ffffffff_ffffffff_ffffffff;");
    assert_eq!(errors.codes(), vec![ErrorCode::CONSTANT_OUT_OF_RANGE]);
    assert_eq!(const_value(&table, "X"), None);
    assert_eq!(
        const_value(&resolve_source("const Y = 0x7fffffff_ffffffff_ffffffff_ffffffff;").0, "Y"),
        Some(ConstValue::Int(i128::MAX))
    );
}

#[test]
fn test_constants_may_refer_forward() {
    let (table, errors) = resolve_source("const A = B * 2; const B = C + 1; const C = 20;");
    assert!(!errors.has_errors());
    assert_eq!(const_value(&table, "A"), Some(ConstValue::Int(42)));
}

#[test]
fn test_constant_cycle() {
    assert_eq!(
        codes("const A = B; const B = A + 1;"),
        vec![ErrorCode::DEPENDENCY_CYCLE]
    );
}

#[test]
fn test_non_constant_references() {
    assert_eq!(
        codes("global g: i32 = 1; const A = g;"),
        vec![ErrorCode::NOT_CONSTANT]
    );
    assert_eq!(codes("const A = missing;"), vec![ErrorCode::UNKNOWN_IDENTIFIER]);
    assert_eq!(codes("const A = 10 % (2 - 2);"), vec![ErrorCode::DIVISION_BY_ZERO]);
}

#[test]
fn test_sizeof_is_constant() {
    let (table, errors) = resolve_source(
        "type P = struct { a: u8; b: f64; next: P*; };
         const S = sizeof(P) * 2;",
    );
    assert!(!errors.has_errors());
    assert_eq!(const_value(&table, "S"), Some(ConstValue::Int(26)));
}

// ─────────────────────────────────────────────────────────────────────
// Globals, data, tables
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_global_initialisers_are_folded() {
    let (table, errors) = resolve_source("const K = 7; global g: u16 = K * 3;");
    assert!(!errors.has_errors());
    let DeclKind::Global { init: Some(init), .. } = &table.get("g").unwrap().kind else {
        panic!("expected global");
    };
    assert_eq!(init.value, Some(ConstValue::Int(21)));
}

#[test]
fn test_data_segment_bytes_truncate_per_element() {
    let (table, errors) =
        resolve_source("data 123 = [1, 2, 3, 20, 12345];\ndata 0: u16 = [1, 12345];");
    assert!(!errors.has_errors(), "{:?}", errors.errors);
    let bytes = |name: &str| match &table.get(name).unwrap().kind {
        DeclKind::Data { bytes, .. } => bytes.clone(),
        _ => panic!("expected data"),
    };
    assert_eq!(bytes(".data0"), vec![1, 2, 3, 20, 0x39]);
    assert_eq!(bytes(".data1"), vec![1, 0, 0x39, 0x30]);
}

#[test]
fn test_real_data_elements() {
    let (table, errors) = resolve_source("data 0: f32 = [1.5]; data 4: u8 = [2.5];");
    assert_eq!(errors.codes(), vec![ErrorCode::TYPE_MISMATCH]);
    let DeclKind::Data { bytes, .. } = &table.get(".data0").unwrap().kind else {
        panic!("expected data");
    };
    assert_eq!(bytes.as_slice(), &1.5f32.to_le_bytes());
}

#[test]
fn test_data_strings_are_stored_verbatim() {
    let (table, errors) = resolve_source("data 8 = \"hi\\n\";");
    assert!(!errors.has_errors());
    let DeclKind::Data { bytes, .. } = &table.get(".data0").unwrap().kind else {
        panic!("expected data");
    };
    assert_eq!(bytes.as_slice(), b"hi\n");
}

#[test]
fn test_data_offset_must_be_an_address() {
    assert_eq!(
        codes("data -4 = [1];"),
        vec![ErrorCode::CONSTANT_OUT_OF_RANGE]
    );
}

#[test]
fn test_table_functions_must_exist() {
    assert_eq!(
        codes("const c = 1; table t = [f, c]; func f() {}"),
        vec![ErrorCode::UNKNOWN_FUNCTION]
    );
}

// ─────────────────────────────────────────────────────────────────────
// Order and flags
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_emission_order_is_post_order() {
    let (table, errors) = resolve_source(
        "export func main(): i32 { return twice(LIMIT); }
         func twice(x: i32): i32 { return x * 2; }
         const LIMIT = BASE + 1;
         const BASE = 10;",
    );
    assert!(!errors.has_errors());
    let names: Vec<&str> = table.in_order().iter().map(|d| d.name.name.as_str()).collect();
    assert_eq!(names, vec!["twice", "BASE", "LIMIT", "main"]);
}

#[test]
fn test_missing_return_is_reported_at_the_name() {
    let (_, errors) = resolve_source("\nfunc f(): i32 { }");
    assert_eq!(errors.codes(), vec![ErrorCode::MISSING_RETURN]);
    assert_eq!(errors.errors[0].span.start_line, 2);
    assert_eq!(errors.errors[0].span.start_col, 6);
}

#[test]
fn test_resolved_flag() {
    let (table, _) = resolve_source("type A = struct { x: Missing; }; type B = u32;");
    assert!(!table.get("A").unwrap().resolved);
    assert!(table.get("B").unwrap().resolved);
}

// ─────────────────────────────────────────────────────────────────────
// Layout properties
// ─────────────────────────────────────────────────────────────────────

const SCALARS: [(&str, u32); 10] = [
    ("i8", 1),
    ("u8", 1),
    ("i16", 2),
    ("u16", 2),
    ("i32", 4),
    ("u32", 4),
    ("i64", 8),
    ("u64", 8),
    ("f32", 4),
    ("f64", 8),
];

proptest! {
    #[test]
    fn prop_struct_offsets_are_prefix_sums(
        fields in prop::collection::vec(0usize..SCALARS.len(), 1..12),
        pointer_at in prop::option::of(0usize..12),
    ) {
        let mut body = String::new();
        let mut expected_offsets = Vec::new();
        let mut total = 0u32;
        for (i, &field) in fields.iter().enumerate() {
            let (name, size) = if pointer_at == Some(i) {
                ("S*", 4)
            } else {
                SCALARS[field]
            };
            body.push_str(&format!("f{i}: {name}; "));
            expected_offsets.push(Some(total));
            total += size;
        }
        let (table, errors) = resolve_source(&format!("type S = struct {{ {body}}};"));
        prop_assert!(!errors.has_errors());

        let DeclKind::Type { spec } = &table.get("S").unwrap().kind else {
            panic!("expected type");
        };
        let TypeSpecKind::Struct(resolved) = &spec.kind else {
            panic!("expected struct");
        };
        let offsets: Vec<Option<u32>> = resolved.iter().map(|f| f.offset).collect();
        prop_assert_eq!(offsets, expected_offsets);
        prop_assert_eq!(spec.meta.size_of, Some(total));
        prop_assert_eq!(Types::new(&table).size_of(&Ty::Named("S".into())), total);
    }

    #[test]
    fn prop_array_size_is_element_times_length(index in 0usize..SCALARS.len(), length in 1u32..500) {
        let (name, size) = SCALARS[index];
        let (table, errors) = resolve_source(&format!("type A = {name}[{length}];"));
        prop_assert!(!errors.has_errors());
        let types = Types::new(&table);
        prop_assert_eq!(types.size_of(&Ty::Named("A".into())), size * length);
    }
}

#[test]
fn test_untyped_constants_in_bodies_are_folded() {
    let (table, errors) = resolve_source(
        "const N = 4;
         func f(x: i32): i32 { return (N + 1) * x; }
         func g(N: i32): i32 { return N + 1; }",
    );
    assert!(!errors.has_errors());

    let body_value = |name: &str| {
        let function = table.get(name).unwrap().as_function().unwrap();
        let lowc_types::ast::StmtKind::Return(Some(expr)) = &function.body[0].kind else {
            panic!("expected return");
        };
        let lowc_types::ast::ExprKind::Binary { left, .. } = &expr.kind else {
            panic!("expected binary");
        };
        (expr.value, left.value)
    };
    assert_eq!(body_value("f"), (None, Some(ConstValue::Int(5))));
    // A parameter shadows the constant.
    assert_eq!(body_value("g"), (None, None));
}

//! End-to-end pipeline tests.
//!
//! Tests verify the full pipeline: source → preprocess → lex → parse →
//! resolve → emit → module text, then assemble the text and run the
//! exported functions under `wasmi`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use lowc_compiler::{
    compile_to_result, source_hash, CompileOptions, CompileResult, Compiler, ErrorCode,
    IncludedSource, Instruction,
};

// ══════════════════════════════════════════════════════════════════════════════
// Sources
// ══════════════════════════════════════════════════════════════════════════════

const ARITHMETIC: &str = r#"
export func fact(n: i32): i32 {
    var acc: i32 = 1;
    while (n > 1) {
        acc *= n;
        n -= 1;
    }
    return acc;
}

export func fib(n: i32): i32 {
    if (n < 2) {
        return n;
    }
    return fib(n - 1) + fib(n - 2);
}

export func sdiv(a: i32, b: i32): i32 { return a / b; }
export func udiv(a: u32, b: u32): u32 { return a / b; }

export func wrap8(x: i32): i32 {
    var b: u8 = u8(x);
    b += 1;
    return i32(b);
}
"#;

const MEMORY: &str = r#"
type Point = struct {
    x: i32;
    y: i16;
};

data 64: i32 = [10, 20, 30, 40];

export func store(p: Point*): i32 {
    p.x = 7;
    p.y = -1;
    return p.x + i32(p.y);
}

export func total(): i32 {
    var p: i32* = 64;
    var last: i32* = p + 4;
    var sum: i32 = 0;
    while (p < last) {
        sum += *p;
        p += 1;
    }
    return sum;
}
"#;

const DISPATCH: &str = r#"
import "env" func log(v: i32);

global counter: i32 = 0;

func add(a: i32, b: i32): i32 { return a + b; }
func mul(a: i32, b: i32): i32 { return a * b; }
table ops = [add, mul];

inline func square(x: i32): i32 { return x * x; }

export func apply(which: i32, a: i32, b: i32): i32 {
    counter += 1;
    log(counter);
    return ops[which](a, b);
}

export func hypot2(a: i32, b: i32): i32 {
    return square(a) + square(b);
}
"#;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Compile, panicking with the diagnostics on failure.
fn compile(source: &str) -> String {
    let mut compiler = Compiler::new(source);
    compiler.compile().unwrap_or_else(|| {
        panic!(
            "compilation failed:\n{}",
            compiler
                .errors()
                .errors
                .iter()
                .map(|e| format!("  {e}"))
                .collect::<Vec<_>>()
                .join("\n")
        )
    })
}

fn error_codes(source: &str) -> Vec<ErrorCode> {
    let mut compiler = Compiler::new(source);
    assert!(compiler.compile().is_none(), "expected compilation to fail");
    compiler.errors().codes()
}

fn assemble(text: &str) -> Vec<u8> {
    let bytes = wat::parse_str(text).unwrap_or_else(|e| panic!("invalid text: {e}\n{text}"));
    wasmparser::validate(&bytes).unwrap_or_else(|e| panic!("invalid module: {e}\n{text}"));
    bytes
}

/// Host state held by the wasmi Store.
#[derive(Default)]
struct HostState {
    /// Values passed to `env.log`.
    logs: Vec<i32>,
}

struct Runner {
    store: wasmi::Store<HostState>,
    instance: wasmi::Instance,
}

impl Runner {
    fn new(text: &str) -> Self {
        let bytes = assemble(text);
        let engine = wasmi::Engine::default();
        let module = wasmi::Module::new(&engine, &bytes[..]).expect("failed to parse module");
        let mut store = wasmi::Store::new(&engine, HostState::default());
        let mut linker = <wasmi::Linker<HostState>>::new(&engine);
        linker
            .func_wrap(
                "env",
                "log",
                |mut caller: wasmi::Caller<'_, HostState>, value: i32| {
                    caller.data_mut().logs.push(value);
                },
            )
            .expect("link log");
        let instance = linker
            .instantiate(&mut store, &module)
            .expect("instantiation failed")
            .start(&mut store)
            .expect("start failed");
        Self { store, instance }
    }

    fn call<P, R>(&mut self, name: &str, params: P) -> R
    where
        P: wasmi::WasmParams,
        R: wasmi::WasmResults,
    {
        let func = self
            .instance
            .get_typed_func::<P, R>(&self.store, name)
            .unwrap_or_else(|e| panic!("no export '{name}': {e}"));
        func.call(&mut self.store, params)
            .unwrap_or_else(|e| panic!("'{name}' trapped: {e}"))
    }

    fn memory(&self, start: usize, len: usize) -> Vec<u8> {
        let memory = self
            .instance
            .get_memory(&self.store, "memory")
            .expect("no memory export");
        memory.data(&self.store)[start..start + len].to_vec()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Execution
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_arithmetic_runs() {
    let mut runner = Runner::new(&compile(ARITHMETIC));
    assert_eq!(runner.call::<i32, i32>("fact", 5), 120);
    assert_eq!(runner.call::<i32, i32>("fact", 0), 1);
    assert_eq!(runner.call::<i32, i32>("fib", 10), 55);
    assert_eq!(runner.call::<(i32, i32), i32>("sdiv", (-7, 2)), -3);
    assert_eq!(runner.call::<(i32, i32), i32>("udiv", (-1, 2)), i32::MAX);
}

#[test]
fn test_sub_word_values_wrap() {
    let mut runner = Runner::new(&compile(ARITHMETIC));
    assert_eq!(runner.call::<i32, i32>("wrap8", 255), 0);
    assert_eq!(runner.call::<i32, i32>("wrap8", -2), 255);
    assert_eq!(runner.call::<i32, i32>("wrap8", 0x1234), 0x35);
}

#[test]
fn test_struct_fields_in_memory() {
    let mut runner = Runner::new(&compile(MEMORY));
    assert_eq!(runner.call::<i32, i32>("store", 32), 6);
    assert_eq!(runner.memory(32, 6), vec![7, 0, 0, 0, 0xff, 0xff]);
}

#[test]
fn test_pointer_walk_over_data() {
    let mut runner = Runner::new(&compile(MEMORY));
    assert_eq!(runner.memory(64, 4), vec![10, 0, 0, 0]);
    assert_eq!(runner.call::<(), i32>("total", ()), 100);
}

#[test]
fn test_indirect_calls_imports_and_globals() {
    let mut runner = Runner::new(&compile(DISPATCH));
    assert_eq!(runner.call::<(i32, i32, i32), i32>("apply", (0, 6, 7)), 13);
    assert_eq!(runner.call::<(i32, i32, i32), i32>("apply", (1, 6, 7)), 42);
    assert_eq!(runner.store.data().logs, vec![1, 2]);
}

#[test]
fn test_inline_function_runs_without_call() {
    let mut compiler = Compiler::new(DISPATCH);
    let text = compiler.compile().expect("compiles");
    let body = compiler
        .function_instructions("hypot2")
        .expect("hypot2 is emitted");
    assert!(!body
        .iter()
        .any(|i| matches!(i, Instruction::Call(name) if name == "square")));

    let mut runner = Runner::new(&text);
    assert_eq!(runner.call::<(i32, i32), i32>("hypot2", (3, 4)), 25);
}

// ══════════════════════════════════════════════════════════════════════════════
// Preprocessing
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_symbols_select_code() {
    let source = r#"
#if FAST
export func mode(): i32 { return 1; }
#else
export func mode(): i32 { return 2; }
#endif
"#;
    let fast = Compiler::new(source)
        .with_symbols(["FAST"])
        .compile()
        .expect("compiles with FAST");
    assert_eq!(Runner::new(&fast).call::<(), i32>("mode", ()), 1);

    let slow = Compiler::new(source).compile().expect("compiles without FAST");
    assert_eq!(Runner::new(&slow).call::<(), i32>("mode", ()), 2);
}

#[test]
fn test_includes_are_resolved() {
    let files = HashMap::from([(
        "util.lc".to_string(),
        "func twice(x: i32): i32 { return x + x; }\n".to_string(),
    )]);
    let requested = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&requested);
    let mut compiler = Compiler::new(
        "#include \"util.lc\"\nexport func four(): i32 { return twice(2); }\n",
    )
    .with_includes(move |name: &str| {
        seen.borrow_mut().push(name.to_string());
        files.get(name).map(|source| IncludedSource {
            source: source.clone(),
            file_index: 1,
        })
    });
    let text = compiler.compile().expect("compiles");
    assert_eq!(*requested.borrow(), vec!["util.lc".to_string()]);
    assert_eq!(Runner::new(&text).call::<(), i32>("four", ()), 4);
}

#[test]
fn test_errors_in_includes_carry_file_index() {
    let mut compiler = Compiler::new("#include \"bad.lc\"\n").with_includes(|_: &str| {
        Some(IncludedSource {
            source: "func broken(: i32 {}\n".to_string(),
            file_index: 3,
        })
    });
    assert!(compiler.compile().is_none());
    let first = &compiler.errors().errors[0];
    assert_eq!(first.span.file, 3);
    assert_eq!(first.span.start_line, 1);
}

#[test]
fn test_missing_include_stops_pipeline() {
    let mut compiler = Compiler::new("#include \"nowhere.lc\"\nfunc f() {}\n");
    assert!(compiler.compile().is_none());
    assert_eq!(compiler.errors().codes(), vec![ErrorCode::INCLUDE_NOT_FOUND]);
    assert!(compiler.declarations().is_none());
}

// ══════════════════════════════════════════════════════════════════════════════
// Options
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_comments_add_header() {
    let source = "export func one(): i32 { return 1; }";
    let mut compiler = Compiler::new(source).with_options(CompileOptions {
        emit_comments: true,
        ..Default::default()
    });
    let text = compiler.compile().expect("compiles");
    let header = format!(
        ";; lowc {} source sha256 {}\n",
        lowc_compiler::version(),
        source_hash(source)
    );
    assert!(text.starts_with(&header), "{text}");
    assert!(text.contains(";; func one (line 1)"));
    assemble(&text);
}

#[test]
fn test_memory_options() {
    let mut compiler = Compiler::new("export func one(): i32 { return 1; }").with_options(
        CompileOptions {
            memory_pages: 2,
            memory_export: Some("heap".to_string()),
            ..Default::default()
        },
    );
    let text = compiler.compile().expect("compiles");
    assert!(text.contains("(memory $memory 2)"));
    assert!(text.contains("(export \"heap\" (memory $memory))"));
}

#[test]
fn test_traces_cover_every_stage() {
    let mut compiler = Compiler::new(DISPATCH).with_options(CompileOptions {
        trace: true,
        ..Default::default()
    });
    compiler.compile().expect("compiles");
    let traces = compiler.traces();
    assert!(traces.iter().any(|t| t.starts_with("preprocessed")));
    assert!(traces.iter().any(|t| t.starts_with("lexed")));
    assert!(traces.iter().any(|t| t.starts_with("parsed")));
    assert!(traces.iter().any(|t| t == "inlined 'square' into 'hypot2'"));
}

#[test]
fn test_options_deserialize_with_defaults() {
    let options: CompileOptions =
        serde_json::from_str(r#"{ "emit_comments": true }"#).expect("valid options");
    assert!(options.emit_comments);
    assert_eq!(options.memory_pages, 1);
    assert_eq!(options.memory_export.as_deref(), Some("memory"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_empty_source_is_empty_module() {
    let text = compile("");
    assert_eq!(
        text,
        "(module\n  (memory $memory 1)\n  (export \"memory\" (memory $memory))\n)\n"
    );
    assemble(&text);
}

#[test]
fn test_parse_errors_stop_before_resolution() {
    let mut compiler = Compiler::new("func f(): i32 { return 1 }\nfunc g(): Missing { }\n");
    assert!(compiler.compile().is_none());
    let codes = compiler.errors().codes();
    assert!(codes.contains(&ErrorCode::MISSING_SEMICOLON), "{codes:?}");
    assert!(!codes.contains(&ErrorCode::UNKNOWN_TYPE), "{codes:?}");
    assert!(compiler.declarations().is_some());
}

#[test]
fn test_resolution_errors_reported() {
    assert!(error_codes("global g: Missing;").contains(&ErrorCode::UNKNOWN_TYPE));
    assert!(error_codes("const c: i8 = 300;").contains(&ErrorCode::CONSTANT_OUT_OF_RANGE));
}

#[test]
fn test_emission_errors_reported() {
    let codes = error_codes("export func f(): i32 { return g(); }");
    assert_eq!(codes, vec![ErrorCode::UNKNOWN_FUNCTION]);
}

#[test]
fn test_warnings_do_not_fail() {
    let mut compiler = Compiler::new("func unused() {}\nexport func used() {}\n");
    assert!(compiler.compile().is_some());
    assert!(!compiler.has_errors());
    assert_eq!(compiler.errors().warnings.len(), 1);
    assert_eq!(compiler.errors().warnings[0].code, ErrorCode::UNUSED_FUNCTION);
}

// ══════════════════════════════════════════════════════════════════════════════
// compile_to_result
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_compile_to_result_success() {
    let result = compile_to_result(ARITHMETIC, "arith.lc");
    assert!(result.success);
    assert!(result.output.is_some());
    assert!(!result.errors.has_errors());
    assert_eq!(result.source_hash, source_hash(ARITHMETIC));
}

#[test]
fn test_compile_to_result_failure() {
    let result = compile_to_result("export func f(): i32 { return x; }", "bad.lc");
    assert!(!result.success);
    assert!(result.output.is_none());
    assert!(result.errors.has_errors());
}

#[test]
fn test_compile_result_json() {
    let result = compile_to_result("export func f(): i32 { return 1.5; }", "f.lc");
    let json = serde_json::to_string(&result).expect("serializes");
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert_eq!(value["success"], false);
    let error = &value["errors"]["errors"][0];
    assert_eq!(error["code"], "W130");
    assert_eq!(error["line"], 1);
    assert_eq!(error["file_index"], 0);

    let back: CompileResult = serde_json::from_str(&json).expect("roundtrips");
    assert_eq!(back.errors.codes(), vec![ErrorCode::TYPE_MISMATCH]);
    assert_eq!(back.source_hash, result.source_hash);
}

//! Module text renderer.
//!
//! Purely syntactic: every decision about what to emit was made by the
//! emitter. Each nesting level indents by [`INDENT`]. Imports are printed
//! first, then the memory and table, then the remaining fields in the
//! order they were emitted.

use std::fmt::Write;

use crate::module::{
    Conversion, Field, Func, FuncType, Instruction, MemArg, Module, NumOp, ValType, Value,
};

pub const INDENT: &str = "  ";

/// Render a whole module.
pub fn render(module: &Module) -> String {
    let mut printer = Printer::default();
    printer.line(0, "(module");

    for field in &module.fields {
        if matches!(field, Field::FuncImport { .. }) {
            printer.field(field);
        }
    }
    if let Some(memory) = &module.memory {
        printer.line(1, &format!("(memory $memory {})", memory.pages));
        if let Some(export) = &memory.export {
            printer.line(1, &format!("(export {} (memory $memory))", quote(export)));
        }
    }
    if let Some(size) = module.table {
        printer.line(1, &format!("(table $table {size} funcref)"));
    }
    for field in &module.fields {
        if !matches!(field, Field::FuncImport { .. }) {
            printer.field(field);
        }
    }

    printer.line(0, ")");
    printer.out
}

/// Render an instruction list at the given nesting level.
pub fn render_instructions(instructions: &[Instruction], indent: usize) -> String {
    let mut printer = Printer::default();
    for instruction in instructions {
        printer.instruction(instruction, indent);
    }
    printer.out
}

/// Escape every byte as `\hh`.
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3 + 2);
    out.push('"');
    for byte in bytes {
        let _ = write!(out, "\\{byte:02x}");
    }
    out.push('"');
    out
}

// ══════════════════════════════════════════════════════════════════════════════
// Printer
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Printer {
    out: String,
}

impl Printer {
    fn line(&mut self, indent: usize, text: &str) {
        for _ in 0..indent {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Append to the last line, before its newline.
    fn close(&mut self) {
        if self.out.ends_with('\n') {
            self.out.pop();
        }
        self.out.push_str(")\n");
    }

    // ── Fields ────────────────────────────────────────────────────────────────

    fn field(&mut self, field: &Field) {
        match field {
            Field::FuncImport {
                module,
                field,
                name,
                ty,
            } => self.line(
                1,
                &format!(
                    "(import {} {} (func ${name}{}))",
                    quote(module),
                    quote(field),
                    signature(ty)
                ),
            ),
            Field::FuncExport { export, name } => {
                self.line(1, &format!("(export {} (func ${name}))", quote(export)))
            }
            Field::Element { offset, functions } => {
                let mut text = format!("(elem (i32.const {offset})");
                for function in functions {
                    let _ = write!(text, " ${function}");
                }
                text.push(')');
                self.line(1, &text);
            }
            Field::Global {
                name,
                ty,
                mutable,
                init,
            } => {
                let ty = if *mutable {
                    format!("(mut {ty})")
                } else {
                    ty.to_string()
                };
                self.line(1, &format!("(global ${name} {ty} ({}))", constant(*init)));
            }
            Field::TypeDef { name, ty } => {
                self.line(1, &format!("(type ${name} (func{}))", signature(ty)))
            }
            Field::Data { offset, bytes } => self.line(
                1,
                &format!("(data (i32.const {offset}) {})", escape_bytes(bytes)),
            ),
            Field::Func(func) => self.func(func),
            Field::Comment(text) => self.line(1, &format!(";; {text}")),
        }
    }

    fn func(&mut self, func: &Func) {
        let mut header = format!("(func ${}", func.name);
        for (name, ty) in &func.params {
            let _ = write!(header, " (param ${name} {ty})");
        }
        if let Some(result) = func.result {
            let _ = write!(header, " (result {result})");
        }
        self.line(1, &header);
        for (name, ty) in &func.locals {
            self.line(2, &format!("(local ${name} {ty})"));
        }
        for instruction in &func.body {
            self.instruction(instruction, 2);
        }
        self.line(1, ")");
    }

    // ── Instructions ──────────────────────────────────────────────────────────

    fn instruction(&mut self, instruction: &Instruction, indent: usize) {
        match instruction {
            Instruction::Block {
                label,
                result,
                body,
            }
            | Instruction::Loop {
                label,
                result,
                body,
            } => {
                let keyword = if matches!(instruction, Instruction::Block { .. }) {
                    "block"
                } else {
                    "loop"
                };
                self.line(indent, &format!("{keyword} ${label}{}", result_type(*result)));
                for inner in body {
                    self.instruction(inner, indent + 1);
                }
                self.line(indent, "end");
            }
            Instruction::If {
                result,
                then_body,
                else_body,
            } => {
                self.line(indent, &format!("if{}", result_type(*result)));
                for inner in then_body {
                    self.instruction(inner, indent + 1);
                }
                if let Some(else_body) = else_body {
                    self.line(indent, "else");
                    for inner in else_body {
                        self.instruction(inner, indent + 1);
                    }
                }
                self.line(indent, "end");
            }
            Instruction::Folded { .. } => self.inline(instruction, indent),
            Instruction::Comment(text) => self.line(indent, &format!(";; {text}")),
            flat => self.line(indent, &plain(flat)),
        }
    }

    /// Parenthesised form used for operands of a folded instruction.
    fn inline(&mut self, instruction: &Instruction, indent: usize) {
        match instruction {
            Instruction::Folded { head, operands } => {
                self.line(indent, &format!("({}", plain(head)));
                for operand in operands {
                    self.inline(operand, indent + 1);
                }
                self.close();
            }
            Instruction::Block {
                label,
                result,
                body,
            }
            | Instruction::Loop {
                label,
                result,
                body,
            } => {
                let keyword = if matches!(instruction, Instruction::Block { .. }) {
                    "block"
                } else {
                    "loop"
                };
                self.line(indent, &format!("({keyword} ${label}{}", result_type(*result)));
                for inner in body {
                    self.inline(inner, indent + 1);
                }
                self.close();
            }
            Instruction::If {
                result,
                then_body,
                else_body,
            } => {
                self.line(indent, &format!("(if{}", result_type(*result)));
                self.line(indent + 1, "(then");
                for inner in then_body {
                    self.inline(inner, indent + 2);
                }
                self.close();
                if let Some(else_body) = else_body {
                    self.line(indent + 1, "(else");
                    for inner in else_body {
                        self.inline(inner, indent + 2);
                    }
                    self.close();
                }
                self.close();
            }
            Instruction::Comment(text) => self.line(indent, &format!(";; {text}")),
            flat => self.line(indent, &format!("({})", plain(flat))),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Text of single instructions
// ══════════════════════════════════════════════════════════════════════════════

/// The one-line text of an instruction without children.
fn plain(instruction: &Instruction) -> String {
    match instruction {
        Instruction::Const(value) => constant(*value),
        Instruction::LocalGet(name) => format!("local.get ${name}"),
        Instruction::LocalSet(name) => format!("local.set ${name}"),
        Instruction::LocalTee(name) => format!("local.tee ${name}"),
        Instruction::GlobalGet(name) => format!("global.get ${name}"),
        Instruction::GlobalSet(name) => format!("global.set ${name}"),
        Instruction::Numeric { ty, op } => format!("{ty}.{}", numeric_name(*op, *ty)),
        Instruction::Convert { to, op } => conversion(*to, *op),
        Instruction::Load(arg) => memory_access("load", arg, true),
        Instruction::Store(arg) => memory_access("store", arg, false),
        Instruction::Call(name) => format!("call ${name}"),
        Instruction::CallIndirect(ty) => format!("call_indirect (type ${ty})"),
        Instruction::Br(label) => format!("br ${label}"),
        Instruction::BrIf(label) => format!("br_if ${label}"),
        Instruction::Return => "return".to_string(),
        Instruction::Drop => "drop".to_string(),
        Instruction::Unreachable => "unreachable".to_string(),
        Instruction::MemorySize => "memory.size".to_string(),
        Instruction::MemoryGrow => "memory.grow".to_string(),
        Instruction::Block { label, result, .. } => format!("block ${label}{}", result_type(*result)),
        Instruction::Loop { label, result, .. } => format!("loop ${label}{}", result_type(*result)),
        Instruction::If { result, .. } => format!("if{}", result_type(*result)),
        Instruction::Folded { head, .. } => plain(head),
        Instruction::Comment(text) => format!(";; {text}"),
    }
}

fn constant(value: Value) -> String {
    match value {
        Value::I32(v) => format!("i32.const {v}"),
        Value::I64(v) => format!("i64.const {v}"),
        Value::F32(v) => format!("f32.const {}", float_text(v as f64, v.is_nan(), || format!("{v:?}"))),
        Value::F64(v) => format!("f64.const {}", float_text(v, v.is_nan(), || format!("{v:?}"))),
    }
}

fn float_text(v: f64, nan: bool, finite: impl FnOnce() -> String) -> String {
    if nan {
        "nan".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        finite()
    }
}

fn numeric_name(op: NumOp, ty: ValType) -> String {
    let sign = |signed: bool| {
        if ty.is_float() {
            ""
        } else if signed {
            "_s"
        } else {
            "_u"
        }
    };
    let (base, suffix) = match op {
        NumOp::Add => ("add", ""),
        NumOp::Sub => ("sub", ""),
        NumOp::Mul => ("mul", ""),
        NumOp::Div { signed } => ("div", sign(signed)),
        NumOp::Rem { signed } => ("rem", sign(signed)),
        NumOp::And => ("and", ""),
        NumOp::Or => ("or", ""),
        NumOp::Xor => ("xor", ""),
        NumOp::Shl => ("shl", ""),
        NumOp::Shr { signed } => ("shr", sign(signed)),
        NumOp::Rotl => ("rotl", ""),
        NumOp::Rotr => ("rotr", ""),
        NumOp::Eq => ("eq", ""),
        NumOp::Ne => ("ne", ""),
        NumOp::Lt { signed } => ("lt", sign(signed)),
        NumOp::Le { signed } => ("le", sign(signed)),
        NumOp::Gt { signed } => ("gt", sign(signed)),
        NumOp::Ge { signed } => ("ge", sign(signed)),
        NumOp::Eqz => ("eqz", ""),
        NumOp::Clz => ("clz", ""),
        NumOp::Ctz => ("ctz", ""),
        NumOp::Popcnt => ("popcnt", ""),
        NumOp::Abs => ("abs", ""),
        NumOp::Neg => ("neg", ""),
        NumOp::Ceil => ("ceil", ""),
        NumOp::Floor => ("floor", ""),
        NumOp::Trunc => ("trunc", ""),
        NumOp::Nearest => ("nearest", ""),
        NumOp::Sqrt => ("sqrt", ""),
        NumOp::Min => ("min", ""),
        NumOp::Max => ("max", ""),
        NumOp::Copysign => ("copysign", ""),
        NumOp::Extend8 => ("extend8_s", ""),
        NumOp::Extend16 => ("extend16_s", ""),
    };
    format!("{base}{suffix}")
}

fn conversion(to: ValType, op: Conversion) -> String {
    let sign = |signed: bool| if signed { "s" } else { "u" };
    match op {
        Conversion::Wrap => format!("{to}.wrap_i64"),
        Conversion::Extend { signed } => format!("{to}.extend_i32_{}", sign(signed)),
        Conversion::Trunc { from, signed } => format!("{to}.trunc_{from}_{}", sign(signed)),
        Conversion::Convert { from, signed } => format!("{to}.convert_{from}_{}", sign(signed)),
        Conversion::Promote => format!("{to}.promote_f32"),
        Conversion::Demote => format!("{to}.demote_f64"),
    }
}

/// `T.load[8|16|32[_s|_u]] [offset=N] [align=N]`
fn memory_access(op: &str, arg: &MemArg, load: bool) -> String {
    let mut text = format!("{}.{op}", arg.ty);
    if let Some(bits) = arg.bits {
        let _ = write!(text, "{bits}");
        if load {
            text.push_str(if arg.signed { "_s" } else { "_u" });
        }
    }
    if arg.offset != 0 {
        let _ = write!(text, " offset={}", arg.offset);
    }
    if arg.align != arg.width() {
        let _ = write!(text, " align={}", arg.align);
    }
    text
}

fn signature(ty: &FuncType) -> String {
    let mut text = String::new();
    if !ty.params.is_empty() {
        text.push_str(" (param");
        for param in &ty.params {
            let _ = write!(text, " {param}");
        }
        text.push(')');
    }
    if let Some(result) = ty.result {
        let _ = write!(text, " (result {result})");
    }
    text
}

fn result_type(result: Option<ValType>) -> String {
    result.map(|ty| format!(" (result {ty})")).unwrap_or_default()
}

/// Quote a name, escaping anything outside printable ASCII.
fn quote(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for byte in name.bytes() {
        match byte {
            b'"' | b'\\' => {
                out.push('\\');
                out.push(byte as char);
            }
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\{byte:02x}");
            }
        }
    }
    out.push('"');
    out
}

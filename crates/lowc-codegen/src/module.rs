//! Module emission tree.
//!
//! Independent of the syntax tree: names are already mangled, types are
//! reduced to the four value types and every function body is a list of
//! [`Instruction`]s. The emitter builds it; the renderer only reads it.

use std::fmt;

use lowc_types::ast::Intrinsic;

/// Page count used when no memory size is configured.
pub const DEFAULT_MEMORY_PAGES: u32 = 1;

/// Largest memory the target can address, in 64 KiB pages.
pub const MAX_MEMORY_PAGES: u32 = 65536;

// ══════════════════════════════════════════════════════════════════════════════
// Value types
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl ValType {
    /// The slot an intrinsic lives in. Sub-word integers widen to `i32`.
    pub fn of(intrinsic: Intrinsic) -> Self {
        match intrinsic {
            Intrinsic::I64 | Intrinsic::U64 => ValType::I64,
            Intrinsic::F32 => ValType::F32,
            Intrinsic::F64 => ValType::F64,
            _ => ValType::I32,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ValType::F32 | ValType::F64)
    }

    /// Natural access width in bytes.
    pub fn width(self) -> u32 {
        match self {
            ValType::I32 | ValType::F32 => 4,
            ValType::I64 | ValType::F64 => 8,
        }
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
        })
    }
}

/// Parameter and result types of a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub result: Option<ValType>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Instructions
// ══════════════════════════════════════════════════════════════════════════════

/// A constant operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn ty(self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
        }
    }
}

/// Numeric operators. The renderer adds the `_s`/`_u` suffix for the
/// integer forms that carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumOp {
    Add,
    Sub,
    Mul,
    Div { signed: bool },
    Rem { signed: bool },
    And,
    Or,
    Xor,
    Shl,
    Shr { signed: bool },
    Rotl,
    Rotr,
    Eq,
    Ne,
    Lt { signed: bool },
    Le { signed: bool },
    Gt { signed: bool },
    Ge { signed: bool },
    Eqz,
    Clz,
    Ctz,
    Popcnt,
    Abs,
    Neg,
    Ceil,
    Floor,
    Trunc,
    Nearest,
    Sqrt,
    Min,
    Max,
    Copysign,
    /// `i32.extend8_s`
    Extend8,
    /// `i32.extend16_s`
    Extend16,
}

/// Conversions between value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// `i32.wrap_i64`
    Wrap,
    /// `i64.extend_i32_s` / `_u`
    Extend { signed: bool },
    /// `i32.trunc_f64_s` etc.
    Trunc { from: ValType, signed: bool },
    /// `f64.convert_i32_u` etc.
    Convert { from: ValType, signed: bool },
    /// `f64.promote_f32`
    Promote,
    /// `f32.demote_f64`
    Demote,
}

/// Operand of a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    pub ty: ValType,
    /// Access width in bits when narrower than `ty`.
    pub bits: Option<u32>,
    /// Extension of a narrow load. Ignored for stores.
    pub signed: bool,
    pub offset: u32,
    /// Alignment hint in bytes.
    pub align: u32,
}

impl MemArg {
    /// Natural access width in bytes.
    pub fn width(&self) -> u32 {
        self.bits.map_or(self.ty.width(), |bits| bits / 8)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Const(Value),
    LocalGet(String),
    LocalSet(String),
    LocalTee(String),
    GlobalGet(String),
    GlobalSet(String),
    Numeric { ty: ValType, op: NumOp },
    Convert { to: ValType, op: Conversion },
    Load(MemArg),
    Store(MemArg),
    Call(String),
    /// Call through the module table with the named type.
    CallIndirect(String),
    Br(String),
    BrIf(String),
    Return,
    Drop,
    Unreachable,
    MemorySize,
    MemoryGrow,
    Block {
        label: String,
        result: Option<ValType>,
        body: Vec<Instruction>,
    },
    Loop {
        label: String,
        result: Option<ValType>,
        body: Vec<Instruction>,
    },
    If {
        result: Option<ValType>,
        then_body: Vec<Instruction>,
        else_body: Option<Vec<Instruction>>,
    },
    /// An instruction with its operands written inline as children.
    Folded {
        head: Box<Instruction>,
        operands: Vec<Instruction>,
    },
    Comment(String),
}

impl Instruction {
    pub fn i32_const(value: i32) -> Self {
        Instruction::Const(Value::I32(value))
    }

    pub fn numeric(ty: ValType, op: NumOp) -> Self {
        Instruction::Numeric { ty, op }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Module
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    pub pages: u32,
    /// Export name, if the memory is exported.
    pub export: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub name: String,
    pub params: Vec<(String, ValType)>,
    pub result: Option<ValType>,
    pub locals: Vec<(String, ValType)>,
    pub body: Vec<Instruction>,
}

impl Func {
    pub fn ty(&self) -> FuncType {
        FuncType {
            params: self.params.iter().map(|(_, ty)| *ty).collect(),
            result: self.result,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    FuncImport {
        module: String,
        field: String,
        name: String,
        ty: FuncType,
    },
    FuncExport {
        export: String,
        name: String,
    },
    /// Elements placed in the module table at `offset`.
    Element {
        offset: u32,
        functions: Vec<String>,
    },
    Global {
        name: String,
        ty: ValType,
        mutable: bool,
        init: Value,
    },
    TypeDef {
        name: String,
        ty: FuncType,
    },
    Data {
        offset: u32,
        bytes: Vec<u8>,
    },
    Func(Func),
    Comment(String),
}

/// A complete module.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub memory: Option<Memory>,
    /// Size of the single `funcref` table, if any.
    pub table: Option<u32>,
    pub fields: Vec<Field>,
}

impl Module {
    pub fn func(&self, name: &str) -> Option<&Func> {
        self.fields.iter().find_map(|field| match field {
            Field::Func(func) if func.name == name => Some(func),
            _ => None,
        })
    }

    pub fn funcs(&self) -> impl Iterator<Item = &Func> {
        self.fields.iter().filter_map(|field| match field {
            Field::Func(func) => Some(func),
            _ => None,
        })
    }
}

//! Syntax tree for lowc programs.
//!
//! Every node carries a [`Span`] for error reporting. The tree is strictly
//! owned: references between declarations (a named type, a called
//! function, a table entry) are by name and looked up through the
//! [`DeclarationTable`], never shared nodes. Resolver output is written
//! back into the metadata fields (`meta`, `value`, `offset`, `order`,
//! `bytes`, function flags).

use crate::Span;
use std::collections::HashMap;
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ══════════════════════════════════════════════════════════════════════════════

/// A spanned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Type Specifications
// ══════════════════════════════════════════════════════════════════════════════

/// One of the ten fixed-width numeric types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl Intrinsic {
    pub const ALL: [Intrinsic; 10] = [
        Intrinsic::I8,
        Intrinsic::U8,
        Intrinsic::I16,
        Intrinsic::U16,
        Intrinsic::I32,
        Intrinsic::U32,
        Intrinsic::I64,
        Intrinsic::U64,
        Intrinsic::F32,
        Intrinsic::F64,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Size in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.size() * 8
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    /// Signed integer types. Floats report `false`.
    pub fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Returns `true` for `i8`, `u8`, `i16` and `u16`.
    pub fn is_sub_word(self) -> bool {
        self.is_integer() && self.size() < 4
    }
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A type as written in source, plus the layout facts the resolver fills in.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub kind: TypeSpecKind,
    pub span: Span,
    pub meta: TypeMeta,
}

/// Post-resolution metadata of a [`TypeSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeMeta {
    /// All names inside this spec are bound.
    pub resolved: bool,
    /// Struct layout is fully expanded (every field has an offset).
    pub flattened: bool,
    /// Byte size, once known.
    pub size_of: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpecKind {
    Void,
    Intrinsic(Intrinsic),
    /// `T*`
    Pointer(Box<TypeSpec>),
    /// `T[N]`
    Array {
        element: Box<TypeSpec>,
        length: Box<Expr>,
    },
    /// `struct { a: T; b: U; }`
    Struct(Vec<StructField>),
    /// Reference to a `type` declaration, by name.
    Named(Ident),
}

/// A struct member. `offset` is the running byte total of the fields
/// before it, set by the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: Ident,
    pub spec: TypeSpec,
    pub offset: Option<u32>,
    pub span: Span,
}

impl TypeSpec {
    pub fn new(kind: TypeSpecKind, span: Span) -> Self {
        Self {
            kind,
            span,
            meta: TypeMeta::default(),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeSpecKind::Void)
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeSpecKind::Void => write!(f, "void"),
            TypeSpecKind::Intrinsic(i) => write!(f, "{i}"),
            TypeSpecKind::Pointer(inner) => write!(f, "{inner}*"),
            TypeSpecKind::Array { element, length } => match length.value {
                Some(ConstValue::Int(n)) => write!(f, "{element}[{n}]"),
                _ => write!(f, "{element}[]"),
            },
            TypeSpecKind::Struct(fields) => {
                write!(f, "struct {{")?;
                for field in fields {
                    write!(f, " {}: {};", field.name, field.spec)?;
                }
                write!(f, " }}")
            }
            TypeSpecKind::Named(name) => write!(f, "{name}"),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

/// An expression node. `value` holds the folded constant once the
/// resolver has evaluated it.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub value: Option<ConstValue>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// `*ptr`
    Dereference(Box<Expr>),
    /// `-x`, `~x`, `!x`, `&place`
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// `a + b`
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `cond ? a : b`
    Conditional {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// `sizeof(T)`
    SizeOf(Box<TypeSpec>),
    /// `sqrt(x)`, `memory_grow(n)`
    BuiltinCall { builtin: Builtin, args: Vec<Expr> },
    /// `i64(x)`
    TypeCast {
        target: Intrinsic,
        operand: Box<Expr>,
    },
    /// `f(a, b)`, or `table[i](a, b)` when `dispatcher` is set.
    FunctionCall {
        name: Ident,
        args: Vec<Expr>,
        dispatcher: Option<Box<Expr>>,
    },
    /// `p.field`
    MemberAccess { object: Box<Expr>, member: Ident },
    /// `p[i]`
    ItemAccess { object: Box<Expr>, index: Box<Expr> },
    Identifier(Ident),
    Literal(Literal),
}

/// A numeric literal as written. The variant is the source-form tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    /// Fits a signed 64-bit machine word.
    Integer(i64),
    /// Wider than `i64::MAX`.
    BigInteger(u128),
    Real(f64),
}

/// Source-form tag of a [`Literal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralForm {
    Integer,
    BigInteger,
    Real,
}

impl Literal {
    /// Classify an integer value by magnitude.
    pub fn from_u128(value: u128) -> Self {
        match i64::try_from(value) {
            Ok(v) => Literal::Integer(v),
            Err(_) => Literal::BigInteger(value),
        }
    }

    pub fn form(&self) -> LiteralForm {
        match self {
            Literal::Integer(_) => LiteralForm::Integer,
            Literal::BigInteger(_) => LiteralForm::BigInteger,
            Literal::Real(_) => LiteralForm::Real,
        }
    }

    /// The literal's exact value in the constant evaluator's domain, or
    /// `None` for integers above `i128::MAX`.
    pub fn to_const(self) -> Option<ConstValue> {
        match self {
            Literal::Integer(v) => Some(ConstValue::Int(v as i128)),
            Literal::BigInteger(v) => i128::try_from(v).ok().map(ConstValue::Int),
            Literal::Real(v) => Some(ConstValue::Float(v)),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(v) => write!(f, "{v}"),
            Literal::BigInteger(v) => write!(f, "{v}"),
            Literal::Real(v) => write!(f, "{v:?}"),
        }
    }
}

/// A folded constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i128),
    Float(f64),
}

impl ConstValue {
    pub fn as_int(self) -> Option<i128> {
        match self {
            ConstValue::Int(v) => Some(v),
            ConstValue::Float(_) => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            ConstValue::Int(v) => v as f64,
            ConstValue::Float(v) => v,
        }
    }

    pub fn is_truthy(self) -> bool {
        match self {
            ConstValue::Int(v) => v != 0,
            ConstValue::Float(v) => v != 0.0,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Float(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `+x`
    Plus,
    /// `-x`
    Neg,
    /// `~x`
    BitNot,
    /// `!x`
    Not,
    /// `&place`
    AddressOf,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Plus => "+",
            UnaryOp::Neg => "-",
            UnaryOp::BitNot => "~",
            UnaryOp::Not => "!",
            UnaryOp::AddressOf => "&",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    /// `>>`, arithmetic for signed operands.
    Shr,
    /// `>>>`, always logical.
    ShrU,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::ShrU => ">>>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// Operators that only make sense on integers.
    pub fn is_integer_only(self) -> bool {
        matches!(
            self,
            BinaryOp::Rem
                | BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
                | BinaryOp::Shl
                | BinaryOp::Shr
                | BinaryOp::ShrU
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Reserved call-like names that map onto single machine instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Clz,
    Ctz,
    Popcnt,
    Rotl,
    Rotr,
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
    MemorySize,
    MemoryGrow,
}

impl Builtin {
    pub const ALL: [Builtin; 17] = [
        Builtin::Clz,
        Builtin::Ctz,
        Builtin::Popcnt,
        Builtin::Rotl,
        Builtin::Rotr,
        Builtin::Abs,
        Builtin::Neg,
        Builtin::Ceil,
        Builtin::Floor,
        Builtin::Trunc,
        Builtin::Nearest,
        Builtin::Sqrt,
        Builtin::Min,
        Builtin::Max,
        Builtin::Copysign,
        Builtin::MemorySize,
        Builtin::MemoryGrow,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Clz => "clz",
            Builtin::Ctz => "ctz",
            Builtin::Popcnt => "popcnt",
            Builtin::Rotl => "rotl",
            Builtin::Rotr => "rotr",
            Builtin::Abs => "abs",
            Builtin::Neg => "neg",
            Builtin::Ceil => "ceil",
            Builtin::Floor => "floor",
            Builtin::Trunc => "trunc",
            Builtin::Nearest => "nearest",
            Builtin::Sqrt => "sqrt",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Copysign => "copysign",
            Builtin::MemorySize => "memory_size",
            Builtin::MemoryGrow => "memory_grow",
        }
    }

    /// Number of arguments the builtin takes.
    pub fn arity(self) -> usize {
        match self {
            Builtin::MemorySize => 0,
            Builtin::Rotl | Builtin::Rotr | Builtin::Min | Builtin::Max | Builtin::Copysign => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `var x: i32 = 0;`
    LocalVariable(Variable),
    /// `place = value;` or `place op= value;`
    Assignment {
        target: Expr,
        op: Option<BinaryOp>,
        value: Expr,
    },
    /// A call evaluated for its effect; any result is dropped.
    LocalFunctionInvocation(Expr),
    If {
        condition: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    Do {
        body: Vec<Stmt>,
        condition: Expr,
    },
    Break,
    Continue,
    Return(Option<Expr>),
}

// ══════════════════════════════════════════════════════════════════════════════
// Declarations
// ══════════════════════════════════════════════════════════════════════════════

/// A function-scoped variable: a parameter or a `var` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: Ident,
    pub ty: Option<TypeSpec>,
    pub init: Option<Expr>,
    pub span: Span,
}

/// Parameter list and result type shared by functions and imports.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Variable>,
    /// `None` for `void` functions.
    pub result: Option<TypeSpec>,
}

/// Facts about a function's body derived after parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionFlags {
    /// Calls may be expanded in place.
    pub can_be_inlined: bool,
    /// The last body statement is a `return`.
    pub has_return: bool,
    /// Number of direct call sites.
    pub invocation_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Stable index in order of appearance.
    pub index: u32,
    pub signature: Signature,
    pub body: Vec<Stmt>,
    pub exported: bool,
    pub inline: bool,
    pub flags: FunctionFlags,
}

/// Contents of a `data` declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum DataContents {
    /// `[1, 2, 3]`, each element stored at the declared element width.
    Values(Vec<Expr>),
    /// `"text"`, stored verbatim.
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    /// `const N: T = expr;`
    Const { ty: Option<TypeSpec>, value: Expr },
    /// `global N: T = expr;`
    Global { ty: TypeSpec, init: Option<Expr> },
    /// `type N = T;`
    Type { spec: TypeSpec },
    /// `table N = [f, g];`
    Table { functions: Vec<Ident> },
    /// `data 16: u16 = [1, 2];`. `bytes` is the encoded segment once
    /// resolved.
    Data {
        offset: Expr,
        element: Intrinsic,
        contents: DataContents,
        bytes: Vec<u8>,
    },
    /// `import "env" func log(v: i32);`
    ImportedFunction {
        module: String,
        field: String,
        signature: Signature,
    },
    Function(Function),
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: Ident,
    pub kind: DeclKind,
    /// Emission order, assigned by the resolver.
    pub order: Option<u32>,
    pub resolved: bool,
    pub span: Span,
}

impl Declaration {
    pub fn new(name: Ident, kind: DeclKind, span: Span) -> Self {
        Self {
            name,
            kind,
            order: None,
            resolved: false,
            span,
        }
    }

    /// Human-readable kind for messages.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            DeclKind::Const { .. } => "const",
            DeclKind::Global { .. } => "global",
            DeclKind::Type { .. } => "type",
            DeclKind::Table { .. } => "table",
            DeclKind::Data { .. } => "data",
            DeclKind::ImportedFunction { .. } => "import",
            DeclKind::Function(_) => "func",
        }
    }

    /// The signature of a callable declaration.
    pub fn signature(&self) -> Option<&Signature> {
        match &self.kind {
            DeclKind::Function(func) => Some(&func.signature),
            DeclKind::ImportedFunction { signature, .. } => Some(signature),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match &self.kind {
            DeclKind::Function(func) => Some(func),
            _ => None,
        }
    }
}

/// Every top-level declaration of a program, keyed by name.
///
/// Iteration follows source order; [`DeclarationTable::in_order`] follows
/// the resolver's emission order.
#[derive(Debug, Clone, Default)]
pub struct DeclarationTable {
    decls: Vec<Declaration>,
    index: HashMap<String, usize>,
}

impl DeclarationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a declaration. A name that is already taken hands the new
    /// declaration back.
    pub fn insert(&mut self, decl: Declaration) -> Result<(), Box<Declaration>> {
        if self.index.contains_key(&decl.name.name) {
            return Err(Box::new(decl));
        }
        self.index.insert(decl.name.name.clone(), self.decls.len());
        self.decls.push(decl);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.index.get(name).map(|&i| &self.decls[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Declaration> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.decls[i]),
            None => None,
        }
    }

    /// Position of `name` in source order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Declarations in source order.
    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Declaration> {
        self.decls.iter_mut()
    }

    /// Declarations sorted by emission order. Unordered declarations come
    /// last, in source order.
    pub fn in_order(&self) -> Vec<&Declaration> {
        let mut decls: Vec<&Declaration> = self.decls.iter().collect();
        decls.sort_by_key(|d| d.order.unwrap_or(u32::MAX));
        decls
    }

    pub fn functions(&self) -> impl Iterator<Item = (&Declaration, &Function)> {
        self.decls
            .iter()
            .filter_map(|d| d.as_function().map(|f| (d, f)))
    }

    /// Take the declarations out, in source order.
    pub fn into_declarations(self) -> Vec<Declaration> {
        self.decls
    }

    /// Rebuild a table from declarations with distinct names.
    pub fn from_declarations(decls: Vec<Declaration>) -> Self {
        let index = decls
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.name.clone(), i))
            .collect();
        Self { decls, index }
    }
}

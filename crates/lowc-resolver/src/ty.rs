//! Semantic types used after resolution.
//!
//! [`Ty`] is distinct from [`TypeSpec`], which is the syntactic form
//! produced by the parser. Named types stay by name so that
//! self-referential pointer graphs remain finite; [`Types`] expands them
//! on demand through the declaration table.

use std::fmt;

use lowc_types::ast::{DeclKind, DeclarationTable, Intrinsic, TypeSpec, TypeSpecKind};

/// Size of a pointer on the target, in bytes.
pub const POINTER_SIZE: u32 = 4;

/// Alias chains longer than this are treated as unresolvable.
const MAX_ALIAS_DEPTH: usize = 64;

// ══════════════════════════════════════════════════════════════════════════════
// Ty
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Ty {
    Void,
    Scalar(Intrinsic),
    Pointer(Box<Ty>),
    Array { element: Box<Ty>, length: u32 },
    Struct(Vec<FieldTy>),
    /// A `type` declaration, by name.
    Named(String),
}

/// A struct member with its resolved byte offset.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTy {
    pub name: String,
    pub ty: Ty,
    pub offset: u32,
}

impl Ty {
    /// Convert a resolved type spec. Unresolved array lengths become 0.
    pub fn from_spec(spec: &TypeSpec) -> Ty {
        match &spec.kind {
            TypeSpecKind::Void => Ty::Void,
            TypeSpecKind::Intrinsic(i) => Ty::Scalar(*i),
            TypeSpecKind::Pointer(inner) => Ty::Pointer(Box::new(Ty::from_spec(inner))),
            TypeSpecKind::Array { element, length } => Ty::Array {
                element: Box::new(Ty::from_spec(element)),
                length: length
                    .value
                    .and_then(|v| v.as_int())
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(0),
            },
            TypeSpecKind::Struct(fields) => Ty::Struct(
                fields
                    .iter()
                    .map(|f| FieldTy {
                        name: f.name.name.clone(),
                        ty: Ty::from_spec(&f.spec),
                        offset: f.offset.unwrap_or(0),
                    })
                    .collect(),
            ),
            TypeSpecKind::Named(name) => Ty::Named(name.name.clone()),
        }
    }

    pub fn pointer_to(self) -> Ty {
        Ty::Pointer(Box::new(self))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Ty::Pointer(_))
    }

    pub fn scalar(&self) -> Option<Intrinsic> {
        match self {
            Ty::Scalar(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Void => write!(f, "void"),
            Ty::Scalar(i) => write!(f, "{i}"),
            Ty::Pointer(inner) => write!(f, "{inner}*"),
            Ty::Array { element, length } => write!(f, "{element}[{length}]"),
            Ty::Struct(fields) => {
                write!(f, "struct {{")?;
                for field in fields {
                    write!(f, " {}: {};", field.name, field.ty)?;
                }
                write!(f, " }}")
            }
            Ty::Named(name) => f.write_str(name),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Types
// ══════════════════════════════════════════════════════════════════════════════

/// Type queries against a resolved declaration table.
#[derive(Clone, Copy)]
pub struct Types<'a> {
    table: &'a DeclarationTable,
}

impl<'a> Types<'a> {
    pub fn new(table: &'a DeclarationTable) -> Self {
        Self { table }
    }

    /// The spec behind a `type` declaration.
    fn declared(&self, name: &str) -> Option<&'a TypeSpec> {
        match &self.table.get(name)?.kind {
            DeclKind::Type { spec } => Some(spec),
            _ => None,
        }
    }

    /// Follow named types until a structural type is reached. Unknown
    /// names expand to `Void`.
    pub fn expand(&self, ty: &Ty) -> Ty {
        let mut current = ty.clone();
        for _ in 0..MAX_ALIAS_DEPTH {
            let Ty::Named(name) = &current else {
                return current;
            };
            match self.declared(name) {
                Some(spec) => current = Ty::from_spec(spec),
                None => return Ty::Void,
            }
        }
        Ty::Void
    }

    /// Byte size of a type. Void and unresolved types are 0.
    pub fn size_of(&self, ty: &Ty) -> u32 {
        match ty {
            Ty::Void => 0,
            Ty::Scalar(i) => i.size(),
            Ty::Pointer(_) => POINTER_SIZE,
            Ty::Array { element, length } => self.size_of(element).saturating_mul(*length),
            Ty::Struct(fields) => fields
                .iter()
                .map(|f| f.offset.saturating_add(self.size_of(&f.ty)))
                .max()
                .unwrap_or(0),
            Ty::Named(name) => self
                .declared(name)
                .and_then(|spec| spec.meta.size_of)
                .unwrap_or(0),
        }
    }

    /// Scalar or pointer after expansion: a value that fits a slot.
    pub fn is_scalar(&self, ty: &Ty) -> bool {
        matches!(self.expand(ty), Ty::Scalar(_) | Ty::Pointer(_))
    }

    /// The intrinsic a type aliases, if any.
    pub fn intrinsic(&self, ty: &Ty) -> Option<Intrinsic> {
        self.expand(ty).scalar()
    }

    /// Look up a struct member.
    pub fn field(&self, ty: &Ty, name: &str) -> Option<FieldTy> {
        match self.expand(ty) {
            Ty::Struct(fields) => fields.into_iter().find(|f| f.name == name),
            _ => None,
        }
    }

    /// Compare two types with top-level aliases expanded.
    pub fn same(&self, a: &Ty, b: &Ty) -> bool {
        match (self.expand(a), self.expand(b)) {
            (Ty::Pointer(x), Ty::Pointer(y)) => {
                matches!((&*x, &*y), (Ty::Void, _) | (_, Ty::Void)) || self.same(&x, &y)
            }
            (x, y) => x == y,
        }
    }
}

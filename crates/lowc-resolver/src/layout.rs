//! Type binding and layout.
//!
//! Sizes are computed bottom-up: intrinsics have fixed widths, pointers
//! are [`POINTER_SIZE`], arrays are element size times the folded length
//! and structs are the sum of their fields. Fields are laid out in
//! declaration order with no padding; each field's offset is the running
//! total of the fields before it.
//!
//! A named type reached by value is laid out on demand. Reaching a type
//! that is still being laid out means it contains itself (W101). Named
//! types behind a pointer are only bound, never laid out, so a struct may
//! point to itself.

use std::collections::HashSet;

use lowc_types::ast::{ConstValue, DeclKind, TypeSpec, TypeSpecKind};
use lowc_types::{ErrorCode, Span};

use crate::resolver::{Resolver, Status};
use crate::ty::POINTER_SIZE;

impl Resolver<'_> {
    /// Lay out a `type` declaration by name.
    pub(crate) fn resolve_named_type(&mut self, name: &str, span: Span) -> Option<u32> {
        match self.types.get(name) {
            Some(Status::Done(size)) => return *size,
            Some(Status::InProgress) => {
                self.error(
                    ErrorCode::RECURSIVE_LAYOUT,
                    format!("type '{name}' contains itself by value; use a pointer"),
                    span,
                );
                return None;
            }
            None => {}
        }

        let Some(decl) = self.table.get_mut(name) else {
            self.error(ErrorCode::UNKNOWN_TYPE, format!("unknown type '{name}'"), span);
            return None;
        };
        let DeclKind::Type { spec } = &mut decl.kind else {
            let kind = decl.kind_name();
            self.error(
                ErrorCode::UNKNOWN_TYPE,
                format!("'{name}' is a {kind}, not a type"),
                span,
            );
            return None;
        };
        let placeholder = TypeSpec::new(TypeSpecKind::Void, spec.span);
        let mut spec = std::mem::replace(spec, placeholder);

        self.types.insert(name.to_string(), Status::InProgress);
        let size = self.layout_spec(&mut spec, false);
        self.types.insert(name.to_string(), Status::Done(size));
        tracing::trace!(name, ?size, "laid out type");

        if let Some(DeclKind::Type { spec: slot }) = self.table.get_mut(name).map(|d| &mut d.kind) {
            *slot = spec;
        }
        size
    }

    /// Compute the size of `spec` and fill in its metadata. With
    /// `descend`, pointer targets are bound as well; without it they are
    /// left for a later call.
    ///
    /// Each node reports its own errors once: a node already marked
    /// `resolved` keeps its size and only its children are revisited.
    pub(crate) fn layout_spec(&mut self, spec: &mut TypeSpec, descend: bool) -> Option<u32> {
        let first = !spec.meta.resolved;
        let span = spec.span;
        let mut flattened = false;
        let size = match &mut spec.kind {
            TypeSpecKind::Void => {
                if first {
                    self.error(
                        ErrorCode::UNKNOWN_TYPE,
                        "'void' has no size; use it as a result or pointer target",
                        span,
                    );
                }
                None
            }
            TypeSpecKind::Intrinsic(intrinsic) => Some(intrinsic.size()),
            TypeSpecKind::Pointer(inner) => {
                if descend {
                    self.bind_pointee(inner);
                }
                Some(POINTER_SIZE)
            }
            TypeSpecKind::Named(name) => {
                if first {
                    let name = name.clone();
                    self.resolve_named_type(&name.name, name.span)
                } else {
                    spec.meta.size_of
                }
            }
            TypeSpecKind::Array { element, length } => {
                let element_size = self.layout_spec(element, descend);
                let length = if first {
                    self.array_length(length)
                } else {
                    length
                        .value
                        .and_then(|v| v.as_int())
                        .and_then(|v| u32::try_from(v).ok())
                };
                match (element_size, length) {
                    (Some(size), Some(length)) => match size.checked_mul(length) {
                        Some(total) => Some(total),
                        None if first => {
                            self.error(
                                ErrorCode::INVALID_ARRAY_LENGTH,
                                format!("array of {length} elements is too large"),
                                span,
                            );
                            None
                        }
                        None => None,
                    },
                    _ => None,
                }
            }
            TypeSpecKind::Struct(fields) => {
                let mut seen = HashSet::new();
                let mut offset = Some(0u32);
                for field in fields.iter_mut() {
                    if first && !seen.insert(field.name.name.clone()) {
                        self.error(
                            ErrorCode::DUPLICATE_DECLARATION,
                            format!("duplicate field '{}'", field.name.name),
                            field.name.span,
                        );
                    }
                    let size = self.layout_spec(&mut field.spec, descend);
                    field.offset = offset;
                    offset = match (offset, size) {
                        (Some(offset), Some(size)) => offset.checked_add(size),
                        _ => None,
                    };
                }
                flattened = offset.is_some();
                offset
            }
        };
        spec.meta.resolved = true;
        spec.meta.flattened = flattened;
        spec.meta.size_of = size;
        size
    }

    /// A pointer target only needs its names bound. `void*` is allowed.
    fn bind_pointee(&mut self, inner: &mut TypeSpec) {
        match &inner.kind {
            TypeSpecKind::Void => {
                inner.meta.resolved = true;
            }
            TypeSpecKind::Named(name) => {
                if inner.meta.resolved {
                    return;
                }
                let name = name.clone();
                let size = match self.types.get(&name.name) {
                    Some(Status::Done(size)) => *size,
                    Some(Status::InProgress) => None,
                    None => match self.table.get(&name.name).map(|d| &d.kind) {
                        Some(DeclKind::Type { .. }) => {
                            self.resolve_named_type(&name.name, name.span)
                        }
                        Some(other) => {
                            let kind = match other {
                                DeclKind::Function(_) | DeclKind::ImportedFunction { .. } => {
                                    "function"
                                }
                                _ => "value",
                            };
                            self.error(
                                ErrorCode::UNKNOWN_TYPE,
                                format!("'{}' is a {kind}, not a type", name.name),
                                name.span,
                            );
                            None
                        }
                        None => {
                            self.error(
                                ErrorCode::UNKNOWN_TYPE,
                                format!("unknown type '{}'", name.name),
                                name.span,
                            );
                            None
                        }
                    },
                };
                inner.meta.resolved = true;
                inner.meta.size_of = size;
            }
            _ => {
                self.layout_spec(inner, true);
            }
        }
    }

    /// Fold an array length. Lengths must be positive integers.
    fn array_length(&mut self, length: &mut lowc_types::ast::Expr) -> Option<u32> {
        let value = self.eval(length)?;
        match value {
            ConstValue::Int(n) if n > 0 => match u32::try_from(n) {
                Ok(n) => Some(n),
                Err(_) => {
                    self.error(
                        ErrorCode::INVALID_ARRAY_LENGTH,
                        format!("array length {n} is too large"),
                        length.span,
                    );
                    None
                }
            },
            other => {
                self.error(
                    ErrorCode::INVALID_ARRAY_LENGTH,
                    format!("array length must be a positive integer, found {other}"),
                    length.span,
                );
                None
            }
        }
    }
}

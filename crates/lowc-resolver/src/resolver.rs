//! Resolution driver.
//!
//! Runs in four passes over the declaration table:
//!
//! 1. every `type` and `const` declaration is resolved on demand, so
//!    forward references work and cycles are detected (W101, W108);
//! 2. every remaining spec and constant expression is completed: pointer
//!    targets, globals, data segments, tables, signatures and function
//!    bodies;
//! 3. emission order is assigned by post-order traversal of the
//!    dependency graph;
//! 4. function flags are derived.
//!
//! Error codes emitted:
//! - W100: unknown type
//! - W101: type contains itself by value
//! - W102: duplicate struct field
//! - W103: unknown identifier in a constant expression
//! - W104: expression is not constant
//! - W105: division by zero in a constant expression
//! - W106: constant out of range
//! - W107: invalid array length
//! - W108: constant dependency cycle
//! - W130: type mismatch in a constant context
//! - W131: missing return
//! - W133: invalid operand in a constant expression
//! - W137: unknown function in a table

use std::collections::{HashMap, HashSet};

use lowc_types::ast::{
    ConstValue, DataContents, DeclKind, Declaration, DeclarationTable, Expr, ExprKind, Intrinsic,
    Signature, Stmt, StmtKind, TypeSpec, TypeSpecKind, UnaryOp,
};
use lowc_types::{CompileErrors, Diagnostic, ErrorCode, Span};

use crate::eval::{fit_to_width, wrap_to_width};

/// Progress of an on-demand resolution.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Status<T> {
    InProgress,
    Done(T),
}

/// Resolve a parsed declaration table in place and return the
/// diagnostics.
pub fn resolve(table: &mut DeclarationTable) -> CompileErrors {
    let mut errors = CompileErrors::empty();
    Resolver::new(table, &mut errors).resolve();
    errors
}

// ══════════════════════════════════════════════════════════════════════════════
// Resolver
// ══════════════════════════════════════════════════════════════════════════════

pub struct Resolver<'a> {
    pub(crate) table: &'a mut DeclarationTable,
    errors: &'a mut CompileErrors,
    /// Size of each `type` declaration once laid out.
    pub(crate) types: HashMap<String, Status<Option<u32>>>,
    /// Value of each `const` declaration once folded.
    pub(crate) consts: HashMap<String, Status<Option<ConstValue>>>,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a mut DeclarationTable, errors: &'a mut CompileErrors) -> Self {
        Self {
            table,
            errors,
            types: HashMap::new(),
            consts: HashMap::new(),
        }
    }

    /// Run every pass.
    pub fn resolve(&mut self) {
        let _span = tracing::debug_span!("resolve", declarations = self.table.len()).entered();
        let names: Vec<(String, Span)> = self
            .table
            .iter()
            .map(|d| (d.name.name.clone(), d.name.span))
            .collect();

        let before = self.errors.total_errors;
        for (name, span) in &names {
            match self.table.get(name).map(|d| &d.kind) {
                Some(DeclKind::Type { .. }) => {
                    self.resolve_named_type(name, *span);
                }
                Some(DeclKind::Const { .. }) => {
                    self.resolve_const(name, *span);
                }
                _ => {}
            }
        }

        for (name, _) in &names {
            self.complete_declaration(name);
        }

        self.assign_order();
        self.derive_function_flags();

        tracing::debug!(
            errors = self.errors.total_errors - before,
            "resolved {} declarations",
            names.len()
        );
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    pub(crate) fn error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.errors.push(Diagnostic::new(code, message, span));
    }

    pub(crate) fn error_count(&self) -> usize {
        self.errors.total_errors
    }

    // ── Declarations ──────────────────────────────────────────────────────────

    /// Second pass over one declaration. Its kind is taken out of the
    /// table while it is being completed and put back afterwards.
    fn complete_declaration(&mut self, name: &str) {
        let Some(decl) = self.table.get_mut(name) else {
            return;
        };
        let mut kind = std::mem::replace(
            &mut decl.kind,
            DeclKind::Table {
                functions: Vec::new(),
            },
        );
        let before = self.error_count();

        match &mut kind {
            DeclKind::Type { spec } => {
                self.layout_spec(spec, true);
            }
            DeclKind::Const { ty: Some(spec), .. } => {
                self.layout_spec(spec, true);
            }
            DeclKind::Const { ty: None, .. } => {}
            DeclKind::Global { ty, init } => self.complete_global(ty, init.as_mut()),
            DeclKind::Table { functions } => {
                for function in functions.iter() {
                    let known = self
                        .table
                        .get(&function.name)
                        .is_some_and(|d| d.signature().is_some());
                    if !known {
                        self.error(
                            ErrorCode::UNKNOWN_FUNCTION,
                            format!("unknown function '{}' in table '{name}'", function.name),
                            function.span,
                        );
                    }
                }
            }
            DeclKind::Data {
                offset,
                element,
                contents,
                bytes,
            } => {
                *bytes = self.complete_data(offset, *element, contents);
            }
            DeclKind::ImportedFunction { signature, .. } => self.complete_signature(signature),
            DeclKind::Function(function) => {
                self.complete_signature(&mut function.signature);
                let mut locals: HashSet<String> = function
                    .signature
                    .params
                    .iter()
                    .map(|p| p.name.name.clone())
                    .collect();
                collect_locals(&function.body, &mut locals);
                for stmt in &mut function.body {
                    self.complete_stmt(stmt, &locals);
                }
            }
        }

        // Types and constants were first visited in pass 1; their failures
        // show up as missing sizes and values rather than new errors.
        let complete = match &kind {
            DeclKind::Type { spec } => spec.meta.size_of.is_some(),
            DeclKind::Const { value, .. } => value.value.is_some(),
            _ => true,
        };
        let resolved = complete && self.error_count() == before;
        if let Some(decl) = self.table.get_mut(name) {
            decl.kind = kind;
            decl.resolved = resolved;
        }
    }

    fn complete_global(&mut self, ty: &mut TypeSpec, init: Option<&mut Expr>) {
        self.layout_spec(ty, true);
        let Some(init) = init else {
            return;
        };
        let Some(value) = self.eval(init) else {
            return;
        };
        if let Some(target) = self.spec_intrinsic(ty) {
            if let Some(value) = self.convert_constant(value, target, init.span) {
                init.value = Some(value);
            }
        }
    }

    /// Fit a folded constant to a declared scalar type.
    pub(crate) fn convert_constant(
        &mut self,
        value: ConstValue,
        target: Intrinsic,
        span: Span,
    ) -> Option<ConstValue> {
        match (value, target.is_float()) {
            (ConstValue::Int(v), false) => match fit_to_width(v, target) {
                Some(v) => Some(ConstValue::Int(v)),
                None => {
                    self.error(
                        ErrorCode::CONSTANT_OUT_OF_RANGE,
                        format!("constant {v} does not fit in {target}"),
                        span,
                    );
                    None
                }
            },
            (ConstValue::Float(_), false) => {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    format!("expected an integer constant for {target}, found a real"),
                    span,
                );
                None
            }
            (value, true) => {
                let v = value.as_f64();
                Some(ConstValue::Float(if target == Intrinsic::F32 {
                    v as f32 as f64
                } else {
                    v
                }))
            }
        }
    }

    /// Encode a data segment. Offsets must fit in 32 bits.
    fn complete_data(
        &mut self,
        offset: &mut Expr,
        element: Intrinsic,
        contents: &mut DataContents,
    ) -> Vec<u8> {
        if let Some(value) = self.eval(offset) {
            match value {
                ConstValue::Int(v) if (0..=u32::MAX as i128).contains(&v) => {}
                _ => self.error(
                    ErrorCode::CONSTANT_OUT_OF_RANGE,
                    format!("data offset {value} is not a valid address"),
                    offset.span,
                ),
            }
        }
        let values = match contents {
            DataContents::Bytes(bytes) => return bytes.clone(),
            DataContents::Values(values) => values,
        };
        let mut bytes = Vec::with_capacity(values.len() * element.size() as usize);
        for expr in values.iter_mut() {
            let Some(value) = self.eval(expr) else {
                continue;
            };
            // Elements wider than the segment's element type are truncated.
            let value = match value {
                ConstValue::Int(v) if element.is_integer() => {
                    ConstValue::Int(wrap_to_width(v, element))
                }
                other => match self.convert_constant(other, element, expr.span) {
                    Some(value) => value,
                    None => continue,
                },
            };
            expr.value = Some(value);
            match (value, element) {
                (ConstValue::Float(v), Intrinsic::F32) => {
                    bytes.extend_from_slice(&(v as f32).to_le_bytes())
                }
                (ConstValue::Float(v), _) => bytes.extend_from_slice(&v.to_le_bytes()),
                (ConstValue::Int(v), _) => {
                    let size = element.size() as usize;
                    bytes.extend_from_slice(&(v as u128).to_le_bytes()[..size]);
                }
            }
        }
        bytes
    }

    fn complete_signature(&mut self, signature: &mut Signature) {
        for param in &mut signature.params {
            if let Some(ty) = &mut param.ty {
                self.layout_spec(ty, true);
            }
        }
        if let Some(result) = &mut signature.result {
            self.layout_spec(result, true);
        }
    }

    fn complete_stmt(&mut self, stmt: &mut Stmt, locals: &HashSet<String>) {
        match &mut stmt.kind {
            StmtKind::LocalVariable(var) => {
                if let Some(ty) = &mut var.ty {
                    self.layout_spec(ty, true);
                }
                if let Some(init) = &mut var.init {
                    self.complete_expr(init, locals);
                }
            }
            StmtKind::Assignment { target, value, .. } => {
                self.complete_expr(target, locals);
                self.complete_expr(value, locals);
            }
            StmtKind::LocalFunctionInvocation(expr) => self.complete_expr(expr, locals),
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                self.complete_expr(condition, locals);
                for stmt in then_body.iter_mut().chain(else_body.iter_mut().flatten()) {
                    self.complete_stmt(stmt, locals);
                }
            }
            StmtKind::While { condition, body } | StmtKind::Do { body, condition } => {
                self.complete_expr(condition, locals);
                for stmt in body {
                    self.complete_stmt(stmt, locals);
                }
            }
            StmtKind::Return(Some(expr)) => self.complete_expr(expr, locals),
            StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue => {}
        }
    }

    /// Fold every untyped constant subtree of a run-time expression and
    /// lay out the types it mentions.
    fn complete_expr(&mut self, expr: &mut Expr, locals: &HashSet<String>) {
        if self.is_untyped_constant(expr, locals) {
            self.eval(expr);
            return;
        }
        match &mut expr.kind {
            ExprKind::Dereference(inner) => self.complete_expr(inner, locals),
            ExprKind::Unary { operand, .. } | ExprKind::TypeCast { operand, .. } => {
                self.complete_expr(operand, locals)
            }
            ExprKind::Binary { left, right, .. } => {
                self.complete_expr(left, locals);
                self.complete_expr(right, locals);
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                self.complete_expr(condition, locals);
                self.complete_expr(then_expr, locals);
                self.complete_expr(else_expr, locals);
            }
            ExprKind::BuiltinCall { args, .. } => {
                for arg in args {
                    self.complete_expr(arg, locals);
                }
            }
            ExprKind::FunctionCall {
                args, dispatcher, ..
            } => {
                for arg in args {
                    self.complete_expr(arg, locals);
                }
                if let Some(dispatcher) = dispatcher {
                    self.complete_expr(dispatcher, locals);
                }
            }
            ExprKind::MemberAccess { object, .. } => self.complete_expr(object, locals),
            ExprKind::ItemAccess { object, index } => {
                self.complete_expr(object, locals);
                self.complete_expr(index, locals);
            }
            ExprKind::SizeOf(_) | ExprKind::Identifier(_) | ExprKind::Literal(_) => {}
        }
    }

    /// Literals, `sizeof` and untyped `const` names, combined by operators.
    /// Such trees take their type from the context they are used in.
    fn is_untyped_constant(&self, expr: &Expr, locals: &HashSet<String>) -> bool {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::SizeOf(_) => true,
            ExprKind::Identifier(ident) => {
                !locals.contains(&ident.name)
                    && matches!(
                        self.table.get(&ident.name).map(|d| &d.kind),
                        Some(DeclKind::Const { ty: None, .. })
                    )
            }
            ExprKind::Unary { op, operand } => {
                *op != UnaryOp::AddressOf && self.is_untyped_constant(operand, locals)
            }
            ExprKind::Binary { left, right, .. } => {
                self.is_untyped_constant(left, locals) && self.is_untyped_constant(right, locals)
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                self.is_untyped_constant(condition, locals)
                    && self.is_untyped_constant(then_expr, locals)
                    && self.is_untyped_constant(else_expr, locals)
            }
            _ => false,
        }
    }

    // ── Lookups ───────────────────────────────────────────────────────────────

    /// The intrinsic a spec denotes, following `type` aliases.
    pub(crate) fn spec_intrinsic(&self, spec: &TypeSpec) -> Option<Intrinsic> {
        let mut current = spec;
        for _ in 0..64 {
            match &current.kind {
                TypeSpecKind::Intrinsic(i) => return Some(*i),
                TypeSpecKind::Named(name) => match self.table.get(&name.name) {
                    Some(Declaration {
                        kind: DeclKind::Type { spec },
                        ..
                    }) => current = spec,
                    _ => return None,
                },
                _ => return None,
            }
        }
        None
    }
}

/// Names of every `var` a body declares, at any depth.
fn collect_locals(body: &[Stmt], out: &mut HashSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::LocalVariable(var) => {
                out.insert(var.name.name.clone());
            }
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                collect_locals(then_body, out);
                if let Some(else_body) = else_body {
                    collect_locals(else_body, out);
                }
            }
            StmtKind::While { body, .. } | StmtKind::Do { body, .. } => collect_locals(body, out),
            _ => {}
        }
    }
}

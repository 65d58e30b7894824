//! Per-function emission state.
//!
//! A [`FunctionBuilder`] owns the locals of one function while its body is
//! lowered: scoped bindings from source names to slot names, temporaries,
//! loop labels and the inline-expansion stack. Expression and statement
//! lowering live in `expr.rs` and `stmt.rs`.

use std::collections::{HashMap, HashSet};

use lowc_resolver::Ty;
use lowc_types::ast::{Declaration, Expr, ExprKind, Function, Intrinsic, UnaryOp};
use lowc_types::{ErrorCode, Span};

use crate::emitter::Emitter;
use crate::error::CodegenResult;
use crate::module::{Func, Instruction, NumOp, ValType};

/// A source name bound to a local slot.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub slot: String,
    pub ty: Ty,
}

/// Branch targets of the innermost loop.
#[derive(Debug, Clone)]
pub(crate) struct LoopLabels {
    pub break_label: String,
    pub continue_label: String,
}

pub(crate) struct FunctionBuilder<'e, 'a> {
    pub(crate) cx: &'e mut Emitter<'a>,
    pub(crate) name: String,
    /// `Ty::Void` for functions without a result.
    pub(crate) result: Ty,
    params: Vec<(String, ValType)>,
    locals: Vec<(String, ValType)>,
    /// Every slot name in use, parameters included.
    slot_names: HashSet<String>,
    /// Source name → stack of bindings, innermost last.
    bindings: HashMap<String, Vec<Binding>>,
    /// Names bound in each open scope.
    scopes: Vec<Vec<String>>,
    loops: Vec<LoopLabels>,
    /// Functions currently being expanded in place.
    pub(crate) inline_stack: Vec<String>,
    next_label: u32,
    next_temp: u32,
}

impl<'e, 'a> FunctionBuilder<'e, 'a> {
    pub(crate) fn new(cx: &'e mut Emitter<'a>, decl: &Declaration, function: &Function) -> Self {
        Self {
            cx,
            name: decl.name.name.clone(),
            result: function
                .signature
                .result
                .as_ref()
                .map(Ty::from_spec)
                .unwrap_or(Ty::Void),
            params: Vec::new(),
            locals: Vec::new(),
            slot_names: HashSet::new(),
            bindings: HashMap::new(),
            scopes: Vec::new(),
            loops: Vec::new(),
            inline_stack: Vec::new(),
            next_label: 0,
            next_temp: 0,
        }
    }

    /// Lower the whole function.
    pub(crate) fn build(mut self, function: &Function) -> CodegenResult<Func> {
        let _span = tracing::trace_span!("function", name = %self.name).entered();

        self.enter_scope();
        for param in &function.signature.params {
            let ty = param.ty.as_ref().map(Ty::from_spec).unwrap_or(Ty::Void);
            let Some(slot_ty) = self.cx.slot(&ty, "parameter", param.span) else {
                continue;
            };
            let slot = self.unique_slot(&param.name.name);
            self.params.push((slot.clone(), slot_ty));
            self.bind(&param.name.name, slot, ty);
        }
        let result = match &self.result {
            Ty::Void => None,
            ty => {
                let span = function
                    .signature
                    .result
                    .as_ref()
                    .map(|spec| spec.span)
                    .unwrap_or_default();
                let ty = ty.clone();
                self.cx.slot(&ty, "result", span)
            }
        };

        let mut body = Vec::new();
        let last = function.body.len().saturating_sub(1);
        for (i, stmt) in function.body.iter().enumerate() {
            self.stmt(stmt, i == last, &mut body)?;
        }
        if result.is_some() && !function.flags.has_return {
            body.push(Instruction::Unreachable);
        }
        self.leave_scope();

        Ok(Func {
            name: self.name,
            params: self.params,
            result,
            locals: self.locals,
            body,
        })
    }

    // ── Scopes and locals ─────────────────────────────────────────────────

    pub(crate) fn enter_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    pub(crate) fn leave_scope(&mut self) {
        for name in self.scopes.pop().unwrap_or_default() {
            if let Some(stack) = self.bindings.get_mut(&name) {
                stack.pop();
            }
        }
    }

    fn bind(&mut self, name: &str, slot: String, ty: Ty) {
        self.bindings
            .entry(name.to_string())
            .or_default()
            .push(Binding { slot, ty });
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(name.to_string());
        }
    }

    /// Declare a local variable in the current scope and return its slot.
    pub(crate) fn declare(&mut self, name: &str, ty: Ty, slot_ty: ValType) -> String {
        let slot = self.unique_slot(name);
        self.locals.push((slot.clone(), slot_ty));
        self.bind(name, slot.clone(), ty);
        slot
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name).and_then(|stack| stack.last())
    }

    /// A fresh unnamed local.
    pub(crate) fn temp(&mut self, slot_ty: ValType) -> String {
        loop {
            let name = format!("__tmp{}", self.next_temp);
            self.next_temp += 1;
            if self.slot_names.insert(name.clone()) {
                self.locals.push((name.clone(), slot_ty));
                return name;
            }
        }
    }

    /// `name`, or `name_N` when a shadowed binding already uses it.
    fn unique_slot(&mut self, name: &str) -> String {
        if self.slot_names.insert(name.to_string()) {
            return name.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{name}_{n}");
            if self.slot_names.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Replace every binding with the parameters of an inlined callee.
    pub(crate) fn enter_inline(
        &mut self,
        params: impl IntoIterator<Item = (String, Binding)>,
    ) -> HashMap<String, Vec<Binding>> {
        let mut bindings: HashMap<String, Vec<Binding>> = HashMap::new();
        for (name, binding) in params {
            bindings.entry(name).or_default().push(binding);
        }
        std::mem::replace(&mut self.bindings, bindings)
    }

    pub(crate) fn leave_inline(&mut self, saved: HashMap<String, Vec<Binding>>) {
        self.bindings = saved;
    }

    // ── Loops ─────────────────────────────────────────────────────────────

    pub(crate) fn next_label(&mut self) -> u32 {
        let n = self.next_label;
        self.next_label += 1;
        n
    }

    pub(crate) fn push_loop(&mut self, labels: LoopLabels) {
        self.loops.push(labels);
    }

    pub(crate) fn pop_loop(&mut self) {
        self.loops.pop();
    }

    pub(crate) fn innermost_loop(&self) -> Option<&LoopLabels> {
        self.loops.last()
    }

    // ── Typing helpers ────────────────────────────────────────────────────

    pub(crate) fn error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.cx.error(code, message, span);
    }

    /// Report W130 unless `actual` can be used where `expected` is needed.
    /// Pointers and `u32` addresses convert into each other.
    pub(crate) fn expect_type(&mut self, actual: &Ty, expected: &Ty, span: Span) -> bool {
        let types = self.cx.types;
        let address_pair = matches!(
            (types.expand(actual), types.expand(expected)),
            (Ty::Pointer(_), Ty::Scalar(Intrinsic::U32))
                | (Ty::Scalar(Intrinsic::U32), Ty::Pointer(_))
        );
        if address_pair || types.same(actual, expected) {
            return true;
        }
        self.error(
            ErrorCode::TYPE_MISMATCH,
            format!("type mismatch: expected {expected}, found {actual}"),
            span,
        );
        false
    }

    /// Bring a sub-word value on the stack back into its type's range.
    pub(crate) fn normalize(&self, ty: &Ty, out: &mut Vec<Instruction>) {
        match self.cx.types.intrinsic(ty) {
            Some(Intrinsic::I8) => out.push(Instruction::numeric(ValType::I32, NumOp::Extend8)),
            Some(Intrinsic::I16) => out.push(Instruction::numeric(ValType::I32, NumOp::Extend16)),
            Some(Intrinsic::U8) => {
                out.push(Instruction::i32_const(0xff));
                out.push(Instruction::numeric(ValType::I32, NumOp::And));
            }
            Some(Intrinsic::U16) => {
                out.push(Instruction::i32_const(0xffff));
                out.push(Instruction::numeric(ValType::I32, NumOp::And));
            }
            _ => {}
        }
    }

    /// [`FunctionBuilder::normalize`], skipped when `expr` already yields
    /// an in-range value.
    pub(crate) fn normalize_value(&self, ty: &Ty, expr: &Expr, out: &mut Vec<Instruction>) {
        if needs_normalize(expr) {
            self.normalize(ty, out);
        }
    }
}

/// Expressions whose 32-bit result may leave a sub-word range. Constants
/// are fitted, loads extend, casts and calls normalise.
fn needs_normalize(expr: &Expr) -> bool {
    if expr.value.is_some() {
        return false;
    }
    match &expr.kind {
        ExprKind::Binary { op, .. } => !op.is_comparison(),
        ExprKind::Unary { op, operand } => match op {
            UnaryOp::Plus => needs_normalize(operand),
            UnaryOp::Neg | UnaryOp::BitNot => true,
            UnaryOp::Not | UnaryOp::AddressOf => false,
        },
        ExprKind::BuiltinCall { .. } | ExprKind::Conditional { .. } => true,
        _ => false,
    }
}

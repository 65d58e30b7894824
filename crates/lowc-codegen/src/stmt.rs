//! Statement lowering.

use lowc_resolver::Ty;
use lowc_types::ast::{BinaryOp, Expr, Stmt, StmtKind, Variable};
use lowc_types::{ErrorCode, Span};

use crate::builder::{FunctionBuilder, LoopLabels};
use crate::error::{CodegenError, CodegenResult};
use crate::expr::Place;
use crate::module::{Instruction, NumOp, ValType};

impl FunctionBuilder<'_, '_> {
    /// Lower a nested statement list in its own scope.
    fn stmts(&mut self, stmts: &[Stmt], out: &mut Vec<Instruction>) -> CodegenResult<()> {
        self.enter_scope();
        for stmt in stmts {
            self.stmt(stmt, false, out)?;
        }
        self.leave_scope();
        Ok(())
    }

    /// Lower one statement. `tail` marks the last statement of the
    /// function body, where a `return` falls off the end instead.
    ///
    /// Source errors are reported and the statement is abandoned; only
    /// internal inconsistencies are returned as `Err`.
    pub(crate) fn stmt(
        &mut self,
        stmt: &Stmt,
        tail: bool,
        out: &mut Vec<Instruction>,
    ) -> CodegenResult<()> {
        match &stmt.kind {
            StmtKind::LocalVariable(variable) => {
                self.local_variable(variable, out);
            }
            StmtKind::Assignment { target, op, value } => {
                self.assignment(target, *op, value, stmt.span, out);
            }
            StmtKind::LocalFunctionInvocation(call) => {
                if let Some(ty) = self.expr(call, None, out) {
                    if ty != Ty::Void {
                        out.push(Instruction::Drop);
                    }
                }
            }
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => {
                if self.condition(condition, out).is_none() {
                    return Ok(());
                }
                let mut then_out = Vec::new();
                self.stmts(then_body, &mut then_out)?;
                let else_out = match else_body {
                    Some(body) => {
                        let mut else_out = Vec::new();
                        self.stmts(body, &mut else_out)?;
                        Some(else_out)
                    }
                    None => None,
                };
                out.push(Instruction::If {
                    result: None,
                    then_body: then_out,
                    else_body: else_out,
                });
            }
            StmtKind::While { condition, body } => {
                let n = self.next_label();
                let labels = LoopLabels {
                    break_label: format!("break_{n}"),
                    continue_label: format!("loop_{n}"),
                };
                let mut inner = Vec::new();
                if self.condition(condition, &mut inner).is_none() {
                    return Ok(());
                }
                inner.push(Instruction::numeric(ValType::I32, NumOp::Eqz));
                inner.push(Instruction::BrIf(labels.break_label.clone()));
                self.push_loop(labels.clone());
                let lowered = self.stmts(body, &mut inner);
                self.pop_loop();
                lowered?;
                inner.push(Instruction::Br(labels.continue_label.clone()));
                out.push(Instruction::Block {
                    label: labels.break_label,
                    result: None,
                    body: vec![Instruction::Loop {
                        label: labels.continue_label,
                        result: None,
                        body: inner,
                    }],
                });
            }
            StmtKind::Do { body, condition } => {
                let n = self.next_label();
                let labels = LoopLabels {
                    break_label: format!("break_{n}"),
                    continue_label: format!("continue_{n}"),
                };
                let loop_label = format!("loop_{n}");
                let mut body_out = Vec::new();
                self.push_loop(labels.clone());
                let lowered = self.stmts(body, &mut body_out);
                self.pop_loop();
                lowered?;
                let mut inner = vec![Instruction::Block {
                    label: labels.continue_label,
                    result: None,
                    body: body_out,
                }];
                if self.condition(condition, &mut inner).is_none() {
                    return Ok(());
                }
                inner.push(Instruction::BrIf(loop_label.clone()));
                out.push(Instruction::Block {
                    label: labels.break_label,
                    result: None,
                    body: vec![Instruction::Loop {
                        label: loop_label,
                        result: None,
                        body: inner,
                    }],
                });
            }
            StmtKind::Break | StmtKind::Continue => {
                let Some(labels) = self.innermost_loop() else {
                    return Err(CodegenError::Internal(format!(
                        "jump outside a loop in '{}'",
                        self.name
                    )));
                };
                let label = match stmt.kind {
                    StmtKind::Break => labels.break_label.clone(),
                    _ => labels.continue_label.clone(),
                };
                out.push(Instruction::Br(label));
            }
            StmtKind::Return(value) => self.return_stmt(value.as_ref(), stmt.span, tail, out),
        }
        Ok(())
    }

    fn local_variable(&mut self, variable: &Variable, out: &mut Vec<Instruction>) {
        let declared = variable.ty.as_ref().map(Ty::from_spec);
        let mut init_out = Vec::new();
        let ty = match (&declared, &variable.init) {
            (Some(ty), Some(init)) => {
                let Some(actual) = self.expr(init, Some(ty), &mut init_out) else {
                    return;
                };
                if !self.expect_type(&actual, ty, init.span) {
                    return;
                }
                self.normalize_value(ty, init, &mut init_out);
                ty.clone()
            }
            (None, Some(init)) => {
                let hint = self.type_of(init);
                let Some(actual) = self.expr(init, hint.as_ref(), &mut init_out) else {
                    return;
                };
                self.normalize_value(&actual, init, &mut init_out);
                actual
            }
            (Some(ty), None) => ty.clone(),
            (None, None) => Ty::Scalar(lowc_types::ast::Intrinsic::I32),
        };
        let Some(slot_ty) = self.cx.slot(&ty, "variable", variable.span) else {
            return;
        };
        let slot = self.declare(&variable.name.name, ty, slot_ty);
        // Locals start zeroed; only an initialiser needs a store.
        if variable.init.is_some() {
            out.extend(init_out);
            out.push(Instruction::LocalSet(slot));
        }
    }

    fn assignment(
        &mut self,
        target: &Expr,
        op: Option<BinaryOp>,
        value: &Expr,
        span: Span,
        out: &mut Vec<Instruction>,
    ) {
        let mut address = Vec::new();
        let Some(place) = self.place(target, &mut address) else {
            return;
        };
        match place {
            Place::Local { slot, ty } => {
                if op.is_some() {
                    out.push(Instruction::LocalGet(slot.clone()));
                }
                if self.assigned_value(&ty, op, value, span, out).is_some() {
                    out.push(Instruction::LocalSet(slot));
                }
            }
            Place::Global { name, ty } => {
                if op.is_some() {
                    out.push(Instruction::GlobalGet(name.clone()));
                }
                if self.assigned_value(&ty, op, value, span, out).is_some() {
                    out.push(Instruction::GlobalSet(name));
                }
            }
            Place::Memory { ty, offset } => {
                let Some(arg) = self.mem_arg(&ty, offset, target.span) else {
                    return;
                };
                out.extend(address);
                if op.is_some() {
                    // The address is needed twice: once for the load of
                    // the current value and once for the store.
                    let temp = self.temp(ValType::I32);
                    out.push(Instruction::LocalTee(temp.clone()));
                    out.push(Instruction::LocalGet(temp));
                    out.push(Instruction::Load(arg));
                }
                if self.assigned_value(&ty, op, value, span, out).is_some() {
                    out.push(Instruction::Store(arg));
                }
            }
        }
    }

    /// Emit the value stored by an assignment. For compound assignments
    /// the current value is already on the stack.
    fn assigned_value(
        &mut self,
        ty: &Ty,
        op: Option<BinaryOp>,
        value: &Expr,
        span: Span,
        out: &mut Vec<Instruction>,
    ) -> Option<()> {
        match op {
            None => {
                let actual = self.expr(value, Some(ty), out)?;
                if !self.expect_type(&actual, ty, value.span) {
                    return None;
                }
                self.normalize_value(ty, value, out);
            }
            Some(op) => {
                self.compound(op, ty, value, span, out)?;
                self.normalize(ty, out);
            }
        }
        Some(())
    }

    /// `current op= value`, with `current` on the stack.
    fn compound(
        &mut self,
        op: BinaryOp,
        ty: &Ty,
        value: &Expr,
        span: Span,
        out: &mut Vec<Instruction>,
    ) -> Option<()> {
        if let Ty::Pointer(target) = self.cx.types.expand(ty) {
            if matches!(op, BinaryOp::Add | BinaryOp::Sub) {
                let size = self.cx.types.size_of(&target).max(1);
                self.index(value, size, out)?;
                let op = if op == BinaryOp::Add { NumOp::Add } else { NumOp::Sub };
                out.push(Instruction::numeric(ValType::I32, op));
                return Some(());
            }
        }
        if op.is_comparison() {
            self.error(
                ErrorCode::INVALID_OPERAND,
                format!("'{op}' cannot be used as a compound assignment"),
                span,
            );
            return None;
        }
        let actual = self.expr(value, Some(ty), out)?;
        if !self.expect_type(&actual, ty, value.span) {
            return None;
        }
        let instruction = self.operator(op, ty, span)?;
        out.push(instruction);
        Some(())
    }

    fn return_stmt(&mut self, value: Option<&Expr>, span: Span, tail: bool, out: &mut Vec<Instruction>) {
        let result = self.result.clone();
        match (value, &result) {
            (Some(value), Ty::Void) => {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    format!("function '{}' returns no value", self.name),
                    value.span,
                );
                return;
            }
            (None, Ty::Void) => {}
            (None, ty) => {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    format!("function '{}' must return a value of type {ty}", self.name),
                    span,
                );
                return;
            }
            (Some(value), ty) => {
                let Some(actual) = self.expr(value, Some(ty), out) else {
                    return;
                };
                if !self.expect_type(&actual, ty, value.span) {
                    return;
                }
                self.normalize_value(ty, value, out);
            }
        }
        if !tail {
            out.push(Instruction::Return);
        }
    }
}

//! Function flags: call counts, inlining eligibility and return shape.

use std::collections::HashMap;

use lowc_types::ast::{DeclKind, Expr, ExprKind, Function, Stmt, StmtKind};
use lowc_types::ErrorCode;

use crate::resolver::Resolver;

impl Resolver<'_> {
    pub(crate) fn derive_function_flags(&mut self) {
        let mut calls: HashMap<String, u32> = HashMap::new();
        for (_, function) in self.table.functions() {
            for stmt in &function.body {
                walk_stmt(stmt, &mut |expr: &Expr| {
                    if let ExprKind::FunctionCall {
                        name,
                        dispatcher: None,
                        ..
                    } = &expr.kind
                    {
                        *calls.entry(name.name.clone()).or_default() += 1;
                    }
                });
            }
        }

        let mut missing = Vec::new();
        for decl in self.table.iter_mut() {
            let name = decl.name.clone();
            let DeclKind::Function(function) = &mut decl.kind else {
                continue;
            };
            function.flags.invocation_count = calls.get(&name.name).copied().unwrap_or(0);
            function.flags.has_return = matches!(
                function.body.last().map(|s| &s.kind),
                Some(StmtKind::Return(_))
            );
            let inlinable = function.inline && is_inlinable(&name.name, function);
            function.flags.can_be_inlined = inlinable;
            if function.signature.result.is_some() && !function.body.iter().any(contains_return) {
                missing.push(name);
            }
        }
        for name in missing {
            self.error(
                ErrorCode::MISSING_RETURN,
                format!("function '{name}' must return a value"),
                name.span,
            );
        }
    }
}

/// A single `return expr;` that does not call its own function.
fn is_inlinable(name: &str, function: &Function) -> bool {
    let [Stmt {
        kind: StmtKind::Return(Some(value)),
        ..
    }] = function.body.as_slice()
    else {
        return false;
    };
    let mut recursive = false;
    walk_expr(value, &mut |expr: &Expr| {
        if let ExprKind::FunctionCall { name: callee, .. } = &expr.kind {
            recursive |= callee.name == name;
        }
    });
    !recursive
}

fn contains_return(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::If {
            then_body,
            else_body,
            ..
        } => then_body
            .iter()
            .chain(else_body.iter().flatten())
            .any(contains_return),
        StmtKind::While { body, .. } | StmtKind::Do { body, .. } => body.iter().any(contains_return),
        _ => false,
    }
}

// ── Traversal ───────────────────────────────────────────────────────────────

fn walk_stmt(stmt: &Stmt, visit: &mut impl FnMut(&Expr)) {
    match &stmt.kind {
        StmtKind::LocalVariable(var) => {
            if let Some(init) = &var.init {
                walk_expr(init, visit);
            }
        }
        StmtKind::Assignment { target, value, .. } => {
            walk_expr(target, visit);
            walk_expr(value, visit);
        }
        StmtKind::LocalFunctionInvocation(expr) | StmtKind::Return(Some(expr)) => {
            walk_expr(expr, visit)
        }
        StmtKind::If {
            condition,
            then_body,
            else_body,
        } => {
            walk_expr(condition, visit);
            for stmt in then_body.iter().chain(else_body.iter().flatten()) {
                walk_stmt(stmt, visit);
            }
        }
        StmtKind::While { condition, body } | StmtKind::Do { body, condition } => {
            walk_expr(condition, visit);
            for stmt in body {
                walk_stmt(stmt, visit);
            }
        }
        StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue => {}
    }
}

fn walk_expr(expr: &Expr, visit: &mut impl FnMut(&Expr)) {
    visit(expr);
    match &expr.kind {
        ExprKind::Dereference(inner) => walk_expr(inner, visit),
        ExprKind::Unary { operand, .. } | ExprKind::TypeCast { operand, .. } => {
            walk_expr(operand, visit)
        }
        ExprKind::Binary { left, right, .. } => {
            walk_expr(left, visit);
            walk_expr(right, visit);
        }
        ExprKind::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            walk_expr(condition, visit);
            walk_expr(then_expr, visit);
            walk_expr(else_expr, visit);
        }
        ExprKind::BuiltinCall { args, .. } => {
            for arg in args {
                walk_expr(arg, visit);
            }
        }
        ExprKind::FunctionCall {
            args, dispatcher, ..
        } => {
            if let Some(dispatcher) = dispatcher {
                walk_expr(dispatcher, visit);
            }
            for arg in args {
                walk_expr(arg, visit);
            }
        }
        ExprKind::MemberAccess { object, .. } => walk_expr(object, visit),
        ExprKind::ItemAccess { object, index } => {
            walk_expr(object, visit);
            walk_expr(index, visit);
        }
        ExprKind::SizeOf(_) | ExprKind::Identifier(_) | ExprKind::Literal(_) => {}
    }
}

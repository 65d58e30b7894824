//! Emission order.
//!
//! Declarations are numbered by a post-order walk of the dependency graph,
//! starting from each declaration in source order: everything a
//! declaration refers to is numbered before it. Back edges (recursive
//! functions, self-pointing types) are skipped.

use lowc_types::ast::{
    DataContents, DeclKind, Expr, ExprKind, Signature, Stmt, StmtKind, TypeSpec, TypeSpecKind,
};

use crate::resolver::Resolver;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

impl Resolver<'_> {
    pub(crate) fn assign_order(&mut self) {
        let edges: Vec<Vec<usize>> = self
            .table
            .iter()
            .map(|decl| {
                let mut names = Vec::new();
                kind_refs(&decl.kind, &mut names);
                let mut targets: Vec<usize> = names
                    .iter()
                    .filter(|n| **n != decl.name.name)
                    .filter_map(|n| self.table.position(n))
                    .collect();
                targets.dedup();
                targets
            })
            .collect();

        let mut marks = vec![Mark::Unvisited; edges.len()];
        let mut order = vec![None; edges.len()];
        let mut next = 0u32;
        for root in 0..edges.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            // (node, next edge to follow)
            let mut stack = vec![(root, 0usize)];
            marks[root] = Mark::Visiting;
            while let Some((node, edge)) = stack.last_mut() {
                let node = *node;
                if let Some(&target) = edges[node].get(*edge) {
                    *edge += 1;
                    if marks[target] == Mark::Unvisited {
                        marks[target] = Mark::Visiting;
                        stack.push((target, 0));
                    }
                } else {
                    stack.pop();
                    marks[node] = Mark::Done;
                    order[node] = Some(next);
                    next += 1;
                }
            }
        }

        for (decl, order) in self.table.iter_mut().zip(order) {
            decl.order = order;
        }
        tracing::trace!(count = next, "assigned emission order");
    }
}

// ── Reference collection ────────────────────────────────────────────────────

fn kind_refs<'a>(kind: &'a DeclKind, out: &mut Vec<&'a str>) {
    match kind {
        DeclKind::Const { ty, value } => {
            if let Some(ty) = ty {
                spec_refs(ty, out);
            }
            expr_refs(value, out);
        }
        DeclKind::Global { ty, init } => {
            spec_refs(ty, out);
            if let Some(init) = init {
                expr_refs(init, out);
            }
        }
        DeclKind::Type { spec } => spec_refs(spec, out),
        DeclKind::Table { functions } => out.extend(functions.iter().map(|f| f.name.as_str())),
        DeclKind::Data {
            offset, contents, ..
        } => {
            expr_refs(offset, out);
            if let DataContents::Values(values) = contents {
                for value in values {
                    expr_refs(value, out);
                }
            }
        }
        DeclKind::ImportedFunction { signature, .. } => signature_refs(signature, out),
        DeclKind::Function(function) => {
            signature_refs(&function.signature, out);
            for stmt in &function.body {
                stmt_refs(stmt, out);
            }
        }
    }
}

fn signature_refs<'a>(signature: &'a Signature, out: &mut Vec<&'a str>) {
    for param in &signature.params {
        if let Some(ty) = &param.ty {
            spec_refs(ty, out);
        }
    }
    if let Some(result) = &signature.result {
        spec_refs(result, out);
    }
}

fn spec_refs<'a>(spec: &'a TypeSpec, out: &mut Vec<&'a str>) {
    match &spec.kind {
        TypeSpecKind::Void | TypeSpecKind::Intrinsic(_) => {}
        TypeSpecKind::Pointer(inner) => spec_refs(inner, out),
        TypeSpecKind::Array { element, length } => {
            spec_refs(element, out);
            expr_refs(length, out);
        }
        TypeSpecKind::Struct(fields) => {
            for field in fields {
                spec_refs(&field.spec, out);
            }
        }
        TypeSpecKind::Named(name) => out.push(&name.name),
    }
}

fn stmt_refs<'a>(stmt: &'a Stmt, out: &mut Vec<&'a str>) {
    match &stmt.kind {
        StmtKind::LocalVariable(var) => {
            if let Some(ty) = &var.ty {
                spec_refs(ty, out);
            }
            if let Some(init) = &var.init {
                expr_refs(init, out);
            }
        }
        StmtKind::Assignment { target, value, .. } => {
            expr_refs(target, out);
            expr_refs(value, out);
        }
        StmtKind::LocalFunctionInvocation(expr) => expr_refs(expr, out),
        StmtKind::If {
            condition,
            then_body,
            else_body,
        } => {
            expr_refs(condition, out);
            for stmt in then_body.iter().chain(else_body.iter().flatten()) {
                stmt_refs(stmt, out);
            }
        }
        StmtKind::While { condition, body } | StmtKind::Do { body, condition } => {
            expr_refs(condition, out);
            for stmt in body {
                stmt_refs(stmt, out);
            }
        }
        StmtKind::Return(Some(expr)) => expr_refs(expr, out),
        StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue => {}
    }
}

fn expr_refs<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
    match &expr.kind {
        ExprKind::Identifier(ident) => out.push(&ident.name),
        ExprKind::Literal(_) => {}
        ExprKind::SizeOf(spec) => spec_refs(spec, out),
        ExprKind::Dereference(inner) => expr_refs(inner, out),
        ExprKind::Unary { operand, .. } | ExprKind::TypeCast { operand, .. } => {
            expr_refs(operand, out)
        }
        ExprKind::Binary { left, right, .. } => {
            expr_refs(left, out);
            expr_refs(right, out);
        }
        ExprKind::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            expr_refs(condition, out);
            expr_refs(then_expr, out);
            expr_refs(else_expr, out);
        }
        ExprKind::BuiltinCall { args, .. } => {
            for arg in args {
                expr_refs(arg, out);
            }
        }
        ExprKind::FunctionCall {
            name,
            args,
            dispatcher,
        } => {
            out.push(&name.name);
            if let Some(dispatcher) = dispatcher {
                expr_refs(dispatcher, out);
            }
            for arg in args {
                expr_refs(arg, out);
            }
        }
        ExprKind::MemberAccess { object, .. } => expr_refs(object, out),
        ExprKind::ItemAccess { object, index } => {
            expr_refs(object, out);
            expr_refs(index, out);
        }
    }
}

//! Expression lowering.
//!
//! [`FunctionBuilder::expr`] leaves the expression's value on the stack
//! (nothing for a void call) and returns its source type, or `None` once
//! a diagnostic has been reported. Folded constants carry no type of
//! their own and take the type hinted by their context.

use lowc_resolver::{fit_to_width, wrap_to_width, Ty};
use lowc_types::ast::{
    BinaryOp, Builtin, ConstValue, DeclKind, Expr, ExprKind, Function, Ident, Intrinsic, Stmt,
    StmtKind, UnaryOp,
};
use lowc_types::{ErrorCode, Span};

use crate::builder::{Binding, FunctionBuilder};
use crate::emitter::{call_signature, value_of, CallSignature};
use crate::module::{Conversion, Instruction, MemArg, NumOp, ValType, Value};

/// A location that can be read or written.
#[derive(Debug, Clone)]
pub(crate) enum Place {
    Local { slot: String, ty: Ty },
    Global { name: String, ty: Ty },
    /// The address is on the stack; `offset` is added by the access.
    Memory { ty: Ty, offset: u32 },
}

impl Place {
    pub(crate) fn ty(&self) -> &Ty {
        match self {
            Place::Local { ty, .. } | Place::Global { ty, .. } | Place::Memory { ty, .. } => ty,
        }
    }
}

const I32: Ty = Ty::Scalar(Intrinsic::I32);

impl FunctionBuilder<'_, '_> {
    pub(crate) fn expr(
        &mut self,
        expr: &Expr,
        hint: Option<&Ty>,
        out: &mut Vec<Instruction>,
    ) -> Option<Ty> {
        if let Some(value) = expr.value {
            return self.constant(value, hint, expr.span, out);
        }
        match &expr.kind {
            ExprKind::Literal(literal) => match literal.to_const() {
                Some(value) => self.constant(value, hint, expr.span, out),
                None => {
                    self.error(
                        ErrorCode::CONSTANT_OUT_OF_RANGE,
                        format!("integer literal {literal} is too large"),
                        expr.span,
                    );
                    None
                }
            },
            ExprKind::Identifier(ident) => self.identifier(ident, out),
            ExprKind::Dereference(_) | ExprKind::MemberAccess { .. } | ExprKind::ItemAccess { .. } => {
                let place = self.place(expr, out)?;
                self.read(place, expr.span, out)
            }
            ExprKind::Unary { op, operand } => self.unary(*op, operand, hint, expr.span, out),
            ExprKind::Binary { op, left, right } => {
                self.binary(*op, left, right, hint, expr.span, out)
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => self.conditional(condition, then_expr, else_expr, hint, out),
            // Folded by the resolver; a missing value was reported there.
            ExprKind::SizeOf(_) => None,
            ExprKind::BuiltinCall { builtin, args } => {
                self.builtin(*builtin, args, hint, expr.span, out)
            }
            ExprKind::TypeCast { target, operand } => self.cast(*target, operand, out),
            ExprKind::FunctionCall {
                name,
                args,
                dispatcher,
            } => self.call(name, args, dispatcher.as_deref(), expr.span, out),
        }
    }

    /// The type an expression has on its own, without emitting anything.
    /// `None` for constants, which adopt their context's type.
    pub(crate) fn type_of(&self, expr: &Expr) -> Option<Ty> {
        if expr.value.is_some() {
            return None;
        }
        let types = self.cx.types;
        let table = self.cx.table;
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::SizeOf(_) => None,
            ExprKind::Identifier(ident) => match self.lookup(&ident.name) {
                Some(binding) => Some(binding.ty.clone()),
                None => match table.get(&ident.name).map(|d| &d.kind) {
                    Some(DeclKind::Global { ty, .. }) => Some(Ty::from_spec(ty)),
                    Some(DeclKind::Const { ty: Some(ty), .. }) => Some(Ty::from_spec(ty)),
                    _ => None,
                },
            },
            ExprKind::Dereference(inner) => match types.expand(&self.type_of(inner)?) {
                Ty::Pointer(target) => Some(*target),
                _ => None,
            },
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => Some(I32),
                UnaryOp::AddressOf => Some(self.type_of(operand)?.pointer_to()),
                _ => self.type_of(operand),
            },
            ExprKind::Binary { op, left, right } => {
                if op.is_comparison() {
                    return Some(I32);
                }
                let left = self.type_of(left);
                let right = self.type_of(right);
                let is_pointer = |ty: &Option<Ty>| {
                    ty.as_ref().is_some_and(|t| types.expand(t).is_pointer())
                };
                match op {
                    BinaryOp::Sub if is_pointer(&left) && is_pointer(&right) => Some(I32),
                    BinaryOp::Add if !is_pointer(&left) && is_pointer(&right) => right,
                    _ => left.or(right),
                }
            }
            ExprKind::Conditional {
                then_expr,
                else_expr,
                ..
            } => self.type_of(then_expr).or_else(|| self.type_of(else_expr)),
            ExprKind::BuiltinCall { builtin, args } => match builtin {
                Builtin::MemorySize | Builtin::MemoryGrow => Some(I32),
                _ => args.iter().find_map(|arg| self.type_of(arg)),
            },
            ExprKind::TypeCast { target, .. } => Some(Ty::Scalar(*target)),
            ExprKind::FunctionCall {
                name, dispatcher, ..
            } => match dispatcher {
                Some(_) => self
                    .cx
                    .tables
                    .get(&name.name)
                    .map(|slot| slot.signature.result.clone()),
                None => table
                    .get(&name.name)?
                    .signature()
                    .map(|s| call_signature(s).result),
            },
            ExprKind::MemberAccess { object, member } => {
                let container = match types.expand(&self.type_of(object)?) {
                    Ty::Pointer(target) => *target,
                    other => other,
                };
                types.field(&container, &member.name).map(|f| f.ty)
            }
            ExprKind::ItemAccess { object, .. } => match types.expand(&self.type_of(object)?) {
                Ty::Pointer(element) | Ty::Array { element, .. } => Some(*element),
                _ => None,
            },
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Constants and names
    // ══════════════════════════════════════════════════════════════════════

    /// Emit a folded constant at the hinted type, or at `i32`/`i64`/`f64`
    /// when the context has none.
    pub(crate) fn constant(
        &mut self,
        value: ConstValue,
        hint: Option<&Ty>,
        span: Span,
        out: &mut Vec<Instruction>,
    ) -> Option<Ty> {
        let types = self.cx.types;
        let target = hint.and_then(|ty| match types.expand(ty) {
            Ty::Scalar(intrinsic) => Some((intrinsic, ty.clone())),
            Ty::Pointer(_) => Some((Intrinsic::U32, ty.clone())),
            _ => None,
        });
        let (intrinsic, ty) = target.unwrap_or_else(|| {
            let intrinsic = default_intrinsic(value);
            (intrinsic, Ty::Scalar(intrinsic))
        });
        let value = match (value, intrinsic.is_float()) {
            (ConstValue::Int(v), false) => match fit_to_width(v, intrinsic) {
                Some(v) => ConstValue::Int(v),
                None => {
                    self.error(
                        ErrorCode::CONSTANT_OUT_OF_RANGE,
                        format!("constant {v} does not fit in {ty}"),
                        span,
                    );
                    return None;
                }
            },
            (ConstValue::Float(_), false) => {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    format!("type mismatch: expected {ty}, found a real constant"),
                    span,
                );
                return None;
            }
            (value, true) => ConstValue::Float(value.as_f64()),
        };
        out.push(Instruction::Const(value_of(value, intrinsic)));
        Some(ty)
    }

    fn identifier(&mut self, ident: &Ident, out: &mut Vec<Instruction>) -> Option<Ty> {
        if let Some(binding) = self.lookup(&ident.name) {
            let (slot, ty) = (binding.slot.clone(), binding.ty.clone());
            out.push(Instruction::LocalGet(slot));
            return Some(ty);
        }
        let table = self.cx.table;
        let Some(decl) = table.get(&ident.name) else {
            self.error(
                ErrorCode::UNKNOWN_IDENTIFIER,
                format!("unknown identifier '{ident}'"),
                ident.span,
            );
            return None;
        };
        match &decl.kind {
            DeclKind::Global { ty, .. } => {
                out.push(Instruction::GlobalGet(ident.name.clone()));
                Some(Ty::from_spec(ty))
            }
            DeclKind::Const { ty: Some(spec), value } => {
                let ty = Ty::from_spec(spec);
                self.constant(value.value?, Some(&ty), ident.span, out)
            }
            DeclKind::Const { ty: None, value } => {
                self.constant(value.value?, None, ident.span, out)
            }
            _ => {
                self.error(
                    ErrorCode::INVALID_OPERAND,
                    format!(
                        "'{ident}' is a {} and cannot be used as a value",
                        decl.kind_name()
                    ),
                    ident.span,
                );
                None
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Places
    // ══════════════════════════════════════════════════════════════════════

    /// Resolve an assignable location. For memory places the address is
    /// emitted.
    pub(crate) fn place(&mut self, expr: &Expr, out: &mut Vec<Instruction>) -> Option<Place> {
        let types = self.cx.types;
        match &expr.kind {
            ExprKind::Identifier(ident) => {
                if let Some(binding) = self.lookup(&ident.name) {
                    return Some(Place::Local {
                        slot: binding.slot.clone(),
                        ty: binding.ty.clone(),
                    });
                }
                let table = self.cx.table;
                match table.get(&ident.name) {
                    Some(decl) => match &decl.kind {
                        DeclKind::Global { ty, .. } => Some(Place::Global {
                            name: ident.name.clone(),
                            ty: Ty::from_spec(ty),
                        }),
                        _ => {
                            self.error(
                                ErrorCode::INVALID_OPERAND,
                                format!("'{ident}' is a {} and cannot be assigned", decl.kind_name()),
                                ident.span,
                            );
                            None
                        }
                    },
                    None => {
                        self.error(
                            ErrorCode::UNKNOWN_IDENTIFIER,
                            format!("unknown identifier '{ident}'"),
                            ident.span,
                        );
                        None
                    }
                }
            }
            ExprKind::Dereference(inner) => {
                let ty = self.expr(inner, None, out)?;
                match types.expand(&ty) {
                    Ty::Pointer(target) => Some(Place::Memory {
                        ty: *target,
                        offset: 0,
                    }),
                    _ => {
                        self.error(
                            ErrorCode::INVALID_OPERAND,
                            format!("cannot dereference a value of type {ty}"),
                            expr.span,
                        );
                        None
                    }
                }
            }
            ExprKind::MemberAccess { object, member } => {
                let (container, offset, _) = self.container(object, out)?;
                if let Some(field) = types.field(&container, &member.name) {
                    return Some(Place::Memory {
                        ty: field.ty,
                        offset: self.add_offset(offset, field.offset, expr.span)?,
                    });
                }
                if matches!(types.expand(&container), Ty::Struct(_)) {
                    self.error(
                        ErrorCode::UNKNOWN_FIELD,
                        format!("{container} has no field '{member}'"),
                        member.span,
                    );
                } else {
                    self.error(
                        ErrorCode::INVALID_OPERAND,
                        format!("'.{member}' needs a struct or a struct pointer, found {container}"),
                        member.span,
                    );
                }
                None
            }
            ExprKind::ItemAccess { object, index } => {
                let (container, offset, via_pointer) = self.container(object, out)?;
                let element = if via_pointer {
                    container
                } else {
                    match types.expand(&container) {
                        Ty::Array { element, .. } => *element,
                        _ => {
                            self.error(
                                ErrorCode::INVALID_OPERAND,
                                format!("cannot index a value of type {container}"),
                                object.span,
                            );
                            return None;
                        }
                    }
                };
                let size = types.size_of(&element).max(1);
                let folded = index
                    .value
                    .and_then(|v| v.as_int())
                    .and_then(|i| i.checked_mul(size as i128))
                    .and_then(|bytes| u32::try_from(bytes + offset as i128).ok());
                match folded {
                    Some(offset) => Some(Place::Memory {
                        ty: element,
                        offset,
                    }),
                    None => {
                        self.index(index, size, out)?;
                        out.push(Instruction::numeric(ValType::I32, NumOp::Add));
                        Some(Place::Memory {
                            ty: element,
                            offset,
                        })
                    }
                }
            }
            _ => {
                self.error(
                    ErrorCode::INVALID_OPERAND,
                    "expression is not assignable",
                    expr.span,
                );
                None
            }
        }
    }

    /// The memory a member or item access reaches into: through a pointer
    /// value, or a struct or array place. Returns the type stored at the
    /// address, the pending offset and whether a pointer was followed.
    fn container(&mut self, object: &Expr, out: &mut Vec<Instruction>) -> Option<(Ty, u32, bool)> {
        let types = self.cx.types;
        if let Some(ty) = self.type_of(object) {
            if let Ty::Pointer(target) = types.expand(&ty) {
                self.expr(object, None, out)?;
                return Some((*target, 0, true));
            }
        }
        match self.place(object, out)? {
            Place::Memory { ty, offset } => Some((ty, offset, false)),
            place => {
                self.error(
                    ErrorCode::INVALID_OPERAND,
                    format!(
                        "expected a pointer or a value in memory, found {}",
                        place.ty()
                    ),
                    object.span,
                );
                None
            }
        }
    }

    fn add_offset(&mut self, base: u32, extra: u32, span: Span) -> Option<u32> {
        let offset = base.checked_add(extra);
        if offset.is_none() {
            self.error(
                ErrorCode::CONSTANT_OUT_OF_RANGE,
                "member offset exceeds the address space",
                span,
            );
        }
        offset
    }

    /// Emit `index * scale` as an `i32`.
    pub(crate) fn index(&mut self, index: &Expr, scale: u32, out: &mut Vec<Instruction>) -> Option<()> {
        let ty = self.expr(index, Some(&I32), out)?;
        match self.cx.types.intrinsic(&ty) {
            Some(i) if i.is_integer() && ValType::of(i) == ValType::I32 => {}
            _ => {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    format!("index must be a 32-bit integer, found {ty}"),
                    index.span,
                );
                return None;
            }
        }
        if scale != 1 {
            out.push(Instruction::i32_const(scale as i32));
            out.push(Instruction::numeric(ValType::I32, NumOp::Mul));
        }
        Some(())
    }

    /// Read a place's value.
    pub(crate) fn read(&mut self, place: Place, span: Span, out: &mut Vec<Instruction>) -> Option<Ty> {
        match place {
            Place::Local { slot, ty } => {
                out.push(Instruction::LocalGet(slot));
                Some(ty)
            }
            Place::Global { name, ty } => {
                out.push(Instruction::GlobalGet(name));
                Some(ty)
            }
            Place::Memory { ty, offset } => {
                let arg = self.mem_arg(&ty, offset, span)?;
                out.push(Instruction::Load(arg));
                Some(ty)
            }
        }
    }

    /// Load/store operand for a value of `ty` at `offset`.
    pub(crate) fn mem_arg(&mut self, ty: &Ty, offset: u32, span: Span) -> Option<MemArg> {
        let intrinsic = match self.cx.types.expand(ty) {
            Ty::Scalar(intrinsic) => intrinsic,
            Ty::Pointer(_) => Intrinsic::U32,
            _ => {
                self.error(
                    ErrorCode::AGGREGATE_IN_SLOT,
                    format!("value of type {ty} cannot be held in a slot; use a pointer"),
                    span,
                );
                return None;
            }
        };
        Some(mem_arg(intrinsic, offset))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Operators
    // ══════════════════════════════════════════════════════════════════════

    fn unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        hint: Option<&Ty>,
        span: Span,
        out: &mut Vec<Instruction>,
    ) -> Option<Ty> {
        match op {
            UnaryOp::Plus => self.expr(operand, hint, out),
            UnaryOp::Neg | UnaryOp::BitNot => {
                let mut inner = Vec::new();
                let ty = self.expr(operand, hint, &mut inner)?;
                let intrinsic = self.arithmetic(&ty, &op.to_string(), span)?;
                let slot = ValType::of(intrinsic);
                match (op, intrinsic.is_float()) {
                    (UnaryOp::Neg, true) => {
                        out.extend(inner);
                        out.push(Instruction::numeric(slot, NumOp::Neg));
                    }
                    (UnaryOp::Neg, false) => {
                        out.push(Instruction::Const(crate::emitter::zero(slot)));
                        out.extend(inner);
                        out.push(Instruction::numeric(slot, NumOp::Sub));
                    }
                    (_, false) => {
                        out.extend(inner);
                        out.push(Instruction::Const(all_ones(slot)));
                        out.push(Instruction::numeric(slot, NumOp::Xor));
                    }
                    (_, true) => {
                        self.error(
                            ErrorCode::INVALID_OPERAND,
                            format!("operator '~' requires an integer operand, found {ty}"),
                            span,
                        );
                        return None;
                    }
                }
                Some(ty)
            }
            UnaryOp::Not => {
                let ty = self.expr(operand, None, out)?;
                let slot = self.cx.slot(&ty, "operand", operand.span)?;
                match slot {
                    ValType::I32 | ValType::I64 => out.push(Instruction::numeric(slot, NumOp::Eqz)),
                    ValType::F32 | ValType::F64 => {
                        out.push(Instruction::Const(crate::emitter::zero(slot)));
                        out.push(Instruction::numeric(slot, NumOp::Eq));
                    }
                }
                Some(I32)
            }
            UnaryOp::AddressOf => match self.place(operand, out)? {
                Place::Memory { ty, offset } => {
                    if offset != 0 {
                        out.push(Instruction::i32_const(offset as i32));
                        out.push(Instruction::numeric(ValType::I32, NumOp::Add));
                    }
                    Some(ty.pointer_to())
                }
                Place::Local { .. } | Place::Global { .. } => {
                    self.error(
                        ErrorCode::INVALID_OPERAND,
                        "cannot take the address of a local or global; only memory places are addressable",
                        operand.span,
                    );
                    None
                }
            },
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        hint: Option<&Ty>,
        span: Span,
        out: &mut Vec<Instruction>,
    ) -> Option<Ty> {
        let types = self.cx.types;
        let left_ty = self.type_of(left);
        let right_ty = self.type_of(right);
        let pointee = |ty: &Option<Ty>| match ty.as_ref().map(|t| types.expand(t)) {
            Some(Ty::Pointer(target)) => Some(types.size_of(&target).max(1)),
            _ => None,
        };

        match (op, pointee(&left_ty), pointee(&right_ty)) {
            (BinaryOp::Sub, Some(size), Some(_)) => {
                let pointer = self.expr(left, None, out)?;
                let other = self.expr(right, Some(&pointer), out)?;
                if !self.expect_type(&other, &pointer, right.span) {
                    return None;
                }
                out.push(Instruction::numeric(ValType::I32, NumOp::Sub));
                if size != 1 {
                    out.push(Instruction::i32_const(size as i32));
                    out.push(Instruction::numeric(ValType::I32, NumOp::Div { signed: true }));
                }
                return Some(I32);
            }
            (BinaryOp::Add | BinaryOp::Sub, Some(size), None) => {
                let pointer = self.expr(left, None, out)?;
                self.index(right, size, out)?;
                let op = if op == BinaryOp::Add { NumOp::Add } else { NumOp::Sub };
                out.push(Instruction::numeric(ValType::I32, op));
                return Some(pointer);
            }
            (BinaryOp::Add, None, Some(size)) => {
                self.index(left, size, out)?;
                let pointer = self.expr(right, None, out)?;
                out.push(Instruction::numeric(ValType::I32, NumOp::Add));
                return Some(pointer);
            }
            _ => {}
        }

        let operand_ty = left_ty
            .or(right_ty)
            .or_else(|| (!op.is_comparison()).then(|| hint.cloned()).flatten());
        let left_actual = self.expr(left, operand_ty.as_ref(), out)?;
        let operand_ty = operand_ty.unwrap_or_else(|| left_actual.clone());
        let right_actual = self.expr(right, Some(&operand_ty), out)?;
        if !self.expect_type(&left_actual, &operand_ty, left.span)
            || !self.expect_type(&right_actual, &operand_ty, right.span)
        {
            return None;
        }
        let instruction = self.operator(op, &operand_ty, span)?;
        out.push(instruction);
        Some(if op.is_comparison() { I32 } else { operand_ty })
    }

    /// The instruction for `op` on two values of `ty`.
    pub(crate) fn operator(&mut self, op: BinaryOp, ty: &Ty, span: Span) -> Option<Instruction> {
        let intrinsic = match self.cx.types.expand(ty) {
            Ty::Pointer(_) if op.is_comparison() => Intrinsic::U32,
            Ty::Pointer(_) => {
                self.error(
                    ErrorCode::INVALID_OPERAND,
                    format!("operator '{op}' cannot be applied to pointers"),
                    span,
                );
                return None;
            }
            _ => self.arithmetic(ty, op.symbol(), span)?,
        };
        if intrinsic.is_float() && op.is_integer_only() {
            self.error(
                ErrorCode::INVALID_OPERAND,
                format!("operator '{op}' requires integer operands, found {ty}"),
                span,
            );
            return None;
        }
        Some(Instruction::numeric(
            ValType::of(intrinsic),
            binary_op(op, intrinsic.is_signed()),
        ))
    }

    /// The intrinsic of an arithmetic operand.
    fn arithmetic(&mut self, ty: &Ty, op: &str, span: Span) -> Option<Intrinsic> {
        let intrinsic = self.cx.types.intrinsic(ty);
        if intrinsic.is_none() {
            self.error(
                ErrorCode::INVALID_OPERAND,
                format!("operator '{op}' cannot be applied to {ty}"),
                span,
            );
        }
        intrinsic
    }

    fn conditional(
        &mut self,
        condition: &Expr,
        then_expr: &Expr,
        else_expr: &Expr,
        hint: Option<&Ty>,
        out: &mut Vec<Instruction>,
    ) -> Option<Ty> {
        let ty = self
            .type_of(then_expr)
            .or_else(|| self.type_of(else_expr))
            .or_else(|| hint.cloned());
        self.condition(condition, out)?;
        let mut then_body = Vec::new();
        let then_ty = self.expr(then_expr, ty.as_ref(), &mut then_body)?;
        let ty = ty.unwrap_or_else(|| then_ty.clone());
        let mut else_body = Vec::new();
        let else_ty = self.expr(else_expr, Some(&ty), &mut else_body)?;
        if !self.expect_type(&then_ty, &ty, then_expr.span)
            || !self.expect_type(&else_ty, &ty, else_expr.span)
        {
            return None;
        }
        let slot = self.cx.slot(&ty, "conditional value", then_expr.span)?;
        out.push(Instruction::If {
            result: Some(slot),
            then_body,
            else_body: Some(else_body),
        });
        Some(ty)
    }

    /// Emit a condition as an `i32` that is non-zero when true.
    pub(crate) fn condition(&mut self, expr: &Expr, out: &mut Vec<Instruction>) -> Option<()> {
        let ty = self.expr(expr, None, out)?;
        let slot = self.cx.slot(&ty, "condition", expr.span)?;
        if slot != ValType::I32 {
            out.push(Instruction::Const(crate::emitter::zero(slot)));
            out.push(Instruction::numeric(slot, NumOp::Ne));
        }
        Some(())
    }

    // ══════════════════════════════════════════════════════════════════════
    // Builtins and casts
    // ══════════════════════════════════════════════════════════════════════

    fn builtin(
        &mut self,
        builtin: Builtin,
        args: &[Expr],
        hint: Option<&Ty>,
        span: Span,
        out: &mut Vec<Instruction>,
    ) -> Option<Ty> {
        if args.len() != builtin.arity() {
            self.error(
                ErrorCode::WRONG_ARG_COUNT,
                format!(
                    "'{builtin}' takes {} argument(s), found {}",
                    builtin.arity(),
                    args.len()
                ),
                span,
            );
            return None;
        }
        let (op, float) = match builtin {
            Builtin::MemorySize => {
                out.push(Instruction::MemorySize);
                return Some(I32);
            }
            Builtin::MemoryGrow => {
                let ty = self.expr(&args[0], Some(&I32), out)?;
                if !self.expect_type(&ty, &I32, args[0].span) {
                    return None;
                }
                out.push(Instruction::MemoryGrow);
                return Some(I32);
            }
            Builtin::Clz => (NumOp::Clz, false),
            Builtin::Ctz => (NumOp::Ctz, false),
            Builtin::Popcnt => (NumOp::Popcnt, false),
            Builtin::Rotl => (NumOp::Rotl, false),
            Builtin::Rotr => (NumOp::Rotr, false),
            Builtin::Abs => (NumOp::Abs, true),
            Builtin::Neg => (NumOp::Neg, true),
            Builtin::Ceil => (NumOp::Ceil, true),
            Builtin::Floor => (NumOp::Floor, true),
            Builtin::Trunc => (NumOp::Trunc, true),
            Builtin::Nearest => (NumOp::Nearest, true),
            Builtin::Sqrt => (NumOp::Sqrt, true),
            Builtin::Min => (NumOp::Min, true),
            Builtin::Max => (NumOp::Max, true),
            Builtin::Copysign => (NumOp::Copysign, true),
        };

        let mut operand_ty = args
            .iter()
            .find_map(|arg| self.type_of(arg))
            .or_else(|| hint.cloned());
        for arg in args {
            let ty = self.expr(arg, operand_ty.as_ref(), out)?;
            match &operand_ty {
                Some(expected) => {
                    if !self.expect_type(&ty, expected, arg.span) {
                        return None;
                    }
                }
                None => operand_ty = Some(ty),
            }
        }
        let ty = operand_ty?;
        let intrinsic = self.arithmetic(&ty, builtin.name(), span)?;
        if intrinsic.is_float() != float {
            let expected = if float { "floating-point" } else { "integer" };
            self.error(
                ErrorCode::INVALID_OPERAND,
                format!("'{builtin}' expects {expected} operands, found {ty}"),
                span,
            );
            return None;
        }
        out.push(Instruction::numeric(ValType::of(intrinsic), op));
        Some(ty)
    }

    fn cast(&mut self, target: Intrinsic, operand: &Expr, out: &mut Vec<Instruction>) -> Option<Ty> {
        if let Some(value) = operand.value {
            let folded = match (value, target.is_float()) {
                (ConstValue::Int(v), false) => ConstValue::Int(wrap_to_width(v, target)),
                (ConstValue::Float(v), false) => {
                    let truncated = v.trunc();
                    let fitted = truncated
                        .is_finite()
                        .then(|| fit_to_width(truncated as i128, target))
                        .flatten();
                    match fitted {
                        Some(v) => ConstValue::Int(v),
                        None => {
                            self.error(
                                ErrorCode::CONSTANT_OUT_OF_RANGE,
                                format!("constant {v:?} does not fit in {target}"),
                                operand.span,
                            );
                            return None;
                        }
                    }
                }
                (value, true) => ConstValue::Float(value.as_f64()),
            };
            out.push(Instruction::Const(value_of(folded, target)));
            return Some(Ty::Scalar(target));
        }

        let source = self.expr(operand, None, out)?;
        let from = match self.cx.types.expand(&source) {
            Ty::Scalar(intrinsic) => intrinsic,
            Ty::Pointer(_) => Intrinsic::U32,
            _ => {
                self.error(
                    ErrorCode::INVALID_OPERAND,
                    format!("cannot convert {source} to {target}"),
                    operand.span,
                );
                return None;
            }
        };
        let (from_slot, to_slot) = (ValType::of(from), ValType::of(target));
        let conversion = match (from.is_float(), target.is_float()) {
            (false, false) => match (from_slot, to_slot) {
                (ValType::I32, ValType::I64) => Some(Conversion::Extend {
                    signed: from.is_signed(),
                }),
                (ValType::I64, ValType::I32) => Some(Conversion::Wrap),
                _ => None,
            },
            (false, true) => Some(Conversion::Convert {
                from: from_slot,
                signed: from.is_signed(),
            }),
            (true, false) => Some(Conversion::Trunc {
                from: from_slot,
                signed: target.is_signed() || target.is_sub_word(),
            }),
            (true, true) => match (from_slot, to_slot) {
                (ValType::F32, ValType::F64) => Some(Conversion::Promote),
                (ValType::F64, ValType::F32) => Some(Conversion::Demote),
                _ => None,
            },
        };
        if let Some(op) = conversion {
            out.push(Instruction::Convert { to: to_slot, op });
        }
        if from != target {
            self.normalize(&Ty::Scalar(target), out);
        }
        Some(Ty::Scalar(target))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Calls
    // ══════════════════════════════════════════════════════════════════════

    fn call(
        &mut self,
        name: &Ident,
        args: &[Expr],
        dispatcher: Option<&Expr>,
        span: Span,
        out: &mut Vec<Instruction>,
    ) -> Option<Ty> {
        let table = self.cx.table;
        if let Some(dispatcher) = dispatcher {
            let Some(slot) = self.cx.tables.get(&name.name).cloned() else {
                // A table without a usable signature was reported already.
                if !matches!(
                    table.get(&name.name).map(|d| &d.kind),
                    Some(DeclKind::Table { .. })
                ) {
                    self.error(
                        ErrorCode::UNKNOWN_FUNCTION,
                        format!("'{name}' is not a table"),
                        name.span,
                    );
                }
                return None;
            };
            self.arguments(&name.name, &slot.signature.params, args, span, out)?;
            self.index(dispatcher, 1, out)?;
            if slot.base != 0 {
                out.push(Instruction::i32_const(slot.base as i32));
                out.push(Instruction::numeric(ValType::I32, NumOp::Add));
            }
            out.push(Instruction::CallIndirect(slot.type_name));
            return Some(slot.signature.result);
        }

        let Some(decl) = table.get(&name.name) else {
            self.error(
                ErrorCode::UNKNOWN_FUNCTION,
                format!("unknown function '{name}'"),
                name.span,
            );
            return None;
        };
        let Some(signature) = decl.signature() else {
            self.error(
                ErrorCode::UNKNOWN_FUNCTION,
                format!("'{name}' is a {}, not a function", decl.kind_name()),
                name.span,
            );
            return None;
        };
        let signature = call_signature(signature);
        if let Some((function, value)) = inline_body(&decl.kind) {
            if !self.inline_stack.contains(&name.name) {
                return self.inline_call(name, function, value, &signature, args, span, out);
            }
        }
        self.arguments(&name.name, &signature.params, args, span, out)?;
        out.push(Instruction::Call(name.name.clone()));
        Some(signature.result)
    }

    /// Emit call arguments, checked against the parameter types.
    fn arguments(
        &mut self,
        callee: &str,
        params: &[Ty],
        args: &[Expr],
        span: Span,
        out: &mut Vec<Instruction>,
    ) -> Option<()> {
        if args.len() != params.len() {
            self.error(
                ErrorCode::WRONG_ARG_COUNT,
                format!(
                    "'{callee}' takes {} argument(s), found {}",
                    params.len(),
                    args.len()
                ),
                span,
            );
            return None;
        }
        for (arg, param) in args.iter().zip(params) {
            let ty = self.expr(arg, Some(param), out)?;
            if !self.expect_type(&ty, param, arg.span) {
                return None;
            }
            self.normalize_value(param, arg, out);
        }
        Some(())
    }

    /// Expand a call to a single-`return` function in place: arguments
    /// are bound to fresh locals and the returned expression is lowered
    /// against them.
    #[allow(clippy::too_many_arguments)]
    fn inline_call(
        &mut self,
        name: &Ident,
        function: &Function,
        value: &Expr,
        signature: &CallSignature,
        args: &[Expr],
        span: Span,
        out: &mut Vec<Instruction>,
    ) -> Option<Ty> {
        let mut arguments = Vec::new();
        self.arguments(&name.name, &signature.params, args, span, &mut arguments)?;
        // Arguments are on the stack in order; pop them into locals last
        // to first.
        let mut bound = Vec::new();
        for (param, ty) in function.signature.params.iter().zip(&signature.params) {
            let slot_ty = self.cx.value_type(ty)?;
            let slot = self.temp(slot_ty);
            bound.push((
                param.name.name.clone(),
                Binding {
                    slot,
                    ty: ty.clone(),
                },
            ));
        }
        out.extend(arguments);
        for (_, binding) in bound.iter().rev() {
            out.push(Instruction::LocalSet(binding.slot.clone()));
        }

        let saved = self.enter_inline(bound);
        self.inline_stack.push(name.name.clone());
        let hint = match &signature.result {
            Ty::Void => None,
            ty => Some(ty),
        };
        let result = self.expr(value, hint, out);
        self.inline_stack.pop();
        self.leave_inline(saved);

        let ty = result?;
        if !self.expect_type(&ty, &signature.result, value.span) {
            return None;
        }
        self.normalize_value(&signature.result, value, out);
        let message = format!("inlined '{name}' into '{}'", self.name);
        self.cx.trace(message);
        Some(signature.result.clone())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// The function and its returned expression when calls to it may be
/// expanded in place.
fn inline_body(kind: &DeclKind) -> Option<(&Function, &Expr)> {
    let DeclKind::Function(function) = kind else {
        return None;
    };
    if !function.flags.can_be_inlined {
        return None;
    }
    match function.body.as_slice() {
        [Stmt {
            kind: StmtKind::Return(Some(value)),
            ..
        }] => Some((function, value)),
        _ => None,
    }
}

/// Type of an unhinted constant: `i32` when it fits, then `i64`, then
/// `u64`; reals are `f64`.
fn default_intrinsic(value: ConstValue) -> Intrinsic {
    match value {
        ConstValue::Float(_) => Intrinsic::F64,
        ConstValue::Int(v) if i32::try_from(v).is_ok() => Intrinsic::I32,
        ConstValue::Int(v) if i64::try_from(v).is_ok() => Intrinsic::I64,
        ConstValue::Int(_) => Intrinsic::U64,
    }
}

fn all_ones(slot: ValType) -> Value {
    match slot {
        ValType::I64 => Value::I64(-1),
        _ => Value::I32(-1),
    }
}

pub(crate) fn binary_op(op: BinaryOp, signed: bool) -> NumOp {
    match op {
        BinaryOp::Add => NumOp::Add,
        BinaryOp::Sub => NumOp::Sub,
        BinaryOp::Mul => NumOp::Mul,
        BinaryOp::Div => NumOp::Div { signed },
        BinaryOp::Rem => NumOp::Rem { signed },
        BinaryOp::BitAnd => NumOp::And,
        BinaryOp::BitOr => NumOp::Or,
        BinaryOp::BitXor => NumOp::Xor,
        BinaryOp::Shl => NumOp::Shl,
        BinaryOp::Shr => NumOp::Shr { signed },
        BinaryOp::ShrU => NumOp::Shr { signed: false },
        BinaryOp::Eq => NumOp::Eq,
        BinaryOp::Ne => NumOp::Ne,
        BinaryOp::Lt => NumOp::Lt { signed },
        BinaryOp::Le => NumOp::Le { signed },
        BinaryOp::Gt => NumOp::Gt { signed },
        BinaryOp::Ge => NumOp::Ge { signed },
    }
}

/// Access of an intrinsic at `offset`. Sub-width accesses carry their bit
/// width; alignment is the largest power of two dividing the offset, up
/// to the access width.
pub(crate) fn mem_arg(intrinsic: Intrinsic, offset: u32) -> MemArg {
    let ty = ValType::of(intrinsic);
    let width = intrinsic.size();
    let align = if offset == 0 {
        width
    } else {
        (1u32 << offset.trailing_zeros()).min(width)
    };
    MemArg {
        ty,
        bits: (width < ty.width()).then(|| intrinsic.bits()),
        signed: intrinsic.is_signed(),
        offset,
        align,
    }
}

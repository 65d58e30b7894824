//! Constant evaluation.
//!
//! Integers fold in 128 bits and reals in `f64`. Overflow of the 128-bit
//! domain and division by zero are errors, never traps. Fitting a folded
//! value to a fixed-width type follows [`fit_to_width`].

use lowc_types::ast::{
    BinaryOp, ConstValue, DeclKind, Expr, ExprKind, Intrinsic, Literal, UnaryOp,
};
use lowc_types::{ErrorCode, Span};

use crate::resolver::{Resolver, Status};

/// Fit an integer constant to an integer type of width *w*.
///
/// The value is accepted when it lies in `[-2^(w-1), 2^w - 1]`, the union
/// of the signed and unsigned ranges, and is then truncated to *w* bits
/// and read back with the target's signedness. `-1` fits `u8` as `255`;
/// `200` fits `i8` as `-56`; `256` fits neither.
pub fn fit_to_width(value: i128, target: Intrinsic) -> Option<i128> {
    let bits = target.bits();
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << bits) - 1;
    if value < min || value > max {
        return None;
    }
    Some(wrap_to_width(value, target))
}

/// Truncate an integer to the target width unconditionally, as an
/// explicit cast does.
pub fn wrap_to_width(value: i128, target: Intrinsic) -> i128 {
    let bits = target.bits();
    let mask = (1u128 << bits) - 1;
    let raw = (value as u128) & mask;
    if target.is_signed() && (raw >> (bits - 1)) & 1 == 1 {
        raw as i128 - (1i128 << bits)
    } else {
        raw as i128
    }
}

impl Resolver<'_> {
    /// Fold a `const` declaration by name.
    pub(crate) fn resolve_const(&mut self, name: &str, span: Span) -> Option<ConstValue> {
        match self.consts.get(name) {
            Some(Status::Done(value)) => return *value,
            Some(Status::InProgress) => {
                self.error(
                    ErrorCode::DEPENDENCY_CYCLE,
                    format!("constant '{name}' depends on itself"),
                    span,
                );
                return None;
            }
            None => {}
        }

        let Some(DeclKind::Const { value, .. }) = self.table.get_mut(name).map(|d| &mut d.kind)
        else {
            return None;
        };
        let placeholder = Expr::new(ExprKind::Literal(Literal::Integer(0)), value.span);
        let mut expr = std::mem::replace(value, placeholder);

        self.consts.insert(name.to_string(), Status::InProgress);
        let mut result = self.eval(&mut expr);
        let declared = match self.table.get(name).map(|d| &d.kind) {
            Some(DeclKind::Const { ty: Some(ty), .. }) => Some((self.spec_intrinsic(ty), ty.span)),
            _ => None,
        };
        match (result, declared) {
            (Some(value), Some((Some(target), _))) => {
                result = self.convert_constant(value, target, expr.span);
            }
            (_, Some((None, ty_span))) => {
                self.error(
                    ErrorCode::TYPE_MISMATCH,
                    format!("constant '{name}' must have a numeric type"),
                    ty_span,
                );
                result = None;
            }
            _ => {}
        }
        expr.value = result;
        self.consts.insert(name.to_string(), Status::Done(result));
        tracing::trace!(name, ?result, "folded constant");

        if let Some(DeclKind::Const { value, .. }) = self.table.get_mut(name).map(|d| &mut d.kind) {
            *value = expr;
        }
        result
    }

    /// Fold an expression, recording the value on the node.
    pub(crate) fn eval(&mut self, expr: &mut Expr) -> Option<ConstValue> {
        if expr.value.is_some() {
            return expr.value;
        }
        let span = expr.span;
        let value = match &mut expr.kind {
            ExprKind::Literal(lit) => {
                let value = lit.to_const();
                if value.is_none() {
                    self.error(
                        ErrorCode::CONSTANT_OUT_OF_RANGE,
                        format!("integer literal {lit} is too large"),
                        span,
                    );
                }
                value
            }
            ExprKind::Identifier(ident) => {
                let ident = ident.clone();
                match self.table.get(&ident.name).map(|d| &d.kind) {
                    Some(DeclKind::Const { .. }) => self.resolve_const(&ident.name, ident.span),
                    Some(_) => {
                        self.error(
                            ErrorCode::NOT_CONSTANT,
                            format!("'{}' is not a constant", ident.name),
                            ident.span,
                        );
                        None
                    }
                    None => {
                        self.error(
                            ErrorCode::UNKNOWN_IDENTIFIER,
                            format!("unknown identifier '{}'", ident.name),
                            ident.span,
                        );
                        None
                    }
                }
            }
            ExprKind::SizeOf(spec) => self
                .layout_spec(spec, true)
                .map(|size| ConstValue::Int(size as i128)),
            ExprKind::Unary { op, operand } => {
                let op = *op;
                let value = self.eval(operand)?;
                self.eval_unary(op, value, span)
            }
            ExprKind::Binary { op, left, right } => {
                let op = *op;
                let lhs = self.eval(left);
                let rhs = self.eval(right);
                self.eval_binary(op, lhs?, rhs?, span)
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(then_expr)
                } else {
                    self.eval(else_expr)
                }
            }
            ExprKind::TypeCast { target, operand } => {
                let target = *target;
                let value = self.eval(operand)?;
                self.eval_cast(value, target, span)
            }
            ExprKind::Dereference(_)
            | ExprKind::BuiltinCall { .. }
            | ExprKind::FunctionCall { .. }
            | ExprKind::MemberAccess { .. }
            | ExprKind::ItemAccess { .. } => {
                self.error(
                    ErrorCode::NOT_CONSTANT,
                    "expression is not constant",
                    span,
                );
                None
            }
        };
        expr.value = value;
        value
    }

    fn eval_unary(&mut self, op: UnaryOp, value: ConstValue, span: Span) -> Option<ConstValue> {
        match (op, value) {
            (UnaryOp::Plus, v) => Some(v),
            (UnaryOp::Neg, ConstValue::Int(v)) => match v.checked_neg() {
                Some(v) => Some(ConstValue::Int(v)),
                None => self.overflow(span),
            },
            (UnaryOp::Neg, ConstValue::Float(v)) => Some(ConstValue::Float(-v)),
            (UnaryOp::BitNot, ConstValue::Int(v)) => Some(ConstValue::Int(!v)),
            (UnaryOp::Not, v) => Some(ConstValue::Int(i128::from(!v.is_truthy()))),
            (UnaryOp::BitNot, ConstValue::Float(_)) => {
                self.error(
                    ErrorCode::INVALID_OPERAND,
                    "'~' needs an integer operand",
                    span,
                );
                None
            }
            (UnaryOp::AddressOf, _) => {
                self.error(ErrorCode::NOT_CONSTANT, "address is not constant", span);
                None
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        lhs: ConstValue,
        rhs: ConstValue,
        span: Span,
    ) -> Option<ConstValue> {
        if op.is_comparison() {
            let result = match (lhs, rhs) {
                (ConstValue::Int(a), ConstValue::Int(b)) => compare(op, a, b),
                (a, b) => compare(op, a.as_f64(), b.as_f64()),
            };
            return Some(ConstValue::Int(i128::from(result)));
        }
        match (lhs, rhs) {
            (ConstValue::Int(a), ConstValue::Int(b)) => self.eval_int(op, a, b, span),
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                let value = match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div if b == 0.0 => return self.division_by_zero(span),
                    BinaryOp::Div => a / b,
                    _ => {
                        self.error(
                            ErrorCode::INVALID_OPERAND,
                            format!("'{op}' needs integer operands"),
                            span,
                        );
                        return None;
                    }
                };
                Some(ConstValue::Float(value))
            }
        }
    }

    fn eval_int(&mut self, op: BinaryOp, a: i128, b: i128, span: Span) -> Option<ConstValue> {
        let value = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div | BinaryOp::Rem if b == 0 => return self.division_by_zero(span),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Rem => a.checked_rem(b),
            BinaryOp::BitAnd => Some(a & b),
            BinaryOp::BitOr => Some(a | b),
            BinaryOp::BitXor => Some(a ^ b),
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::ShrU => {
                let Ok(shift) = u32::try_from(b) else {
                    return self.overflow(span);
                };
                if shift >= 128 {
                    return self.overflow(span);
                }
                match op {
                    BinaryOp::Shl => {
                        let shifted = a << shift;
                        (shifted >> shift == a).then_some(shifted)
                    }
                    BinaryOp::Shr => Some(a >> shift),
                    _ if shift == 0 => Some(a),
                    _ => Some(((a as u128) >> shift) as i128),
                }
            }
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => Some(i128::from(compare(op, a, b))),
        };
        match value {
            Some(v) => Some(ConstValue::Int(v)),
            None => self.overflow(span),
        }
    }

    /// An explicit cast truncates integers silently; reals must fit the
    /// target's range.
    fn eval_cast(&mut self, value: ConstValue, target: Intrinsic, span: Span) -> Option<ConstValue> {
        if target.is_float() {
            let v = value.as_f64();
            return Some(ConstValue::Float(if target == Intrinsic::F32 {
                v as f32 as f64
            } else {
                v
            }));
        }
        match value {
            ConstValue::Int(v) => Some(ConstValue::Int(wrap_to_width(v, target))),
            ConstValue::Float(v) => {
                let truncated = v.trunc();
                let bits = target.bits() as i32;
                let (min, max) = if target.is_signed() {
                    (-(2f64.powi(bits - 1)), 2f64.powi(bits - 1))
                } else {
                    (0.0, 2f64.powi(bits))
                };
                if !truncated.is_finite() || truncated < min || truncated >= max {
                    self.error(
                        ErrorCode::CONSTANT_OUT_OF_RANGE,
                        format!("{v} cannot be converted to {target}"),
                        span,
                    );
                    return None;
                }
                Some(ConstValue::Int(truncated as i128))
            }
        }
    }

    fn overflow(&mut self, span: Span) -> Option<ConstValue> {
        self.error(
            ErrorCode::CONSTANT_OUT_OF_RANGE,
            "constant expression overflows",
            span,
        );
        None
    }

    fn division_by_zero(&mut self, span: Span) -> Option<ConstValue> {
        self.error(
            ErrorCode::DIVISION_BY_ZERO,
            "division by zero in constant expression",
            span,
        );
        None
    }
}

fn compare<T: PartialOrd>(op: BinaryOp, a: T, b: T) -> bool {
    match op {
        BinaryOp::Eq => a == b,
        BinaryOp::Ne => a != b,
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        _ => a >= b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lowc_types::ast::DeclarationTable;
    use lowc_types::CompileErrors;

    fn fold(source: &str) -> (Option<ConstValue>, Vec<ErrorCode>) {
        let tokens = lowc_lexer::lex_source(source, 0).tokens;
        let mut parser = lowc_parser::Parser::new(tokens);
        let mut expr = parser.parse_expr().expect("expression");
        let mut table = DeclarationTable::new();
        let mut errors = CompileErrors::empty();
        let value = Resolver::new(&mut table, &mut errors).eval(&mut expr);
        (value, errors.codes())
    }

    #[test]
    fn test_fit_to_width_accepts_union_of_ranges() {
        assert_eq!(fit_to_width(-1, Intrinsic::U8), Some(255));
        assert_eq!(fit_to_width(200, Intrinsic::I8), Some(-56));
        assert_eq!(fit_to_width(255, Intrinsic::U8), Some(255));
        assert_eq!(fit_to_width(256, Intrinsic::U8), None);
        assert_eq!(fit_to_width(-129, Intrinsic::I8), None);
        assert_eq!(
            fit_to_width(u64::MAX as i128, Intrinsic::I64),
            Some(-1)
        );
        assert_eq!(fit_to_width(1 << 64, Intrinsic::U64), None);
    }

    #[test]
    fn test_integer_folding() {
        assert_eq!(fold("1 + 2 * 3").0, Some(ConstValue::Int(7)));
        assert_eq!(fold("-7 / 2").0, Some(ConstValue::Int(-3)));
        assert_eq!(fold("-7 % 2").0, Some(ConstValue::Int(-1)));
        assert_eq!(fold("1 << 40").0, Some(ConstValue::Int(1 << 40)));
        assert_eq!(fold("-16 >> 2").0, Some(ConstValue::Int(-4)));
        assert_eq!(fold("3 > 2 ? 10 : 20").0, Some(ConstValue::Int(10)));
        assert_eq!(fold("!0 + ~0").0, Some(ConstValue::Int(0)));
    }

    #[test]
    fn test_big_integers_fold_exactly() {
        assert_eq!(
            fold("0xffff_ffff_ffff_ffff + 1").0,
            Some(ConstValue::Int(1 << 64))
        );
    }

    #[test]
    fn test_real_folding() {
        assert_eq!(fold("1.5 * 2").0, Some(ConstValue::Float(3.0)));
        assert_eq!(fold("f32(0.1)").0, Some(ConstValue::Float(0.1f32 as f64)));
        assert_eq!(fold("i32(-2.9)").0, Some(ConstValue::Int(-2)));
        assert_eq!(fold("u8(0x1ff)").0, Some(ConstValue::Int(255)));
    }

    #[test]
    fn test_constant_errors() {
        assert_eq!(fold("1 / 0").1, vec![ErrorCode::DIVISION_BY_ZERO]);
        assert_eq!(fold("1.0 / 0").1, vec![ErrorCode::DIVISION_BY_ZERO]);
        assert_eq!(fold("1.5 % 2").1, vec![ErrorCode::INVALID_OPERAND]);
        assert_eq!(fold("1 << 200").1, vec![ErrorCode::CONSTANT_OUT_OF_RANGE]);
        assert_eq!(fold("u8(300.0)").1, vec![ErrorCode::CONSTANT_OUT_OF_RANGE]);
        assert_eq!(fold("x + 1").1, vec![ErrorCode::UNKNOWN_IDENTIFIER]);
        assert_eq!(fold("f(1)").1, vec![ErrorCode::NOT_CONSTANT]);
    }
}

//! Expression parsing by precedence climbing.
//!
//! Lowest to highest:
//! 1. `?:` (right-associative)
//! 2. `|`
//! 3. `^`
//! 4. `&`
//! 5. `==` `!=`
//! 6. `<` `<=` `>` `>=`
//! 7. `<<` `>>` `>>>`
//! 8. `+` `-`
//! 9. `*` `/` `%`
//! 10. prefix `+` `-` `~` `!` `&` `*`
//! 11. postfix `.field` `[index]` `(args)`
//! 12. primary

use lowc_lexer::TokenKind;
use lowc_types::ast::{BinaryOp, Builtin, Expr, ExprKind, Ident, UnaryOp};
use lowc_types::{ErrorCode, Span};

use crate::parser::{PResult, Parser};

/// Operators of one binary precedence level.
type OperatorTable = fn(&TokenKind) -> Option<BinaryOp>;

fn bit_or(kind: &TokenKind) -> Option<BinaryOp> {
    matches!(kind, TokenKind::Pipe).then_some(BinaryOp::BitOr)
}

fn bit_xor(kind: &TokenKind) -> Option<BinaryOp> {
    matches!(kind, TokenKind::Caret).then_some(BinaryOp::BitXor)
}

fn bit_and(kind: &TokenKind) -> Option<BinaryOp> {
    matches!(kind, TokenKind::Amp).then_some(BinaryOp::BitAnd)
}

fn equality(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::EqEq => Some(BinaryOp::Eq),
        TokenKind::BangEq => Some(BinaryOp::Ne),
        _ => None,
    }
}

fn relational(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Less => Some(BinaryOp::Lt),
        TokenKind::LessEq => Some(BinaryOp::Le),
        TokenKind::Greater => Some(BinaryOp::Gt),
        TokenKind::GreaterEq => Some(BinaryOp::Ge),
        _ => None,
    }
}

fn shift(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Shl => Some(BinaryOp::Shl),
        TokenKind::Shr => Some(BinaryOp::Shr),
        TokenKind::ShrU => Some(BinaryOp::ShrU),
        _ => None,
    }
}

fn additive(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Plus => Some(BinaryOp::Add),
        TokenKind::Minus => Some(BinaryOp::Sub),
        _ => None,
    }
}

fn multiplicative(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Star => Some(BinaryOp::Mul),
        TokenKind::Slash => Some(BinaryOp::Div),
        TokenKind::Percent => Some(BinaryOp::Rem),
        _ => None,
    }
}

/// Binary levels from loosest to tightest.
const LEVELS: [OperatorTable; 8] = [
    bit_or,
    bit_xor,
    bit_and,
    equality,
    relational,
    shift,
    additive,
    multiplicative,
];

/// The operator of a compound assignment token (`+=` gives `+`).
pub(crate) fn compound_assignment(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::PlusEq => BinaryOp::Add,
        TokenKind::MinusEq => BinaryOp::Sub,
        TokenKind::StarEq => BinaryOp::Mul,
        TokenKind::SlashEq => BinaryOp::Div,
        TokenKind::PercentEq => BinaryOp::Rem,
        TokenKind::AmpEq => BinaryOp::BitAnd,
        TokenKind::PipeEq => BinaryOp::BitOr,
        TokenKind::CaretEq => BinaryOp::BitXor,
        TokenKind::ShlEq => BinaryOp::Shl,
        TokenKind::ShrEq => BinaryOp::Shr,
        TokenKind::ShrUEq => BinaryOp::ShrU,
        _ => return None,
    })
}

impl Parser {
    /// Parse a full expression. Each call is one level of nesting.
    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.enter()?;
        let result = self.parse_conditional();
        self.leave();
        result
    }

    /// `cond ? then : else`, with `else` binding to the right.
    fn parse_conditional(&mut self) -> PResult<Expr> {
        let condition = self.parse_binary(0)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(condition);
        }
        let then_expr = self.parse_expr()?;
        self.expect(&TokenKind::Colon, ErrorCode::UNEXPECTED_TOKEN)?;
        self.enter()?;
        let else_expr = self.parse_conditional();
        self.leave();
        let else_expr = else_expr?;
        let span = condition.span.merge(else_expr.span);
        Ok(Expr::new(
            ExprKind::Conditional {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    /// Left-associative binary operators at `LEVELS[level]` and tighter.
    fn parse_binary(&mut self, level: usize) -> PResult<Expr> {
        let Some(operators) = LEVELS.get(level) else {
            return self.parse_unary();
        };
        let mut left = self.parse_binary(level + 1)?;
        while let Some(op) = operators(self.peek_kind()) {
            self.advance();
            let right = self.parse_binary(level + 1)?;
            let span = left.span.merge(right.span);
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(left)
    }

    /// Prefix operators. `*e` is a dereference, the rest are [`UnaryOp`]s.
    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Amp => Some(UnaryOp::AddressOf),
            TokenKind::Star => None,
            _ => return self.parse_postfix(),
        };
        let start = self.advance().span;
        self.enter()?;
        let operand = self.parse_unary();
        self.leave();
        let operand = Box::new(operand?);
        let span = start.merge(operand.span);
        let kind = match op {
            Some(op) => ExprKind::Unary { op, operand },
            None => ExprKind::Dereference(operand),
        };
        Ok(Expr::new(kind, span))
    }

    /// `.field`, `[index]`, and `table[i](args)` after a primary.
    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let member = self.expect_identifier()?;
                    let span = expr.span.merge(member.span);
                    expr = Expr::new(
                        ExprKind::MemberAccess {
                            object: Box::new(expr),
                            member,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    let end = self.expect(&TokenKind::RBracket, ErrorCode::UNEXPECTED_TOKEN)?;
                    let span = expr.span.merge(end.span);
                    expr = Expr::new(
                        ExprKind::ItemAccess {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::LParen => expr = self.parse_indirect_call(expr)?,
                _ => return Ok(expr),
            }
        }
    }

    /// Only `table[index](args)` is callable after a postfix chain.
    fn parse_indirect_call(&mut self, callee: Expr) -> PResult<Expr> {
        let ExprKind::ItemAccess { object, index } = callee.kind else {
            return Err(self.fail(ErrorCode::UNEXPECTED_TOKEN, "expression is not callable"));
        };
        let ExprKind::Identifier(table) = object.kind else {
            return Err(self.fail(ErrorCode::UNEXPECTED_TOKEN, "expression is not callable"));
        };
        let (args, end) = self.parse_arguments()?;
        Ok(Expr::new(
            ExprKind::FunctionCall {
                name: table,
                args,
                dispatcher: Some(index),
            },
            callee.span.merge(end),
        ))
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let span = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::Number(lit) => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(lit), span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                let ident = Ident::new(name, span);
                if self.check(&TokenKind::LParen) {
                    return self.parse_call(ident);
                }
                Ok(Expr::new(ExprKind::Identifier(ident), span))
            }
            TokenKind::Intrinsic(target) => {
                self.advance();
                self.expect(&TokenKind::LParen, ErrorCode::EXPECTED_EXPRESSION)?;
                let operand = self.parse_expr()?;
                let end = self.expect(&TokenKind::RParen, ErrorCode::UNTERMINATED_ARGUMENT_LIST)?;
                Ok(Expr::new(
                    ExprKind::TypeCast {
                        target,
                        operand: Box::new(operand),
                    },
                    span.merge(end.span),
                ))
            }
            TokenKind::Sizeof => {
                self.advance();
                self.expect(&TokenKind::LParen, ErrorCode::UNEXPECTED_TOKEN)?;
                let spec = self.parse_type()?;
                let end = self.expect(&TokenKind::RParen, ErrorCode::UNEXPECTED_TOKEN)?;
                Ok(Expr::new(
                    ExprKind::SizeOf(Box::new(spec)),
                    span.merge(end.span),
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                let end = self.expect(&TokenKind::RParen, ErrorCode::UNEXPECTED_TOKEN)?;
                Ok(Expr {
                    span: span.merge(end.span),
                    ..inner
                })
            }
            other => Err(self.fail(
                ErrorCode::EXPECTED_EXPRESSION,
                format!("expected expression, got '{other}'"),
            )),
        }
    }

    /// `name(args)`: a builtin when `name` is reserved, otherwise a direct
    /// call.
    fn parse_call(&mut self, name: Ident) -> PResult<Expr> {
        let (args, end) = self.parse_arguments()?;
        let span = name.span.merge(end);
        let kind = match Builtin::from_name(&name.name) {
            Some(builtin) => ExprKind::BuiltinCall { builtin, args },
            None => ExprKind::FunctionCall {
                name,
                args,
                dispatcher: None,
            },
        };
        Ok(Expr::new(kind, span))
    }

    /// `( [expr { , expr }] )`. Returns the arguments and the span of `)`.
    fn parse_arguments(&mut self) -> PResult<(Vec<Expr>, Span)> {
        self.expect(&TokenKind::LParen, ErrorCode::UNEXPECTED_TOKEN)?;
        let mut args = Vec::new();
        if let Some(end) = self.eat_span(&TokenKind::RParen) {
            return Ok((args, end));
        }
        loop {
            self.check_argument_list_open()?;
            args.push(self.parse_expr()?);
            if let Some(end) = self.eat_span(&TokenKind::RParen) {
                return Ok((args, end));
            }
            self.check_argument_list_open()?;
            self.expect(&TokenKind::Comma, ErrorCode::UNEXPECTED_TOKEN)?;
        }
    }

    /// A `;`, `}` or end of input inside an argument list means the `)` is
    /// missing.
    fn check_argument_list_open(&mut self) -> PResult<()> {
        match self.peek_kind() {
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof => {
                let span = self.current_span();
                Err(self.fail_at(
                    ErrorCode::UNTERMINATED_ARGUMENT_LIST,
                    "unterminated argument list, expected ')'",
                    span,
                ))
            }
            _ => Ok(()),
        }
    }

    fn eat_span(&mut self, kind: &TokenKind) -> Option<Span> {
        if self.check(kind) {
            Some(self.advance().span)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::{ParseError, Parser};
    use lowc_lexer::lex_source;
    use lowc_types::ast::{BinaryOp, Builtin, Expr, ExprKind, Intrinsic, Literal, UnaryOp};
    use lowc_types::ErrorCode;

    fn parse(source: &str) -> Expr {
        let mut parser = Parser::new(lex_source(source, 0).tokens);
        let expr = parser
            .parse_expr()
            .unwrap_or_else(|e| panic!("{source}: {e:?} {:?}", parser.errors().errors));
        expr
    }

    fn parse_err(source: &str) -> (ParseError, Vec<ErrorCode>) {
        let mut parser = Parser::new(lex_source(source, 0).tokens);
        let err = parser.parse_expr().unwrap_err();
        (err, parser.errors().codes())
    }

    /// Fully parenthesised rendering of an expression tree.
    fn shape(expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Binary { op, left, right } => {
                format!("({} {} {})", shape(left), op, shape(right))
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => format!(
                "({} ? {} : {})",
                shape(condition),
                shape(then_expr),
                shape(else_expr)
            ),
            ExprKind::Unary { op, operand } => format!("({op}{})", shape(operand)),
            ExprKind::Dereference(inner) => format!("(*{})", shape(inner)),
            ExprKind::Identifier(id) => id.name.clone(),
            ExprKind::Literal(lit) => lit.to_string(),
            ExprKind::MemberAccess { object, member } => format!("{}.{member}", shape(object)),
            ExprKind::ItemAccess { object, index } => {
                format!("{}[{}]", shape(object), shape(index))
            }
            other => format!("{other:?}"),
        }
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        assert_eq!(shape(&parse("a + b * c")), "(a + (b * c))");
        assert_eq!(shape(&parse("a * b + c")), "((a * b) + c)");
    }

    #[test]
    fn test_bitwise_levels() {
        assert_eq!(shape(&parse("a | b & c")), "(a | (b & c))");
        assert_eq!(shape(&parse("(a ^ b) | c")), "((a ^ b) | c)");
        assert_eq!(shape(&parse("a ^ b | c")), "((a ^ b) | c)");
        assert_eq!(shape(&parse("a ^ b | c ^ d")), "((a ^ b) | (c ^ d))");
    }

    #[test]
    fn test_comparison_below_shift() {
        assert_eq!(
            shape(&parse("a << 1 < b >>> 2 == c")),
            "(((a << 1) < (b >>> 2)) == c)"
        );
    }

    #[test]
    fn test_left_associative_subtraction() {
        assert_eq!(shape(&parse("a - b - c")), "((a - b) - c)");
    }

    #[test]
    fn test_conditional_is_right_associative() {
        assert_eq!(
            shape(&parse("a ? b : c ? d : e")),
            "(a ? b : (c ? d : e))"
        );
    }

    #[test]
    fn test_prefix_operators() {
        assert_eq!(shape(&parse("-*p")), "(-(*p))");
        assert_eq!(shape(&parse("!~x")), "(!(~x))");
        assert_eq!(shape(&parse("&p.next")), "(&p.next)");
        let expr = parse("&a[1]");
        assert!(matches!(
            expr.kind,
            ExprKind::Unary {
                op: UnaryOp::AddressOf,
                ..
            }
        ));
    }

    #[test]
    fn test_postfix_chain() {
        assert_eq!(shape(&parse("p.items[i].value")), "p.items[i].value");
    }

    #[test]
    fn test_direct_call() {
        let expr = parse("add(1, x)");
        let ExprKind::FunctionCall {
            name,
            args,
            dispatcher,
        } = expr.kind
        else {
            panic!("expected call");
        };
        assert_eq!(name.name, "add");
        assert_eq!(args.len(), 2);
        assert!(dispatcher.is_none());
    }

    #[test]
    fn test_indirect_call() {
        let expr = parse("ops[i + 1](a, b)");
        let ExprKind::FunctionCall {
            name, dispatcher, ..
        } = expr.kind
        else {
            panic!("expected call");
        };
        assert_eq!(name.name, "ops");
        assert_eq!(shape(&dispatcher.unwrap()), "(i + 1)");
    }

    #[test]
    fn test_builtin_and_cast() {
        assert!(matches!(
            parse("sqrt(x)").kind,
            ExprKind::BuiltinCall {
                builtin: Builtin::Sqrt,
                ..
            }
        ));
        assert!(matches!(
            parse("memory_size()").kind,
            ExprKind::BuiltinCall {
                builtin: Builtin::MemorySize,
                ..
            }
        ));
        assert!(matches!(
            parse("i64(x)").kind,
            ExprKind::TypeCast {
                target: Intrinsic::I64,
                ..
            }
        ));
    }

    #[test]
    fn test_sizeof() {
        assert!(matches!(parse("sizeof(Node*)").kind, ExprKind::SizeOf(_)));
    }

    #[test]
    fn test_parentheses_widen_span() {
        let expr = parse("(a)");
        assert_eq!(expr.span.start_col, 1);
        assert_eq!(expr.span.end_col, 4);
    }

    #[test]
    fn test_literal() {
        assert_eq!(
            parse("0x10").kind,
            ExprKind::Literal(Literal::Integer(16))
        );
        assert!(matches!(
            parse("1 + 2").kind,
            ExprKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_call_on_non_table_is_rejected() {
        let (err, codes) = parse_err("f(1)(2)");
        assert_eq!(err, ParseError::Recovered(ErrorCode::UNEXPECTED_TOKEN));
        assert_eq!(codes, vec![ErrorCode::UNEXPECTED_TOKEN]);
    }

    #[test]
    fn test_missing_operand() {
        let (err, codes) = parse_err("a + ;");
        assert_eq!(err, ParseError::Recovered(ErrorCode::EXPECTED_EXPRESSION));
        assert_eq!(codes, vec![ErrorCode::EXPECTED_EXPRESSION]);
    }

    #[test]
    fn test_end_of_input_is_fatal() {
        let (err, _) = parse_err("a +");
        assert_eq!(err, ParseError::Fatal(ErrorCode::UNEXPECTED_END_OF_INPUT));
    }

    #[test]
    fn test_unterminated_arguments() {
        let (err, codes) = parse_err("f(a, b;");
        assert_eq!(err.code(), ErrorCode::UNTERMINATED_ARGUMENT_LIST);
        assert_eq!(codes, vec![ErrorCode::UNTERMINATED_ARGUMENT_LIST]);
    }

    #[test]
    fn test_nesting_limit() {
        let source = format!("{}x{}", "(".repeat(200), ")".repeat(200));
        let (err, codes) = parse_err(&source);
        assert_eq!(err, ParseError::Fatal(ErrorCode::NESTING_TOO_DEEP));
        assert_eq!(codes, vec![ErrorCode::NESTING_TOO_DEEP]);
    }
}

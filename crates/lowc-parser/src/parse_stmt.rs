//! Statement and block parsing.
//!
//! ```text
//! statement := "var" IDENT [":" type] ["=" expr] ";"
//!            | "if" "(" expr ")" body ["else" body]
//!            | "while" "(" expr ")" body
//!            | "do" body "while" "(" expr ")" ";"
//!            | "break" ";" | "continue" ";"
//!            | "return" [expr] ";"
//!            | place ("=" | op "=") expr ";"
//!            | call ";"
//! body      := "{" { statement } "}" | statement
//! ```

use lowc_lexer::TokenKind;
use lowc_types::ast::{Expr, ExprKind, Stmt, StmtKind, Variable};
use lowc_types::ErrorCode;

use crate::parse_expr::compound_assignment;
use crate::parser::{PResult, ParseError, Parser};

impl Parser {
    /// Parse a body: a braced block or a single statement. Counts as one
    /// level of nesting.
    pub(crate) fn parse_body(&mut self) -> PResult<Vec<Stmt>> {
        self.enter()?;
        let result = if self.check(&TokenKind::LBrace) {
            self.parse_block()
        } else {
            self.parse_statement().map(|stmt| vec![stmt])
        };
        self.leave();
        result
    }

    /// `{ statement* }`. Statements that fail are skipped up to the next
    /// boundary; only fatal errors escape.
    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace, ErrorCode::UNEXPECTED_TOKEN)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let before = self.position();
            match self.parse_statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(ParseError::Fatal(code)) => return Err(ParseError::Fatal(code)),
                Err(ParseError::Recovered(_)) => {
                    self.synchronize();
                    if self.position() == before {
                        self.advance();
                    }
                }
            }
        }
        self.expect(&TokenKind::RBrace, ErrorCode::UNEXPECTED_TOKEN)?;
        Ok(stmts)
    }

    /// Parse one statement.
    pub fn parse_statement(&mut self) -> PResult<Stmt> {
        match self.peek_kind() {
            TokenKind::Var => self.parse_var(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do(),
            TokenKind::Break | TokenKind::Continue => self.parse_jump(),
            TokenKind::Return => self.parse_return(),
            TokenKind::LBrace | TokenKind::Semicolon => {
                let found = self.peek_kind().clone();
                Err(self.fail(
                    ErrorCode::UNEXPECTED_TOKEN,
                    format!("unexpected '{found}', expected statement"),
                ))
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// `var name [: type] [= expr];`
    fn parse_var(&mut self) -> PResult<Stmt> {
        let start = self.advance().span;
        let name = self.expect_declared_name()?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        if ty.is_none() && init.is_none() {
            return Err(self.fail(
                ErrorCode::EXPECTED_TYPE,
                format!("variable '{}' needs a type or an initializer", name.name),
            ));
        }
        let end = self.expect_semicolon()?;
        let span = start.merge(end.span);
        Ok(Stmt::new(
            StmtKind::LocalVariable(Variable {
                name,
                ty,
                init,
                span,
            }),
            span,
        ))
    }

    fn parse_condition(&mut self) -> PResult<Expr> {
        self.expect(&TokenKind::LParen, ErrorCode::UNEXPECTED_TOKEN)?;
        let condition = self.parse_expr()?;
        self.expect(&TokenKind::RParen, ErrorCode::UNEXPECTED_TOKEN)?;
        Ok(condition)
    }

    /// `if (cond) body [else body]`
    fn parse_if(&mut self) -> PResult<Stmt> {
        let start = self.advance().span;
        let condition = self.parse_condition()?;
        let then_body = self.parse_body()?;
        let else_body = if self.eat(&TokenKind::Else) {
            Some(self.parse_body()?)
        } else {
            None
        };
        let span = start.merge(self.previous_span());
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_body,
                else_body,
            },
            span,
        ))
    }

    /// Parse a loop body with `break`/`continue` allowed.
    fn parse_loop_body(&mut self) -> PResult<Vec<Stmt>> {
        self.loop_depth += 1;
        let body = self.parse_body();
        self.loop_depth -= 1;
        body
    }

    /// `while (cond) body`
    fn parse_while(&mut self) -> PResult<Stmt> {
        let start = self.advance().span;
        let condition = self.parse_condition()?;
        let body = self.parse_loop_body()?;
        let span = start.merge(self.previous_span());
        Ok(Stmt::new(StmtKind::While { condition, body }, span))
    }

    /// `do body while (cond);`
    fn parse_do(&mut self) -> PResult<Stmt> {
        let start = self.advance().span;
        let body = self.parse_loop_body()?;
        self.expect(&TokenKind::While, ErrorCode::UNEXPECTED_TOKEN)?;
        let condition = self.parse_condition()?;
        let end = self.expect_semicolon()?;
        Ok(Stmt::new(
            StmtKind::Do { body, condition },
            start.merge(end.span),
        ))
    }

    /// `break;` or `continue;`. Outside a loop the statement is kept and
    /// W090 is reported.
    fn parse_jump(&mut self) -> PResult<Stmt> {
        let token = self.advance();
        let (kind, word) = match token.kind {
            TokenKind::Break => (StmtKind::Break, "break"),
            _ => (StmtKind::Continue, "continue"),
        };
        if self.loop_depth == 0 {
            self.report(
                ErrorCode::JUMP_OUTSIDE_LOOP,
                format!("'{word}' outside of a loop"),
                token.span,
            )?;
        }
        let end = self.expect_semicolon()?;
        Ok(Stmt::new(kind, token.span.merge(end.span)))
    }

    /// `return [expr];`
    fn parse_return(&mut self) -> PResult<Stmt> {
        let start = self.advance().span;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let end = self.expect_semicolon()?;
        Ok(Stmt::new(StmtKind::Return(value), start.merge(end.span)))
    }

    /// An assignment or a call evaluated for its effect.
    fn parse_expression_statement(&mut self) -> PResult<Stmt> {
        let expr = self.parse_expr()?;
        let op = match self.peek_kind() {
            TokenKind::Eq => Some(None),
            kind => compound_assignment(kind).map(Some),
        };
        if let Some(op) = op {
            if !is_place(&expr) {
                return Err(self.fail_at(
                    ErrorCode::INVALID_ASSIGNMENT_TARGET,
                    "invalid assignment target",
                    expr.span,
                ));
            }
            self.advance();
            let value = self.parse_expr()?;
            let end = self.expect_semicolon()?;
            let span = expr.span.merge(end.span);
            return Ok(Stmt::new(
                StmtKind::Assignment {
                    target: expr,
                    op,
                    value,
                },
                span,
            ));
        }
        if !matches!(
            expr.kind,
            ExprKind::FunctionCall { .. } | ExprKind::BuiltinCall { .. }
        ) {
            return Err(self.fail_at(
                ErrorCode::INVALID_EXPRESSION_STATEMENT,
                "expression statement must be a call or an assignment",
                expr.span,
            ));
        }
        let end = self.expect_semicolon()?;
        let span = expr.span.merge(end.span);
        Ok(Stmt::new(StmtKind::LocalFunctionInvocation(expr), span))
    }
}

/// Expressions that name a storage location.
fn is_place(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Identifier(_)
            | ExprKind::Dereference(_)
            | ExprKind::MemberAccess { .. }
            | ExprKind::ItemAccess { .. }
    )
}

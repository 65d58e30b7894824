//! Top-level declaration parsing.
//!
//! ```text
//! program     := { declaration }
//! declaration := "const" IDENT [":" type] "=" expr ";"
//!              | "global" IDENT ":" type ["=" expr] ";"
//!              | "type" IDENT "=" type ";"
//!              | "table" IDENT "=" "[" IDENT { "," IDENT } "]" ";"
//!              | "data" expr [":" intrinsic] "=" ( "[" expr { "," expr } "]" | STRING ) ";"
//!              | "import" STRING [STRING] "func" IDENT "(" params ")" [":" type] ";"
//!              | ["export"] ["inline"] "func" IDENT "(" params ")" [":" type] body
//! params      := [ IDENT ":" type { "," IDENT ":" type } ]
//! ```

use lowc_lexer::TokenKind;
use lowc_types::ast::{
    DataContents, DeclKind, Declaration, DeclarationTable, Function, FunctionFlags, Ident,
    Intrinsic, Signature, TypeSpec, Variable,
};
use lowc_types::{ErrorCode, Span};

use crate::parser::{PResult, ParseError, Parser};

impl Parser {
    /// Parse declarations until end of input. Failed declarations are
    /// skipped up to the next declaration keyword.
    pub(crate) fn parse_program(&mut self) -> DeclarationTable {
        let mut table = DeclarationTable::new();
        while !self.at_end() {
            let before = self.position();
            match self.parse_declaration() {
                Ok(decl) => {
                    tracing::trace!(name = %decl.name, kind = decl.kind_name(), "declaration");
                    if let Err(duplicate) = table.insert(decl) {
                        let message = format!(
                            "'{}' is already declared",
                            duplicate.name.name
                        );
                        if self
                            .report(ErrorCode::DUPLICATE_DECLARATION, message, duplicate.name.span)
                            .is_err()
                        {
                            break;
                        }
                    }
                }
                Err(ParseError::Fatal(_)) => break,
                Err(ParseError::Recovered(_)) => {
                    self.synchronize_declaration();
                    if self.position() == before {
                        self.advance();
                    }
                }
            }
        }
        table
    }

    fn parse_declaration(&mut self) -> PResult<Declaration> {
        let start = self.current_span();
        let (name, kind) = match self.peek_kind() {
            TokenKind::Const => self.parse_const()?,
            TokenKind::Global => self.parse_global()?,
            TokenKind::Type => self.parse_type_decl()?,
            TokenKind::Table => self.parse_table()?,
            TokenKind::Data => self.parse_data(start)?,
            TokenKind::Import => self.parse_import()?,
            TokenKind::Export | TokenKind::Inline | TokenKind::Func => self.parse_function()?,
            other => {
                let message = format!("expected declaration, got '{other}'");
                return Err(self.fail(ErrorCode::UNEXPECTED_TOKEN, message));
            }
        };
        Ok(Declaration::new(name, kind, start.merge(self.previous_span())))
    }

    /// `const NAME [: type] = expr;`
    fn parse_const(&mut self) -> PResult<(Ident, DeclKind)> {
        self.advance();
        let name = self.expect_declared_name()?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&TokenKind::Eq, ErrorCode::UNEXPECTED_TOKEN)?;
        let value = self.parse_expr()?;
        self.expect_semicolon()?;
        Ok((name, DeclKind::Const { ty, value }))
    }

    /// `global NAME: type [= expr];`
    fn parse_global(&mut self) -> PResult<(Ident, DeclKind)> {
        self.advance();
        let name = self.expect_declared_name()?;
        self.expect(&TokenKind::Colon, ErrorCode::EXPECTED_TYPE)?;
        let ty = self.parse_type()?;
        let init = if self.eat(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect_semicolon()?;
        Ok((name, DeclKind::Global { ty, init }))
    }

    /// `type NAME = type;`
    fn parse_type_decl(&mut self) -> PResult<(Ident, DeclKind)> {
        self.advance();
        let name = self.expect_declared_name()?;
        self.expect(&TokenKind::Eq, ErrorCode::UNEXPECTED_TOKEN)?;
        let spec = self.parse_type()?;
        self.expect_semicolon()?;
        Ok((name, DeclKind::Type { spec }))
    }

    /// `table NAME = [f, g];`
    fn parse_table(&mut self) -> PResult<(Ident, DeclKind)> {
        self.advance();
        let name = self.expect_declared_name()?;
        self.expect(&TokenKind::Eq, ErrorCode::UNEXPECTED_TOKEN)?;
        self.expect(&TokenKind::LBracket, ErrorCode::UNEXPECTED_TOKEN)?;
        let mut functions = vec![self.expect_identifier()?];
        while self.eat(&TokenKind::Comma) {
            functions.push(self.expect_identifier()?);
        }
        self.expect(&TokenKind::RBracket, ErrorCode::UNEXPECTED_TOKEN)?;
        self.expect_semicolon()?;
        Ok((name, DeclKind::Table { functions }))
    }

    /// `data OFFSET [: intrinsic] = [v, ...] | "bytes";`
    ///
    /// Data segments are anonymous; they are named `.dataN` in order of
    /// appearance, which no identifier can collide with.
    fn parse_data(&mut self, start: Span) -> PResult<(Ident, DeclKind)> {
        self.advance();
        let name = Ident::new(format!(".data{}", self.next_data_index), start);
        self.next_data_index += 1;
        let offset = self.parse_expr()?;
        let element = if self.eat(&TokenKind::Colon) {
            match self.peek_kind().clone() {
                TokenKind::Intrinsic(intrinsic) => {
                    self.advance();
                    intrinsic
                }
                other => {
                    let message = format!("expected element type, got '{other}'");
                    return Err(self.fail(ErrorCode::EXPECTED_TYPE, message));
                }
            }
        } else {
            Intrinsic::U8
        };
        self.expect(&TokenKind::Eq, ErrorCode::UNEXPECTED_TOKEN)?;
        let contents = match self.peek_kind().clone() {
            TokenKind::Str(bytes) => {
                self.advance();
                DataContents::Bytes(bytes)
            }
            _ => {
                self.expect(&TokenKind::LBracket, ErrorCode::EXPECTED_EXPRESSION)?;
                let mut values = vec![self.parse_expr()?];
                while self.eat(&TokenKind::Comma) {
                    values.push(self.parse_expr()?);
                }
                self.expect(&TokenKind::RBracket, ErrorCode::UNEXPECTED_TOKEN)?;
                DataContents::Values(values)
            }
        };
        self.expect_semicolon()?;
        Ok((
            name,
            DeclKind::Data {
                offset,
                element,
                contents,
                bytes: Vec::new(),
            },
        ))
    }

    /// `import "module" ["field"] func NAME(params) [: type];`
    fn parse_import(&mut self) -> PResult<(Ident, DeclKind)> {
        self.advance();
        let module = self.expect_string()?;
        let field = match self.peek_kind() {
            TokenKind::Str(_) => Some(self.expect_string()?),
            _ => None,
        };
        self.expect(&TokenKind::Func, ErrorCode::UNEXPECTED_TOKEN)?;
        let name = self.expect_declared_name()?;
        let signature = self.parse_signature()?;
        self.expect_semicolon()?;
        let field = field.unwrap_or_else(|| name.name.clone());
        Ok((
            name,
            DeclKind::ImportedFunction {
                module,
                field,
                signature,
            },
        ))
    }

    /// `[export] [inline] func NAME(params) [: type] body`
    fn parse_function(&mut self) -> PResult<(Ident, DeclKind)> {
        let exported = self.eat(&TokenKind::Export);
        let inline = self.eat(&TokenKind::Inline);
        self.expect(&TokenKind::Func, ErrorCode::UNEXPECTED_TOKEN)?;
        let name = self.expect_declared_name()?;
        let signature = self.parse_signature()?;
        self.loop_depth = 0;
        let body = self.parse_body()?;
        let index = self.next_function_index;
        self.next_function_index += 1;
        Ok((
            name,
            DeclKind::Function(Function {
                index,
                signature,
                body,
                exported,
                inline,
                flags: FunctionFlags::default(),
            }),
        ))
    }

    /// `(params) [: type]`. A `void` result is the same as none.
    fn parse_signature(&mut self) -> PResult<Signature> {
        self.expect(&TokenKind::LParen, ErrorCode::UNEXPECTED_TOKEN)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            params.push(self.parse_param()?);
            while self.eat(&TokenKind::Comma) {
                params.push(self.parse_param()?);
            }
        }
        self.expect(&TokenKind::RParen, ErrorCode::UNEXPECTED_TOKEN)?;
        let result = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?).filter(|spec: &TypeSpec| !spec.is_void())
        } else {
            None
        };
        Ok(Signature { params, result })
    }

    /// `name: type`
    fn parse_param(&mut self) -> PResult<Variable> {
        let name = self.expect_declared_name()?;
        self.expect(&TokenKind::Colon, ErrorCode::EXPECTED_TYPE)?;
        let ty = self.parse_type()?;
        let span = name.span.merge(ty.span);
        Ok(Variable {
            name,
            ty: Some(ty),
            init: None,
            span,
        })
    }

    fn expect_string(&mut self) -> PResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Str(bytes) => {
                self.advance();
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            other => {
                let message = format!("expected string, got '{other}'");
                Err(self.fail(ErrorCode::UNEXPECTED_TOKEN, message))
            }
        }
    }
}

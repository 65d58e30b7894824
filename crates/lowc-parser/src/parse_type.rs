//! Type specification parsing.
//!
//! ```text
//! type := base { "*" | "[" expr "]" }
//! base := "void" | intrinsic | IDENT | "struct" "{" { IDENT ":" type ";" } "}"
//! ```

use lowc_lexer::TokenKind;
use lowc_types::ast::{Ident, StructField, TypeSpec, TypeSpecKind};
use lowc_types::ErrorCode;

use crate::parser::{PResult, Parser};

impl Parser {
    /// Parse a type with its pointer and array suffixes.
    pub(crate) fn parse_type(&mut self) -> PResult<TypeSpec> {
        let mut spec = self.parse_base_type()?;
        loop {
            match self.peek_kind() {
                TokenKind::Star => {
                    let end = self.advance().span;
                    let span = spec.span.merge(end);
                    spec = TypeSpec::new(TypeSpecKind::Pointer(Box::new(spec)), span);
                }
                TokenKind::LBracket => {
                    self.advance();
                    let length = self.parse_expr()?;
                    let end = self.expect(&TokenKind::RBracket, ErrorCode::UNEXPECTED_TOKEN)?;
                    let span = spec.span.merge(end.span);
                    spec = TypeSpec::new(
                        TypeSpecKind::Array {
                            element: Box::new(spec),
                            length: Box::new(length),
                        },
                        span,
                    );
                }
                _ => return Ok(spec),
            }
        }
    }

    fn parse_base_type(&mut self) -> PResult<TypeSpec> {
        let span = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::Void => {
                self.advance();
                Ok(TypeSpec::new(TypeSpecKind::Void, span))
            }
            TokenKind::Intrinsic(intrinsic) => {
                self.advance();
                Ok(TypeSpec::new(TypeSpecKind::Intrinsic(intrinsic), span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(TypeSpec::new(
                    TypeSpecKind::Named(Ident::new(name, span)),
                    span,
                ))
            }
            TokenKind::Struct => self.parse_struct_type(),
            other => Err(self.fail(
                ErrorCode::EXPECTED_TYPE,
                format!("expected type, got '{other}'"),
            )),
        }
    }

    /// `struct { name: type; ... }`
    fn parse_struct_type(&mut self) -> PResult<TypeSpec> {
        let start = self.advance().span;
        self.expect(&TokenKind::LBrace, ErrorCode::UNEXPECTED_TOKEN)?;
        self.enter()?;
        let fields = self.parse_struct_fields();
        self.leave();
        let fields = fields?;
        let end = self.expect(&TokenKind::RBrace, ErrorCode::UNEXPECTED_TOKEN)?;
        Ok(TypeSpec::new(
            TypeSpecKind::Struct(fields),
            start.merge(end.span),
        ))
    }

    fn parse_struct_fields(&mut self) -> PResult<Vec<StructField>> {
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            let name = self.expect_identifier()?;
            self.expect(&TokenKind::Colon, ErrorCode::UNEXPECTED_TOKEN)?;
            let spec = self.parse_type()?;
            self.expect_semicolon()?;
            let span = name.span.merge(spec.span);
            fields.push(StructField {
                name,
                spec,
                offset: None,
                span,
            });
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::Parser;
    use lowc_lexer::lex_source;
    use lowc_types::ast::{Intrinsic, TypeSpecKind};

    fn parse_type(source: &str) -> lowc_types::ast::TypeSpec {
        let mut parser = Parser::new(lex_source(source, 0).tokens);
        let spec = parser.parse_type().unwrap();
        assert!(!parser.errors().has_errors());
        spec
    }

    #[test]
    fn test_suffixes_apply_left_to_right() {
        // (u8*)[4]
        let spec = parse_type("u8*[4]");
        let TypeSpecKind::Array { element, .. } = &spec.kind else {
            panic!("expected array, got {spec}");
        };
        assert!(matches!(element.kind, TypeSpecKind::Pointer(_)));
    }

    #[test]
    fn test_struct_fields_keep_order() {
        let spec = parse_type("struct { a: u8; next: Node*; }");
        let TypeSpecKind::Struct(fields) = &spec.kind else {
            panic!("expected struct");
        };
        let names: Vec<&str> = fields.iter().map(|f| f.name.name.as_str()).collect();
        assert_eq!(names, vec!["a", "next"]);
        assert_eq!(
            fields[0].spec.kind,
            TypeSpecKind::Intrinsic(Intrinsic::U8)
        );
    }
}

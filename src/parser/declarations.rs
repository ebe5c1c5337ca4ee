//! Declaration parsing module
//!
//! This module drives the top level of a unit: declarations, `FFI_SCOPE`/`FFI_LIB`
//! directives and error recovery between statements.

use crate::ast::*;
use crate::diagnostic::ParseError;
use crate::lexer::TokenKind;
use crate::source::SourceSpan;
use log::debug;

use super::Parser;
use super::declaration_core::{SpecifierContext, parse_declaration_specifiers, skip_attributes, skip_initializer};
use super::declarator::parse_declarator;

/// Parse every top-level item into the parser's unit.
/// Recoverable errors are reported and parsing resumes at the next statement.
pub(crate) fn parse_translation_unit(parser: &mut Parser) -> Result<(), ParseError> {
    while let Some(token) = parser.try_current_token() {
        match token.kind {
            TokenKind::Directive(kind, value) => {
                parser.advance();
                parser.unit.directives.push(Directive {
                    kind,
                    value,
                    span: token.span,
                });
                continue;
            }
            TokenKind::Semicolon => {
                parser.advance();
                continue;
            }
            _ => {}
        }

        match parse_declaration(parser) {
            Ok(declarations) => parser.unit.declarations.extend(declarations),
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                debug!("parse_translation_unit: recovering from {error:?}");
                parser.diag.report_error(error);
                parser.synchronize();
            }
        }
    }
    Ok(())
}

/// Parse one declaration statement, returning one entry per declarator
pub(crate) fn parse_declaration(parser: &mut Parser) -> Result<Vec<Declaration>, ParseError> {
    let start_span = parser.current_token_span_or_empty();
    let specifiers = parse_declaration_specifiers(parser, SpecifierContext::TopLevel)?;
    let is_typedef = specifiers.storage == Some(StorageClass::Typedef);
    let declares_tag = matches!(specifiers.type_spec, TypeSpecifier::Record(_) | TypeSpecifier::Enum(_));
    let spec = parser.unit.push_specifiers(specifiers);

    // `struct S { ... };`, `struct S;`, `enum E { ... };`
    if let Some(semi) = parser.accept(TokenKind::Semicolon) {
        if declares_tag {
            return Ok(vec![Declaration {
                spec,
                declarator: None,
                has_initializer: false,
                span: start_span.merge(semi.span),
            }]);
        }
        return Err(ParseError::MissingDeclaratorName { span: semi.span });
    }

    let mut declarations = Vec::new();
    loop {
        let declarator_start = parser.current_token_span_or_empty();
        let declarator = parse_declarator(parser)?;
        let Some((name, _)) = declarator.name() else {
            return Err(ParseError::MissingDeclaratorName {
                span: declarator_start,
            });
        };
        skip_attributes(parser)?;

        if is_typedef {
            parser.add_typedef(name);
        }

        let mut has_initializer = false;
        if let Some(assign) = parser.accept(TokenKind::Assign) {
            if is_typedef || declarator.is_function() {
                return Err(ParseError::DeclarationNotAllowed {
                    message: format!("'{name}' cannot have an initializer"),
                    span: assign.span,
                });
            }
            skip_initializer(parser)?;
            has_initializer = true;
        }

        if parser.is_token(TokenKind::LeftBrace) && declarator.is_function() && declarations.is_empty() {
            return skip_function_body(parser, declarator_start);
        }

        declarations.push(Declaration {
            spec,
            declarator: Some(declarator),
            has_initializer,
            span: start_span.merge(parser.previous_token_span()),
        });

        if parser.accept(TokenKind::Comma).is_none() {
            break;
        }
    }

    parser.expect(TokenKind::Semicolon)?;
    Ok(declarations)
}

/// Function definitions are reported but the rest of the unit is still parsed
fn skip_function_body(parser: &mut Parser, span: SourceSpan) -> Result<Vec<Declaration>, ParseError> {
    let open = parser.expect(TokenKind::LeftBrace)?;
    parser.diag.report_error(ParseError::Unsupported {
        construct: "function definitions".to_string(),
        span: span.merge(open.span),
    });

    let mut depth = 1usize;
    while depth > 0 {
        let token = parser.current_token()?;
        match token.kind {
            TokenKind::LeftBrace => depth += 1,
            TokenKind::RightBrace => depth -= 1,
            _ => {}
        }
        parser.advance();
    }
    Ok(Vec::new())
}

//! Enum parsing module
//!
//! This module handles parsing of enum declarations and enumerators.

use crate::ast::*;
use crate::diagnostic::ParseError;
use crate::lexer::TokenKind;
use crate::type_node::PrimitiveKind;

use super::Parser;
use super::declaration_core::{SpecifierContext, parse_attributes, parse_declaration_specifiers};
use super::expressions::parse_const_expr;
use super::struct_parsing::wrap_body_error;

/// Parse enum specifier; the current token is `enum`
pub(crate) fn parse_enum_specifier(parser: &mut Parser) -> Result<EnumSpecifier, ParseError> {
    let keyword_token = parser.expect(TokenKind::Enum)?;
    let mut packed = parse_attributes(parser)?;
    let tag = parser.accept_name();

    let underlying = if parser.is_token(TokenKind::Colon) && starts_underlying_type(parser) {
        parser.advance();
        Some(parse_underlying_type(parser)?)
    } else {
        None
    };

    let body = if parser.accept(TokenKind::LeftBrace).is_some() {
        let enumerators = parse_enumerator_list(parser).map_err(|error| wrap_body_error("enum body", error))?;
        parser
            .expect(TokenKind::RightBrace)
            .map_err(|error| wrap_body_error("enum body", error))?;
        packed |= parse_attributes(parser)?;
        Some(enumerators)
    } else {
        None
    };

    if tag.is_none() && body.is_none() {
        let token = parser.current_token()?;
        return Err(ParseError::UnexpectedToken {
            expected: "identifier or '{'".to_string(),
            found: token.kind,
            span: token.span,
        });
    }

    let (tag, is_anonymous) = match tag {
        Some((name, _)) => (name, false),
        None => (parser.anonymous_tag("enum"), true),
    };

    Ok(EnumSpecifier {
        tag,
        is_anonymous,
        underlying,
        body,
        packed,
        span: keyword_token.span.merge(parser.previous_token_span()),
    })
}

/// `enum E : type` only when the token after `:` can start a type; otherwise the
/// colon belongs to an enclosing bit-field (`enum E x : 3`)
fn starts_underlying_type(parser: &Parser) -> bool {
    parser.peek_token(0).is_some_and(|token| match token.kind {
        TokenKind::Identifier(name) => parser.is_type_name(name),
        kind => kind.is_type_specifier() || kind.is_type_qualifier(),
    })
}

fn parse_underlying_type(parser: &mut Parser) -> Result<PrimitiveKind, ParseError> {
    let spec = parse_declaration_specifiers(parser, SpecifierContext::TypeName)?;
    let kind = match spec.type_spec {
        TypeSpecifier::Builtin(kind) => Some(kind),
        TypeSpecifier::TypedefName(name, _) => PrimitiveKind::from_builtin_name(name.as_str()),
        _ => None,
    };
    match kind {
        Some(kind) if kind.is_integer() => Ok(kind),
        _ => Err(ParseError::Unsupported {
            construct: "enum underlying type other than a builtin integer type".to_string(),
            span: spec.span,
        }),
    }
}

/// Parse enumerator list
fn parse_enumerator_list(parser: &mut Parser) -> Result<Vec<Enumerator>, ParseError> {
    let mut enumerators = Vec::new();

    loop {
        let enumerator = parse_enumerator(parser)?;
        enumerators.push(enumerator);

        if parser.accept(TokenKind::Comma).is_none() {
            break;
        }

        // Allow trailing comma
        if parser.is_token(TokenKind::RightBrace) {
            break;
        }
    }

    Ok(enumerators)
}

/// Parse enumerator
fn parse_enumerator(parser: &mut Parser) -> Result<Enumerator, ParseError> {
    let (name, span) = parser.expect_name()?;
    let value = if parser.accept(TokenKind::Assign).is_some() {
        Some(parse_const_expr(parser)?)
    } else {
        None
    };
    let span = match &value {
        Some(expr) => span.merge(expr.span),
        None => span,
    };
    Ok(Enumerator { name, value, span })
}

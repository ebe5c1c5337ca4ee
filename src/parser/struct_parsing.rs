//! Struct and union parsing module
//!
//! This module handles parsing of struct and union declarations,
//! including member declarations, bit-fields and anonymous structs/unions.

use crate::ast::*;
use crate::diagnostic::ParseError;
use crate::lexer::TokenKind;
use log::debug;

use super::Parser;
use super::declaration_core::{SpecifierContext, parse_attributes, parse_declaration_specifiers, skip_attributes};
use super::declarator::parse_declarator;
use super::expressions::parse_const_expr;

/// Parse a `struct`/`union` specifier; the current token is the keyword
pub(crate) fn parse_record_specifier(parser: &mut Parser) -> Result<RecordSpecifier, ParseError> {
    let keyword_token = parser.current_token()?;
    let is_union = keyword_token.kind == TokenKind::Union;
    parser.advance();

    let mut packed = parse_attributes(parser)?;
    let tag = parser.accept_name();

    let body = if let Some(open) = parser.accept(TokenKind::LeftBrace) {
        let members = parse_struct_declaration_list(parser).map_err(|error| wrap_body_error("struct body", error))?;
        parser
            .expect(TokenKind::RightBrace)
            .map_err(|error| wrap_body_error("struct body", error))?;
        debug!(
            "parse_record_specifier: parsed {} member declarations starting at {}",
            members.len(),
            open.span
        );
        packed |= parse_attributes(parser)?;
        Some(members)
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

    let keyword = if is_union { "union" } else { "struct" };
    let (tag, is_anonymous) = match tag {
        Some((name, _)) => (name, false),
        None => (parser.anonymous_tag(keyword), true),
    };

    Ok(RecordSpecifier {
        is_union,
        tag,
        is_anonymous,
        body,
        packed,
        span: keyword_token.span.merge(parser.previous_token_span()),
    })
}

/// Errors inside a braced body are not recoverable at statement level
pub(crate) fn wrap_body_error(what: &'static str, error: ParseError) -> ParseError {
    if error.is_fatal() {
        return error;
    }
    let span = error.span();
    ParseError::MalformedBody {
        what,
        source: Box::new(error),
        span,
    }
}

/// Parse struct declaration list
fn parse_struct_declaration_list(parser: &mut Parser) -> Result<Vec<MemberDecl>, ParseError> {
    let mut declarations = Vec::new();

    while !parser.is_token(TokenKind::RightBrace) {
        if parser.is_at_end() {
            return Err(ParseError::UnexpectedEof {
                span: parser.previous_token_span(),
            });
        }
        // stray ';' inside a body
        if parser.accept(TokenKind::Semicolon).is_some() {
            continue;
        }
        declarations.push(parse_struct_declaration(parser)?);
    }

    Ok(declarations)
}

/// Parse struct declaration
fn parse_struct_declaration(parser: &mut Parser) -> Result<MemberDecl, ParseError> {
    let start_span = parser.current_token_span_or_empty();
    let spec = parse_declaration_specifiers(parser, SpecifierContext::Member)?;
    let mut declarators = Vec::new();

    // `struct { ... };` or `struct Tag;` inside a body: no declarators
    if parser.accept(TokenKind::Semicolon).is_none() {
        loop {
            declarators.push(parse_member_declarator(parser)?);
            if parser.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        skip_attributes(parser)?;
        parser.expect(TokenKind::Semicolon)?;
    }

    Ok(MemberDecl {
        spec,
        declarators,
        span: start_span.merge(parser.previous_token_span()),
    })
}

fn parse_member_declarator(parser: &mut Parser) -> Result<MemberDeclarator, ParseError> {
    let start_span = parser.current_token_span_or_empty();

    // Unnamed bit-field: `int : 3;`
    if parser.accept(TokenKind::Colon).is_some() {
        let width = parse_const_expr(parser)?;
        return Ok(MemberDeclarator {
            declarator: None,
            bit_width: Some(width),
            span: start_span.merge(parser.previous_token_span()),
        });
    }

    let declarator = parse_declarator(parser)?;
    if declarator.name().is_none() {
        return Err(ParseError::MissingDeclaratorName { span: start_span });
    }
    let bit_width = if parser.accept(TokenKind::Colon).is_some() {
        Some(parse_const_expr(parser)?)
    } else {
        None
    };
    skip_attributes(parser)?;

    Ok(MemberDeclarator {
        declarator: Some(declarator),
        bit_width,
        span: start_span.merge(parser.previous_token_span()),
    })
}

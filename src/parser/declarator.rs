//! Declarator parsing module
//!
//! This module handles the parsing of C declarators, which are the most complex
//! part of C's declaration syntax. Declarators can be nested and include pointers,
//! arrays, and functions. The same entry point parses named and abstract
//! declarators; callers decide whether a name is required or forbidden.

use crate::ast::*;
use crate::diagnostic::ParseError;
use crate::lexer::{Token, TokenKind};
use crate::semantic::TypeQualifiers;
use crate::source::SourceSpan;
use log::debug;
use thin_vec::ThinVec;

use super::Parser;
use super::declaration_core::{SpecifierContext, parse_declaration_specifiers, skip_attributes};
use super::expressions::parse_const_expr;

/// Helper enum for reconstructing complex declarators
#[derive(Debug)]
enum DeclaratorComponent {
    Pointer(TypeQualifiers),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Derivation {
    Array,
    Function,
}

/// Look ahead past one or more `__attribute__((...))` constructs without consuming tokens.
/// `start_offset` is the peek offset of the first `__attribute__`.
/// Returns the token immediately following the attributes if they are well formed.
fn peek_past_attribute(parser: &Parser, mut start_offset: u32) -> Option<Token> {
    loop {
        // Attribute ( (
        for _ in 0..2 {
            start_offset += 1;
            if parser.peek_token(start_offset)?.kind != TokenKind::LeftParen {
                return None;
            }
        }
        start_offset += 1;

        let mut depth = 2;
        while depth > 0 {
            match parser.peek_token(start_offset)?.kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => depth -= 1,
                _ => {}
            }
            start_offset += 1;
        }

        let next = *parser.peek_token(start_offset)?;
        if next.kind != TokenKind::Attribute {
            return Some(next);
        }
    }
}

/// Validate declarator combinations
fn validate_declarator_combination(
    base: &Declarator,
    new_kind: Derivation,
    span: SourceSpan,
) -> Result<(), ParseError> {
    let message = match (base, new_kind) {
        (Declarator::Function { .. }, Derivation::Array) => "function cannot return an array",
        (Declarator::Function { .. }, Derivation::Function) => "function cannot return a function",
        (Declarator::Array(..), Derivation::Function) => "array of functions is not allowed",
        _ => return Ok(()),
    };
    Err(ParseError::DeclarationNotAllowed {
        message: message.to_string(),
        span,
    })
}

/// Parse declarator
pub(crate) fn parse_declarator(parser: &mut Parser) -> Result<Declarator, ParseError> {
    debug!(
        "parse_declarator: starting at position {}, token: {:?}",
        parser.current_idx,
        parser.current_token_kind()
    );

    // Check for __attribute__ before declarator (GCC extension)
    skip_attributes(parser)?;

    // Parse leading pointers and their qualifiers
    let declarator_chain = parse_leading_pointers(parser)?;

    // Parse direct declarator (identifier or parenthesized declarator)
    let base_declarator = if let Some((symbol, span)) = parser.accept_name() {
        Declarator::Identifier(symbol, span)
    } else if parser.is_token(TokenKind::LeftParen) && is_grouping_paren(parser) {
        debug!("parse_declarator: found LeftParen, parsing parenthesized declarator");
        parser.advance();
        let inner_declarator = parse_declarator(parser)?;
        parser.expect(TokenKind::RightParen)?;
        inner_declarator
    } else {
        Declarator::Abstract
    };

    // Parse trailing array and function declarators
    let current_base = parse_trailing_declarators(parser, base_declarator)?;

    // Reconstruct the declarator chain in reverse order
    Ok(reconstruct_declarator_chain(declarator_chain, current_base))
}

/// Decide whether the `(` at the current position groups a declarator or opens
/// the parameter list of an abstract function declarator (`int (int)`).
fn is_grouping_paren(parser: &Parser) -> bool {
    let Some(next) = parser.peek_token(0).copied() else {
        return false;
    };
    let next = if next.kind == TokenKind::Attribute {
        match peek_past_attribute(parser, 0) {
            Some(after_attr) => after_attr,
            None => return false,
        }
    } else {
        next
    };
    match next.kind {
        TokenKind::RightParen | TokenKind::Ellipsis => false,
        TokenKind::Star | TokenKind::LeftParen | TokenKind::LeftBracket => true,
        _ => !parser.is_declaration_start_token(&next),
    }
}

/// Helper to parse type qualifiers
fn parse_type_qualifiers(parser: &mut Parser) -> TypeQualifiers {
    let mut qualifiers = TypeQualifiers::empty();
    while let Some(token) = parser.try_current_token() {
        let qualifier = match token.kind {
            TokenKind::Const => TypeQualifiers::CONST,
            TokenKind::Volatile => TypeQualifiers::VOLATILE,
            TokenKind::Restrict => TypeQualifiers::RESTRICT,
            TokenKind::Atomic => TypeQualifiers::ATOMIC,
            _ => break,
        };
        qualifiers.insert(qualifier);
        parser.advance();
    }
    qualifiers
}

/// Helper to parse array size
fn parse_array_size(parser: &mut Parser) -> Result<ArraySize, ParseError> {
    let token = parser.current_token()?;
    match token.kind {
        TokenKind::RightBracket => Ok(ArraySize::Unknown),
        TokenKind::Static => Err(ParseError::Unsupported {
            construct: "'static' in an array declarator".to_string(),
            span: token.span,
        }),
        TokenKind::Star => Err(ParseError::Unsupported {
            construct: "variable length arrays".to_string(),
            span: token.span,
        }),
        kind if kind.is_type_qualifier() => Err(ParseError::Unsupported {
            construct: "qualifiers in an array declarator".to_string(),
            span: token.span,
        }),
        _ => Ok(ArraySize::Expr(parse_const_expr(parser)?)),
    }
}

/// Parse leading pointers and their qualifiers, building a declarator component chain
fn parse_leading_pointers(parser: &mut Parser) -> Result<Vec<DeclaratorComponent>, ParseError> {
    let mut declarator_chain: Vec<DeclaratorComponent> = Vec::new();

    while parser.accept(TokenKind::Star).is_some() {
        let current_qualifiers = parse_type_qualifiers(parser);
        declarator_chain.push(DeclaratorComponent::Pointer(current_qualifiers));
        skip_attributes(parser)?;
    }

    Ok(declarator_chain)
}

/// Parse trailing declarators (arrays, functions) that follow the base declarator
fn parse_trailing_declarators(
    parser: &mut Parser,
    mut current_base: Declarator,
) -> Result<Declarator, ParseError> {
    loop {
        let current_token_span = parser.current_token_span_or_empty();
        if parser.accept(TokenKind::LeftBracket).is_some() {
            validate_declarator_combination(&current_base, Derivation::Array, current_token_span)?;
            let array_size = parse_array_size(parser)?;
            parser.expect(TokenKind::RightBracket)?;
            current_base = Declarator::Array(Box::new(current_base), array_size);
        } else if parser.accept(TokenKind::LeftParen).is_some() {
            validate_declarator_combination(&current_base, Derivation::Function, current_token_span)?;
            let (params, is_variadic) = parse_function_parameters(parser)?;
            parser.expect(TokenKind::RightParen)?;
            current_base = Declarator::Function {
                inner: Box::new(current_base),
                params,
                is_variadic,
            };
        } else {
            break;
        }
    }

    Ok(current_base)
}

/// Reconstruct the declarator chain by applying pointer qualifiers in reverse order
fn reconstruct_declarator_chain(declarator_chain: Vec<DeclaratorComponent>, base_declarator: Declarator) -> Declarator {
    let mut final_declarator = base_declarator;
    for component in declarator_chain.into_iter().rev() {
        final_declarator = match component {
            DeclaratorComponent::Pointer(qualifiers) => Declarator::Pointer(qualifiers, Box::new(final_declarator)),
        };
    }
    final_declarator
}

/// Helper to parse function parameters, up to but excluding the closing `)`
fn parse_function_parameters(parser: &mut Parser) -> Result<(ThinVec<ParamDecl>, bool), ParseError> {
    let mut params = ThinVec::new();
    let mut is_variadic = false;

    if parser.is_token(TokenKind::RightParen) {
        return Ok((params, is_variadic));
    }
    if parser.is_token(TokenKind::Void) && parser.peek_token(0).is_some_and(|t| t.kind == TokenKind::RightParen) {
        // `(void)`: no parameters
        parser.advance();
        return Ok((params, is_variadic));
    }

    loop {
        if let Some(ellipsis) = parser.accept(TokenKind::Ellipsis) {
            if params.is_empty() {
                return Err(ParseError::DeclarationNotAllowed {
                    message: "'...' requires at least one named parameter".to_string(),
                    span: ellipsis.span,
                });
            }
            is_variadic = true;
            break;
        }

        let start_span = parser.current_token_span_or_empty();
        let spec = parse_declaration_specifiers(parser, SpecifierContext::Parameter)?;
        let declarator = parse_declarator(parser)?;
        skip_attributes(parser)?;

        debug!(
            "parse_function_parameters: parsed parameter {:?}, current token: {:?}",
            declarator.name().map(|(name, _)| name),
            parser.current_token_kind()
        );

        params.push(ParamDecl {
            spec,
            declarator,
            span: start_span.merge(parser.previous_token_span()),
        });

        if parser.accept(TokenKind::Comma).is_none() {
            break;
        }
    }

    Ok((params, is_variadic))
}

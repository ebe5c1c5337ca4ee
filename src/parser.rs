//! Parser module for C declarations
//!
//! This module provides the main parser coordination, public API, and state management.
//! It orchestrates the parsing process by delegating to specialized sub-modules for
//! different language constructs.

use crate::ast::*;
use crate::diagnostic::{DiagnosticEngine, ParseError};
use crate::lexer::{Token, TokenKind};
use crate::source::SourceSpan;
use crate::type_node::PrimitiveKind;
use log::debug;
use std::collections::HashSet;

pub mod declaration_core;
pub mod declarations;
pub mod declarator;
pub mod enum_parsing;
pub mod expressions;
pub mod struct_parsing;

/// Type context for tracking typedef names and other type-related state
#[derive(Debug)]
pub(crate) struct TypeDefContext {
    /// Set of typedef names for disambiguation
    typedef_names: HashSet<NameId>,
}

impl Default for TypeDefContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeDefContext {
    /// Create a new type context with the builtin fixed-width type names
    pub(crate) fn new() -> Self {
        let typedef_names = PrimitiveKind::BUILTIN_NAMES.iter().map(|name| NameId::new(name)).collect();
        TypeDefContext { typedef_names }
    }

    /// Check if a symbol is a typedef name
    pub(crate) fn is_type_name(&self, symbol: NameId) -> bool {
        self.typedef_names.contains(&symbol)
    }

    /// Add a typedef name
    pub(crate) fn add_typedef(&mut self, symbol: NameId) {
        self.typedef_names.insert(symbol);
    }
}

/// Main parser structure
pub struct Parser<'src> {
    tokens: &'src [Token],
    current_idx: usize,
    diag: &'src mut DiagnosticEngine,
    unit: TranslationUnit,

    // Type context for typedef tracking
    type_context: TypeDefContext,
}

impl<'src> Parser<'src> {
    /// Create a new parser
    pub fn new(tokens: &'src [Token], diag: &'src mut DiagnosticEngine) -> Self {
        Parser {
            tokens,
            current_idx: 0,
            diag,
            unit: TranslationUnit::new(),
            type_context: TypeDefContext::new(),
        }
    }

    /// Create a parser that continues after `unit`: its typedef names are known and
    /// synthesized anonymous tags do not collide with the unit's.
    pub fn for_unit(tokens: &'src [Token], diag: &'src mut DiagnosticEngine, unit: &TranslationUnit) -> Self {
        let mut parser = Parser::new(tokens, diag);
        for &name in &unit.typedef_names {
            parser.type_context.add_typedef(name);
        }
        parser.unit.anon_count = unit.anon_count;
        parser
    }

    /// Get the current token (returns None if at end of input)
    fn try_current_token(&self) -> Option<Token> {
        self.tokens.get(self.current_idx).copied()
    }

    /// Get the current token (returns error if at end of input)
    fn current_token(&self) -> Result<Token, ParseError> {
        self.try_current_token().ok_or_else(|| ParseError::UnexpectedEof {
            span: self.previous_token_span(),
        })
    }

    /// Get the current token kind
    fn current_token_kind(&self) -> Option<TokenKind> {
        self.try_current_token().map(|t| t.kind)
    }

    /// Get the current token location (infallible, returns empty span on EOF)
    pub(crate) fn current_token_span_or_empty(&self) -> SourceSpan {
        self.try_current_token().map(|t| t.span).unwrap_or_default()
    }

    /// Get the location of the previous token, or an empty span if not available.
    pub(crate) fn previous_token_span(&self) -> SourceSpan {
        if self.current_idx > 0 {
            self.tokens
                .get(self.current_idx - 1)
                .map_or(SourceSpan::empty(), |token| token.span)
        } else {
            SourceSpan::empty()
        }
    }

    /// Peek at the next token without consuming it
    fn peek_token(&self, next_index: u32) -> Option<&Token> {
        self.tokens.get(self.current_idx + 1 + next_index as usize)
    }

    fn is_at_end(&self) -> bool {
        self.current_idx >= self.tokens.len()
    }

    /// Advance to the next token and return previous token
    fn advance(&mut self) -> Option<Token> {
        if self.current_idx < self.tokens.len() {
            let token = self.tokens[self.current_idx];
            self.current_idx += 1;
            Some(token)
        } else {
            None
        }
    }

    /// Accept a specific token kind if found, consume it and return it, otherwise nothing happens
    fn accept(&mut self, accepted: TokenKind) -> Option<Token> {
        if self.current_token_kind() == Some(accepted) {
            self.advance()
        } else {
            None
        }
    }

    /// Expect a specific token kind, consume it if found
    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        let token = self.current_token()?;
        if token.kind == expected {
            self.advance();
            Ok(token)
        } else {
            Err(ParseError::UnexpectedToken {
                expected: format!("'{expected}'"),
                found: token.kind,
                span: token.span,
            })
        }
    }

    /// Check if current token matches the given kind
    fn is_token(&self, kind: TokenKind) -> bool {
        self.current_token_kind() == Some(kind)
    }

    /// Skip tokens until we find a synchronization point
    fn synchronize(&mut self) {
        let mut brace_depth = 0;
        let mut paren_depth = 0;
        let mut any_advance = false;

        while let Some(token) = self.try_current_token() {
            self.advance();
            any_advance = true;
            match token.kind {
                TokenKind::LeftBrace => brace_depth += 1,
                TokenKind::RightBrace => {
                    brace_depth -= 1;
                    if brace_depth < 0 {
                        break; // Unmatched brace, stop here
                    }
                }
                TokenKind::LeftParen => paren_depth += 1,
                TokenKind::RightParen => {
                    paren_depth -= 1;
                    if paren_depth < 0 {
                        break; // Unmatched paren, stop here
                    }
                }
                TokenKind::Semicolon if brace_depth == 0 && paren_depth == 0 => break,
                _ => {}
            }
        }

        // If we didn't advance at all, force advance to avoid infinite loop
        if !any_advance {
            self.advance();
        }
    }

    /// Parse translation unit (top level)
    pub fn parse_translation_unit(&mut self) -> Result<TranslationUnit, ParseError> {
        declarations::parse_translation_unit(self)?;
        Ok(std::mem::take(&mut self.unit))
    }

    /// Parse a standalone type name such as `struct Foo *` or `int[4]`
    pub fn parse_type_name(&mut self) -> Result<TypeName, ParseError> {
        declaration_core::parse_type_name(self)
    }

    /// Disambiguates between a type name and an identifier in declarator position.
    fn is_type_name(&self, symbol: NameId) -> bool {
        self.type_context.is_type_name(symbol)
    }

    /// parse and accept an identifier name
    fn accept_name(&mut self) -> Option<(NameId, SourceSpan)> {
        if let Some(token) = self.try_current_token()
            && let TokenKind::Identifier(symbol) = token.kind
        {
            self.advance();
            return Some((symbol, token.span));
        }
        None
    }

    /// expect and accept an identifier name, returning the symbol or error
    fn expect_name(&mut self) -> Result<(NameId, SourceSpan), ParseError> {
        let token = self.current_token()?;
        if let TokenKind::Identifier(symbol) = token.kind {
            self.advance();
            Ok((symbol, token.span))
        } else {
            Err(ParseError::UnexpectedToken {
                expected: "identifier".to_string(),
                found: token.kind,
                span: token.span,
            })
        }
    }

    /// Add a typedef name to the type context
    pub(crate) fn add_typedef(&mut self, symbol: NameId) {
        debug!("add_typedef: adding {symbol} to typedef_names");
        self.type_context.add_typedef(symbol);
        self.unit.typedef_names.push(symbol);
    }

    /// Synthesize a unique tag for an anonymous struct/union/enum
    pub(crate) fn anonymous_tag(&mut self, keyword: &str) -> NameId {
        self.unit.anon_count += 1;
        NameId::new(format!("__anon_{keyword}_{}", self.unit.anon_count))
    }

    pub(crate) fn is_declaration_start_token(&self, token: &Token) -> bool {
        let is_typedef = if let TokenKind::Identifier(symbol) = token.kind {
            self.is_type_name(symbol)
        } else {
            false
        };
        token.kind.is_declaration_start(is_typedef)
    }
}

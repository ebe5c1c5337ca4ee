//! Core declaration parsing module
//!
//! This module handles declaration specifiers, GCC attributes, skipped
//! initializers and standalone type names.

use crate::ast::*;
use crate::diagnostic::ParseError;
use crate::lexer::TokenKind;
use crate::semantic::TypeQualifiers;
use crate::source::SourceSpan;
use crate::type_node::PrimitiveKind;
use log::debug;

use super::Parser;
use super::declarator::parse_declarator;

/// Where a specifier list appears; storage classes are only valid at file scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpecifierContext {
    TopLevel,
    Member,
    Parameter,
    TypeName,
}

/// Builtin type keywords seen in one specifier list
#[derive(Debug, Default)]
struct BuiltinCounts {
    void: u8,
    bool: u8,
    char: u8,
    short: u8,
    int: u8,
    long: u8,
    float: u8,
    double: u8,
    signed: u8,
    unsigned: u8,
}

impl BuiltinCounts {
    fn add(&mut self, kind: TokenKind) {
        let slot = match kind {
            TokenKind::Void => &mut self.void,
            TokenKind::Bool => &mut self.bool,
            TokenKind::Char => &mut self.char,
            TokenKind::Short => &mut self.short,
            TokenKind::Int => &mut self.int,
            TokenKind::Long => &mut self.long,
            TokenKind::Float => &mut self.float,
            TokenKind::Double => &mut self.double,
            TokenKind::Signed => &mut self.signed,
            TokenKind::Unsigned => &mut self.unsigned,
            _ => return,
        };
        *slot = slot.saturating_add(1);
    }

    fn is_empty(&self) -> bool {
        self.void
            + self.bool
            + self.char
            + self.short
            + self.int
            + self.long
            + self.float
            + self.double
            + self.signed
            + self.unsigned
            == 0
    }

    /// Map a keyword multiset such as `unsigned long int` to its primitive kind
    fn resolve(&self, span: SourceSpan) -> Result<PrimitiveKind, ParseError> {
        let invalid = |message: &str| ParseError::InvalidTypeCombination {
            message: message.to_string(),
            span,
        };

        for (count, keyword) in [
            (self.void, "void"),
            (self.bool, "_Bool"),
            (self.char, "char"),
            (self.short, "short"),
            (self.int, "int"),
            (self.float, "float"),
            (self.double, "double"),
            (self.signed, "signed"),
            (self.unsigned, "unsigned"),
        ] {
            if count > 1 {
                return Err(invalid(&format!("duplicate '{keyword}'")));
            }
        }
        if self.long > 2 {
            return Err(invalid("'long long long' is too long"));
        }
        if self.signed > 0 && self.unsigned > 0 {
            return Err(invalid("both 'signed' and 'unsigned'"));
        }
        if self.short > 0 && self.long > 0 {
            return Err(invalid("both 'short' and 'long'"));
        }
        if self.void + self.bool + self.char + self.float + self.double > 1 {
            return Err(invalid("two or more data types"));
        }

        let has_sign = self.signed + self.unsigned > 0;
        let unsigned = self.unsigned > 0;
        let has_size = self.short + self.long > 0;

        if self.void + self.bool + self.float > 0 {
            if has_sign || has_size || self.int > 0 {
                return Err(invalid("modifiers are not allowed on this type"));
            }
            return Ok(if self.void > 0 {
                PrimitiveKind::Void
            } else if self.bool > 0 {
                PrimitiveKind::Bool
            } else {
                PrimitiveKind::Float
            });
        }

        if self.double > 0 {
            if has_sign || self.short > 0 || self.int > 0 || self.long > 1 {
                return Err(invalid("invalid modifiers on 'double'"));
            }
            return Ok(if self.long == 1 {
                PrimitiveKind::LongDouble
            } else {
                PrimitiveKind::Double
            });
        }

        if self.char > 0 {
            if has_size || self.int > 0 {
                return Err(invalid("invalid modifiers on 'char'"));
            }
            return Ok(match (self.signed > 0, unsigned) {
                (true, _) => PrimitiveKind::SChar,
                (_, true) => PrimitiveKind::UChar,
                _ => PrimitiveKind::Char,
            });
        }

        let kind = match (self.short, self.long, unsigned) {
            (1, _, false) => PrimitiveKind::Short,
            (1, _, true) => PrimitiveKind::UShort,
            (_, 1, false) => PrimitiveKind::Long,
            (_, 1, true) => PrimitiveKind::ULong,
            (_, 2, false) => PrimitiveKind::LongLong,
            (_, 2, true) => PrimitiveKind::ULongLong,
            (_, _, false) => PrimitiveKind::Int,
            (_, _, true) => PrimitiveKind::UInt,
        };
        Ok(kind)
    }
}

/// Parse declaration specifiers
pub(crate) fn parse_declaration_specifiers(
    parser: &mut Parser,
    context: SpecifierContext,
) -> Result<DeclSpecifiers, ParseError> {
    let start_span = parser.current_token_span_or_empty();
    let mut storage = None;
    let mut qualifiers = TypeQualifiers::empty();
    let mut counts = BuiltinCounts::default();
    let mut tagged: Option<TypeSpecifier> = None;
    let mut is_inline = false;
    let mut is_noreturn = false;
    let mut any = false;

    debug!(
        "parse_declaration_specifiers: starting at position {}, token {:?}",
        parser.current_idx,
        parser.current_token_kind()
    );

    while let Some(token) = parser.try_current_token() {
        let two_types = || ParseError::InvalidTypeCombination {
            message: "two or more data types in declaration specifiers".to_string(),
            span: token.span,
        };
        match token.kind {
            // Storage class specifiers
            TokenKind::Typedef | TokenKind::Extern | TokenKind::Static => {
                if context != SpecifierContext::TopLevel {
                    return Err(ParseError::DeclarationNotAllowed {
                        message: format!("storage class '{}' is not allowed here", token.kind),
                        span: token.span,
                    });
                }
                if storage.is_some() {
                    return Err(ParseError::DeclarationNotAllowed {
                        message: "multiple storage classes in declaration specifiers".to_string(),
                        span: token.span,
                    });
                }
                storage = Some(match token.kind {
                    TokenKind::Typedef => StorageClass::Typedef,
                    TokenKind::Extern => StorageClass::Extern,
                    _ => StorageClass::Static,
                });
                parser.advance();
            }
            TokenKind::Auto | TokenKind::Register => {
                return Err(ParseError::DeclarationNotAllowed {
                    message: format!("storage class '{}' is not allowed in a declaration", token.kind),
                    span: token.span,
                });
            }
            TokenKind::ThreadLocal => {
                return Err(ParseError::Unsupported {
                    construct: "'_Thread_local'".to_string(),
                    span: token.span,
                });
            }

            // Type qualifiers
            TokenKind::Const => {
                qualifiers.insert(TypeQualifiers::CONST);
                parser.advance();
            }
            TokenKind::Volatile => {
                qualifiers.insert(TypeQualifiers::VOLATILE);
                parser.advance();
            }
            TokenKind::Restrict => {
                qualifiers.insert(TypeQualifiers::RESTRICT);
                parser.advance();
            }
            TokenKind::Atomic => {
                qualifiers.insert(TypeQualifiers::ATOMIC);
                parser.advance();
            }

            // Function specifiers
            TokenKind::Inline => {
                is_inline = true;
                parser.advance();
            }
            TokenKind::Noreturn => {
                is_noreturn = true;
                parser.advance();
            }

            TokenKind::Attribute => {
                skip_attributes(parser)?;
            }
            TokenKind::Alignas => {
                return Err(ParseError::Unsupported {
                    construct: "'_Alignas'".to_string(),
                    span: token.span,
                });
            }
            TokenKind::Complex => {
                return Err(ParseError::Unsupported {
                    construct: "'_Complex' types".to_string(),
                    span: token.span,
                });
            }

            // Type specifiers
            TokenKind::Void
            | TokenKind::Bool
            | TokenKind::Char
            | TokenKind::Short
            | TokenKind::Int
            | TokenKind::Long
            | TokenKind::Float
            | TokenKind::Double
            | TokenKind::Signed
            | TokenKind::Unsigned => {
                if tagged.is_some() {
                    return Err(two_types());
                }
                counts.add(token.kind);
                parser.advance();
            }
            TokenKind::Struct | TokenKind::Union => {
                if tagged.is_some() || !counts.is_empty() {
                    return Err(two_types());
                }
                let record = super::struct_parsing::parse_record_specifier(parser)?;
                tagged = Some(TypeSpecifier::Record(record));
            }
            TokenKind::Enum => {
                if tagged.is_some() || !counts.is_empty() {
                    return Err(two_types());
                }
                let enum_spec = super::enum_parsing::parse_enum_specifier(parser)?;
                tagged = Some(TypeSpecifier::Enum(enum_spec));
            }

            // With no expressions in this grammar, an identifier before any type
            // specifier can only name a type.
            TokenKind::Identifier(symbol) if tagged.is_none() && counts.is_empty() => {
                if !parser.is_type_name(symbol) {
                    debug!("parse_declaration_specifiers: {symbol} is not a known type name");
                }
                parser.advance();
                tagged = Some(TypeSpecifier::TypedefName(symbol, token.span));
            }

            _ => {
                debug!(
                    "parse_declaration_specifiers: token {:?} not recognized as declaration specifier, breaking",
                    token.kind
                );
                break;
            }
        }
        any = true;
    }

    let span = start_span.merge(parser.previous_token_span());
    let type_spec = match tagged {
        Some(type_spec) => type_spec,
        None if !counts.is_empty() => TypeSpecifier::Builtin(counts.resolve(span)?),
        None if !any => {
            let token = parser.current_token()?;
            return Err(ParseError::UnexpectedToken {
                expected: "declaration specifiers".to_string(),
                found: token.kind,
                span: token.span,
            });
        }
        None => {
            return Err(ParseError::InvalidTypeCombination {
                message: "type specifier missing".to_string(),
                span,
            });
        }
    };

    Ok(DeclSpecifiers {
        storage,
        qualifiers,
        type_spec,
        is_inline,
        is_noreturn,
        span,
    })
}

/// Parse a run of `__attribute__((...))` clauses after `struct`, `union` or `enum`
/// or after a record or enum body. Returns true if any of them requests `packed`.
pub(crate) fn parse_attributes(parser: &mut Parser) -> Result<bool, ParseError> {
    Ok(parse_attribute_list(parser)?.is_some())
}

/// Parse attributes in a position where `packed` has no effect on a record or enum
pub(crate) fn skip_attributes(parser: &mut Parser) -> Result<(), ParseError> {
    match parse_attribute_list(parser)? {
        Some(span) => Err(ParseError::Unsupported {
            construct: "'packed' attribute outside a struct, union or enum specifier".to_string(),
            span,
        }),
        None => Ok(()),
    }
}

/// Attributes that change size or alignment and have no layout support
const LAYOUT_ATTRIBUTES: &[&str] = &["aligned", "vector_size", "mode", "ms_struct", "gcc_struct", "transparent_union"];

/// Position of the last `packed` request, if any. Attributes that change layout
/// in ways the calculator does not model are rejected; the rest are skipped.
fn parse_attribute_list(parser: &mut Parser) -> Result<Option<SourceSpan>, ParseError> {
    let mut packed = None;
    while parser.accept(TokenKind::Attribute).is_some() {
        parser.expect(TokenKind::LeftParen)?;
        parser.expect(TokenKind::LeftParen)?;
        let mut depth = 2;
        while depth > 0 {
            let token = parser.current_token()?;
            match token.kind {
                TokenKind::LeftParen => depth += 1,
                TokenKind::RightParen => depth -= 1,
                TokenKind::Identifier(name) if depth == 2 => {
                    let bare = name.as_str().trim_start_matches("__").trim_end_matches("__");
                    if bare == "packed" {
                        packed = Some(token.span);
                    } else if LAYOUT_ATTRIBUTES.contains(&bare) {
                        return Err(ParseError::Unsupported {
                            construct: format!("'{bare}' attribute"),
                            span: token.span,
                        });
                    }
                }
                _ => {}
            }
            parser.advance();
        }
    }
    Ok(packed)
}

/// Skip an initializer up to the `,` or `;` that ends it
pub(crate) fn skip_initializer(parser: &mut Parser) -> Result<(), ParseError> {
    let mut depth = 0usize;
    loop {
        let token = parser.current_token()?;
        match token.kind {
            TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => depth += 1,
            TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                if depth == 0 {
                    return Err(ParseError::UnexpectedToken {
                        expected: "initializer".to_string(),
                        found: token.kind,
                        span: token.span,
                    });
                }
                depth -= 1;
            }
            TokenKind::Comma | TokenKind::Semicolon if depth == 0 => return Ok(()),
            _ => {}
        }
        parser.advance();
    }
}

/// Parse type name (the operand of `FFI::new`, `FFI::cast`, ...)
pub(crate) fn parse_type_name(parser: &mut Parser) -> Result<TypeName, ParseError> {
    let start_span = parser.current_token_span_or_empty();
    let spec = parse_declaration_specifiers(parser, SpecifierContext::TypeName)?;
    let declarator = parse_declarator(parser)?;

    if let Some((name, span)) = declarator.name() {
        return Err(ParseError::DeclarationNotAllowed {
            message: format!("a type name cannot declare '{name}'"),
            span,
        });
    }
    if let Some(token) = parser.try_current_token() {
        return Err(ParseError::UnexpectedToken {
            expected: "end of type name".to_string(),
            found: token.kind,
            span: token.span,
        });
    }

    Ok(TypeName {
        spec,
        declarator,
        span: start_span.merge(parser.previous_token_span()),
    })
}

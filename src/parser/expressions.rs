//! Constant expression parsing module
//!
//! Array sizes, enumerator values and bit-field widths are integer constant
//! expressions. They are parsed with a small Pratt parser; assignment and the comma
//! operator never appear in these positions so they end the expression.

use crate::ast::{BinaryOp, ConstExpr, ConstExprKind, UnaryOp};
use crate::diagnostic::ParseError;
use crate::lexer::TokenKind;
use log::trace;

use super::Parser;

/// Binding power for Pratt parser operator precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BindingPower(u8);

impl BindingPower {
    pub const MIN: Self = Self(0);
    pub const CONDITIONAL: Self = Self(3);
    pub const LOGICAL_OR: Self = Self(4);
    pub const LOGICAL_AND: Self = Self(5);
    pub const BITWISE_OR: Self = Self(6);
    pub const BITWISE_XOR: Self = Self(7);
    pub const BITWISE_AND: Self = Self(8);
    pub const EQUALITY: Self = Self(9);
    pub const RELATIONAL: Self = Self(10);
    pub const SHIFT: Self = Self(11);
    pub const ADDITIVE: Self = Self(12);
    pub const MULTIPLICATIVE: Self = Self(13);
    pub const UNARY: Self = Self(15);

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

fn binary_operator(kind: TokenKind) -> Option<(BinaryOp, BindingPower)> {
    let op = match kind {
        TokenKind::LogicOr => (BinaryOp::LogicOr, BindingPower::LOGICAL_OR),
        TokenKind::LogicAnd => (BinaryOp::LogicAnd, BindingPower::LOGICAL_AND),
        TokenKind::Pipe => (BinaryOp::BitOr, BindingPower::BITWISE_OR),
        TokenKind::Caret => (BinaryOp::BitXor, BindingPower::BITWISE_XOR),
        TokenKind::Amp => (BinaryOp::BitAnd, BindingPower::BITWISE_AND),
        TokenKind::Equal => (BinaryOp::Equal, BindingPower::EQUALITY),
        TokenKind::NotEqual => (BinaryOp::NotEqual, BindingPower::EQUALITY),
        TokenKind::Less => (BinaryOp::Less, BindingPower::RELATIONAL),
        TokenKind::Greater => (BinaryOp::Greater, BindingPower::RELATIONAL),
        TokenKind::LessEqual => (BinaryOp::LessEqual, BindingPower::RELATIONAL),
        TokenKind::GreaterEqual => (BinaryOp::GreaterEqual, BindingPower::RELATIONAL),
        TokenKind::LeftShift => (BinaryOp::LShift, BindingPower::SHIFT),
        TokenKind::RightShift => (BinaryOp::RShift, BindingPower::SHIFT),
        TokenKind::Plus => (BinaryOp::Add, BindingPower::ADDITIVE),
        TokenKind::Minus => (BinaryOp::Sub, BindingPower::ADDITIVE),
        TokenKind::Star => (BinaryOp::Mul, BindingPower::MULTIPLICATIVE),
        TokenKind::Slash => (BinaryOp::Div, BindingPower::MULTIPLICATIVE),
        TokenKind::Percent => (BinaryOp::Mod, BindingPower::MULTIPLICATIVE),
        _ => return None,
    };
    Some(op)
}

/// Parse a full constant expression
pub(crate) fn parse_const_expr(parser: &mut Parser) -> Result<ConstExpr, ParseError> {
    parse_expression(parser, BindingPower::MIN)
}

/// Main expression parsing using Pratt algorithm
pub(crate) fn parse_expression(parser: &mut Parser, min_binding_power: BindingPower) -> Result<ConstExpr, ParseError> {
    trace!("parse_expression: min_binding_power={}", min_binding_power.0);
    let mut left = parse_prefix(parser)?;

    while let Some(kind) = parser.current_token_kind() {
        if kind == TokenKind::Question {
            if BindingPower::CONDITIONAL < min_binding_power {
                break;
            }
            parser.advance();
            let then_expr = parse_expression(parser, BindingPower::MIN)?;
            parser.expect(TokenKind::Colon)?;
            // right-associative
            let else_expr = parse_expression(parser, BindingPower::CONDITIONAL)?;
            let span = left.span.merge(else_expr.span);
            left = ConstExpr {
                kind: ConstExprKind::Conditional(Box::new(left), Box::new(then_expr), Box::new(else_expr)),
                span,
            };
            continue;
        }

        let Some((op, binding_power)) = binary_operator(kind) else {
            break;
        };
        if binding_power < min_binding_power {
            break;
        }
        parser.advance();
        let right = parse_expression(parser, binding_power.next())?;
        let span = left.span.merge(right.span);
        left = ConstExpr {
            kind: ConstExprKind::Binary(op, Box::new(left), Box::new(right)),
            span,
        };
    }

    Ok(left)
}

fn parse_prefix(parser: &mut Parser) -> Result<ConstExpr, ParseError> {
    let token = parser.current_token()?;
    let unary = match token.kind {
        TokenKind::Plus => Some(UnaryOp::Plus),
        TokenKind::Minus => Some(UnaryOp::Minus),
        TokenKind::Tilde => Some(UnaryOp::BitNot),
        TokenKind::Bang => Some(UnaryOp::LogicNot),
        _ => None,
    };
    if let Some(op) = unary {
        parser.advance();
        let operand = parse_expression(parser, BindingPower::UNARY)?;
        let span = token.span.merge(operand.span);
        return Ok(ConstExpr {
            kind: ConstExprKind::Unary(op, Box::new(operand)),
            span,
        });
    }

    let kind = match token.kind {
        TokenKind::IntegerConstant(value) => match i64::try_from(value) {
            Ok(value) => ConstExprKind::Int(value),
            Err(_) => {
                return Err(ParseError::Unsupported {
                    construct: format!("integer constant {value} above the signed 64-bit range"),
                    span: token.span,
                });
            }
        },
        TokenKind::CharacterConstant(value) => ConstExprKind::Int(value),
        TokenKind::Identifier(name) => ConstExprKind::Ident(name),
        TokenKind::LeftParen => {
            parser.advance();
            let inner = parse_expression(parser, BindingPower::MIN)?;
            let close = parser.expect(TokenKind::RightParen)?;
            return Ok(ConstExpr {
                kind: inner.kind,
                span: token.span.merge(close.span),
            });
        }
        TokenKind::Sizeof => {
            return Err(ParseError::UnexpectedToken {
                expected: "integer constant expression without 'sizeof'".to_string(),
                found: token.kind,
                span: token.span,
            });
        }
        TokenKind::Generic => {
            return Err(ParseError::Unsupported {
                construct: "'_Generic'".to_string(),
                span: token.span,
            });
        }
        TokenKind::FloatConstant(_) => {
            return Err(ParseError::Unsupported {
                construct: "floating constant in an integer constant expression".to_string(),
                span: token.span,
            });
        }
        found => {
            return Err(ParseError::UnexpectedToken {
                expected: "constant expression".to_string(),
                found,
                span: token.span,
            });
        }
    };
    parser.advance();
    Ok(ConstExpr { kind, span: token.span })
}

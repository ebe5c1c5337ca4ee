//! Constant expression evaluation
//!
//! Integer constant expressions appear in array sizes, enumerator values and bit-field
//! widths. Arithmetic is checked in `i64` and overflow is an error; identifiers must
//! name enum constants already visible in the symbol table.

use crate::ast::{BinaryOp, ConstExpr, ConstExprKind, UnaryOp};
use crate::diagnostic::SemanticError;
use crate::semantic::{SymbolKind, SymbolTable};

/// Context for constant expression evaluation
pub(crate) struct ConstEvalCtx<'a> {
    pub(crate) symbol_table: &'a SymbolTable,
}

/// Evaluate a constant expression to an i64 value
pub(crate) fn eval_const_expr(ctx: &ConstEvalCtx, expr: &ConstExpr) -> Result<i64, SemanticError> {
    match &expr.kind {
        ConstExprKind::Int(val) => Ok(*val),
        ConstExprKind::Ident(name) => {
            let symbol = ctx
                .symbol_table
                .lookup_ordinary(*name)
                .map(|r| ctx.symbol_table.get(r));
            match symbol {
                Some(symbol) => match symbol.kind {
                    SymbolKind::EnumConstant { value } => Ok(value),
                    _ => Err(SemanticError::InvalidConstant {
                        message: format!("'{name}' is not an integer constant"),
                        span: expr.span,
                    }),
                },
                None => Err(SemanticError::UndeclaredConstant {
                    name: name.to_string(),
                    span: expr.span,
                }),
            }
        }
        ConstExprKind::Binary(op, left, right) => {
            let left_val = eval_const_expr(ctx, left)?;

            // Short-circuiting logic
            match op {
                BinaryOp::LogicAnd => {
                    if left_val == 0 {
                        return Ok(0);
                    }
                    let right_val = eval_const_expr(ctx, right)?;
                    return Ok((right_val != 0) as i64);
                }
                BinaryOp::LogicOr => {
                    if left_val != 0 {
                        return Ok(1);
                    }
                    let right_val = eval_const_expr(ctx, right)?;
                    return Ok((right_val != 0) as i64);
                }
                _ => {}
            }

            let right_val = eval_const_expr(ctx, right)?;
            let checked = match op {
                BinaryOp::Add => left_val.checked_add(right_val),
                BinaryOp::Sub => left_val.checked_sub(right_val),
                BinaryOp::Mul => left_val.checked_mul(right_val),
                BinaryOp::Div | BinaryOp::Mod if right_val == 0 => {
                    return Err(SemanticError::InvalidConstant {
                        message: "division by zero".to_string(),
                        span: expr.span,
                    });
                }
                BinaryOp::Div => left_val.checked_div(right_val),
                BinaryOp::Mod => left_val.checked_rem(right_val),
                BinaryOp::Equal => Some((left_val == right_val) as i64),
                BinaryOp::NotEqual => Some((left_val != right_val) as i64),
                BinaryOp::Less => Some((left_val < right_val) as i64),
                BinaryOp::LessEqual => Some((left_val <= right_val) as i64),
                BinaryOp::Greater => Some((left_val > right_val) as i64),
                BinaryOp::GreaterEqual => Some((left_val >= right_val) as i64),
                BinaryOp::BitOr => Some(left_val | right_val),
                BinaryOp::BitAnd => Some(left_val & right_val),
                BinaryOp::BitXor => Some(left_val ^ right_val),
                BinaryOp::LShift | BinaryOp::RShift if !(0..64).contains(&right_val) => {
                    return Err(SemanticError::InvalidConstant {
                        message: format!("shift count {right_val} is out of range"),
                        span: expr.span,
                    });
                }
                // bits shifted out of the value are an overflow
                BinaryOp::LShift => {
                    let shifted = left_val << right_val;
                    (shifted >> right_val == left_val).then_some(shifted)
                }
                BinaryOp::RShift => Some(left_val >> right_val),
                BinaryOp::LogicAnd | BinaryOp::LogicOr => Some((right_val != 0) as i64),
            };
            checked.ok_or_else(|| overflow(expr))
        }
        ConstExprKind::Unary(op, operand) => {
            let operand_val = eval_const_expr(ctx, operand)?;
            match op {
                UnaryOp::LogicNot => Ok((operand_val == 0) as i64),
                UnaryOp::Plus => Ok(operand_val),
                UnaryOp::Minus => operand_val.checked_neg().ok_or_else(|| overflow(expr)),
                UnaryOp::BitNot => Ok(!operand_val),
            }
        }
        ConstExprKind::Conditional(cond, then_expr, else_expr) => {
            let cond_val = eval_const_expr(ctx, cond)?;
            if cond_val != 0 {
                eval_const_expr(ctx, then_expr)
            } else {
                eval_const_expr(ctx, else_expr)
            }
        }
    }
}

fn overflow(expr: &ConstExpr) -> SemanticError {
    SemanticError::InvalidConstant {
        message: "constant expression overflows a 64-bit integer".to_string(),
        span: expr.span,
    }
}

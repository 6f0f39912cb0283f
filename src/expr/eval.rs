//! Tree-walking evaluation of [`Expr`] against a [`Scope`].

use super::parser::{BinaryOp, Expr, UnaryOp};
use super::ExprError;
use crate::core::{Order, Token};
use crate::scope::Scope;

/// Evaluate `expr`, resolving identifiers through `scope`.
///
/// `&&`, `||` and `?:` short-circuit, so an unknown or absent operand on
/// the side not taken does not make the whole expression fail.
pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<Token, ExprError> {
    match expr {
        Expr::Literal(token) => Ok(token.clone()),
        Expr::Identifier(name) => scope
            .get(name)?
            .ok_or_else(|| ExprError::UndefinedIdentifier(name.clone())),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Token::Array),
        Expr::Index { target, index } => {
            let array = evaluate(target, scope)?;
            let index = evaluate(index, scope)?;
            apply_index(&array, &index)
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope)?;
            apply_unary(*op, &value)
        }
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            if !expect_bool(&evaluate(left, scope)?, "&&")? {
                return Ok(Token::Boolean(false));
            }
            Ok(Token::Boolean(expect_bool(&evaluate(right, scope)?, "&&")?))
        }
        Expr::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => {
            if expect_bool(&evaluate(left, scope)?, "||")? {
                return Ok(Token::Boolean(true));
            }
            Ok(Token::Boolean(expect_bool(&evaluate(right, scope)?, "||")?))
        }
        Expr::Binary { op, left, right } => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            apply_binary(*op, &left, &right)
        }
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            if expect_bool(&evaluate(condition, scope)?, "?:")? {
                evaluate(then, scope)
            } else {
                evaluate(otherwise, scope)
            }
        }
    }
}

fn expect_bool(token: &Token, operator: &str) -> Result<bool, ExprError> {
    token.as_bool().ok_or_else(|| {
        ExprError::TypeMismatch(format!(
            "operator '{operator}' expects boolean operands, got {token}"
        ))
    })
}

fn apply_index(array: &Token, index: &Token) -> Result<Token, ExprError> {
    let items = array
        .as_array()
        .ok_or_else(|| ExprError::NotIndexable(array.to_string()))?;
    let i = index.as_int().ok_or_else(|| {
        ExprError::TypeMismatch(format!("array index must be an int, got {index}"))
    })?;
    usize::try_from(i)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or(ExprError::IndexOutOfBounds {
            index: i,
            length: items.len(),
        })
}

fn apply_unary(op: UnaryOp, value: &Token) -> Result<Token, ExprError> {
    match (op, value) {
        (UnaryOp::Not, Token::Boolean(b)) => Ok(Token::Boolean(!b)),
        (UnaryOp::Neg, Token::Int(i)) => i.checked_neg().map(Token::Int).ok_or(ExprError::Overflow),
        (UnaryOp::Neg, Token::Double(d)) => Ok(Token::Double(-d)),
        (UnaryOp::Not, other) => Err(ExprError::TypeMismatch(format!(
            "operator '!' expects a boolean, got {other}"
        ))),
        (UnaryOp::Neg, other) => Err(ExprError::TypeMismatch(format!(
            "operator '-' expects a number, got {other}"
        ))),
    }
}

fn apply_binary(op: BinaryOp, left: &Token, right: &Token) -> Result<Token, ExprError> {
    match op {
        BinaryOp::Eq => Ok(Token::Boolean(left.value_eq(right))),
        BinaryOp::NotEq => Ok(Token::Boolean(!left.value_eq(right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, left, right),
        BinaryOp::Add => match (left, right) {
            (Token::Str(a), b) => Ok(Token::Str(format!("{a}{}", plain(b)))),
            (a, Token::Str(b)) => Ok(Token::Str(format!("{}{b}", plain(a)))),
            _ => arithmetic(op, left, right),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, left, right)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators short-circuit"),
    }
}

fn plain(token: &Token) -> String {
    match token {
        Token::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(op: BinaryOp, left: &Token, right: &Token) -> Result<Token, ExprError> {
    let order = left.order(right).ok_or_else(|| {
        ExprError::TypeMismatch(format!("cannot compare {left} with {right}"))
    })?;
    let holds = match op {
        BinaryOp::Lt => order == Order::Less,
        BinaryOp::Le => matches!(order, Order::Less | Order::Equal),
        BinaryOp::Gt => order == Order::Greater,
        BinaryOp::Ge => matches!(order, Order::Greater | Order::Equal),
        _ => unreachable!("only relational operators are compared"),
    };
    Ok(Token::Boolean(holds))
}

fn arithmetic(op: BinaryOp, left: &Token, right: &Token) -> Result<Token, ExprError> {
    if let (Token::Int(a), Token::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div | BinaryOp::Mod if b == 0 => return Err(ExprError::DivisionByZero),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Mod => a.checked_rem(b),
            _ => unreachable!("non-arithmetic operator"),
        };
        return result.map(Token::Int).ok_or(ExprError::Overflow);
    }

    match (left.as_double(), right.as_double()) {
        (Some(a), Some(b)) => Ok(Token::Double(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
            _ => unreachable!("non-arithmetic operator"),
        })),
        _ => Err(ExprError::TypeMismatch(format!(
            "arithmetic on non-numeric operands {left} and {right}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;
    use crate::scope::MapScope;

    fn eval(text: &str) -> Result<Token, ExprError> {
        let scope = MapScope::new()
            .with("x", Token::Int(7))
            .with("y", Token::Double(2.5))
            .with("name", Token::from("fsm"))
            .with("values", Token::Array(vec![Token::Int(10), Token::Int(20)]));
        evaluate(&parse(text)?, &scope)
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(eval("x * 2 + 1"), Ok(Token::Int(15)));
        assert_eq!(eval("x / 2"), Ok(Token::Int(3)));
        assert_eq!(eval("x % 4"), Ok(Token::Int(3)));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_double() {
        assert_eq!(eval("x + y"), Ok(Token::Double(9.5)));
    }

    #[test]
    fn integer_division_by_zero_fails() {
        assert_eq!(eval("x / 0"), Err(ExprError::DivisionByZero));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(eval("name + \"_\" + x"), Ok(Token::from("fsm_7")));
    }

    #[test]
    fn relational_and_equality() {
        assert_eq!(eval("x > y"), Ok(Token::Boolean(true)));
        assert_eq!(eval("x == 7.0"), Ok(Token::Boolean(true)));
        assert_eq!(eval("name != \"fsm\""), Ok(Token::Boolean(false)));
    }

    #[test]
    fn incomparable_arrays_satisfy_no_relation() {
        assert_eq!(eval("{1, 4} < {2, 3}"), Ok(Token::Boolean(false)));
        assert_eq!(eval("{1, 4} >= {2, 3}"), Ok(Token::Boolean(false)));
        assert_eq!(eval("{1, 2} <= {2, 3}"), Ok(Token::Boolean(true)));
    }

    #[test]
    fn comparing_unrelated_kinds_is_an_error() {
        assert!(matches!(eval("x < name"), Err(ExprError::TypeMismatch(_))));
    }

    #[test]
    fn logical_operators_short_circuit() {
        assert_eq!(eval("false && missing"), Ok(Token::Boolean(false)));
        assert_eq!(eval("true || missing"), Ok(Token::Boolean(true)));
        assert_eq!(
            eval("true && missing"),
            Err(ExprError::UndefinedIdentifier("missing".to_string()))
        );
    }

    #[test]
    fn indexing_arrays() {
        assert_eq!(eval("values(1)"), Ok(Token::Int(20)));
        assert_eq!(
            eval("values(2)"),
            Err(ExprError::IndexOutOfBounds {
                index: 2,
                length: 2
            })
        );
        assert!(matches!(eval("x(0)"), Err(ExprError::NotIndexable(_))));
    }

    #[test]
    fn conditional_selects_branch() {
        assert_eq!(eval("x > 5 ? \"big\" : \"small\""), Ok(Token::from("big")));
    }

    #[test]
    fn unary_operators() {
        assert_eq!(eval("-x"), Ok(Token::Int(-7)));
        assert_eq!(eval("!(x > 5)"), Ok(Token::Boolean(false)));
        assert!(matches!(eval("!x"), Err(ExprError::TypeMismatch(_))));
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(eval("9223372036854775807 + 1"), Err(ExprError::Overflow));
    }
}

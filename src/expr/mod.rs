//! Guard and action expression language.
//!
//! Expressions use a C-like infix grammar over [`Token`] values. Parsing
//! produces an [`Expr`] tree that transitions cache between firings;
//! evaluation resolves identifiers through a [`Scope`].
//!
//! The [`Evaluator`] trait is the injection point for alternative
//! evaluation semantics. A machine holds one boxed evaluator and uses it
//! for every guard and action.

mod eval;
mod lexer;
mod parser;

pub use eval::evaluate;
pub use parser::{parse, BinaryOp, Expr, UnaryOp};

use crate::core::Token;
use crate::scope::Scope;
use thiserror::Error;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("Unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("Invalid number literal '{text}'")]
    InvalidNumber { text: String },

    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Empty expression")]
    Empty,

    #[error("The identifier \"{0}\" is undefined")]
    UndefinedIdentifier(String),

    /// The value is not yet determined in this fixed-point iteration.
    #[error("The value of \"{0}\" is unknown")]
    Unknown(String),

    #[error("Port \"{0}\" has no token in this firing")]
    Absent(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow")]
    Overflow,

    #[error("Index {index} is out of bounds for an array of length {length}")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("{0} is not an array and cannot be indexed")]
    NotIndexable(String),
}

impl ExprError {
    /// Whether this error is the "unknown" sentinel of fixed-point
    /// iteration rather than a genuine failure.
    pub fn is_unknown(&self) -> bool {
        matches!(self, ExprError::Unknown(_))
    }
}

/// Parses and evaluates guard and action expressions.
pub trait Evaluator: Send + Sync {
    fn parse(&self, text: &str) -> Result<Expr, ExprError> {
        parse(text)
    }

    fn evaluate(&self, expr: &Expr, scope: &dyn Scope) -> Result<Token, ExprError>;
}

/// The standard expression semantics.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultEvaluator;

impl Evaluator for DefaultEvaluator {
    fn evaluate(&self, expr: &Expr, scope: &dyn Scope) -> Result<Token, ExprError> {
        evaluate(expr, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::MapScope;

    struct Doubling;

    impl Evaluator for Doubling {
        fn evaluate(&self, expr: &Expr, scope: &dyn Scope) -> Result<Token, ExprError> {
            match evaluate(expr, scope)? {
                Token::Int(i) => Ok(Token::Int(i * 2)),
                other => Ok(other),
            }
        }
    }

    #[test]
    fn default_evaluator_uses_standard_semantics() {
        let scope = MapScope::new().with("a", Token::Int(2));
        let expr = DefaultEvaluator.parse("a + 1").unwrap();
        assert_eq!(DefaultEvaluator.evaluate(&expr, &scope), Ok(Token::Int(3)));
    }

    #[test]
    fn evaluator_is_replaceable() {
        let scope = MapScope::new();
        let evaluator: Box<dyn Evaluator> = Box::new(Doubling);
        let expr = evaluator.parse("21").unwrap();
        assert_eq!(evaluator.evaluate(&expr, &scope), Ok(Token::Int(42)));
    }

    #[test]
    fn unknown_is_distinguished_from_failures() {
        assert!(ExprError::Unknown("x".into()).is_unknown());
        assert!(!ExprError::Absent("x".into()).is_unknown());
    }
}

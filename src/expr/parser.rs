//! Recursive-descent parser producing [`Expr`] trees.
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, `== !=`, `< <= > >=`,
//! `+ -`, `* / %`, unary `! -`, postfix indexing `x(i)`.

use super::lexer::{tokenize, Lexeme, Spanned};
use super::ExprError;
use crate::core::Token;
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Parse tree of a guard or action expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Token),
    Identifier(String),
    Array(Vec<Expr>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    /// Every identifier referenced anywhere in the tree.
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_identifiers(&mut names);
        names
    }

    fn collect_identifiers(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Identifier(name) => {
                names.insert(name.clone());
            }
            Expr::Array(items) => items.iter().for_each(|e| e.collect_identifiers(names)),
            Expr::Index { target, index } => {
                target.collect_identifiers(names);
                index.collect_identifiers(names);
            }
            Expr::Unary { operand, .. } => operand.collect_identifiers(names),
            Expr::Binary { left, right, .. } => {
                left.collect_identifiers(names);
                right.collect_identifiers(names);
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_identifiers(names);
                then.collect_identifiers(names);
                otherwise.collect_identifiers(names);
            }
        }
    }
}

/// Parse an expression string.
///
/// # Example
///
/// ```rust
/// use fsm_kernel::expr::{parse, BinaryOp, Expr};
///
/// let expr = parse("start_isPresent && count > 2").unwrap();
/// assert!(matches!(expr, Expr::Binary { op: BinaryOp::And, .. }));
/// assert_eq!(expr.identifiers().len(), 2);
/// ```
pub fn parse(text: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    if parser.peek() == &Lexeme::Eof {
        return Err(ExprError::Empty);
    }
    let expr = parser.parse_expr()?;
    if parser.peek() != &Lexeme::Eof {
        return Err(parser.err(format!("unexpected {:?} after expression", parser.peek())));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Lexeme {
        &self.cur().lexeme
    }

    fn advance(&mut self) -> Lexeme {
        let lexeme = self.cur().lexeme.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        lexeme
    }

    fn err(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            offset: self.cur().offset,
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: Lexeme, what: &str) -> Result<(), ExprError> {
        if self.peek() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', got {:?}", what, self.peek())))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> Result<Expr, ExprError> {
        let condition = self.parse_or()?;
        if self.peek() != &Lexeme::Question {
            return Ok(condition);
        }
        self.advance();
        let then = self.parse_expr()?;
        self.expect(Lexeme::Colon, ":")?;
        let otherwise = self.parse_conditional()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek() == &Lexeme::OrOr {
            self.advance();
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_equality()?;
        while self.peek() == &Lexeme::AndAnd {
            self.advance();
            let right = self.parse_equality()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Lexeme::EqEq => BinaryOp::Eq,
                Lexeme::NotEq => BinaryOp::NotEq,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_relational()?;
            left = binary(op, left, right);
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Lexeme::Lt => BinaryOp::Lt,
                Lexeme::Le => BinaryOp::Le,
                Lexeme::Gt => BinaryOp::Gt,
                Lexeme::Ge => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Lexeme::Plus => BinaryOp::Add,
                Lexeme::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Lexeme::Star => BinaryOp::Mul,
                Lexeme::Slash => BinaryOp::Div,
                Lexeme::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek() {
            Lexeme::Not => UnaryOp::Not,
            Lexeme::Minus => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        while self.peek() == &Lexeme::LParen {
            self.advance();
            let index = self.parse_expr()?;
            self.expect(Lexeme::RParen, ")")?;
            expr = Expr::Index {
                target: Box::new(expr),
                index: Box::new(index),
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.peek().clone() {
            Lexeme::Int(i) => {
                self.advance();
                Ok(Expr::Literal(Token::Int(i)))
            }
            Lexeme::Double(d) => {
                self.advance();
                Ok(Expr::Literal(Token::Double(d)))
            }
            Lexeme::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Token::Str(s)))
            }
            Lexeme::True => {
                self.advance();
                Ok(Expr::Literal(Token::Boolean(true)))
            }
            Lexeme::False => {
                self.advance();
                Ok(Expr::Literal(Token::Boolean(false)))
            }
            Lexeme::Ident(name) => {
                self.advance();
                Ok(Expr::Identifier(name))
            }
            Lexeme::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(Lexeme::RParen, ")")?;
                Ok(expr)
            }
            Lexeme::LBrace => {
                self.advance();
                let mut items = Vec::new();
                if self.peek() != &Lexeme::RBrace {
                    items.push(self.parse_expr()?);
                    while self.peek() == &Lexeme::Comma {
                        self.advance();
                        items.push(self.parse_expr()?);
                    }
                }
                self.expect(Lexeme::RBrace, "}")?;
                Ok(Expr::Array(items))
            }
            other => Err(self.err(format!("expected expression, got {other:?}"))),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Identifier(name.to_string()))
    }

    fn int(i: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Token::Int(i)))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse("a + b * 2").unwrap(),
            Expr::Binary {
                op: BinaryOp::Add,
                left: ident("a"),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: ident("b"),
                    right: int(2),
                }),
            }
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("a || b && c").unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::Or,
                right,
                ..
            } => assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. })),
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn postfix_call_indexes() {
        assert_eq!(
            parse("inArray(1)").unwrap(),
            Expr::Index {
                target: ident("inArray"),
                index: int(1),
            }
        );
    }

    #[test]
    fn conditional_is_right_associative() {
        let expr = parse("a ? 1 : b ? 2 : 3").unwrap();
        match expr {
            Expr::Conditional { otherwise, .. } => {
                assert!(matches!(*otherwise, Expr::Conditional { .. }))
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn array_literals_parse() {
        assert_eq!(
            parse("{1, 2}").unwrap(),
            Expr::Array(vec![*int(1), *int(2)])
        );
        assert_eq!(parse("{}").unwrap(), Expr::Array(vec![]));
    }

    #[test]
    fn empty_and_trailing_input_are_errors() {
        assert_eq!(parse("   "), Err(ExprError::Empty));
        assert!(matches!(parse("a b"), Err(ExprError::Syntax { .. })));
        assert!(matches!(parse("(a"), Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn identifiers_are_collected() {
        let names = parse("x_isPresent ? x + y : z(0)").unwrap().identifiers();
        let expected: Vec<&str> = vec!["x", "x_isPresent", "y", "z"];
        assert_eq!(names.iter().map(String::as_str).collect::<Vec<_>>(), expected);
    }
}

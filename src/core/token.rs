//! Token values exchanged through ports and bound in expression scopes.
//!
//! Tokens are plain immutable values. Numeric tokens compare by value across
//! `Int` and `Double`; arrays are ordered element-wise, which yields a
//! partial order rather than a total one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A value carried on a port channel or bound to an identifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Token {
    Boolean(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Array(Vec<Token>),
}

/// The static type of a token, as reported by a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    Boolean,
    Int,
    Double,
    String,
    Array(Box<TokenType>),
    /// Any type. Used for ports without a declared type.
    General,
}

/// Result of comparing two tokens under the partial order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Less,
    Equal,
    Greater,
    Incomparable,
}

impl Token {
    /// The type of this value.
    pub fn token_type(&self) -> TokenType {
        match self {
            Token::Boolean(_) => TokenType::Boolean,
            Token::Int(_) => TokenType::Int,
            Token::Double(_) => TokenType::Double,
            Token::Str(_) => TokenType::String,
            Token::Array(items) => {
                let element = items
                    .iter()
                    .map(Token::token_type)
                    .reduce(|a, b| a.least_upper_bound(&b))
                    .unwrap_or(TokenType::General);
                TokenType::Array(Box::new(element))
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Token::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Token::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, promoting integers.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Token::Int(i) => Some(*i as f64),
            Token::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Token::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Token]> {
        match self {
            Token::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Token::Int(_) | Token::Double(_))
    }

    /// Value equality. Integers and doubles are equal when numerically equal.
    pub fn value_eq(&self, other: &Token) -> bool {
        match (self, other) {
            (Token::Int(a), Token::Int(b)) => a == b,
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_double() == b.as_double(),
            (Token::Array(a), Token::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.value_eq(y))
            }
            (a, b) => a == b,
        }
    }

    /// Compare two tokens.
    ///
    /// Scalars are totally ordered within their kind (numbers by value,
    /// strings lexicographically, `false < true`). Arrays of equal length
    /// use the product order: `a <= b` iff every `a[i] <= b[i]`. Returns
    /// `None` when the kinds cannot be compared at all.
    pub fn order(&self, other: &Token) -> Option<Order> {
        match (self, other) {
            (Token::Int(a), Token::Int(b)) => Some(a.cmp(b).into()),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (x, y) = (a.as_double()?, b.as_double()?);
                Some(x.partial_cmp(&y).map_or(Order::Incomparable, Order::from))
            }
            (Token::Str(a), Token::Str(b)) => Some(a.cmp(b).into()),
            (Token::Boolean(a), Token::Boolean(b)) => Some(a.cmp(b).into()),
            (Token::Array(a), Token::Array(b)) => {
                if a.len() != b.len() {
                    return Some(Order::Incomparable);
                }
                let mut less = false;
                let mut greater = false;
                for (x, y) in a.iter().zip(b) {
                    match x.order(y)? {
                        Order::Less => less = true,
                        Order::Greater => greater = true,
                        Order::Equal => {}
                        Order::Incomparable => return Some(Order::Incomparable),
                    }
                }
                Some(match (less, greater) {
                    (false, false) => Order::Equal,
                    (true, false) => Order::Less,
                    (false, true) => Order::Greater,
                    (true, true) => Order::Incomparable,
                })
            }
            _ => None,
        }
    }
}

impl From<std::cmp::Ordering> for Order {
    fn from(ordering: std::cmp::Ordering) -> Self {
        match ordering {
            std::cmp::Ordering::Less => Order::Less,
            std::cmp::Ordering::Equal => Order::Equal,
            std::cmp::Ordering::Greater => Order::Greater,
        }
    }
}

impl From<bool> for Token {
    fn from(value: bool) -> Self {
        Token::Boolean(value)
    }
}

impl From<i64> for Token {
    fn from(value: i64) -> Self {
        Token::Int(value)
    }
}

impl From<f64> for Token {
    fn from(value: f64) -> Self {
        Token::Double(value)
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Token::Str(value.to_string())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Token::Str(value)
    }
}

impl From<Vec<Token>> for Token {
    fn from(value: Vec<Token>) -> Self {
        Token::Array(value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Boolean(b) => write!(f, "{b}"),
            Token::Int(i) => write!(f, "{i}"),
            Token::Double(d) if d.is_finite() && d.fract() == 0.0 => write!(f, "{d:.1}"),
            Token::Double(d) => write!(f, "{d}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Array(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl TokenType {
    /// Smallest type both `self` and `other` convert to.
    pub fn least_upper_bound(&self, other: &TokenType) -> TokenType {
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (TokenType::Int, TokenType::Double) | (TokenType::Double, TokenType::Int) => {
                TokenType::Double
            }
            (TokenType::Array(a), TokenType::Array(b)) => {
                TokenType::Array(Box::new(a.least_upper_bound(b)))
            }
            _ => TokenType::General,
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Boolean => write!(f, "boolean"),
            TokenType::Int => write!(f, "int"),
            TokenType::Double => write!(f, "double"),
            TokenType::String => write!(f, "string"),
            TokenType::Array(element) => write!(f, "arrayType({element})"),
            TokenType::General => write!(f, "general"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Token {
        Token::Array(values.iter().copied().map(Token::Int).collect())
    }

    #[test]
    fn numeric_equality_promotes_integers() {
        assert!(Token::Int(5).value_eq(&Token::Double(5.0)));
        assert!(!Token::Int(5).value_eq(&Token::Double(5.5)));
        assert!(!Token::Int(1).value_eq(&Token::Boolean(true)));
    }

    #[test]
    fn scalars_are_totally_ordered() {
        assert_eq!(Token::Int(1).order(&Token::Double(2.0)), Some(Order::Less));
        assert_eq!(
            Token::from("b").order(&Token::from("a")),
            Some(Order::Greater)
        );
        assert_eq!(Token::Int(1).order(&Token::from("a")), None);
    }

    #[test]
    fn arrays_use_product_order() {
        assert_eq!(ints(&[1, 2]).order(&ints(&[1, 3])), Some(Order::Less));
        assert_eq!(ints(&[1, 2]).order(&ints(&[1, 2])), Some(Order::Equal));
        assert_eq!(
            ints(&[1, 4]).order(&ints(&[2, 3])),
            Some(Order::Incomparable)
        );
        assert_eq!(
            ints(&[1]).order(&ints(&[1, 2])),
            Some(Order::Incomparable)
        );
    }

    #[test]
    fn array_type_is_least_upper_bound_of_elements() {
        let mixed = Token::Array(vec![Token::Int(1), Token::Double(2.5)]);
        assert_eq!(
            mixed.token_type(),
            TokenType::Array(Box::new(TokenType::Double))
        );
        let empty = Token::Array(vec![]);
        assert_eq!(
            empty.token_type(),
            TokenType::Array(Box::new(TokenType::General))
        );
    }

    #[test]
    fn display_matches_expression_syntax() {
        assert_eq!(Token::Double(5.0).to_string(), "5.0");
        assert_eq!(Token::from("hi").to_string(), "\"hi\"");
        assert_eq!(ints(&[1, 2]).to_string(), "{1, 2}");
    }

    #[test]
    fn token_serializes_correctly() {
        let token = Token::Array(vec![Token::Int(1), Token::from("x")]);
        let json = serde_json::to_string(&token).unwrap();
        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(token, back);
    }
}

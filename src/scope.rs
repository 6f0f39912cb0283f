//! Identifier resolution for guard and action expressions.
//!
//! During a firing, expressions see input port values through a
//! [`PortScope`]. For an input port `p` of width `n` the scope binds:
//!
//! | identifier | value |
//! | --- | --- |
//! | `p`, `p_i` | the token read from the port / channel `i` |
//! | `p_isPresent`, `p_i_isPresent` | whether a token was read |
//! | `pArray`, `p_iArray` | all tokens read (multirate only) |
//!
//! Names that are not port identifiers fall through to the machine's
//! variables and then to an optional enclosing scope.

use crate::actor::IoPort;
use crate::core::{Token, TokenType};
use crate::expr::ExprError;
use crate::fsm::FsmError;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

const IS_PRESENT: &str = "_isPresent";
const ARRAY: &str = "Array";

/// Read-only identifier environment.
pub trait Scope {
    /// Value bound to `name`, or `None` if the scope does not define it.
    fn get(&self, name: &str) -> Result<Option<Token>, ExprError>;

    /// Type of the value bound to `name`, or `None` if undefined.
    fn get_type(&self, name: &str) -> Result<Option<TokenType>, ExprError>;

    /// Every identifier this scope can resolve.
    fn identifier_set(&self) -> BTreeSet<String>;
}

/// A scope backed by a plain map. Useful as an enclosing scope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapScope {
    values: BTreeMap<String, Token>,
}

impl MapScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Token) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Token) {
        self.values.insert(name.into(), value);
    }
}

impl Scope for MapScope {
    fn get(&self, name: &str) -> Result<Option<Token>, ExprError> {
        Ok(self.values.get(name).cloned())
    }

    fn get_type(&self, name: &str) -> Result<Option<TokenType>, ExprError> {
        Ok(self.values.get(name).map(Token::token_type))
    }

    fn identifier_set(&self) -> BTreeSet<String> {
        self.values.keys().cloned().collect()
    }
}

/// All identifiers an input port binds for the given width.
pub(crate) fn port_identifiers(port: &str, width: usize) -> Vec<String> {
    let mut names = vec![
        port.to_string(),
        format!("{port}{IS_PRESENT}"),
        format!("{port}{ARRAY}"),
    ];
    for channel in 0..width {
        names.push(format!("{port}_{channel}"));
        names.push(format!("{port}_{channel}{IS_PRESENT}"));
        names.push(format!("{port}_{channel}{ARRAY}"));
    }
    names
}

/// Identifier-to-port map and the tokens read in the current firing.
#[derive(Clone, Debug, Default)]
pub struct InputBindings {
    identifier_to_port: HashMap<String, String>,
    port_types: HashMap<String, TokenType>,
    tokens: HashMap<String, Token>,
    unknown: HashSet<String>,
}

impl InputBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the identifiers of every input port, in port order.
    pub fn for_ports(ports: &[IoPort]) -> Result<Self, FsmError> {
        let mut bindings = Self::new();
        for port in ports.iter().filter(|p| p.is_input()) {
            for identifier in port_identifiers(port.name(), port.width()) {
                bindings.bind(&identifier, port.name())?;
            }
            bindings.set_port_type(port.name(), port.token_type().clone());
        }
        Ok(bindings)
    }

    /// Associate `identifier` with `port`.
    ///
    /// Fails if the identifier already refers to a different port.
    pub(crate) fn bind(&mut self, identifier: &str, port: &str) -> Result<(), FsmError> {
        match self.identifier_to_port.get(identifier) {
            Some(previous) if previous != port => Err(FsmError::IdentifierCollision {
                identifier: identifier.to_string(),
                first: previous.clone(),
                second: port.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.identifier_to_port
                    .insert(identifier.to_string(), port.to_string());
                Ok(())
            }
        }
    }

    pub(crate) fn set_port_type(&mut self, port: &str, token_type: TokenType) {
        self.port_types.insert(port.to_string(), token_type);
    }

    /// Bind a token read from `port` to `identifier`.
    pub(crate) fn set(&mut self, identifier: &str, port: &str, token: Token) -> Result<(), FsmError> {
        self.bind(identifier, port)?;
        self.unknown.remove(identifier);
        self.tokens.insert(identifier.to_string(), token);
        Ok(())
    }

    /// Record that `identifier` has no value in this firing.
    pub(crate) fn set_absent(&mut self, identifier: &str) {
        self.unknown.remove(identifier);
        self.tokens.remove(identifier);
    }

    /// Record that the value of `identifier` is not yet known.
    pub(crate) fn set_unknown(&mut self, identifier: &str) {
        self.tokens.remove(identifier);
        self.unknown.insert(identifier.to_string());
    }

    /// Forget every identifier and token.
    pub(crate) fn clear(&mut self) {
        self.identifier_to_port.clear();
        self.port_types.clear();
        self.clear_tokens();
    }

    /// Forget the tokens of the last firing, keeping the identifier map.
    pub(crate) fn clear_tokens(&mut self) {
        self.tokens.clear();
        self.unknown.clear();
    }

    /// The port an identifier refers to, if any.
    pub fn port_for(&self, identifier: &str) -> Option<&str> {
        self.identifier_to_port.get(identifier).map(String::as_str)
    }

    pub fn token(&self, identifier: &str) -> Option<&Token> {
        self.tokens.get(identifier)
    }

    /// Whether the last firing read at least one token from `port`.
    pub fn is_present(&self, port: &str) -> bool {
        matches!(
            self.tokens.get(&format!("{port}{IS_PRESENT}")),
            Some(Token::Boolean(true))
        )
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.identifier_to_port.keys().map(String::as_str)
    }
}

/// The per-firing view of input values, variables and the enclosing scope.
pub struct PortScope<'a> {
    inputs: &'a InputBindings,
    variables: &'a BTreeMap<String, Token>,
    parent: Option<&'a dyn Scope>,
}

impl<'a> PortScope<'a> {
    pub fn new(
        inputs: &'a InputBindings,
        variables: &'a BTreeMap<String, Token>,
        parent: Option<&'a dyn Scope>,
    ) -> Self {
        Self {
            inputs,
            variables,
            parent,
        }
    }
}

impl Scope for PortScope<'_> {
    fn get(&self, name: &str) -> Result<Option<Token>, ExprError> {
        if self.inputs.unknown.contains(name) {
            return Err(ExprError::Unknown(name.to_string()));
        }
        if let Some(token) = self.inputs.tokens.get(name) {
            return Ok(Some(token.clone()));
        }
        if self.inputs.identifier_to_port.contains_key(name) {
            if name.ends_with(IS_PRESENT) {
                return Ok(Some(Token::Boolean(false)));
            }
            return Err(ExprError::Absent(name.to_string()));
        }
        if let Some(value) = self.variables.get(name) {
            return Ok(Some(value.clone()));
        }
        match self.parent {
            Some(parent) => parent.get(name),
            None => Ok(None),
        }
    }

    fn get_type(&self, name: &str) -> Result<Option<TokenType>, ExprError> {
        if let Some(port) = self.inputs.identifier_to_port.get(name) {
            if name.ends_with(IS_PRESENT) {
                return Ok(Some(TokenType::Boolean));
            }
            let port_type = self
                .inputs
                .port_types
                .get(port)
                .cloned()
                .unwrap_or(TokenType::General);
            if let Some(base) = name.strip_suffix(ARRAY) {
                if self.inputs.identifier_to_port.get(base) == Some(port) {
                    return Ok(Some(TokenType::Array(Box::new(port_type))));
                }
            }
            return Ok(Some(port_type));
        }
        if let Some(value) = self.variables.get(name) {
            return Ok(Some(value.token_type()));
        }
        match self.parent {
            Some(parent) => parent.get_type(name),
            None => Ok(None),
        }
    }

    fn identifier_set(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.variables.keys().cloned().collect();
        names.extend(self.inputs.identifier_to_port.keys().cloned());
        if let Some(parent) = self.parent {
            names.extend(parent.identifier_set());
        }
        names
    }
}

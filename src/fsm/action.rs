//! Transition actions.
//!
//! An action is a list of `destination = expression` commands separated by
//! semicolons. Choice actions run during `fire` and may run several times
//! per iteration; commit actions run once, in `postfire`.
//!
//! ```text
//! out = count + 1; alarm(1) = true
//! ```
//!
//! A destination is a name, optionally followed by a channel index in
//! parentheses. `=` is an assignment only when it is not part of `==`,
//! `!=`, `<=` or `>=`.
//!
//! Constructing an action only splits its commands. The right-hand sides
//! are parsed by the owning machine's [`Evaluator`] and handed to
//! [`Action::execute`] through the [`ActionContext`].

use super::error::FsmError;
use crate::actor::{IoPort, Refinement};
use crate::core::Token;
use crate::expr::{Evaluator, Expr, ExprError};
use crate::scope::{InputBindings, PortScope, Scope};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// One `destination = expression` assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub destination: String,
    pub channel: Option<usize>,
    pub expression: String,
}

/// What the destinations of an action name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestinationKind {
    Port,
    Variable,
}

/// Identifies an action constructor in an [`ActionRegistry`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Output,
    Set,
    Custom(String),
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Output => write!(f, "outputActions"),
            ActionKind::Set => write!(f, "setActions"),
            ActionKind::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// An action attached to a transition.
pub trait Action: Send + Sync + fmt::Debug {
    fn kind(&self) -> ActionKind;

    /// Runs during `fire`. Must not change persistent state.
    fn is_choice(&self) -> bool;

    /// Runs once, during `postfire`.
    fn is_commit(&self) -> bool;

    fn expression(&self) -> &str;

    fn commands(&self) -> &[Command];

    fn destination_kind(&self) -> DestinationKind;

    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), FsmError>;
}

/// What an action may read and write while it executes.
pub struct ActionContext<'a> {
    transition: &'a str,
    inputs: &'a InputBindings,
    variables: &'a mut BTreeMap<String, Token>,
    ports: &'a mut [IoPort],
    refinements: &'a mut BTreeMap<String, Box<dyn Refinement>>,
    evaluator: &'a dyn Evaluator,
    parent: Option<&'a dyn Scope>,
    trees: &'a [Expr],
}

impl<'a> ActionContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transition: &'a str,
        inputs: &'a InputBindings,
        variables: &'a mut BTreeMap<String, Token>,
        ports: &'a mut [IoPort],
        refinements: &'a mut BTreeMap<String, Box<dyn Refinement>>,
        evaluator: &'a dyn Evaluator,
        parent: Option<&'a dyn Scope>,
    ) -> Self {
        Self {
            transition,
            inputs,
            variables,
            ports,
            refinements,
            evaluator,
            parent,
            trees: &[],
        }
    }

    /// Hand over the parsed commands of the action about to execute.
    pub(crate) fn set_command_trees(&mut self, trees: &'a [Expr]) {
        self.trees = trees;
    }

    /// Name of the transition whose action is executing.
    pub fn transition(&self) -> &str {
        self.transition
    }

    /// Evaluate against the current inputs, variables and enclosing scope.
    pub fn evaluate(&self, expr: &Expr) -> Result<Token, ExprError> {
        let scope = PortScope::new(self.inputs, &*self.variables, self.parent);
        self.evaluator.evaluate(expr, &scope)
    }

    /// Evaluate the right-hand side of the executing action's `index`th
    /// command, as parsed by the machine's evaluator.
    pub fn evaluate_command(&self, index: usize) -> Result<Token, ExprError> {
        let tree = self.trees.get(index).ok_or(ExprError::Empty)?;
        self.evaluate(tree)
    }

    pub fn port(&self, name: &str) -> Option<&IoPort> {
        self.ports.iter().find(|p| p.name() == name)
    }

    pub fn port_mut(&mut self, name: &str) -> Option<&mut IoPort> {
        self.ports.iter_mut().find(|p| p.name() == name)
    }

    pub fn variable(&self, name: &str) -> Option<&Token> {
        self.variables.get(name)
    }

    /// Assign an existing variable.
    pub fn set_variable(&mut self, name: &str, value: Token) -> Result<(), FsmError> {
        let slot = self
            .variables
            .get_mut(name)
            .ok_or_else(|| FsmError::NoSuchVariable(name.to_string()))?;
        *slot = value;
        Ok(())
    }

    pub fn set_refinement_parameter(
        &mut self,
        refinement: &str,
        parameter: &str,
        value: Token,
    ) -> Result<(), FsmError> {
        self.refinements
            .get_mut(refinement)
            .ok_or_else(|| FsmError::NoSuchVariable(format!("{refinement}.{parameter}")))?
            .set_parameter(parameter, value)
    }

    fn evaluation_error(&self, destination: &str, source: ExprError) -> FsmError {
        FsmError::ActionEvaluation {
            transition: self.transition.to_string(),
            destination: destination.to_string(),
            source,
        }
    }
}

/// Parse a `;`-separated list of assignments.
pub fn parse_commands(text: &str) -> Result<Vec<Command>, ExprError> {
    split_top_level(text, ';')
        .into_iter()
        .filter(|(_, segment)| !segment.trim().is_empty())
        .map(|(offset, segment)| parse_command(offset, segment))
        .collect()
}

fn parse_command(offset: usize, segment: &str) -> Result<Command, ExprError> {
    let split = find_assignment(segment).ok_or_else(|| ExprError::Syntax {
        offset,
        message: format!("expected 'destination = expression' in \"{}\"", segment.trim()),
    })?;
    let (destination, channel) = parse_destination(offset, &segment[..split])?;
    let expression = segment[split + 1..].trim();
    if expression.is_empty() {
        return Err(ExprError::Syntax {
            offset: offset + split + 1,
            message: format!("missing expression for \"{destination}\""),
        });
    }
    Ok(Command {
        destination,
        channel,
        expression: expression.to_string(),
    })
}

fn parse_destination(offset: usize, text: &str) -> Result<(String, Option<usize>), ExprError> {
    let syntax = |message: String| ExprError::Syntax { offset, message };
    let text = text.trim();
    let (name, channel) = match text.find('(') {
        Some(open) => {
            let inner = text[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| syntax(format!("unbalanced channel index in \"{text}\"")))?;
            let channel = inner
                .trim()
                .parse::<usize>()
                .map_err(|_| syntax(format!("channel index must be a non-negative integer in \"{text}\"")))?;
            (text[..open].trim(), Some(channel))
        }
        None => (text, None),
    };
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && !name.ends_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    if !valid {
        return Err(syntax(format!("invalid destination \"{name}\"")));
    }
    Ok((name.to_string(), channel))
}

/// Split on `separator` outside of strings, parentheses and braces.
fn split_top_level(text: &str, separator: char) -> Vec<(usize, &str)> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if in_string {
            match (escaped, c) {
                (true, _) => escaped = false,
                (false, '\\') => escaped = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '{' => depth += 1,
            ')' | '}' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push((start, &text[start..i]));
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push((start, &text[start..]));
    parts
}

/// Byte offset of the assignment `=` in a command.
fn find_assignment(segment: &str) -> Option<usize> {
    let bytes = segment.as_bytes();
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match (escaped, b) {
                (true, _) => escaped = false,
                (false, b'\\') => escaped = true,
                (false, b'"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'=' => {
                let previous = i.checked_sub(1).map(|p| bytes[p]);
                let next = bytes.get(i + 1).copied();
                let compound = matches!(previous, Some(b'=' | b'!' | b'<' | b'>'));
                if !compound && next != Some(b'=') {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Choice action that writes tokens to output ports.
///
/// `port = expr` broadcasts to every channel; `port(i) = expr` sends on
/// channel `i`. If the port is also an input, the token is delivered to
/// the port's own receivers as well.
#[derive(Clone, Debug)]
pub struct OutputActions {
    expression: String,
    commands: Vec<Command>,
}

impl OutputActions {
    pub fn new(expression: &str) -> Result<Self, FsmError> {
        let commands = parse_commands(expression).map_err(|source| FsmError::ActionParse {
            expression: expression.to_string(),
            source,
        })?;
        Ok(Self {
            expression: expression.to_string(),
            commands,
        })
    }
}

impl Action for OutputActions {
    fn kind(&self) -> ActionKind {
        ActionKind::Output
    }

    fn is_choice(&self) -> bool {
        true
    }

    fn is_commit(&self) -> bool {
        false
    }

    fn expression(&self) -> &str {
        &self.expression
    }

    fn commands(&self) -> &[Command] {
        &self.commands
    }

    fn destination_kind(&self) -> DestinationKind {
        DestinationKind::Port
    }

    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), FsmError> {
        for (index, command) in self.commands.iter().enumerate() {
            let name = command.destination.as_str();
            let port = ctx
                .port(name)
                .ok_or_else(|| FsmError::NoSuchPort(name.to_string()))?;
            if !port.is_output() {
                return Err(FsmError::NotAnOutputPort(name.to_string()));
            }

            let token = match ctx.evaluate_command(index) {
                Ok(token) => token,
                Err(err) if err.is_unknown() => {
                    trace!(port = name, "output value unknown, not sending");
                    continue;
                }
                Err(source) => return Err(ctx.evaluation_error(name, source)),
            };

            let cannot_complete = |source| FsmError::CannotCompleteAction {
                destination: name.to_string(),
                source,
            };
            let port = ctx
                .port_mut(name)
                .ok_or_else(|| FsmError::NoSuchPort(name.to_string()))?;
            match command.channel {
                Some(channel) => {
                    port.send(channel, token.clone()).map_err(cannot_complete)?;
                    if port.is_input() {
                        port.deliver(channel, token.clone()).map_err(cannot_complete)?;
                    }
                    debug!(port = name, channel, token = %token, "sent output");
                }
                None => {
                    port.broadcast(token.clone()).map_err(cannot_complete)?;
                    if port.is_input() {
                        for channel in 0..port.width() {
                            port.deliver(channel, token.clone()).map_err(cannot_complete)?;
                        }
                    }
                    debug!(port = name, token = %token, "broadcast output");
                }
            }
        }
        Ok(())
    }
}

/// Commit action that assigns variables.
///
/// A destination `refinement.param` assigns a parameter of the named
/// refinement instead of a machine variable.
#[derive(Clone, Debug)]
pub struct SetActions {
    expression: String,
    commands: Vec<Command>,
}

impl SetActions {
    pub fn new(expression: &str) -> Result<Self, FsmError> {
        let commands = parse_commands(expression).map_err(|source| FsmError::ActionParse {
            expression: expression.to_string(),
            source,
        })?;
        Ok(Self {
            expression: expression.to_string(),
            commands,
        })
    }
}

impl Action for SetActions {
    fn kind(&self) -> ActionKind {
        ActionKind::Set
    }

    fn is_choice(&self) -> bool {
        false
    }

    fn is_commit(&self) -> bool {
        true
    }

    fn expression(&self) -> &str {
        &self.expression
    }

    fn commands(&self) -> &[Command] {
        &self.commands
    }

    fn destination_kind(&self) -> DestinationKind {
        DestinationKind::Variable
    }

    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), FsmError> {
        for (index, command) in self.commands.iter().enumerate() {
            let name = command.destination.as_str();
            if command.channel.is_some() {
                return Err(FsmError::InvalidDestination {
                    destination: name.to_string(),
                    reason: "variables have no channels".to_string(),
                });
            }
            let value = ctx
                .evaluate_command(index)
                .map_err(|source| ctx.evaluation_error(name, source))?;
            debug!(variable = name, value = %value, "setting variable");
            match name.split_once('.') {
                Some((refinement, parameter)) => {
                    ctx.set_refinement_parameter(refinement, parameter, value)?
                }
                None => ctx.set_variable(name, value)?,
            }
        }
        Ok(())
    }
}

/// Creates an action from its expression text.
pub type ActionConstructor =
    Arc<dyn Fn(&str) -> Result<Box<dyn Action>, FsmError> + Send + Sync>;

/// Maps action kinds to constructors.
///
/// The default registry knows [`ActionKind::Output`] and
/// [`ActionKind::Set`]. Register custom kinds to attach further actions
/// from configuration.
#[derive(Clone)]
pub struct ActionRegistry {
    constructors: HashMap<ActionKind, ActionConstructor>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        registry.register(ActionKind::Output, |text| {
            Ok(Box::new(OutputActions::new(text)?) as Box<dyn Action>)
        });
        registry.register(ActionKind::Set, |text| {
            Ok(Box::new(SetActions::new(text)?) as Box<dyn Action>)
        });
        registry
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("kinds", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: ActionKind, constructor: F)
    where
        F: Fn(&str) -> Result<Box<dyn Action>, FsmError> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Arc::new(constructor));
    }

    pub fn create(&self, kind: &ActionKind, expression: &str) -> Result<Box<dyn Action>, FsmError> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| FsmError::UnregisteredAction(kind.to_string()))?;
        constructor(expression)
    }
}

//! Errors raised while configuring or executing a machine.

use super::machine::Phase;
use crate::actor::PortError;
use crate::core::Token;
use crate::expr::ExprError;
use thiserror::Error;

/// Errors that can occur while configuring or executing a machine.
#[derive(Debug, Error)]
pub enum FsmError {
    #[error("No initial state has been specified in \"{machine}\"")]
    NoInitialState { machine: String },

    #[error("Multiple initial states in \"{machine}\": {states:?}")]
    MultipleInitialStates { machine: String, states: Vec<String> },

    #[error("Cannot find initial state with name \"{name}\"")]
    InitialStateNotFound { name: String },

    #[error(
        "Name conflict in finite state machine: the identifier \"{identifier}\" \
         is associated with the port {first} and with the port {second}"
    )]
    IdentifierCollision {
        identifier: String,
        first: String,
        second: String,
    },

    #[error("An element named \"{0}\" already exists")]
    NameDuplication(String),

    #[error("No state named \"{0}\"")]
    NoSuchState(String),

    #[error("No transition named \"{0}\"")]
    NoSuchTransition(String),

    #[error("Transition \"{transition}\" can only connect to states, \"{name}\" is not a state")]
    NotAState { transition: String, name: String },

    #[error("Transition \"{transition}\" can only connect two states")]
    TooManyLinks { transition: String },

    #[error("Transition \"{transition}\" can only have one source and one destination")]
    DuplicateLinkEnd { transition: String },

    #[error("Transition \"{transition}\" has no destination state")]
    MissingDestination { transition: String },

    #[error("{owner} has a malformed list of refinements: {names}")]
    MalformedRefinementList { owner: String, names: String },

    #[error("{owner}: cannot find refinement with name \"{name}\"")]
    RefinementNotFound { owner: String, name: String },

    #[error("Failed to parse guard expression \"{expression}\" of transition \"{transition}\": {source}")]
    GuardParse {
        transition: String,
        expression: String,
        #[source]
        source: ExprError,
    },

    #[error("Guard \"{expression}\" of transition \"{transition}\" could not be evaluated: {source}")]
    GuardEvaluation {
        transition: String,
        expression: String,
        #[source]
        source: ExprError,
    },

    #[error("Guard \"{expression}\" of transition \"{transition}\" evaluated to {value}, which is not a boolean")]
    GuardNotBoolean {
        transition: String,
        expression: String,
        value: Token,
    },

    #[error(
        "Nondeterministic FSM error: multiple enabled transitions found in state \"{state}\" \
         but transition \"{transition}\" is not marked nondeterministic"
    )]
    MultipleEnabledTransitions { state: String, transition: String },

    #[error("Failed to parse action \"{expression}\": {source}")]
    ActionParse {
        expression: String,
        #[source]
        source: ExprError,
    },

    #[error("Expression invalid for destination \"{destination}\" in transition \"{transition}\": {source}")]
    ActionEvaluation {
        transition: String,
        destination: String,
        #[source]
        source: ExprError,
    },

    #[error("Invalid destination \"{destination}\": {reason}")]
    InvalidDestination { destination: String, reason: String },

    #[error("Cannot find port with name: {0}")]
    NoSuchPort(String),

    #[error("The port is not an output port: {0}")]
    NotAnOutputPort(String),

    #[error("The port is not an input port: {0}")]
    NotAnInputPort(String),

    #[error("Cannot find variable with name: {0}")]
    NoSuchVariable(String),

    #[error("Cannot complete action for destination \"{destination}\": {source}")]
    CannotCompleteAction {
        destination: String,
        #[source]
        source: PortError,
    },

    #[error("No action constructor registered for {0}")]
    UnregisteredAction(String),

    #[error("Refinement \"{refinement}\" failed: {message}")]
    Refinement { refinement: String, message: String },

    #[error("Cannot {operation} while the machine is {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Expr(#[from] ExprError),
}

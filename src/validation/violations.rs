//! Structural problems found in a machine.

use thiserror::Error;

/// A structural problem that would make a machine fail at run time.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelViolation {
    #[error("No initial state in \"{machine}\"")]
    NoInitialState { machine: String },

    #[error("Multiple initial states in \"{machine}\": {}", .states.join(", "))]
    MultipleInitialStates { machine: String, states: Vec<String> },

    #[error("Initial state \"{name}\" does not exist")]
    InitialStateNotFound { name: String },

    #[error("Transition \"{transition}\" has no {end} state")]
    UnlinkedTransition {
        transition: String,
        end: &'static str,
    },

    #[error("Identifier \"{identifier}\" is bound by both port \"{first}\" and port \"{second}\"")]
    IdentifierCollision {
        identifier: String,
        first: String,
        second: String,
    },

    #[error("Guard \"{expression}\" of \"{transition}\" does not parse: {message}")]
    InvalidGuard {
        transition: String,
        expression: String,
        message: String,
    },

    #[error("Action expression \"{expression}\" of \"{transition}\" does not parse: {message}")]
    InvalidAction {
        transition: String,
        expression: String,
        message: String,
    },

    #[error("Action of \"{transition}\" writes unknown port \"{port}\"")]
    UnknownPort { transition: String, port: String },

    #[error("Action of \"{transition}\" writes \"{port}\", which is not an output port")]
    NotAnOutputPort { transition: String, port: String },

    #[error("Action of \"{transition}\" assigns unknown variable \"{variable}\"")]
    UnknownVariable {
        transition: String,
        variable: String,
    },

    #[error("Malformed refinement list of \"{owner}\": \"{names}\"")]
    MalformedRefinementList { owner: String, names: String },

    #[error("Refinement \"{name}\" of \"{owner}\" does not exist")]
    UnknownRefinement { owner: String, name: String },
}

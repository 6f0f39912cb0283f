//! Build errors for machine and transition builders.

use crate::fsm::FsmError;
use crate::validation::ModelViolation;
use thiserror::Error;

/// Errors that can occur when building a machine.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Transition \"{transition}\" has no source state. Call .from(state)")]
    MissingFromState { transition: String },

    #[error("Transition \"{transition}\" has no destination state. Call .to(state)")]
    MissingToState { transition: String },

    #[error(transparent)]
    Model(#[from] FsmError),

    /// The assembled machine failed validation. Carries every violation.
    #[error("Invalid machine: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<ModelViolation>),
}

//! Fluent builders for machines and transitions.
//!
//! [`FsmBuilder`] collects states, ports, variables, refinements and
//! [`TransitionBuilder`]s, then assembles an [`FsmActor`](crate::fsm::FsmActor)
//! and validates it. Action text given to a transition builder is turned
//! into actions through the machine's [`ActionRegistry`](crate::fsm::ActionRegistry).

pub mod error;
pub mod machine;
pub mod transition;

pub use error::BuildError;
pub use machine::FsmBuilder;
pub use transition::{BuiltTransition, TransitionBuilder};

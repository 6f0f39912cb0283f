//! The finite state machine kernel.
//!
//! - [`FsmActor`]: states, transitions and the prefire/fire/postfire protocol
//! - [`Transition`]: guarded edges with choice and commit actions
//! - [`Action`]s: [`OutputActions`], [`SetActions`] and custom kinds
//!   resolved through an [`ActionRegistry`]
//! - [`CausalityInterface`]: input-to-output dependencies

mod action;
mod causality;
mod error;
mod machine;
mod transition;

pub use action::{
    parse_commands, Action, ActionConstructor, ActionContext, ActionKind, ActionRegistry, Command,
    DestinationKind, OutputActions, SetActions,
};
pub use causality::CausalityInterface;
pub use error::FsmError;
pub use machine::{FsmActor, IterateResult, Phase};
pub use transition::{GuardValue, LinkEnd, Transition, TransitionId};

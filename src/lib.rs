//! fsm-kernel: guarded finite state machines for actor-oriented models
//!
//! A [`FsmActor`] is an actor with input and output ports whose behavior is
//! a flat graph of [`State`]s connected by guarded [`Transition`]s. A
//! director drives it through a three-phase protocol:
//!
//! - `prefire` checks readiness
//! - `fire` reads the inputs, picks at most one enabled transition and runs
//!   its choice actions (typically producing outputs). It can be repeated
//!   within one iteration and never changes persistent state.
//! - `postfire` runs the commit actions of the chosen transition and moves
//!   to its destination state
//!
//! Guards and actions are expressions over the identifiers bound by the
//! machine's input ports (`p`, `p_isPresent`, `pArray`, `p_0`, ...), its
//! variables and an optional parent scope.
//!
//! # Example
//!
//! ```rust
//! use fsm_kernel::builder::{FsmBuilder, TransitionBuilder};
//! use fsm_kernel::core::{State, Token};
//!
//! let mut fsm = FsmBuilder::new("gate")
//!     .input("level")
//!     .output("alarm")
//!     .state(State::new("Quiet").initial())
//!     .state(State::new("Alarmed"))
//!     .transition(
//!         TransitionBuilder::new("trip")
//!             .from("Quiet")
//!             .to("Alarmed")
//!             .guard("level_isPresent && level > 10")
//!             .output_actions("alarm = level"),
//!     )
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! fsm.preinitialize().unwrap();
//! fsm.initialize().unwrap();
//! fsm.port_mut("level").unwrap().deliver(0, Token::Int(12)).unwrap();
//!
//! fsm.prefire().unwrap();
//! fsm.fire().unwrap();
//! fsm.postfire().unwrap();
//!
//! assert_eq!(fsm.current_state().map(|s| s.name()), Some("Alarmed"));
//! assert_eq!(fsm.port_mut("alarm").unwrap().take_sent(0).unwrap(), vec![Token::Int(12)]);
//! ```

pub mod actor;
pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod expr;
pub mod fsm;
pub mod scope;
pub mod validation;

// Re-export commonly used types
pub use builder::{BuildError, FsmBuilder, TransitionBuilder};
pub use checkpoint::{Checkpoint, CheckpointError};
pub use config::FsmConfig;
pub use self::core::{State, StateHistory, Token, TokenType};
pub use fsm::{FsmActor, FsmError, Transition};
pub use validation::{validate, ModelViolation};

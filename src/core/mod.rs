//! Core value types of the state machine kernel.
//!
//! - Tokens and token types exchanged through ports
//! - States of the flat state graph
//! - Structural revisions and revision-stamped caches
//! - Immutable history of committed transitions

mod history;
mod revision;
mod state;
mod token;

pub use history::{StateHistory, TransitionRecord};
pub use revision::{Cached, Revision};
pub use state::{parse_name_list, State, StateId};
pub use token::{Order, Token, TokenType};

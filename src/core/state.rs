//! States of a finite state machine.
//!
//! A state is a named node in the machine's flat transition graph. It may
//! name one or more refinements that execute while the state is active.

use serde::{Deserialize, Serialize};

/// Index of a state within its owning machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub(crate) usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A node of the state graph.
///
/// # Example
///
/// ```rust
/// use fsm_kernel::core::State;
///
/// let idle = State::new("Idle").initial();
/// let done = State::new("Done").final_state();
///
/// assert!(idle.is_initial_state());
/// assert!(!idle.is_final_state());
/// assert!(done.is_final_state());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    name: String,
    is_initial_state: bool,
    is_final_state: bool,
    refinement: String,
    visited: bool,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_initial_state: false,
            is_final_state: false,
            refinement: String::new(),
            visited: false,
        }
    }

    /// Mark this state as the initial state.
    pub fn initial(mut self) -> Self {
        self.is_initial_state = true;
        self
    }

    /// Mark this state as a final state. Reaching it halts iteration.
    pub fn final_state(mut self) -> Self {
        self.is_final_state = true;
        self
    }

    /// Set the comma-separated list of refinement names.
    pub fn with_refinement(mut self, names: impl Into<String>) -> Self {
        self.refinement = names.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_initial_state(&self) -> bool {
        self.is_initial_state
    }

    pub fn is_final_state(&self) -> bool {
        self.is_final_state
    }

    pub fn refinement_names(&self) -> &str {
        &self.refinement
    }

    /// Whether the state has been visited since it was last reset.
    ///
    /// Continuous domains use this to decide whether signals entering the
    /// state's refinement need to be reconstructed.
    pub fn is_visited(&self) -> bool {
        self.visited
    }

    pub fn set_visited(&mut self, visited: bool) {
        self.visited = visited;
    }

    pub(crate) fn set_initial_state(&mut self, initial: bool) {
        self.is_initial_state = initial;
    }

    pub(crate) fn set_final_state(&mut self, is_final: bool) {
        self.is_final_state = is_final;
    }

    pub(crate) fn set_refinement_names(&mut self, names: String) {
        self.refinement = names;
    }
}

/// Split a comma-separated list of names.
///
/// Returns an empty list for blank input and `Err` carrying the whole list
/// if any element is blank.
pub fn parse_name_list(names: &str) -> Result<Vec<String>, String> {
    if names.trim().is_empty() {
        return Ok(Vec::new());
    }
    names
        .split(',')
        .map(|name| {
            let name = name.trim();
            if name.is_empty() {
                Err(names.to_string())
            } else {
                Ok(name.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_has_no_flags() {
        let state = State::new("Idle");
        assert_eq!(state.name(), "Idle");
        assert!(!state.is_initial_state());
        assert!(!state.is_final_state());
        assert!(!state.is_visited());
        assert_eq!(state.refinement_names(), "");
    }

    #[test]
    fn visited_flag_toggles() {
        let mut state = State::new("Running");
        state.set_visited(true);
        assert!(state.is_visited());
        state.set_visited(false);
        assert!(!state.is_visited());
    }

    #[test]
    fn name_list_parses_and_trims() {
        assert_eq!(
            parse_name_list(" a, b ,c").unwrap(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(parse_name_list("   ").unwrap().is_empty());
    }

    #[test]
    fn name_list_rejects_blank_elements() {
        assert_eq!(parse_name_list("a,,b"), Err("a,,b".to_string()));
    }

    #[test]
    fn state_serializes_correctly() {
        let state = State::new("Done").final_state().with_refinement("sub");
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: State = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}

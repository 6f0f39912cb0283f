//! Builder for constructing transitions.

use crate::builder::error::BuildError;
use crate::fsm::{Action, ActionKind, ActionRegistry, Transition};

/// A transition ready to be linked between two states.
#[derive(Debug)]
pub struct BuiltTransition {
    pub transition: Transition,
    pub from: String,
    pub to: String,
}

enum PendingAction {
    Text(ActionKind, String),
    Built(Box<dyn Action>),
}

/// Builder for constructing transitions with a fluent API.
///
/// Action expressions are kept as text until [`build`](Self::build), where
/// they are turned into actions through an [`ActionRegistry`].
pub struct TransitionBuilder {
    name: String,
    from: Option<String>,
    to: Option<String>,
    guard: String,
    actions: Vec<PendingAction>,
    nondeterministic: bool,
    default_transition: bool,
    preemptive: bool,
    reset: bool,
    refinement: String,
    annotation: String,
}

impl TransitionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: None,
            to: None,
            guard: String::new(),
            actions: Vec::new(),
            nondeterministic: false,
            default_transition: false,
            preemptive: false,
            reset: false,
            refinement: String::new(),
            annotation: String::new(),
        }
    }

    /// Set the source state (required).
    pub fn from(mut self, state: impl Into<String>) -> Self {
        self.from = Some(state.into());
        self
    }

    /// Set the destination state (required).
    pub fn to(mut self, state: impl Into<String>) -> Self {
        self.to = Some(state.into());
        self
    }

    pub fn guard(mut self, expression: impl Into<String>) -> Self {
        self.guard = expression.into();
        self
    }

    pub fn output_actions(self, text: impl Into<String>) -> Self {
        self.action(ActionKind::Output, text)
    }

    pub fn set_actions(self, text: impl Into<String>) -> Self {
        self.action(ActionKind::Set, text)
    }

    /// Attach an action of any registered kind.
    pub fn action(mut self, kind: ActionKind, text: impl Into<String>) -> Self {
        self.actions.push(PendingAction::Text(kind, text.into()));
        self
    }

    /// Attach an already constructed action.
    pub fn with_action(mut self, action: Box<dyn Action>) -> Self {
        self.actions.push(PendingAction::Built(action));
        self
    }

    pub fn nondeterministic(mut self) -> Self {
        self.nondeterministic = true;
        self
    }

    pub fn default_transition(mut self) -> Self {
        self.default_transition = true;
        self
    }

    pub fn preemptive(mut self) -> Self {
        self.preemptive = true;
        self
    }

    pub fn reset(mut self) -> Self {
        self.reset = true;
        self
    }

    pub fn refinement(mut self, names: impl Into<String>) -> Self {
        self.refinement = names.into();
        self
    }

    pub fn annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = annotation.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fail early if either end is missing.
    pub(crate) fn check_ends(&self) -> Result<(), BuildError> {
        if self.from.is_none() {
            return Err(BuildError::MissingFromState {
                transition: self.name.clone(),
            });
        }
        if self.to.is_none() {
            return Err(BuildError::MissingToState {
                transition: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Resolve actions through `registry` and produce the transition.
    pub fn build(self, registry: &ActionRegistry) -> Result<BuiltTransition, BuildError> {
        self.check_ends()?;
        let mut transition = Transition::new(self.name)
            .with_guard(self.guard)
            .with_refinement(self.refinement)
            .with_annotation(self.annotation);
        transition.set_nondeterministic(self.nondeterministic);
        transition.set_default(self.default_transition);
        transition.set_preemptive(self.preemptive);
        transition.set_reset(self.reset);
        for action in self.actions {
            let action = match action {
                PendingAction::Text(kind, text) => registry.create(&kind, &text)?,
                PendingAction::Built(action) => action,
            };
            transition.add_action(action);
        }
        Ok(BuiltTransition {
            transition,
            from: self.from.unwrap_or_default(),
            to: self.to.unwrap_or_default(),
        })
    }
}

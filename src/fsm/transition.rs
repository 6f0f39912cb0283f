//! Transitions between states.
//!
//! A transition has a guard, an ordered list of actions and a few flags.
//! Its parsed guard and action commands, the partition of its actions into
//! choice and commit lists, and its resolved refinement names are cached
//! against the owning machine's [`Revision`].

use super::action::{Action, ActionKind};
use super::error::FsmError;
use crate::core::{parse_name_list, Cached, Revision, StateId, Token};
use crate::expr::{Evaluator, Expr};
use crate::scope::Scope;

/// Index of a transition within its owning machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(pub(crate) usize);

impl TransitionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which end of a transition a state is linked to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkEnd {
    /// The state is the source; the transition is one of its outgoing.
    Outgoing,
    /// The state is the destination.
    Incoming,
}

/// Result of evaluating a guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardValue {
    Enabled,
    Disabled,
    /// The guard depends on an input whose status is not yet known.
    Unknown,
}

#[derive(Clone, Debug, Default)]
struct ActionLists {
    choice: Vec<usize>,
    commit: Vec<usize>,
}

/// A directed edge of the state graph.
///
/// # Example
///
/// ```rust
/// use fsm_kernel::fsm::{OutputActions, Transition};
///
/// let transition = Transition::new("go")
///     .with_guard("start_isPresent")
///     .with_action(Box::new(OutputActions::new("out = 1").unwrap()))
///     .nondeterministic();
///
/// assert_eq!(transition.guard_expression(), "start_isPresent");
/// assert!(transition.is_nondeterministic());
/// assert_eq!(transition.label(), "guard: start_isPresent\noutput: out = 1");
/// ```
#[derive(Debug)]
pub struct Transition {
    name: String,
    guard_expression: String,
    guard_tree: Cached<Option<Expr>>,
    actions: Vec<Box<dyn Action>>,
    action_lists: Cached<ActionLists>,
    action_trees: Cached<Vec<Vec<Expr>>>,
    preemptive: bool,
    reset: bool,
    nondeterministic: bool,
    default_transition: bool,
    refinement_name: String,
    refinements: Cached<Vec<String>>,
    annotation: String,
    links: Vec<(StateId, LinkEnd)>,
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            guard_expression: String::new(),
            guard_tree: Cached::new(),
            actions: Vec::new(),
            action_lists: Cached::new(),
            action_trees: Cached::new(),
            preemptive: false,
            reset: false,
            nondeterministic: false,
            default_transition: false,
            refinement_name: String::new(),
            refinements: Cached::new(),
            annotation: String::new(),
            links: Vec::new(),
        }
    }

    pub fn with_guard(mut self, expression: impl Into<String>) -> Self {
        self.set_guard_expression(expression);
        self
    }

    pub fn with_action(mut self, action: Box<dyn Action>) -> Self {
        self.add_action(action);
        self
    }

    pub fn nondeterministic(mut self) -> Self {
        self.nondeterministic = true;
        self
    }

    /// Taken only when no other outgoing transition is enabled.
    pub fn default_transition(mut self) -> Self {
        self.default_transition = true;
        self
    }

    pub fn preemptive(mut self) -> Self {
        self.preemptive = true;
        self
    }

    /// Reinitialize the destination's refinements when taken.
    pub fn reset(mut self) -> Self {
        self.reset = true;
        self
    }

    /// Comma-separated names of refinements run when this transition is taken.
    pub fn with_refinement(mut self, names: impl Into<String>) -> Self {
        self.refinement_name = names.into();
        self.refinements.invalidate();
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = annotation.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn guard_expression(&self) -> &str {
        &self.guard_expression
    }

    pub fn set_guard_expression(&mut self, expression: impl Into<String>) {
        self.guard_expression = expression.into();
        self.guard_tree.invalidate();
    }

    pub fn actions(&self) -> &[Box<dyn Action>] {
        &self.actions
    }

    pub fn add_action(&mut self, action: Box<dyn Action>) {
        self.actions.push(action);
        self.action_lists.invalidate();
        self.action_trees.invalidate();
    }

    pub fn is_preemptive(&self) -> bool {
        self.preemptive
    }

    pub fn is_reset(&self) -> bool {
        self.reset
    }

    pub fn is_nondeterministic(&self) -> bool {
        self.nondeterministic
    }

    pub fn is_default(&self) -> bool {
        self.default_transition
    }

    pub fn set_nondeterministic(&mut self, nondeterministic: bool) {
        self.nondeterministic = nondeterministic;
    }

    pub fn set_default(&mut self, default_transition: bool) {
        self.default_transition = default_transition;
    }

    pub fn set_preemptive(&mut self, preemptive: bool) {
        self.preemptive = preemptive;
    }

    pub fn set_reset(&mut self, reset: bool) {
        self.reset = reset;
    }

    pub fn refinement_name(&self) -> &str {
        &self.refinement_name
    }

    pub fn annotation(&self) -> &str {
        &self.annotation
    }

    /// The state this transition leaves, once linked.
    pub fn source_state(&self) -> Option<StateId> {
        self.linked(LinkEnd::Outgoing)
    }

    /// The state this transition enters, once linked.
    pub fn destination_state(&self) -> Option<StateId> {
        self.linked(LinkEnd::Incoming)
    }

    fn linked(&self, end: LinkEnd) -> Option<StateId> {
        self.links
            .iter()
            .find(|(_, e)| *e == end)
            .map(|(state, _)| *state)
    }

    /// Attach one end of the transition to a state.
    pub(crate) fn link(&mut self, state: StateId, end: LinkEnd) -> Result<(), FsmError> {
        if self.links.len() >= 2 {
            return Err(FsmError::TooManyLinks {
                transition: self.name.clone(),
            });
        }
        if self.links.iter().any(|(_, e)| *e == end) {
            return Err(FsmError::DuplicateLinkEnd {
                transition: self.name.clone(),
            });
        }
        self.links.push((state, end));
        Ok(())
    }

    pub(crate) fn unlink(&mut self) {
        self.links.clear();
    }

    /// Display text: the annotation, then one line each for the guard and
    /// every non-empty action.
    pub fn label(&self) -> String {
        let mut lines = Vec::new();
        let annotation = self.annotation.trim();
        if !annotation.is_empty() {
            lines.push(annotation.to_string());
        }
        let guard = self.guard_expression.trim();
        if !guard.is_empty() {
            lines.push(format!("guard: {guard}"));
        }
        for action in &self.actions {
            let expression = action.expression().trim();
            if expression.is_empty() {
                continue;
            }
            let prefix = match action.kind() {
                ActionKind::Output => "output".to_string(),
                ActionKind::Set => "set".to_string(),
                ActionKind::Custom(name) => name,
            };
            lines.push(format!("{prefix}: {expression}"));
        }
        lines.join("\n")
    }

    /// The parsed guard, or `None` for an empty guard.
    pub(crate) fn guard_tree(
        &mut self,
        evaluator: &dyn Evaluator,
        revision: Revision,
    ) -> Result<Option<&Expr>, FsmError> {
        let name = &self.name;
        let text = &self.guard_expression;
        let tree = self.guard_tree.get_or_try_update(revision, || {
            if text.trim().is_empty() {
                return Ok(None);
            }
            evaluator
                .parse(text)
                .map(Some)
                .map_err(|source| FsmError::GuardParse {
                    transition: name.clone(),
                    expression: text.clone(),
                    source,
                })
        })?;
        Ok(tree.as_ref())
    }

    /// Evaluate the guard. An empty guard is always enabled.
    pub fn evaluate_guard(
        &mut self,
        scope: &dyn Scope,
        evaluator: &dyn Evaluator,
        revision: Revision,
    ) -> Result<GuardValue, FsmError> {
        let Some(tree) = self.guard_tree(evaluator, revision)? else {
            return Ok(GuardValue::Enabled);
        };
        match evaluator.evaluate(tree, scope) {
            Ok(Token::Boolean(true)) => Ok(GuardValue::Enabled),
            Ok(Token::Boolean(false)) => Ok(GuardValue::Disabled),
            Ok(value) => Err(FsmError::GuardNotBoolean {
                transition: self.name.clone(),
                expression: self.guard_expression.clone(),
                value,
            }),
            Err(err) if err.is_unknown() => Ok(GuardValue::Unknown),
            Err(source) => Err(FsmError::GuardEvaluation {
                transition: self.name.clone(),
                expression: self.guard_expression.clone(),
                source,
            }),
        }
    }

    /// Whether the guard evaluates to true. Unknown counts as not enabled.
    pub fn is_enabled(
        &mut self,
        scope: &dyn Scope,
        evaluator: &dyn Evaluator,
        revision: Revision,
    ) -> Result<bool, FsmError> {
        Ok(self.evaluate_guard(scope, evaluator, revision)? == GuardValue::Enabled)
    }

    fn action_lists(&mut self, revision: Revision) -> &ActionLists {
        let actions = &self.actions;
        self.action_lists.get_or_update(revision, || {
            let mut lists = ActionLists::default();
            for (index, action) in actions.iter().enumerate() {
                if action.is_choice() {
                    lists.choice.push(index);
                }
                if action.is_commit() {
                    lists.commit.push(index);
                }
            }
            lists
        })
    }

    /// Actions run during `fire`, in attachment order.
    pub fn choice_actions(&mut self, revision: Revision) -> Vec<&dyn Action> {
        let indices = self.action_lists(revision).choice.clone();
        indices.into_iter().map(|i| self.actions[i].as_ref()).collect()
    }

    /// Actions run during `postfire`, in attachment order.
    pub fn commit_actions(&mut self, revision: Revision) -> Vec<&dyn Action> {
        let indices = self.action_lists(revision).commit.clone();
        indices.into_iter().map(|i| self.actions[i].as_ref()).collect()
    }

    /// The choice or commit actions, each paired with its commands parsed
    /// by `evaluator`.
    pub(crate) fn prepared_actions(
        &mut self,
        commit: bool,
        evaluator: &dyn Evaluator,
        revision: Revision,
    ) -> Result<Vec<(&dyn Action, &[Expr])>, FsmError> {
        let lists = self.action_lists(revision);
        let indices = if commit {
            lists.commit.clone()
        } else {
            lists.choice.clone()
        };
        let actions = &self.actions;
        let trees = self
            .action_trees
            .get_or_try_update(revision, || parse_action_commands(actions, evaluator))?;
        Ok(indices
            .into_iter()
            .map(|i| (actions[i].as_ref(), trees[i].as_slice()))
            .collect())
    }

    /// Resolve the refinement names of this transition.
    ///
    /// `exists` reports whether a refinement of the given name is available.
    pub fn refinements(
        &mut self,
        revision: Revision,
        exists: impl Fn(&str) -> bool,
    ) -> Result<&[String], FsmError> {
        let name = &self.name;
        let names = &self.refinement_name;
        let resolved = self.refinements.get_or_try_update(revision, || {
            let list = parse_name_list(names).map_err(|names| FsmError::MalformedRefinementList {
                owner: name.clone(),
                names,
            })?;
            match list.iter().find(|r| !exists(r)) {
                Some(missing) => Err(FsmError::RefinementNotFound {
                    owner: name.clone(),
                    name: missing.clone(),
                }),
                None => Ok(list),
            }
        })?;
        Ok(resolved.as_slice())
    }
}

/// Parse every command of every action with the machine's evaluator.
pub(crate) fn parse_action_commands(
    actions: &[Box<dyn Action>],
    evaluator: &dyn Evaluator,
) -> Result<Vec<Vec<Expr>>, FsmError> {
    actions
        .iter()
        .map(|action| {
            action
                .commands()
                .iter()
                .map(|command| {
                    evaluator
                        .parse(&command.expression)
                        .map_err(|source| FsmError::ActionParse {
                            expression: command.expression.clone(),
                            source,
                        })
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{DefaultEvaluator, ExprError};
    use crate::fsm::action::{OutputActions, SetActions};
    use crate::scope::MapScope;

    fn scope() -> MapScope {
        MapScope::new()
            .with("x", Token::Int(3))
            .with("label", Token::from("a"))
    }

    #[test]
    fn empty_guard_is_enabled() {
        let mut transition = Transition::new("t").with_guard("  ");
        let value = transition
            .evaluate_guard(&scope(), &DefaultEvaluator, Revision::new())
            .unwrap();
        assert_eq!(value, GuardValue::Enabled);
    }

    #[test]
    fn guard_follows_its_expression() {
        let revision = Revision::new();
        let mut transition = Transition::new("t").with_guard("x > 2");
        assert!(transition
            .is_enabled(&scope(), &DefaultEvaluator, revision)
            .unwrap());

        transition.set_guard_expression("x > 5");
        assert!(!transition
            .is_enabled(&scope(), &DefaultEvaluator, revision)
            .unwrap());
    }

    #[test]
    fn non_boolean_guard_is_an_error() {
        let mut transition = Transition::new("t").with_guard("x + 1");
        let err = transition
            .evaluate_guard(&scope(), &DefaultEvaluator, Revision::new())
            .unwrap_err();
        assert!(matches!(err, FsmError::GuardNotBoolean { value: Token::Int(4), .. }));
    }

    #[test]
    fn parse_failure_names_transition_and_text() {
        let mut transition = Transition::new("broken").with_guard("x >");
        let err = transition
            .evaluate_guard(&scope(), &DefaultEvaluator, Revision::new())
            .unwrap_err();
        match err {
            FsmError::GuardParse {
                transition,
                expression,
                ..
            } => {
                assert_eq!(transition, "broken");
                assert_eq!(expression, "x >");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_inputs_make_the_guard_unknown() {
        struct Pending;
        impl Scope for Pending {
            fn get(&self, name: &str) -> Result<Option<Token>, ExprError> {
                Err(ExprError::Unknown(name.to_string()))
            }
            fn get_type(&self, _: &str) -> Result<Option<crate::core::TokenType>, ExprError> {
                Ok(None)
            }
            fn identifier_set(&self) -> std::collections::BTreeSet<String> {
                Default::default()
            }
        }

        let mut transition = Transition::new("t").with_guard("in_isPresent");
        let value = transition
            .evaluate_guard(&Pending, &DefaultEvaluator, Revision::new())
            .unwrap();
        assert_eq!(value, GuardValue::Unknown);
    }

    #[test]
    fn actions_are_partitioned_in_order() {
        let mut transition = Transition::new("t")
            .with_action(Box::new(SetActions::new("a = 1").unwrap()))
            .with_action(Box::new(OutputActions::new("out = 1").unwrap()))
            .with_action(Box::new(OutputActions::new("out = 2").unwrap()));
        let revision = Revision::new();

        let choice: Vec<&str> = transition
            .choice_actions(revision)
            .iter()
            .map(|a| a.expression())
            .collect();
        assert_eq!(choice, vec!["out = 1", "out = 2"]);
        assert_eq!(transition.commit_actions(revision).len(), 1);

        transition.add_action(Box::new(SetActions::new("b = 2").unwrap()));
        assert_eq!(transition.commit_actions(revision).len(), 2);
    }

    #[test]
    fn action_commands_are_parsed_once_per_revision() {
        struct Counting(std::sync::atomic::AtomicUsize);
        impl Evaluator for Counting {
            fn parse(&self, text: &str) -> Result<Expr, ExprError> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                crate::expr::parse(text)
            }
            fn evaluate(&self, expr: &Expr, scope: &dyn Scope) -> Result<Token, ExprError> {
                DefaultEvaluator.evaluate(expr, scope)
            }
        }

        let counting = Counting(Default::default());
        let mut revision = Revision::new();
        let mut transition = Transition::new("t")
            .with_action(Box::new(OutputActions::new("out = 1; out = 2").unwrap()))
            .with_action(Box::new(SetActions::new("a = x").unwrap()));

        let choice = transition.prepared_actions(false, &counting, revision).unwrap();
        assert_eq!(choice.len(), 1);
        assert_eq!(choice[0].1, &[Expr::Literal(Token::Int(1)), Expr::Literal(Token::Int(2))]);
        transition.prepared_actions(true, &counting, revision).unwrap();
        assert_eq!(counting.0.load(std::sync::atomic::Ordering::SeqCst), 3);

        revision.bump();
        transition.prepared_actions(true, &counting, revision).unwrap();
        assert_eq!(counting.0.load(std::sync::atomic::Ordering::SeqCst), 6);
    }

    #[test]
    fn unparsable_action_commands_fail_when_prepared() {
        let mut transition =
            Transition::new("t").with_action(Box::new(OutputActions::new("out = 1 +").unwrap()));
        assert!(matches!(
            transition.prepared_actions(false, &DefaultEvaluator, Revision::new()),
            Err(FsmError::ActionParse { ref expression, .. }) if expression == "1 +"
        ));
    }

    #[test]
    fn at_most_one_source_and_destination() {
        let mut transition = Transition::new("t");
        transition.link(StateId(0), LinkEnd::Outgoing).unwrap();
        assert!(matches!(
            transition.link(StateId(1), LinkEnd::Outgoing),
            Err(FsmError::DuplicateLinkEnd { .. })
        ));
        transition.link(StateId(1), LinkEnd::Incoming).unwrap();
        assert!(matches!(
            transition.link(StateId(2), LinkEnd::Incoming),
            Err(FsmError::TooManyLinks { .. })
        ));
        assert_eq!(transition.source_state(), Some(StateId(0)));
        assert_eq!(transition.destination_state(), Some(StateId(1)));

        transition.unlink();
        assert_eq!(transition.source_state(), None);
    }

    #[test]
    fn refinements_must_exist() {
        let revision = Revision::new();
        let mut transition = Transition::new("t").with_refinement("a, b");
        let found = transition
            .refinements(revision, |name| name == "a" || name == "b")
            .unwrap()
            .to_vec();
        assert_eq!(found, vec!["a".to_string(), "b".to_string()]);

        let mut missing = Transition::new("t").with_refinement("a, c");
        assert!(matches!(
            missing.refinements(revision, |name| name == "a"),
            Err(FsmError::RefinementNotFound { ref name, .. }) if name == "c"
        ));

        let mut malformed = Transition::new("t").with_refinement("a,,b");
        assert!(matches!(
            malformed.refinements(revision, |_| true),
            Err(FsmError::MalformedRefinementList { .. })
        ));
    }

    #[test]
    fn label_lists_annotation_guard_and_actions() {
        let transition = Transition::new("t")
            .with_annotation("retry path")
            .with_guard("x > 1")
            .with_action(Box::new(OutputActions::new("out = x").unwrap()))
            .with_action(Box::new(SetActions::new("y = 2").unwrap()));
        assert_eq!(
            transition.label(),
            "retry path\nguard: x > 1\noutput: out = x\nset: y = 2"
        );
        assert_eq!(Transition::new("t").label(), "");
    }
}

//! Builder for constructing machines.

use crate::actor::{Director, IoPort, Refinement};
use crate::builder::error::BuildError;
use crate::builder::transition::TransitionBuilder;
use crate::config::FsmConfig;
use crate::core::{State, Token};
use crate::expr::Evaluator;
use crate::fsm::{ActionRegistry, FsmActor};
use crate::scope::Scope;
use crate::validation::{validate, ModelViolation};
use rand::RngCore;
use stillwater::validation::Validation;
use tracing::debug;

/// Builder for [`FsmActor`] with a fluent API.
///
/// Structural errors (duplicate names, links to missing states, action
/// text that does not parse) surface from [`build`](Self::build), which
/// then validates the assembled machine and rejects it with every
/// violation found.
///
/// # Example
///
/// ```rust
/// use fsm_kernel::builder::{FsmBuilder, TransitionBuilder};
/// use fsm_kernel::core::{State, Token};
///
/// let fsm = FsmBuilder::new("counter")
///     .input("tick")
///     .output("count_out")
///     .variable("count", Token::Int(0))
///     .state(State::new("Counting").initial())
///     .transition(
///         TransitionBuilder::new("step")
///             .from("Counting")
///             .to("Counting")
///             .guard("tick_isPresent")
///             .output_actions("count_out = count + 1")
///             .set_actions("count = count + 1"),
///     )
///     .unwrap()
///     .build()
///     .unwrap();
///
/// assert_eq!(fsm.transitions().len(), 1);
/// ```
pub struct FsmBuilder {
    name: String,
    config: FsmConfig,
    states: Vec<State>,
    ports: Vec<IoPort>,
    variables: Vec<(String, Token)>,
    refinements: Vec<Box<dyn Refinement>>,
    transitions: Vec<TransitionBuilder>,
    director: Option<Box<dyn Director>>,
    evaluator: Option<Box<dyn Evaluator>>,
    parent_scope: Option<Box<dyn Scope + Send + Sync>>,
    rng: Option<Box<dyn RngCore + Send>>,
    registry: ActionRegistry,
}

impl FsmBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: FsmConfig::default(),
            states: Vec::new(),
            ports: Vec::new(),
            variables: Vec::new(),
            refinements: Vec::new(),
            transitions: Vec::new(),
            director: None,
            evaluator: None,
            parent_scope: None,
            rng: None,
            registry: ActionRegistry::default(),
        }
    }

    pub fn config(mut self, config: FsmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn state(mut self, state: State) -> Self {
        self.states.push(state);
        self
    }

    pub fn port(mut self, port: IoPort) -> Self {
        self.ports.push(port);
        self
    }

    pub fn input(self, name: impl Into<String>) -> Self {
        self.port(IoPort::input(name))
    }

    pub fn output(self, name: impl Into<String>) -> Self {
        self.port(IoPort::output(name))
    }

    pub fn variable(mut self, name: impl Into<String>, value: Token) -> Self {
        self.variables.push((name.into(), value));
        self
    }

    pub fn refinement(mut self, refinement: Box<dyn Refinement>) -> Self {
        self.refinements.push(refinement);
        self
    }

    pub fn director(mut self, director: Box<dyn Director>) -> Self {
        self.director = Some(director);
        self
    }

    pub fn evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn parent_scope(mut self, scope: Box<dyn Scope + Send + Sync>) -> Self {
        self.parent_scope = Some(scope);
        self
    }

    /// Use `rng` instead of the random source derived from the config seed.
    pub fn rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Resolve action text through `registry` instead of the default one.
    pub fn action_registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Add a transition using a builder.
    /// Returns an error if either end of the transition is missing.
    pub fn transition(mut self, builder: TransitionBuilder) -> Result<Self, BuildError> {
        builder.check_ends()?;
        self.transitions.push(builder);
        Ok(self)
    }

    /// Add multiple transitions at once.
    pub fn transitions(
        self,
        builders: impl IntoIterator<Item = TransitionBuilder>,
    ) -> Result<Self, BuildError> {
        builders
            .into_iter()
            .try_fold(self, |builder, transition| builder.transition(transition))
    }

    /// Assemble and validate the machine.
    pub fn build(self) -> Result<FsmActor, BuildError> {
        let fsm = self.assemble()?;
        match validate(&fsm) {
            Validation::Success(()) => Ok(fsm),
            Validation::Failure(errors) => {
                let violations: Vec<ModelViolation> = errors.iter().cloned().collect();
                debug!(machine = fsm.name(), count = violations.len(), "machine failed validation");
                Err(BuildError::Invalid(violations))
            }
        }
    }

    /// Assemble the machine without validating it.
    pub fn build_unchecked(self) -> Result<FsmActor, BuildError> {
        self.assemble()
    }

    fn assemble(self) -> Result<FsmActor, BuildError> {
        let mut fsm = FsmActor::with_config(self.name, self.config);
        if let Some(director) = self.director {
            fsm.set_director(director);
        }
        if let Some(evaluator) = self.evaluator {
            fsm.set_evaluator(evaluator);
        }
        if let Some(scope) = self.parent_scope {
            fsm.set_parent_scope(scope);
        }
        if let Some(rng) = self.rng {
            fsm.set_rng(rng);
        }
        for port in self.ports {
            fsm.add_port(port)?;
        }
        for (name, value) in self.variables {
            fsm.add_variable(name, value)?;
        }
        for refinement in self.refinements {
            fsm.add_refinement(refinement)?;
        }
        for state in self.states {
            fsm.add_state(state)?;
        }
        for builder in self.transitions {
            let built = builder.build(&self.registry)?;
            fsm.add_transition(built.transition, &built.from, &built.to)?;
        }
        Ok(fsm)
    }
}

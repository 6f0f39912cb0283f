//! The state machine actor and its firing protocol.

use super::action::{ActionContext, DestinationKind};
use super::causality::{self, CausalityInterface};
use super::error::FsmError;
use super::transition::{GuardValue, LinkEnd, Transition, TransitionId};
use crate::actor::{Director, IoPort, LocalDirector, Refinement};
use crate::checkpoint::{Checkpoint, CheckpointError, CHECKPOINT_VERSION};
use crate::config::FsmConfig;
use crate::core::{
    parse_name_list, Cached, Revision, State, StateHistory, StateId, Token, TransitionRecord,
};
use crate::expr::{DefaultEvaluator, Evaluator};
use crate::scope::{InputBindings, PortScope, Scope};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, trace};
use uuid::Uuid;

/// Where the machine is in its execution lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Uninitialized,
    Preinitialized,
    Initialized,
    Prefired,
    Fired,
    Postfired,
    WrappedUp,
}

/// Outcome of [`FsmActor::iterate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterateResult {
    Completed,
    NotReady,
    StopIterating,
}

type ConnectionMaps = HashMap<StateId, HashMap<String, Vec<bool>>>;

/// Element kinds whose names must be distinct from each other. Ports and
/// variables share one because both bind expression identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Namespace {
    State,
    Transition,
    Identifier,
    Refinement,
}

/// A finite state machine driven by a director through
/// `prefire`/`fire`/`postfire`.
///
/// `fire` reads inputs, picks at most one enabled transition out of the
/// current state and runs its choice actions. It may be called several
/// times per iteration; it never changes the current state, variables or
/// history. `postfire` commits: it runs the commit actions and only then
/// moves to the destination state.
///
/// # Example
///
/// ```rust
/// use fsm_kernel::actor::IoPort;
/// use fsm_kernel::core::{State, Token};
/// use fsm_kernel::fsm::{FsmActor, OutputActions, Transition};
///
/// let mut fsm = FsmActor::new("toggle");
/// fsm.add_port(IoPort::input("tick")).unwrap();
/// fsm.add_port(IoPort::output("out")).unwrap();
/// fsm.add_state(State::new("Off").initial()).unwrap();
/// fsm.add_state(State::new("On")).unwrap();
/// fsm.add_transition(
///     Transition::new("switch_on")
///         .with_guard("tick_isPresent")
///         .with_action(Box::new(OutputActions::new("out = true").unwrap())),
///     "Off",
///     "On",
/// )
/// .unwrap();
///
/// fsm.preinitialize().unwrap();
/// fsm.initialize().unwrap();
/// fsm.port_mut("tick").unwrap().deliver(0, Token::Int(1)).unwrap();
///
/// fsm.prefire().unwrap();
/// fsm.fire().unwrap();
/// assert!(fsm.postfire().unwrap());
/// assert_eq!(fsm.current_state().map(|s| s.name()), Some("On"));
/// ```
pub struct FsmActor {
    name: String,
    config: FsmConfig,
    revision: Revision,
    states: Vec<State>,
    transitions: Vec<Transition>,
    ports: Vec<IoPort>,
    variables: BTreeMap<String, Token>,
    refinements: BTreeMap<String, Box<dyn Refinement>>,
    director: Box<dyn Director>,
    evaluator: Box<dyn Evaluator>,
    parent_scope: Option<Box<dyn Scope + Send + Sync>>,
    rng: Box<dyn RngCore + Send>,
    inputs: InputBindings,
    phase: Phase,
    current_state: Option<StateId>,
    last_chosen_transition: Option<TransitionId>,
    stop_requested: bool,
    reached_final_state: bool,
    new_iteration: bool,
    token_lists: HashMap<String, Vec<Vec<Token>>>,
    receivers_revision: Option<Revision>,
    connection_maps: Cached<ConnectionMaps>,
    causality: HashMap<Option<StateId>, Cached<CausalityInterface>>,
    history: StateHistory,
}

impl fmt::Debug for FsmActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsmActor")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("revision", &self.revision)
            .field("states", &self.states)
            .field("transitions", &self.transitions)
            .field("current_state", &self.current_state)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

fn rng_for(seed: Option<u64>) -> Box<dyn RngCore + Send> {
    match seed {
        Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
        None => Box::new(StdRng::from_os_rng()),
    }
}

fn as_scope(parent: &Option<Box<dyn Scope + Send + Sync>>) -> Option<&dyn Scope> {
    parent.as_deref().map(|scope| scope as &dyn Scope)
}

impl FsmActor {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, FsmConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: FsmConfig) -> Self {
        let rng = rng_for(config.rng_seed);
        Self {
            name: name.into(),
            config,
            revision: Revision::new(),
            states: Vec::new(),
            transitions: Vec::new(),
            ports: Vec::new(),
            variables: BTreeMap::new(),
            refinements: BTreeMap::new(),
            director: Box::new(LocalDirector::new()),
            evaluator: Box::new(DefaultEvaluator),
            parent_scope: None,
            rng,
            inputs: InputBindings::new(),
            phase: Phase::Uninitialized,
            current_state: None,
            last_chosen_transition: None,
            stop_requested: false,
            reached_final_state: false,
            new_iteration: true,
            token_lists: HashMap::new(),
            receivers_revision: None,
            connection_maps: Cached::new(),
            causality: HashMap::new(),
            history: StateHistory::new(),
        }
    }

    fn structure_changed(&mut self) {
        self.revision.bump();
    }

    fn ensure_unique(&self, name: &str, namespace: Namespace) -> Result<(), FsmError> {
        let taken = match namespace {
            Namespace::State => self.states.iter().any(|s| s.name() == name),
            Namespace::Transition => self.transitions.iter().any(|t| t.name() == name),
            Namespace::Identifier => {
                self.ports.iter().any(|p| p.name() == name) || self.variables.contains_key(name)
            }
            Namespace::Refinement => self.refinements.contains_key(name),
        };
        if taken {
            Err(FsmError::NameDuplication(name.to_string()))
        } else {
            Ok(())
        }
    }

    fn is_named(&self, name: &str) -> bool {
        [
            Namespace::State,
            Namespace::Transition,
            Namespace::Identifier,
            Namespace::Refinement,
        ]
        .into_iter()
        .any(|namespace| self.ensure_unique(name, namespace).is_err())
    }

    // Structure

    pub fn add_state(&mut self, state: State) -> Result<StateId, FsmError> {
        self.ensure_unique(state.name(), Namespace::State)?;
        self.states.push(state);
        self.structure_changed();
        Ok(StateId(self.states.len() - 1))
    }

    /// Add a transition and link it from `from` to `to`.
    pub fn add_transition(
        &mut self,
        transition: Transition,
        from: &str,
        to: &str,
    ) -> Result<TransitionId, FsmError> {
        let id = self.add_unlinked_transition(transition)?;
        self.link(id, from, LinkEnd::Outgoing)?;
        self.link(id, to, LinkEnd::Incoming)?;
        Ok(id)
    }

    pub fn add_unlinked_transition(&mut self, transition: Transition) -> Result<TransitionId, FsmError> {
        self.ensure_unique(transition.name(), Namespace::Transition)?;
        self.transitions.push(transition);
        self.structure_changed();
        Ok(TransitionId(self.transitions.len() - 1))
    }

    /// Link one end of a transition to the element called `name`.
    pub fn link(&mut self, id: TransitionId, name: &str, end: LinkEnd) -> Result<(), FsmError> {
        let transition_name = self.transition_checked(id)?.name().to_string();
        let state = match self.state_by_name(name) {
            Some(state) => state,
            None if self.is_named(name) => {
                return Err(FsmError::NotAState {
                    transition: transition_name,
                    name: name.to_string(),
                })
            }
            None => return Err(FsmError::NoSuchState(name.to_string())),
        };
        self.transitions[id.0].link(state, end)?;
        self.structure_changed();
        Ok(())
    }

    pub fn unlink(&mut self, id: TransitionId) -> Result<(), FsmError> {
        self.transition_checked(id)?;
        self.transitions[id.0].unlink();
        self.structure_changed();
        Ok(())
    }

    pub fn add_port(&mut self, port: IoPort) -> Result<(), FsmError> {
        self.ensure_unique(port.name(), Namespace::Identifier)?;
        self.ports.push(port);
        self.structure_changed();
        Ok(())
    }

    pub fn set_port_width(&mut self, name: &str, width: usize) -> Result<(), FsmError> {
        self.ports
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| FsmError::NoSuchPort(name.to_string()))?
            .set_width(width);
        self.structure_changed();
        Ok(())
    }

    pub fn add_variable(&mut self, name: impl Into<String>, value: Token) -> Result<(), FsmError> {
        let name = name.into();
        self.ensure_unique(&name, Namespace::Identifier)?;
        self.variables.insert(name, value);
        self.structure_changed();
        Ok(())
    }

    /// Assign an existing variable.
    pub fn set_variable(&mut self, name: &str, value: Token) -> Result<(), FsmError> {
        let slot = self
            .variables
            .get_mut(name)
            .ok_or_else(|| FsmError::NoSuchVariable(name.to_string()))?;
        *slot = value;
        Ok(())
    }

    pub fn add_refinement(&mut self, refinement: Box<dyn Refinement>) -> Result<(), FsmError> {
        let name = refinement.name().to_string();
        self.ensure_unique(&name, Namespace::Refinement)?;
        self.refinements.insert(name, refinement);
        self.structure_changed();
        Ok(())
    }

    /// Replace the refinement list of a state.
    pub fn set_state_refinement(&mut self, id: StateId, names: impl Into<String>) -> Result<(), FsmError> {
        self.states
            .get_mut(id.0)
            .ok_or_else(|| FsmError::NoSuchState(format!("#{}", id.0)))?
            .set_refinement_names(names.into());
        self.structure_changed();
        Ok(())
    }

    pub fn set_guard_expression(&mut self, id: TransitionId, expression: &str) -> Result<(), FsmError> {
        self.transition_mut(id)?.set_guard_expression(expression);
        Ok(())
    }

    /// Mutable access to a transition. Counts as a structural change.
    pub fn transition_mut(&mut self, id: TransitionId) -> Result<&mut Transition, FsmError> {
        self.transition_checked(id)?;
        self.structure_changed();
        Ok(&mut self.transitions[id.0])
    }

    pub fn set_director(&mut self, director: Box<dyn Director>) {
        self.director = director;
        self.receivers_revision = None;
    }

    pub fn set_evaluator(&mut self, evaluator: Box<dyn Evaluator>) {
        self.evaluator = evaluator;
        self.structure_changed();
    }

    pub fn set_parent_scope(&mut self, scope: Box<dyn Scope + Send + Sync>) {
        self.parent_scope = Some(scope);
    }

    /// Replace the random source used to pick among nondeterministic
    /// transitions.
    pub fn set_rng(&mut self, rng: Box<dyn RngCore + Send>) {
        self.rng = rng;
    }

    pub fn set_support_multirate(&mut self, support_multirate: bool) {
        self.config.support_multirate = support_multirate;
    }

    /// Tell the machine whether the next firing starts a new iteration.
    /// Multirate token lists are reset at the start of each iteration.
    pub fn set_new_iteration(&mut self, new_iteration: bool) {
        self.new_iteration = new_iteration;
    }

    // Accessors

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &FsmConfig {
        &self.config
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id.0)
    }

    pub fn state_by_name(&self, name: &str) -> Option<StateId> {
        self.states.iter().position(|s| s.name() == name).map(StateId)
    }

    pub fn set_state_visited(&mut self, id: StateId, visited: bool) -> Result<(), FsmError> {
        self.states
            .get_mut(id.0)
            .ok_or_else(|| FsmError::NoSuchState(format!("#{}", id.0)))?
            .set_visited(visited);
        Ok(())
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(id.0)
    }

    fn transition_checked(&self, id: TransitionId) -> Result<&Transition, FsmError> {
        self.transitions
            .get(id.0)
            .ok_or_else(|| FsmError::NoSuchTransition(format!("#{}", id.0)))
    }

    pub fn transition_by_name(&self, name: &str) -> Option<TransitionId> {
        self.transitions
            .iter()
            .position(|t| t.name() == name)
            .map(TransitionId)
    }

    /// Transitions leaving `state`, in declaration order.
    pub fn outgoing_transitions(&self, state: StateId) -> Vec<TransitionId> {
        self.transitions
            .iter()
            .enumerate()
            .filter(|(_, t)| t.source_state() == Some(state))
            .map(|(i, _)| TransitionId(i))
            .collect()
    }

    pub fn ports(&self) -> &[IoPort] {
        &self.ports
    }

    pub fn port(&self, name: &str) -> Option<&IoPort> {
        self.ports.iter().find(|p| p.name() == name)
    }

    /// Mutable access to a port for delivering or collecting tokens.
    pub fn port_mut(&mut self, name: &str) -> Option<&mut IoPort> {
        self.ports.iter_mut().find(|p| p.name() == name)
    }

    pub fn variables(&self) -> &BTreeMap<String, Token> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Token> {
        self.variables.get(name)
    }

    pub fn refinement(&self, name: &str) -> Option<&dyn Refinement> {
        self.refinements.get(name).map(|r| r.as_ref())
    }

    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    pub fn director(&self) -> &dyn Director {
        self.director.as_ref()
    }

    pub fn director_mut(&mut self) -> &mut dyn Director {
        self.director.as_mut()
    }

    pub fn current_state_id(&self) -> Option<StateId> {
        self.current_state
    }

    pub fn current_state(&self) -> Option<&State> {
        self.current_state.and_then(|id| self.states.get(id.0))
    }

    pub fn last_chosen_transition(&self) -> Option<TransitionId> {
        self.last_chosen_transition
    }

    /// Override the transition `postfire` will commit.
    pub fn set_last_chosen_transition(&mut self, id: Option<TransitionId>) -> Result<(), FsmError> {
        if let Some(id) = id {
            self.transition_checked(id)?;
        }
        self.last_chosen_transition = id;
        Ok(())
    }

    pub fn history(&self) -> &StateHistory {
        &self.history
    }

    pub fn reached_final_state(&self) -> bool {
        self.reached_final_state
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn input_bindings(&self) -> &InputBindings {
        &self.inputs
    }

    /// The scope guards and actions see in the current firing.
    pub fn port_scope(&self) -> PortScope<'_> {
        PortScope::new(&self.inputs, &self.variables, as_scope(&self.parent_scope))
    }

    /// Names of variables assigned by any commit action.
    pub fn modified_variables(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .transitions
            .iter()
            .flat_map(|t| t.actions())
            .filter(|a| a.destination_kind() == DestinationKind::Variable)
            .flat_map(|a| a.commands())
            .map(|c| c.destination.clone())
            .filter(|d| self.variables.contains_key(d))
            .collect();
        names.into_iter().collect()
    }

    /// Whether any input port received a token in the last read.
    pub fn has_input(&self) -> bool {
        self.ports
            .iter()
            .filter(|p| p.is_input())
            .any(|p| self.inputs.is_present(p.name()))
    }

    pub fn has_input_on(&self, port: &str) -> Result<bool, FsmError> {
        let found = self
            .port(port)
            .ok_or_else(|| FsmError::NoSuchPort(port.to_string()))?;
        if !found.is_input() {
            return Err(FsmError::NotAnInputPort(port.to_string()));
        }
        Ok(self.inputs.is_present(port))
    }

    // Lifecycle

    fn require_initialized(&self, operation: &'static str) -> Result<StateId, FsmError> {
        match (self.phase, self.current_state) {
            (Phase::Uninitialized | Phase::Preinitialized | Phase::WrappedUp, _) | (_, None) => {
                Err(FsmError::InvalidPhase {
                    operation,
                    phase: self.phase,
                })
            }
            (_, Some(state)) => Ok(state),
        }
    }

    /// Prepare for execution: rebuild the identifier map, create receivers
    /// and move to the initial state.
    pub fn preinitialize(&mut self) -> Result<(), FsmError> {
        self.stop_requested = false;
        self.reached_final_state = false;
        self.new_iteration = true;
        self.last_chosen_transition = None;
        self.token_lists.clear();
        let final_state_names = self.config.final_states();
        for state in &mut self.states {
            if final_state_names.contains(state.name()) {
                state.set_final_state(true);
            }
        }
        self.inputs.clear();
        self.inputs = InputBindings::for_ports(&self.ports)?;
        self.create_receivers();
        self.reset()?;
        self.phase = Phase::Preinitialized;
        debug!(machine = %self.name, revision = self.revision.value(), "preinitialized");
        Ok(())
    }

    /// Create receivers for every port, or reset the existing ones when the
    /// structure has not changed since they were created.
    pub fn create_receivers(&mut self) {
        if self.receivers_revision == Some(self.revision)
            && self.ports.iter().all(IoPort::has_receivers)
        {
            self.ports.iter_mut().for_each(IoPort::reset_receivers);
            return;
        }
        for port in &mut self.ports {
            port.create_receivers(self.director.as_ref());
        }
        self.receivers_revision = Some(self.revision);
    }

    /// The initial state, marking it if it is named by legacy configuration.
    pub fn initial_state(&mut self) -> Result<StateId, FsmError> {
        if let Some(name) = self.config.initial_state() {
            let id = self
                .state_by_name(name)
                .ok_or_else(|| FsmError::InitialStateNotFound {
                    name: name.to_string(),
                })?;
            self.states[id.0].set_initial_state(true);
            return Ok(id);
        }
        let initial: Vec<StateId> = self
            .states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_initial_state())
            .map(|(i, _)| StateId(i))
            .collect();
        match initial.as_slice() {
            [id] => Ok(*id),
            [] => Err(FsmError::NoInitialState {
                machine: self.name.clone(),
            }),
            many => Err(FsmError::MultipleInitialStates {
                machine: self.name.clone(),
                states: many
                    .iter()
                    .map(|id| self.states[id.0].name().to_string())
                    .collect(),
            }),
        }
    }

    /// Move to the initial state.
    pub fn reset(&mut self) -> Result<(), FsmError> {
        let initial = self.initial_state()?;
        self.current_state = Some(initial);
        debug!(machine = %self.name, state = self.states[initial.0].name(), "reset to initial state");
        Ok(())
    }

    pub fn initialize(&mut self) -> Result<(), FsmError> {
        if self.phase == Phase::Uninitialized {
            return Err(FsmError::InvalidPhase {
                operation: "initialize",
                phase: self.phase,
            });
        }
        self.reset()?;
        self.states.iter_mut().for_each(|s| s.set_visited(false));
        self.reached_final_state = false;
        self.last_chosen_transition = None;
        self.inputs.clear_tokens();
        self.phase = Phase::Initialized;
        Ok(())
    }

    pub fn prefire(&mut self) -> Result<bool, FsmError> {
        self.require_initialized("prefire")?;
        self.last_chosen_transition = None;
        self.phase = Phase::Prefired;
        Ok(true)
    }

    /// Read inputs, choose a transition and run its choice actions.
    pub fn fire(&mut self) -> Result<(), FsmError> {
        let current = self.require_initialized("fire")?;
        self.read_inputs()?;
        let outgoing = self.outgoing_transitions(current);
        self.choose_transition(&outgoing)?;
        self.phase = Phase::Fired;
        Ok(())
    }

    /// Commit the chosen transition. Returns `false` once a final state is
    /// reached or stop was requested.
    pub fn postfire(&mut self) -> Result<bool, FsmError> {
        self.require_initialized("postfire")?;
        self.commit_transition()?;
        self.phase = Phase::Postfired;
        Ok(!self.reached_final_state && !self.stop_requested)
    }

    /// Run up to `count` prefire/fire/postfire rounds.
    pub fn iterate(&mut self, count: usize) -> Result<IterateResult, FsmError> {
        for _ in 0..count {
            if self.stop_requested {
                return Ok(IterateResult::StopIterating);
            }
            if !self.prefire()? {
                return Ok(IterateResult::NotReady);
            }
            self.fire()?;
            if !self.postfire()? {
                return Ok(IterateResult::StopIterating);
            }
        }
        if self.stop_requested {
            Ok(IterateResult::StopIterating)
        } else {
            Ok(IterateResult::Completed)
        }
    }

    /// Request that execution halt after the current step.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn stop_fire(&mut self) {}

    pub fn terminate(&mut self) {
        self.stop();
    }

    pub fn wrapup(&mut self) {
        self.last_chosen_transition = None;
        self.phase = Phase::WrappedUp;
        debug!(machine = %self.name, "wrapped up");
    }

    // Input reading

    /// Bind the tokens available on every input channel.
    pub fn read_inputs(&mut self) -> Result<(), FsmError> {
        for index in 0..self.ports.len() {
            if self.stop_requested {
                break;
            }
            if !self.ports[index].is_input() {
                continue;
            }
            let name = self.ports[index].name().to_string();
            self.inputs.set_absent(&name);
            self.inputs.set_absent(&format!("{name}_isPresent"));
            self.inputs.set_absent(&format!("{name}Array"));
            for channel in 0..self.ports[index].width() {
                self.read_channel(index, channel)?;
            }
        }
        Ok(())
    }

    /// Read only the input channels driven by an output of the current
    /// state's refinements.
    pub fn read_outputs_from_refinement(&mut self) -> Result<(), FsmError> {
        let current = self.require_initialized("read refinement outputs")?;
        let revision = self.revision;
        let states = &self.states;
        let ports = &self.ports;
        let refinements = &self.refinements;
        let maps = self
            .connection_maps
            .get_or_try_update(revision, || connection_maps(states, ports, refinements))?;
        let channels: Vec<(usize, usize)> = match maps.get(&current) {
            Some(map) => self
                .ports
                .iter()
                .enumerate()
                .filter_map(|(index, port)| map.get(port.name()).map(|flags| (index, flags)))
                .flat_map(|(index, flags)| {
                    flags
                        .iter()
                        .enumerate()
                        .filter(|(_, fed)| **fed)
                        .map(move |(channel, _)| (index, channel))
                })
                .collect(),
            None => Vec::new(),
        };
        for (index, channel) in channels {
            self.read_channel(index, channel)?;
        }
        Ok(())
    }

    fn read_channel(&mut self, index: usize, channel: usize) -> Result<(), FsmError> {
        let port = &mut self.ports[index];
        let name = port.name().to_string();
        let width = port.width();
        let channel_name = format!("{name}_{channel}");
        let present = format!("{name}_isPresent");
        let channel_present = format!("{channel_name}_isPresent");
        let array = format!("{name}Array");
        let channel_array = format!("{channel_name}Array");

        if !port.is_known(channel) {
            trace!(port = %name, channel, "input unknown");
            for identifier in [&channel_name, &channel_present, &channel_array] {
                self.inputs.set_unknown(identifier);
            }
            if !self.inputs.is_present(&name) {
                for identifier in [&name, &present, &array] {
                    self.inputs.set_unknown(identifier);
                }
            }
            return Ok(());
        }

        if self.config.support_multirate {
            let drained = port.drain(channel)?;
            let lists = self.token_lists.entry(name.clone()).or_default();
            lists.resize(width, Vec::new());
            if self.new_iteration {
                lists[channel].clear();
            }
            for token in drained {
                trace!(port = %name, channel, token = %token, "read token");
                lists[channel].insert(0, token);
            }
            let received = lists[channel].clone();
            match received.first().cloned() {
                Some(newest) => {
                    self.inputs.set(&present, &name, Token::Boolean(true))?;
                    self.inputs.set(&channel_present, &name, Token::Boolean(true))?;
                    self.inputs.set(&name, &name, newest.clone())?;
                    self.inputs.set(&channel_name, &name, newest)?;
                    self.inputs.set(&array, &name, Token::Array(received.clone()))?;
                    self.inputs.set(&channel_array, &name, Token::Array(received))?;
                }
                None => {
                    self.inputs.set_absent(&channel_present);
                    self.inputs.set_absent(&channel_name);
                    self.inputs.set_absent(&channel_array);
                }
            }
        } else if port.has_token(channel) {
            let token = port.get(channel)?;
            trace!(port = %name, channel, token = %token, "read token");
            self.inputs.set(&present, &name, Token::Boolean(true))?;
            self.inputs.set(&channel_present, &name, Token::Boolean(true))?;
            self.inputs.set(&name, &name, token.clone())?;
            self.inputs.set(&channel_name, &name, token)?;
        } else {
            self.inputs.set_absent(&channel_present);
            self.inputs.set_absent(&channel_name);
        }
        Ok(())
    }

    // Transition selection

    /// The candidates among `transitions` that may be taken: the enabled
    /// non-default ones, or the defaults if none is enabled and no guard
    /// was unknown.
    pub fn enabled_transitions(
        &mut self,
        transitions: &[TransitionId],
    ) -> Result<Vec<TransitionId>, FsmError> {
        for &id in transitions {
            self.transition_checked(id)?;
        }
        let revision = self.revision;
        let scope = PortScope::new(&self.inputs, &self.variables, as_scope(&self.parent_scope));
        let evaluator = self.evaluator.as_ref();
        let mut enabled = Vec::new();
        let mut defaults = Vec::new();
        let mut unknown = false;

        for &id in transitions {
            if self.stop_requested {
                break;
            }
            let transition = &mut self.transitions[id.0];
            if transition.is_default() {
                defaults.push(id);
                continue;
            }
            match transition.evaluate_guard(&scope, evaluator, revision)? {
                GuardValue::Enabled => enabled.push(id),
                GuardValue::Disabled => {}
                GuardValue::Unknown => unknown = true,
            }
        }

        if !enabled.is_empty() {
            Ok(enabled)
        } else if unknown {
            Ok(Vec::new())
        } else {
            Ok(defaults)
        }
    }

    /// Choose among `transitions` and run the choice actions of the chosen
    /// one. Fails if several are enabled and any of them is deterministic.
    pub fn choose_transition(
        &mut self,
        transitions: &[TransitionId],
    ) -> Result<Option<TransitionId>, FsmError> {
        let enabled = self.enabled_transitions(transitions)?;
        let chosen = match enabled.as_slice() {
            [] => None,
            [only] => Some(*only),
            many => {
                if let Some(offender) = many
                    .iter()
                    .find(|id| !self.transitions[id.0].is_nondeterministic())
                {
                    let state = self
                        .current_state()
                        .map(|s| s.name().to_string())
                        .unwrap_or_default();
                    return Err(FsmError::MultipleEnabledTransitions {
                        state,
                        transition: self.transitions[offender.0].name().to_string(),
                    });
                }
                Some(many[self.rng.random_range(0..many.len())])
            }
        };

        if let Some(id) = chosen {
            debug!(
                machine = %self.name,
                transition = self.transitions[id.0].name(),
                "chose transition"
            );
            self.execute_actions(id, false)?;
        }
        self.last_chosen_transition = chosen;
        Ok(chosen)
    }

    fn execute_actions(&mut self, id: TransitionId, commit: bool) -> Result<(), FsmError> {
        let revision = self.revision;
        let transition = &mut self.transitions[id.0];
        let owner = transition.name().to_string();
        let actions = transition.prepared_actions(commit, self.evaluator.as_ref(), revision)?;
        let mut ctx = ActionContext::new(
            &owner,
            &self.inputs,
            &mut self.variables,
            &mut self.ports,
            &mut self.refinements,
            self.evaluator.as_ref(),
            as_scope(&self.parent_scope),
        );
        for (action, trees) in actions {
            if commit && self.stop_requested {
                break;
            }
            ctx.set_command_trees(trees);
            action.execute(&mut ctx)?;
        }
        Ok(())
    }

    // Commit

    fn state_refinements(&self, state: StateId) -> Result<Vec<String>, FsmError> {
        let state = &self.states[state.0];
        let names = parse_name_list(state.refinement_names()).map_err(|names| {
            FsmError::MalformedRefinementList {
                owner: state.name().to_string(),
                names,
            }
        })?;
        match names.iter().find(|n| !self.refinements.contains_key(n.as_str())) {
            Some(missing) => Err(FsmError::RefinementNotFound {
                owner: state.name().to_string(),
                name: missing.clone(),
            }),
            None => Ok(names),
        }
    }

    fn commit_transition(&mut self) -> Result<(), FsmError> {
        let Some(id) = self.last_chosen_transition else {
            return Ok(());
        };
        let (name, destination, reset) = {
            let transition = self.transition_checked(id)?;
            (
                transition.name().to_string(),
                transition.destination_state(),
                transition.is_reset(),
            )
        };
        let destination = destination.ok_or_else(|| FsmError::MissingDestination {
            transition: name.clone(),
        })?;

        let time = self.director.model_time();
        let refinements = self.state_refinements(destination)?;
        for refinement_name in &refinements {
            if let Some(refinement) = self.refinements.get_mut(refinement_name) {
                let local_time = match refinement.accumulated_suspend_time() {
                    Some(suspended) => time - suspended,
                    None => time,
                };
                refinement.set_model_time(local_time);
            }
        }

        self.execute_actions(id, true)?;

        let previous = self.current_state;
        self.current_state = Some(destination);
        self.last_chosen_transition = None;
        if self.config.state_dependent_causality && previous != Some(destination) {
            self.director.invalidate_schedule();
        }
        let entered = self.states[destination.0].name().to_string();
        if self.states[destination.0].is_final_state() {
            self.reached_final_state = true;
        }
        let left = previous
            .map(|state| self.states[state.0].name().to_string())
            .unwrap_or_default();
        debug!(
            machine = %self.name,
            transition = %name,
            from = %left,
            to = %entered,
            time,
            "committed transition"
        );
        self.history = self.history.record(TransitionRecord {
            from: left,
            to: entered,
            transition: name,
            model_time: time,
            timestamp: Utc::now(),
        });

        if reset {
            for refinement_name in &refinements {
                if let Some(refinement) = self.refinements.get_mut(refinement_name) {
                    debug!(refinement = %refinement_name, "initializing refinement on reset");
                    refinement.initialize()?;
                }
            }
            self.states[destination.0].set_visited(false);
        }
        Ok(())
    }

    // Causality

    /// Input-to-output dependencies. With state-dependent causality only
    /// the current state's outgoing transitions are considered.
    pub fn causality_interface(&mut self) -> Result<CausalityInterface, FsmError> {
        let revision = self.revision;
        let key = if self.config.state_dependent_causality {
            self.current_state
        } else {
            None
        };
        let transitions = &self.transitions;
        let ports = &self.ports;
        let evaluator = self.evaluator.as_ref();
        self.causality
            .entry(key)
            .or_default()
            .get_or_try_update(revision, || {
                let inputs = InputBindings::for_ports(ports)?;
                let relevant = transitions
                    .iter()
                    .filter(|t| key.is_none() || t.source_state() == key);
                causality::analyze(relevant, &inputs, evaluator)
            })
            .cloned()
    }

    /// Whether every input that is not also an output affects every output.
    pub fn is_strict(&mut self) -> Result<bool, FsmError> {
        let interface = self.causality_interface()?;
        let outputs: BTreeSet<String> = self
            .ports
            .iter()
            .filter(|p| p.is_output())
            .map(|p| p.name().to_string())
            .collect();
        Ok(self
            .ports
            .iter()
            .filter(|p| p.is_input() && !p.is_output())
            .all(|p| interface.dependent_ports(p.name()).is_superset(&outputs)))
    }

    // Checkpoint

    /// Snapshot the runtime state.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            machine: self.name.clone(),
            current_state: self.current_state().map(|s| s.name().to_string()),
            visited: self
                .states
                .iter()
                .filter(|s| s.is_visited())
                .map(|s| s.name().to_string())
                .collect(),
            variables: self.variables.clone(),
            history: self.history.clone(),
            reached_final_state: self.reached_final_state,
        }
    }

    /// Restore runtime state from a checkpoint of a machine with the same
    /// structure. The machine must have been preinitialized.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: checkpoint.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        if self.phase == Phase::Uninitialized {
            return Err(CheckpointError::ValidationFailed(
                "machine must be preinitialized before restoring".to_string(),
            ));
        }
        if checkpoint.machine != self.name {
            return Err(CheckpointError::ValidationFailed(format!(
                "checkpoint of \"{}\" cannot restore \"{}\"",
                checkpoint.machine, self.name
            )));
        }

        let find = |name: &str| {
            self.state_by_name(name)
                .ok_or_else(|| CheckpointError::ValidationFailed(format!("unknown state \"{name}\"")))
        };
        let current = match checkpoint.current_state.as_deref() {
            Some(name) => find(name)?,
            None => {
                return Err(CheckpointError::ValidationFailed(
                    "checkpoint has no current state".to_string(),
                ))
            }
        };
        let visited = checkpoint
            .visited
            .iter()
            .map(|name| find(name))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(unknown) = checkpoint
            .variables
            .keys()
            .find(|name| !self.variables.contains_key(*name))
        {
            return Err(CheckpointError::ValidationFailed(format!(
                "unknown variable \"{unknown}\""
            )));
        }

        for state in &mut self.states {
            state.set_visited(false);
        }
        for id in visited {
            self.states[id.0].set_visited(true);
        }
        self.variables.extend(checkpoint.variables.clone());
        self.history = checkpoint.history.clone();
        self.reached_final_state = checkpoint.reached_final_state;
        self.last_chosen_transition = None;
        self.current_state = Some(current);
        self.phase = Phase::Initialized;
        debug!(machine = %self.name, checkpoint = %checkpoint.id, "restored checkpoint");
        Ok(())
    }
}

fn connection_maps(
    states: &[State],
    ports: &[IoPort],
    refinements: &BTreeMap<String, Box<dyn Refinement>>,
) -> Result<ConnectionMaps, FsmError> {
    let mut maps = HashMap::new();
    for (index, state) in states.iter().enumerate() {
        let names = parse_name_list(state.refinement_names()).map_err(|names| {
            FsmError::MalformedRefinementList {
                owner: state.name().to_string(),
                names,
            }
        })?;
        let mut map = HashMap::new();
        for port in ports.iter().filter(|p| p.is_input()) {
            let flags = (0..port.width())
                .map(|channel| {
                    port.source(channel).is_some_and(|source| {
                        names.contains(&source.refinement)
                            && refinements
                                .get(&source.refinement)
                                .is_some_and(|r| r.output_port_names().contains(&source.port))
                    })
                })
                .collect();
            map.insert(port.name().to_string(), flags);
        }
        maps.insert(StateId(index), map);
    }
    Ok(maps)
}

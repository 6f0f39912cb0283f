//! Validation rules over a whole machine.

use crate::core::parse_name_list;
use crate::fsm::{DestinationKind, FsmActor, FsmError, Transition};
use crate::scope::InputBindings;
use crate::validation::violations::ModelViolation;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<ModelViolation>>;

fn check(violation: Option<ModelViolation>) -> Check {
    match violation {
        Some(violation) => Validation::fail(violation),
        None => Validation::success(()),
    }
}

/// Check a machine's structure, accumulating every violation.
pub fn validate(fsm: &FsmActor) -> Check {
    let mut checks: Vec<Check> = vec![initial_state(fsm), identifier_collisions(fsm)];

    for state in fsm.states() {
        checks.extend(refinement_list(fsm, state.name(), state.refinement_names()));
    }

    for transition in fsm.transitions() {
        checks.push(check(linked(transition, "source", transition.source_state().is_some())));
        checks.push(check(linked(
            transition,
            "destination",
            transition.destination_state().is_some(),
        )));
        checks.push(guard(fsm, transition));
        checks.extend(action_expressions(fsm, transition));
        checks.extend(destinations(fsm, transition));
        checks.extend(refinement_list(
            fsm,
            transition.name(),
            transition.refinement_name(),
        ));
    }

    Validation::all_vec(checks).map(|_| ())
}

/// Every violation of [`validate`], or none.
pub fn violations(fsm: &FsmActor) -> Vec<ModelViolation> {
    match validate(fsm) {
        Validation::Success(()) => Vec::new(),
        Validation::Failure(errors) => errors.iter().cloned().collect(),
    }
}

fn initial_state(fsm: &FsmActor) -> Check {
    if let Some(name) = fsm.config().initial_state() {
        return check(fsm.state_by_name(name).is_none().then(|| {
            ModelViolation::InitialStateNotFound {
                name: name.to_string(),
            }
        }));
    }
    let initial: Vec<String> = fsm
        .states()
        .iter()
        .filter(|s| s.is_initial_state())
        .map(|s| s.name().to_string())
        .collect();
    check(match initial.len() {
        1 => None,
        0 => Some(ModelViolation::NoInitialState {
            machine: fsm.name().to_string(),
        }),
        _ => Some(ModelViolation::MultipleInitialStates {
            machine: fsm.name().to_string(),
            states: initial,
        }),
    })
}

fn identifier_collisions(fsm: &FsmActor) -> Check {
    check(match InputBindings::for_ports(fsm.ports()) {
        Err(FsmError::IdentifierCollision {
            identifier,
            first,
            second,
        }) => Some(ModelViolation::IdentifierCollision {
            identifier,
            first,
            second,
        }),
        _ => None,
    })
}

fn linked(transition: &Transition, end: &'static str, present: bool) -> Option<ModelViolation> {
    (!present).then(|| ModelViolation::UnlinkedTransition {
        transition: transition.name().to_string(),
        end,
    })
}

fn guard(fsm: &FsmActor, transition: &Transition) -> Check {
    let expression = transition.guard_expression();
    if expression.trim().is_empty() {
        return Validation::success(());
    }
    check(
        fsm.evaluator()
            .parse(expression)
            .err()
            .map(|e| ModelViolation::InvalidGuard {
                transition: transition.name().to_string(),
                expression: expression.to_string(),
                message: e.to_string(),
            }),
    )
}

fn action_expressions(fsm: &FsmActor, transition: &Transition) -> Vec<Check> {
    transition
        .actions()
        .iter()
        .flat_map(|action| action.commands())
        .map(|command| {
            check(fsm.evaluator().parse(&command.expression).err().map(|e| {
                ModelViolation::InvalidAction {
                    transition: transition.name().to_string(),
                    expression: command.expression.clone(),
                    message: e.to_string(),
                }
            }))
        })
        .collect()
}

fn destinations(fsm: &FsmActor, transition: &Transition) -> Vec<Check> {
    let owner = transition.name();
    transition
        .actions()
        .iter()
        .flat_map(|action| {
            let kind = action.destination_kind();
            action.commands().iter().map(move |command| (kind, command))
        })
        .map(|(kind, command)| {
            let destination = command.destination.as_str();
            check(match kind {
                DestinationKind::Port => match fsm.port(destination) {
                    None => Some(ModelViolation::UnknownPort {
                        transition: owner.to_string(),
                        port: destination.to_string(),
                    }),
                    Some(port) if !port.is_output() => Some(ModelViolation::NotAnOutputPort {
                        transition: owner.to_string(),
                        port: destination.to_string(),
                    }),
                    Some(_) => None,
                },
                DestinationKind::Variable => variable_destination(fsm, owner, destination),
            })
        })
        .collect()
}

fn variable_destination(fsm: &FsmActor, owner: &str, destination: &str) -> Option<ModelViolation> {
    if fsm.variable(destination).is_some() {
        return None;
    }
    match destination.split_once('.') {
        Some((refinement, _)) if fsm.refinement(refinement).is_some() => None,
        Some((refinement, _)) => Some(ModelViolation::UnknownRefinement {
            owner: owner.to_string(),
            name: refinement.to_string(),
        }),
        None => Some(ModelViolation::UnknownVariable {
            transition: owner.to_string(),
            variable: destination.to_string(),
        }),
    }
}

fn refinement_list(fsm: &FsmActor, owner: &str, names: &str) -> Vec<Check> {
    match parse_name_list(names) {
        Err(names) => vec![Validation::fail(ModelViolation::MalformedRefinementList {
            owner: owner.to_string(),
            names,
        })],
        Ok(list) => list
            .into_iter()
            .map(|name| {
                check(fsm.refinement(&name).is_none().then(|| {
                    ModelViolation::UnknownRefinement {
                        owner: owner.to_string(),
                        name,
                    }
                }))
            })
            .collect(),
    }
}

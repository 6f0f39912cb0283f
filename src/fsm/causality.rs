//! Input-to-output dependencies of a machine.
//!
//! An output depends on an input when some transition that may produce
//! the output reads the input, either in its guard or in the output
//! expression itself. A scheduler uses this to order the machine relative
//! to its neighbours.

use super::action::DestinationKind;
use super::error::FsmError;
use super::transition::Transition;
use crate::expr::Evaluator;
use crate::scope::InputBindings;
use std::collections::{BTreeMap, BTreeSet};

/// Which outputs each input port affects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CausalityInterface {
    dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl CausalityInterface {
    /// Outputs that depend on `input`.
    pub fn dependent_ports(&self, input: &str) -> BTreeSet<String> {
        self.dependencies.get(input).cloned().unwrap_or_default()
    }

    pub fn depends(&self, input: &str, output: &str) -> bool {
        self.dependencies
            .get(input)
            .is_some_and(|outputs| outputs.contains(output))
    }

    fn add(&mut self, input: &str, output: &str) {
        self.dependencies
            .entry(input.to_string())
            .or_default()
            .insert(output.to_string());
    }
}

/// Dependencies induced by `transitions`.
pub(crate) fn analyze<'t>(
    transitions: impl IntoIterator<Item = &'t Transition>,
    inputs: &InputBindings,
    evaluator: &dyn Evaluator,
) -> Result<CausalityInterface, FsmError> {
    let mut interface = CausalityInterface::default();

    for transition in transitions {
        let mut read = BTreeSet::new();
        let guard = transition.guard_expression();
        if !guard.trim().is_empty() {
            let tree = evaluator
                .parse(guard)
                .map_err(|source| FsmError::GuardParse {
                    transition: transition.name().to_string(),
                    expression: guard.to_string(),
                    source,
                })?;
            read.extend(tree.identifiers());
        }

        let mut written = BTreeSet::new();
        for action in transition.actions() {
            if !action.is_choice() || action.destination_kind() != DestinationKind::Port {
                continue;
            }
            for command in action.commands() {
                written.insert(command.destination.as_str());
                let tree = evaluator.parse(&command.expression).map_err(|source| {
                    FsmError::ActionParse {
                        expression: command.expression.clone(),
                        source,
                    }
                })?;
                read.extend(tree.identifiers());
            }
        }

        let ports: BTreeSet<&str> = read
            .iter()
            .filter_map(|identifier| inputs.port_for(identifier))
            .collect();
        for input in ports {
            for output in &written {
                interface.add(input, output);
            }
        }
    }

    Ok(interface)
}

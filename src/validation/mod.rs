//! Accumulating structural validation of a machine.
//!
//! Running a badly wired machine fails at the first problem it hits:
//! a missing initial state at `preinitialize`, an unparsable guard at the
//! first `fire` out of its state, a misspelled port only when the action
//! runs. [`validate`] walks the whole model up front and reports every
//! problem at once as a `stillwater` [`Validation`].
//!
//! # Example
//!
//! ```rust
//! use fsm_kernel::core::State;
//! use fsm_kernel::fsm::{FsmActor, Transition};
//! use fsm_kernel::validation::{violations, ModelViolation};
//!
//! let mut fsm = FsmActor::new("broken");
//! fsm.add_state(State::new("A")).unwrap();
//! fsm.add_unlinked_transition(Transition::new("t").with_guard("x >")).unwrap();
//!
//! let found = violations(&fsm);
//! assert!(found.contains(&ModelViolation::NoInitialState { machine: "broken".into() }));
//! assert_eq!(found.len(), 4);
//! ```
//!
//! [`Validation`]: stillwater::validation::Validation

pub mod rules;
pub mod violations;

pub use rules::{validate, violations};
pub use violations::ModelViolation;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{IoPort, Refinement};
    use crate::config::FsmConfig;
    use crate::core::{State, Token};
    use crate::fsm::{FsmActor, FsmError, OutputActions, SetActions, Transition};
    use stillwater::validation::Validation;

    #[derive(Debug)]
    struct Inner(&'static str);

    impl Refinement for Inner {
        fn name(&self) -> &str {
            self.0
        }

        fn initialize(&mut self) -> Result<(), FsmError> {
            Ok(())
        }

        fn output_port_names(&self) -> Vec<String> {
            Vec::new()
        }

        fn set_model_time(&mut self, _time: f64) {}
    }

    fn well_formed() -> FsmActor {
        let mut fsm = FsmActor::new("ok");
        fsm.add_port(IoPort::input("in")).unwrap();
        fsm.add_port(IoPort::output("out")).unwrap();
        fsm.add_variable("count", Token::Int(0)).unwrap();
        fsm.add_refinement(Box::new(Inner("inner"))).unwrap();
        fsm.add_state(State::new("A").initial()).unwrap();
        fsm.add_state(State::new("B").with_refinement("inner")).unwrap();
        fsm.add_transition(
            Transition::new("go")
                .with_guard("in_isPresent && in > 0")
                .with_action(Box::new(OutputActions::new("out = in").unwrap()))
                .with_action(Box::new(
                    SetActions::new("count = count + 1; inner.gain = 2").unwrap(),
                )),
            "A",
            "B",
        )
        .unwrap();
        fsm
    }

    #[test]
    fn well_formed_machine_passes() {
        let fsm = well_formed();
        assert!(matches!(validate(&fsm), Validation::Success(())));
        assert!(violations(&fsm).is_empty());
    }

    #[test]
    fn accumulates_all_violations() {
        let mut fsm = FsmActor::new("bad");
        fsm.add_port(IoPort::input("in")).unwrap();
        fsm.add_state(State::new("A").initial()).unwrap();
        fsm.add_state(State::new("B").initial().with_refinement("ghost")).unwrap();
        fsm.add_transition(
            Transition::new("t")
                .with_guard("in ==")
                .with_action(Box::new(OutputActions::new("missing = 1; in = 2").unwrap()))
                .with_action(Box::new(SetActions::new("nope = 1; other.p = 1").unwrap())),
            "A",
            "B",
        )
        .unwrap();

        let found = violations(&fsm);
        assert_eq!(found.len(), 7, "{found:?}");
        assert!(found.iter().any(|v| matches!(v, ModelViolation::MultipleInitialStates { .. })));
        assert!(found.iter().any(|v| matches!(v, ModelViolation::InvalidGuard { .. })));
        assert!(found.contains(&ModelViolation::UnknownPort {
            transition: "t".into(),
            port: "missing".into(),
        }));
        assert!(found.contains(&ModelViolation::NotAnOutputPort {
            transition: "t".into(),
            port: "in".into(),
        }));
        assert!(found.contains(&ModelViolation::UnknownVariable {
            transition: "t".into(),
            variable: "nope".into(),
        }));
        assert!(found.contains(&ModelViolation::UnknownRefinement {
            owner: "t".into(),
            name: "other".into(),
        }));
        assert!(found.contains(&ModelViolation::UnknownRefinement {
            owner: "B".into(),
            name: "ghost".into(),
        }));
    }

    #[test]
    fn unparsable_action_expressions_are_reported() {
        let mut fsm = well_formed();
        fsm.add_transition(
            Transition::new("back")
                .with_action(Box::new(OutputActions::new("out = in +").unwrap())),
            "B",
            "A",
        )
        .unwrap();

        let found = violations(&fsm);
        assert_eq!(found.len(), 1, "{found:?}");
        assert!(matches!(
            &found[0],
            ModelViolation::InvalidAction { transition, expression, .. }
                if transition == "back" && expression == "in +"
        ));
    }

    #[test]
    fn unlinked_ends_are_reported_separately() {
        let mut fsm = FsmActor::new("m");
        fsm.add_state(State::new("A").initial()).unwrap();
        fsm.add_unlinked_transition(Transition::new("dangling")).unwrap();

        let found = violations(&fsm);
        assert_eq!(
            found,
            vec![
                ModelViolation::UnlinkedTransition {
                    transition: "dangling".into(),
                    end: "source",
                },
                ModelViolation::UnlinkedTransition {
                    transition: "dangling".into(),
                    end: "destination",
                },
            ]
        );
    }

    #[test]
    fn legacy_initial_state_name_must_exist() {
        let config = FsmConfig::default().with_initial_state_name("Start");
        let mut fsm = FsmActor::with_config("m", config);
        fsm.add_state(State::new("A")).unwrap();

        assert_eq!(
            violations(&fsm),
            vec![ModelViolation::InitialStateNotFound {
                name: "Start".into()
            }]
        );
    }

    #[test]
    fn identifier_collisions_are_reported() {
        let mut fsm = FsmActor::new("m");
        fsm.add_port(IoPort::input("a").with_width(2)).unwrap();
        fsm.add_port(IoPort::input("a_1")).unwrap();
        fsm.add_state(State::new("A").initial()).unwrap();

        let found = violations(&fsm);
        assert_eq!(found.len(), 1);
        assert!(matches!(
            &found[0],
            ModelViolation::IdentifierCollision { identifier, .. } if identifier == "a_1"
        ));
    }

    #[test]
    fn malformed_refinement_lists_are_reported() {
        let mut fsm = FsmActor::new("m");
        fsm.add_state(State::new("A").initial().with_refinement("x, ,y")).unwrap();

        assert_eq!(
            violations(&fsm),
            vec![ModelViolation::MalformedRefinementList {
                owner: "A".into(),
                names: "x, ,y".into(),
            }]
        );
    }
}

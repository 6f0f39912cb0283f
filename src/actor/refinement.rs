//! Sub-models that run while a state is active or a transition is taken.

use crate::core::Token;
use crate::fsm::FsmError;

/// A named sub-model attached to states or transitions by name.
pub trait Refinement: Send {
    fn name(&self) -> &str;

    /// Return to the refinement's initial condition. Called when a reset
    /// transition enters a state that this refinement refines.
    fn initialize(&mut self) -> Result<(), FsmError>;

    /// Names of output ports that may feed the machine's inputs.
    fn output_port_names(&self) -> Vec<String>;

    /// Synchronize the refinement's local clock.
    fn set_model_time(&mut self, time: f64);

    /// Total time this refinement has spent suspended, if it tracks it.
    fn accumulated_suspend_time(&self) -> Option<f64> {
        None
    }

    /// Assign a parameter from a commit action (`name.param = expr`).
    fn set_parameter(&mut self, parameter: &str, value: Token) -> Result<(), FsmError> {
        let _ = value;
        Err(FsmError::NoSuchVariable(format!("{}.{}", self.name(), parameter)))
    }
}

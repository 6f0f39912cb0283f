//! Machine configuration.
//!
//! Every field has a default, so a configuration can be loaded from a
//! partial JSON document:
//!
//! ```rust
//! use fsm_kernel::config::FsmConfig;
//!
//! let config = FsmConfig::from_json(r#"{ "support_multirate": true, "rng_seed": 7 }"#).unwrap();
//! assert!(config.support_multirate);
//! assert!(!config.state_dependent_causality);
//! assert_eq!(config.rng_seed, Some(7));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsmConfig {
    /// Read every available token per channel in each firing and expose
    /// them as `portArray` identifiers.
    pub support_multirate: bool,

    /// Recompute causality from the current state only, and invalidate
    /// the director's schedule whenever the state changes.
    pub state_dependent_causality: bool,

    /// Legacy: name of the initial state. Overrides state flags when set.
    pub initial_state_name: Option<String>,

    /// Legacy: comma-separated names of final states.
    pub final_state_names: String,

    /// Seed for choosing among nondeterministic transitions. Unseeded
    /// machines draw from OS entropy.
    pub rng_seed: Option<u64>,
}

impl FsmConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_multirate(mut self, support_multirate: bool) -> Self {
        self.support_multirate = support_multirate;
        self
    }

    pub fn with_state_dependent_causality(mut self, enabled: bool) -> Self {
        self.state_dependent_causality = enabled;
        self
    }

    pub fn with_initial_state_name(mut self, name: impl Into<String>) -> Self {
        self.initial_state_name = Some(name.into());
        self
    }

    pub fn with_final_state_names(mut self, names: impl Into<String>) -> Self {
        self.final_state_names = names.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// The legacy final state names, blanks skipped.
    pub fn final_states(&self) -> BTreeSet<String> {
        self.final_state_names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The legacy initial state name, if set to something non-blank.
    pub fn initial_state(&self) -> Option<&str> {
        self.initial_state_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

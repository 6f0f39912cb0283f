//! The execution context a machine runs under.

use super::receiver::{FixedPointReceiver, QueueReceiver, Receiver};
use serde::{Deserialize, Serialize};

/// Supplies receivers and model time, and is told when a schedule built
/// from the machine's causality goes stale.
pub trait Director: Send {
    fn new_receiver(&self) -> Box<dyn Receiver>;

    fn model_time(&self) -> f64;

    /// Called when the machine's input/output dependencies changed.
    fn invalidate_schedule(&mut self);
}

/// Which receiver a [`LocalDirector`] hands out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiverKind {
    #[default]
    Queue,
    FixedPoint,
}

/// A director for running a machine on its own.
#[derive(Clone, Debug, Default)]
pub struct LocalDirector {
    kind: ReceiverKind,
    time: f64,
    capacity: Option<usize>,
    invalidations: usize,
}

impl LocalDirector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixed_point() -> Self {
        Self {
            kind: ReceiverKind::FixedPoint,
            ..Self::default()
        }
    }

    /// Queue receivers with bounded capacity.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    pub fn set_model_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn schedule_invalidations(&self) -> usize {
        self.invalidations
    }
}

impl Director for LocalDirector {
    fn new_receiver(&self) -> Box<dyn Receiver> {
        match (self.kind, self.capacity) {
            (ReceiverKind::FixedPoint, _) => Box::new(FixedPointReceiver::new()),
            (ReceiverKind::Queue, Some(capacity)) => Box::new(QueueReceiver::bounded(capacity)),
            (ReceiverKind::Queue, None) => Box::new(QueueReceiver::new()),
        }
    }

    fn model_time(&self) -> f64 {
        self.time
    }

    fn invalidate_schedule(&mut self) {
        self.invalidations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Token;

    #[test]
    fn hands_out_receivers_of_its_kind() {
        let mut queue = LocalDirector::new().new_receiver();
        queue.put(Token::Int(1)).unwrap();
        queue.get().unwrap();
        assert!(!queue.has_token());

        let fixed = LocalDirector::fixed_point().new_receiver();
        assert!(!fixed.is_known());

        let mut bounded = LocalDirector::bounded(0).new_receiver();
        assert!(bounded.put(Token::Int(1)).is_err());
    }

    #[test]
    fn counts_schedule_invalidations() {
        let mut director = LocalDirector::new().with_time(2.5);
        director.invalidate_schedule();
        assert_eq!(director.schedule_invalidations(), 1);
        assert_eq!(director.model_time(), 2.5);
    }
}

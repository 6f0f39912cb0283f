//! Token receivers behind each port channel.

use crate::core::Token;
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Errors raised by ports and receivers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PortError {
    #[error("No room in receiver of capacity {capacity}")]
    NoRoom { capacity: usize },

    #[error("No token available")]
    NoToken,

    #[error("The status of the receiver is unknown")]
    Unknown,

    #[error("Receiver already holds {held}, cannot accept {offered} in the same iteration")]
    Conflict { held: Token, offered: Token },

    #[error("Channel {channel} is out of range for port \"{port}\" of width {width}")]
    NoSuchChannel {
        port: String,
        channel: usize,
        width: usize,
    },
}

/// Storage for the tokens of one port channel.
///
/// The concrete behaviour is chosen by the [`Director`](super::Director)
/// that creates the receiver.
pub trait Receiver: Send + fmt::Debug {
    fn put(&mut self, token: Token) -> Result<(), PortError>;

    /// Retrieve the next token.
    fn get(&mut self) -> Result<Token, PortError>;

    fn has_token(&self) -> bool;

    /// Whether presence or absence of a token has been determined.
    fn is_known(&self) -> bool {
        true
    }

    /// Declare that no token will arrive in this iteration.
    fn set_absent(&mut self) {}

    /// Take every available token, oldest first.
    fn drain(&mut self) -> Result<Vec<Token>, PortError> {
        let mut tokens = Vec::new();
        while self.has_token() {
            tokens.push(self.get()?);
        }
        Ok(tokens)
    }

    /// Discard all held tokens.
    fn reset(&mut self);
}

/// FIFO receiver with optional bounded capacity. `get` consumes.
#[derive(Clone, Debug, Default)]
pub struct QueueReceiver {
    queue: VecDeque<Token>,
    capacity: Option<usize>,
}

impl QueueReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: Some(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Receiver for QueueReceiver {
    fn put(&mut self, token: Token) -> Result<(), PortError> {
        if let Some(capacity) = self.capacity {
            if self.queue.len() >= capacity {
                return Err(PortError::NoRoom { capacity });
            }
        }
        self.queue.push_back(token);
        Ok(())
    }

    fn get(&mut self) -> Result<Token, PortError> {
        self.queue.pop_front().ok_or(PortError::NoToken)
    }

    fn has_token(&self) -> bool {
        !self.queue.is_empty()
    }

    fn reset(&mut self) {
        self.queue.clear();
    }
}

/// Single-value receiver for fixed-point iteration.
///
/// Starts each iteration unknown. Once a value (or absence) is asserted
/// it stays until [`reset`](Receiver::reset), and `get` does not consume,
/// so repeated firings within an iteration see the same input.
#[derive(Clone, Debug, Default)]
pub struct FixedPointReceiver {
    value: Option<Token>,
    known: bool,
}

impl FixedPointReceiver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Receiver for FixedPointReceiver {
    fn put(&mut self, token: Token) -> Result<(), PortError> {
        match &self.value {
            Some(held) if *held != token => Err(PortError::Conflict {
                held: held.clone(),
                offered: token,
            }),
            _ => {
                self.value = Some(token);
                self.known = true;
                Ok(())
            }
        }
    }

    fn get(&mut self) -> Result<Token, PortError> {
        if !self.known {
            return Err(PortError::Unknown);
        }
        self.value.clone().ok_or(PortError::NoToken)
    }

    fn has_token(&self) -> bool {
        self.known && self.value.is_some()
    }

    fn is_known(&self) -> bool {
        self.known
    }

    fn set_absent(&mut self) {
        self.value = None;
        self.known = true;
    }

    fn drain(&mut self) -> Result<Vec<Token>, PortError> {
        Ok(self.value.iter().cloned().collect())
    }

    fn reset(&mut self) {
        self.value = None;
        self.known = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_fifo_and_consuming() {
        let mut receiver = QueueReceiver::new();
        receiver.put(Token::Int(1)).unwrap();
        receiver.put(Token::Int(2)).unwrap();
        assert_eq!(receiver.get(), Ok(Token::Int(1)));
        assert_eq!(receiver.drain(), Ok(vec![Token::Int(2)]));
        assert_eq!(receiver.get(), Err(PortError::NoToken));
    }

    #[test]
    fn bounded_queue_reports_no_room() {
        let mut receiver = QueueReceiver::bounded(1);
        receiver.put(Token::Int(1)).unwrap();
        assert_eq!(
            receiver.put(Token::Int(2)),
            Err(PortError::NoRoom { capacity: 1 })
        );
    }

    #[test]
    fn fixed_point_receiver_starts_unknown() {
        let mut receiver = FixedPointReceiver::new();
        assert!(!receiver.is_known());
        assert_eq!(receiver.get(), Err(PortError::Unknown));

        receiver.set_absent();
        assert!(receiver.is_known());
        assert!(!receiver.has_token());
    }

    #[test]
    fn fixed_point_get_does_not_consume() {
        let mut receiver = FixedPointReceiver::new();
        receiver.put(Token::Int(5)).unwrap();
        assert_eq!(receiver.get(), Ok(Token::Int(5)));
        assert_eq!(receiver.get(), Ok(Token::Int(5)));
        assert_eq!(receiver.drain(), Ok(vec![Token::Int(5)]));
        assert!(receiver.has_token());

        receiver.reset();
        assert!(!receiver.is_known());
    }

    #[test]
    fn fixed_point_accepts_repeats_but_not_changes() {
        let mut receiver = FixedPointReceiver::new();
        receiver.put(Token::Int(5)).unwrap();
        assert!(receiver.put(Token::Int(5)).is_ok());
        assert!(matches!(
            receiver.put(Token::Int(6)),
            Err(PortError::Conflict { .. })
        ));
    }
}

//! Multi-channel input/output ports.

use super::director::Director;
use super::receiver::{PortError, Receiver};
use crate::core::{Token, TokenType};
use tracing::trace;

/// Where an input channel is fed from when it is driven by a refinement
/// output rather than by the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSource {
    pub refinement: String,
    pub port: String,
}

/// A port of the machine.
///
/// An input port owns one receiver per channel holding tokens that
/// arrive at the machine. An output port owns one receiver per channel
/// standing in for the remote side; tokens sent by output actions land
/// there and are collected with [`take_sent`](IoPort::take_sent).
///
/// # Example
///
/// ```rust
/// use fsm_kernel::actor::{IoPort, LocalDirector};
/// use fsm_kernel::core::Token;
///
/// let mut port = IoPort::output("out").with_width(2);
/// port.create_receivers(&LocalDirector::new());
/// port.broadcast(Token::Int(5)).unwrap();
///
/// assert_eq!(port.take_sent(0).unwrap(), vec![Token::Int(5)]);
/// assert_eq!(port.take_sent(1).unwrap(), vec![Token::Int(5)]);
/// ```
#[derive(Debug)]
pub struct IoPort {
    name: String,
    is_input: bool,
    is_output: bool,
    width: usize,
    token_type: TokenType,
    local: Vec<Box<dyn Receiver>>,
    remote: Vec<Box<dyn Receiver>>,
    sources: Vec<Option<ChannelSource>>,
}

impl IoPort {
    fn with_direction(name: impl Into<String>, is_input: bool, is_output: bool) -> Self {
        Self {
            name: name.into(),
            is_input,
            is_output,
            width: 1,
            token_type: TokenType::General,
            local: Vec::new(),
            remote: Vec::new(),
            sources: vec![None],
        }
    }

    pub fn input(name: impl Into<String>) -> Self {
        Self::with_direction(name, true, false)
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self::with_direction(name, false, true)
    }

    /// A port that is both input and output. Tokens it sends are also
    /// delivered to its own input side.
    pub fn input_output(name: impl Into<String>) -> Self {
        Self::with_direction(name, true, true)
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.set_width(width);
        self
    }

    pub fn with_type(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }

    /// Declare that input `channel` is driven by output `port` of
    /// `refinement`.
    pub fn with_source(mut self, channel: usize, refinement: &str, port: &str) -> Self {
        if channel < self.sources.len() {
            self.sources[channel] = Some(ChannelSource {
                refinement: refinement.to_string(),
                port: port.to_string(),
            });
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_input(&self) -> bool {
        self.is_input
    }

    pub fn is_output(&self) -> bool {
        self.is_output
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }

    pub fn source(&self, channel: usize) -> Option<&ChannelSource> {
        self.sources.get(channel).and_then(Option::as_ref)
    }

    /// Changing the width discards existing receivers.
    pub(crate) fn set_width(&mut self, width: usize) {
        self.width = width;
        self.sources.resize(width, None);
        self.local.clear();
        self.remote.clear();
    }

    /// Replace all receivers with fresh ones from `director`.
    pub fn create_receivers(&mut self, director: &dyn Director) {
        self.local = if self.is_input {
            (0..self.width).map(|_| director.new_receiver()).collect()
        } else {
            Vec::new()
        };
        self.remote = if self.is_output {
            (0..self.width).map(|_| director.new_receiver()).collect()
        } else {
            Vec::new()
        };
    }

    pub fn has_receivers(&self) -> bool {
        (!self.is_input || self.local.len() == self.width)
            && (!self.is_output || self.remote.len() == self.width)
    }

    pub fn reset_receivers(&mut self) {
        for receiver in self.local.iter_mut().chain(self.remote.iter_mut()) {
            receiver.reset();
        }
    }

    fn channel_error(&self, channel: usize) -> PortError {
        PortError::NoSuchChannel {
            port: self.name.clone(),
            channel,
            width: self.width,
        }
    }

    fn local_receiver(&mut self, channel: usize) -> Result<&mut Box<dyn Receiver>, PortError> {
        let error = self.channel_error(channel);
        self.local.get_mut(channel).ok_or(error)
    }

    fn remote_receiver(&mut self, channel: usize) -> Result<&mut Box<dyn Receiver>, PortError> {
        let error = self.channel_error(channel);
        self.remote.get_mut(channel).ok_or(error)
    }

    /// Place a token on input `channel`, as the environment would.
    pub fn deliver(&mut self, channel: usize, token: Token) -> Result<(), PortError> {
        trace!(port = %self.name, channel, token = %token, "delivering token");
        self.local_receiver(channel)?.put(token)
    }

    /// Declare that input `channel` receives nothing this iteration.
    pub fn mark_absent(&mut self, channel: usize) -> Result<(), PortError> {
        self.local_receiver(channel)?.set_absent();
        Ok(())
    }

    pub fn has_token(&self, channel: usize) -> bool {
        self.local.get(channel).is_some_and(|r| r.has_token())
    }

    pub fn is_known(&self, channel: usize) -> bool {
        self.local.get(channel).is_some_and(|r| r.is_known())
    }

    pub fn get(&mut self, channel: usize) -> Result<Token, PortError> {
        self.local_receiver(channel)?.get()
    }

    pub(crate) fn drain(&mut self, channel: usize) -> Result<Vec<Token>, PortError> {
        self.local_receiver(channel)?.drain()
    }

    /// Send a token on output `channel`.
    pub fn send(&mut self, channel: usize, token: Token) -> Result<(), PortError> {
        self.remote_receiver(channel)?.put(token)
    }

    /// Send a token on every output channel.
    pub fn broadcast(&mut self, token: Token) -> Result<(), PortError> {
        for receiver in &mut self.remote {
            receiver.put(token.clone())?;
        }
        Ok(())
    }

    /// Collect the tokens sent on output `channel`.
    pub fn take_sent(&mut self, channel: usize) -> Result<Vec<Token>, PortError> {
        let receiver = self.remote_receiver(channel)?;
        let tokens = receiver.drain()?;
        receiver.reset();
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::LocalDirector;

    fn ready(port: IoPort) -> IoPort {
        let mut port = port;
        port.create_receivers(&LocalDirector::new());
        port
    }

    #[test]
    fn input_ports_receive_on_each_channel() {
        let mut port = ready(IoPort::input("in").with_width(2));
        port.deliver(1, Token::Int(3)).unwrap();
        assert!(!port.has_token(0));
        assert!(port.has_token(1));
        assert_eq!(port.get(1), Ok(Token::Int(3)));
    }

    #[test]
    fn out_of_range_channels_are_reported() {
        let mut port = ready(IoPort::output("out"));
        assert_eq!(
            port.send(3, Token::Int(1)),
            Err(PortError::NoSuchChannel {
                port: "out".to_string(),
                channel: 3,
                width: 1
            })
        );
    }

    #[test]
    fn changing_width_drops_receivers() {
        let mut port = ready(IoPort::input("in"));
        assert!(port.has_receivers());
        port.set_width(3);
        assert!(!port.has_receivers());
        assert!(port.source(2).is_none());
    }

    #[test]
    fn sources_are_recorded_per_channel() {
        let port = IoPort::input("in").with_source(0, "inner", "out");
        assert_eq!(
            port.source(0),
            Some(&ChannelSource {
                refinement: "inner".to_string(),
                port: "out".to_string()
            })
        );
    }

    #[test]
    fn reset_clears_pending_tokens() {
        let mut port = ready(IoPort::input_output("io"));
        port.deliver(0, Token::Int(1)).unwrap();
        port.send(0, Token::Int(2)).unwrap();
        port.reset_receivers();
        assert!(!port.has_token(0));
        assert_eq!(port.take_sent(0), Ok(vec![]));
    }
}

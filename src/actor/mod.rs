//! The actor environment a machine is embedded in.
//!
//! - [`IoPort`]s with per-channel [`Receiver`]s
//! - The [`Director`] supplying receivers, model time and schedules
//! - [`Refinement`]s attached to states and transitions

mod director;
mod port;
mod receiver;
mod refinement;

pub use director::{Director, LocalDirector, ReceiverKind};
pub use port::{ChannelSource, IoPort};
pub use receiver::{FixedPointReceiver, PortError, QueueReceiver, Receiver};
pub use refinement::Refinement;

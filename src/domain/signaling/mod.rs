//! Signaling bounded context - call-control messages and the channel port

pub mod channel;
pub mod codec;
pub mod message;

pub use channel::{ChannelEvent, ConnectionState, EventHandler, SignalingChannel};
#[cfg(test)]
pub use channel::MockSignalingChannel;
pub use codec::{decode, encode, Inbound};
pub use message::{Ack, ChatKind, SignalType, SignalingEvent};

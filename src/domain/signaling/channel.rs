//! Signaling channel port

use super::message::{Ack, SignalType, SignalingEvent};
use crate::domain::shared::error::SendError;
use crate::domain::shared::value_objects::SessionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Connectivity of the persistent signaling connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Something the channel reports to the call core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A decoded call-control message, in receipt order
    Message(SignalingEvent),
    /// The connection went up or down
    Connection(ConnectionState),
    /// The relay accepted a message from us but could not deliver it
    Undeliverable {
        session_id: SessionId,
        kind: SignalType,
        error: SendError,
    },
}

/// Callback registered with [`SignalingChannel::on_event`]
pub type EventHandler = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

/// Persistent duplex channel carrying call-control messages.
///
/// Adapters decode frames at the boundary; malformed frames never reach the
/// handler. A disconnect is reported, it does not end any call by itself.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Deliver one message. Fails with [`SendError::NotConnected`] while down.
    async fn send(&self, event: &SignalingEvent) -> Result<Ack, SendError>;

    /// Register the inbound handler, replacing any previous one. The handler
    /// is called once per inbound message, in receipt order.
    fn on_event(&self, handler: EventHandler);

    /// Current connectivity
    fn connection_state(&self) -> ConnectionState;
}

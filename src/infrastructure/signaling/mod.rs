//! Signaling channel adapters

pub mod memory;
pub mod websocket;

pub use memory::{MemoryChannel, MemorySignalingHub};
pub use websocket::WebSocketChannel;

use crate::domain::shared::error::SendError;
use crate::domain::shared::value_objects::UserId;
use crate::domain::signaling::{codec, ChannelEvent, EventHandler, Inbound};
use metrics::counter;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Registered inbound handler shared between a channel and its reader task
#[derive(Clone, Default)]
pub(crate) struct HandlerSlot(Arc<Mutex<Option<EventHandler>>>);

impl HandlerSlot {
    pub(crate) fn set(&self, handler: EventHandler) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub(crate) fn emit(&self, event: ChannelEvent) {
        let handler = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match handler {
            Some(handler) => handler(event),
            None => debug!("No handler registered; dropping {:?}", event),
        }
    }

    /// Decode one text frame for `user` and hand call control to the handler.
    /// Chat traffic and malformed frames stop here.
    pub(crate) fn deliver_frame(&self, user: &UserId, text: &str) {
        match codec::decode(text) {
            Ok(Inbound::Call(event)) => self.emit(ChannelEvent::Message(event)),
            Ok(Inbound::Chat(kind)) => debug!("{} received {:?} chat frame", user, kind),
            Ok(Inbound::RelayError {
                code,
                message,
                session_id: Some(session_id),
                rejected: Some(kind),
            }) if code == codec::PEER_NOT_FOUND => {
                warn!("Relay could not deliver '{}' for session {}: {}", kind, session_id, message);
                self.emit(ChannelEvent::Undeliverable {
                    session_id,
                    kind,
                    error: SendError::PeerUnreachable,
                });
            }
            Ok(Inbound::RelayError { code, message, .. }) => {
                warn!("Relay rejected a frame from {}: {} ({})", user, message, code)
            }
            Err(e) => {
                counter!("signaling_protocol_errors_total").increment(1);
                warn!("Dropping malformed frame for {}: {}", user, e);
            }
        }
    }
}

//! In-process signaling relay
//!
//! Channels created from one [`MemorySignalingHub`] exchange real JSON frames
//! over a broadcast channel, so the codec is exercised end to end. Each
//! channel can be taken offline to simulate a network outage.
//!
//! ```
//! use observer_call::domain::call::MediaKind;
//! use observer_call::domain::shared::{SessionId, UserId};
//! use observer_call::domain::signaling::{SignalType, SignalingChannel, SignalingEvent};
//! use observer_call::infrastructure::signaling::MemorySignalingHub;
//!
//! # tokio_test::block_on(async {
//! let hub = MemorySignalingHub::new();
//! let alice = hub.connect(UserId::from(1));
//! let _bob = hub.connect(UserId::from(2));
//!
//! let initiate = SignalingEvent::new(
//!     SignalType::Initiate,
//!     SessionId::new(),
//!     UserId::from(1),
//!     UserId::from(2),
//!     MediaKind::Audio,
//! );
//! assert!(alice.send(&initiate).await.is_ok());
//!
//! alice.set_connected(false);
//! assert!(alice.send(&initiate).await.is_err());
//! # });
//! ```

use super::HandlerSlot;
use crate::domain::shared::error::SendError;
use crate::domain::shared::value_objects::UserId;
use crate::domain::signaling::{
    codec, Ack, ChannelEvent, ConnectionState, EventHandler, SignalingChannel, SignalingEvent,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const HUB_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct MemorySignalingHub {
    tx: broadcast::Sender<(UserId, String)>,
}

impl MemorySignalingHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    /// Open a connected channel for `user`
    pub fn connect(&self, user: UserId) -> Arc<MemoryChannel> {
        let handler = HandlerSlot::default();
        let state = Arc::new(Mutex::new(ConnectionState::Connected));

        let reader = tokio::spawn(read_frames(
            self.tx.subscribe(),
            user.clone(),
            handler.clone(),
            state.clone(),
        ));

        info!("{} joined the in-memory signaling hub", user);
        Arc::new(MemoryChannel {
            user,
            hub: self.clone(),
            handler,
            state,
            reader,
        })
    }

    /// Push a raw frame to `to`, bypassing the sender side. Lets callers feed
    /// frames that no well-behaved client would produce.
    pub fn inject(&self, to: &UserId, frame: impl Into<String>) {
        let _ = self.tx.send((to.clone(), frame.into()));
    }

    fn route(&self, to: &UserId, frame: String) {
        if self.tx.send((to.clone(), frame)).is_err() {
            debug!("No channel listening on the hub; frame for {} dropped", to);
        }
    }
}

impl Default for MemorySignalingHub {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_frames(
    mut rx: broadcast::Receiver<(UserId, String)>,
    user: UserId,
    handler: HandlerSlot,
    state: Arc<Mutex<ConnectionState>>,
) {
    loop {
        match rx.recv().await {
            Ok((to, frame)) if to == user => {
                let online =
                    *state.lock().unwrap_or_else(PoisonError::into_inner) == ConnectionState::Connected;
                if online {
                    handler.deliver_frame(&user, &frame);
                } else {
                    debug!("{} is offline; frame lost", user);
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("{} lagged behind the hub, {} frames lost", user, skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub struct MemoryChannel {
    user: UserId,
    hub: MemorySignalingHub,
    handler: HandlerSlot,
    state: Arc<Mutex<ConnectionState>>,
    reader: JoinHandle<()>,
}

impl MemoryChannel {
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Simulate losing or regaining the network. Reports the change to the
    /// registered handler.
    pub fn set_connected(&self, connected: bool) {
        let next = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };

        let previous = std::mem::replace(
            &mut *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            next,
        );
        if previous != next {
            info!("{} signaling {:?}", self.user, next);
            self.handler.emit(ChannelEvent::Connection(next));
        }
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl SignalingChannel for MemoryChannel {
    async fn send(&self, event: &SignalingEvent) -> Result<Ack, SendError> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(SendError::NotConnected);
        }

        let frame = codec::encode(event).map_err(|e| {
            error!("Failed to encode '{}': {}", event.kind, e);
            SendError::NotConnected
        })?;
        self.hub.route(&event.to_user_id, frame);
        Ok(Ack::for_event(event))
    }

    fn on_event(&self, handler: EventHandler) {
        self.handler.set(handler);
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

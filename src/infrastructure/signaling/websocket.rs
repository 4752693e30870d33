//! WebSocket signaling client
//!
//! Keeps one persistent connection to `<url>/<user_id>`, reconnecting with
//! jittered exponential backoff. Outbound frames go through a single writer
//! so they leave in the order `send` was called; each `send` resolves once
//! its frame has been written.

use super::HandlerSlot;
use crate::config::SignalingConfig;
use crate::domain::shared::error::SendError;
use crate::domain::shared::value_objects::UserId;
use crate::domain::signaling::{
    codec, Ack, ChannelEvent, ConnectionState, EventHandler, SignalingChannel, SignalingEvent,
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

struct Outgoing {
    frame: String,
    written: oneshot::Sender<Result<(), SendError>>,
}

#[derive(Debug, Clone, Copy)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Next delay: the current step plus up to 50% jitter, then double the step
    fn next_delay(&mut self) -> Duration {
        let base = self.current;
        let jitter_ms = (base.as_millis() as u64) / 2;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        self.current = (self.current * 2).min(self.max);
        (base + Duration::from_millis(jitter)).min(self.max)
    }
}

pub struct WebSocketChannel {
    user: UserId,
    outbound: mpsc::UnboundedSender<Outgoing>,
    handler: HandlerSlot,
    state: Arc<Mutex<ConnectionState>>,
    send_timeout: Duration,
    supervisor: JoinHandle<()>,
}

impl WebSocketChannel {
    /// Start connecting in the background. The channel reports
    /// `Disconnected` until the first connection succeeds.
    pub fn connect(config: &SignalingConfig, user: UserId) -> Arc<Self> {
        let url = format!("{}/{}", config.url.trim_end_matches('/'), user);
        let handler = HandlerSlot::default();
        let state = Arc::new(Mutex::new(ConnectionState::Disconnected));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let backoff = Backoff::new(
            Duration::from_millis(config.reconnect_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        );

        let supervisor = tokio::spawn(supervise(
            url,
            user.clone(),
            outbound_rx,
            handler.clone(),
            state.clone(),
            backoff,
        ));

        Arc::new(Self {
            user,
            outbound,
            handler,
            state,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            supervisor,
        })
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

#[async_trait]
impl SignalingChannel for WebSocketChannel {
    async fn send(&self, event: &SignalingEvent) -> Result<Ack, SendError> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(SendError::NotConnected);
        }

        let frame = codec::encode(event).map_err(|e| {
            error!("Failed to encode '{}': {}", event.kind, e);
            SendError::NotConnected
        })?;
        let (written, confirmation) = oneshot::channel();
        self.outbound
            .send(Outgoing { frame, written })
            .map_err(|_| SendError::NotConnected)?;

        match tokio::time::timeout(self.send_timeout, confirmation).await {
            Ok(Ok(Ok(()))) => Ok(Ack::for_event(event)),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(SendError::NotConnected),
            Err(_) => Err(SendError::Timeout),
        }
    }

    fn on_event(&self, handler: EventHandler) {
        self.handler.set(handler);
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn set_state(state: &Mutex<ConnectionState>, handler: &HandlerSlot, next: ConnectionState) {
    let previous = std::mem::replace(
        &mut *state.lock().unwrap_or_else(PoisonError::into_inner),
        next,
    );
    if previous != next {
        handler.emit(ChannelEvent::Connection(next));
    }
}

async fn supervise(
    url: String,
    user: UserId,
    mut outbound: mpsc::UnboundedReceiver<Outgoing>,
    handler: HandlerSlot,
    state: Arc<Mutex<ConnectionState>>,
    mut backoff: Backoff,
) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                info!("Signaling connected for {} ({})", user, url);
                backoff.reset();
                set_state(&state, &handler, ConnectionState::Connected);

                let (mut sink, mut stream) = socket.split();
                loop {
                    tokio::select! {
                        next = outbound.recv() => {
                            let Some(Outgoing { frame, written }) = next else {
                                // Channel dropped
                                let _ = sink.close().await;
                                return;
                            };
                            let result = sink.send(Message::Text(frame)).await;
                            let failed = result.is_err();
                            if let Err(e) = &result {
                                warn!("Signaling write failed for {}: {}", user, e);
                            }
                            let _ = written.send(result.map_err(|_| SendError::NotConnected));
                            if failed {
                                break;
                            }
                        }
                        incoming = stream.next() => match incoming {
                            Some(Ok(Message::Text(text))) => handler.deliver_frame(&user, &text),
                            Some(Ok(Message::Close(_))) | None => {
                                info!("Relay closed the signaling connection for {}", user);
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("Signaling read failed for {}: {}", user, e);
                                break;
                            }
                        }
                    }
                }

                set_state(&state, &handler, ConnectionState::Disconnected);
            }
            Err(e) => debug!("Signaling connect to {} failed: {}", url, e),
        }

        // Frames queued while the connection dropped cannot be written anymore
        while let Ok(Outgoing { written, .. }) = outbound.try_recv() {
            let _ = written.send(Err(SendError::NotConnected));
        }

        let delay = backoff.next_delay();
        debug!("Reconnecting {} in {:?}", user, delay);
        tokio::time::sleep(delay).await;
    }
}

//! Development signaling relay for call-control and chat frames
use crate::domain::shared::value_objects::UserId;
use crate::domain::signaling::{codec, Inbound, SignalingEvent};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use futures::{sink::SinkExt, stream::StreamExt};
use metrics::{counter, gauge};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

/// Connected user information
#[derive(Debug, Clone, Serialize)]
pub struct RelayPeer {
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
}

/// Relay state
pub struct SignalingRelay {
    /// Connected users
    peers: Arc<RwLock<HashMap<UserId, RelayPeer>>>,
    /// Frames addressed to a user
    tx: broadcast::Sender<(UserId, String)>,
}

impl SignalingRelay {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
            tx,
        }
    }

    /// Register a connection. A user may only be connected once.
    pub async fn register_peer(&self, user_id: UserId) -> Result<(), String> {
        let mut peers = self.peers.write().await;

        if peers.contains_key(&user_id) {
            return Err(format!("{} is already connected", user_id));
        }

        peers.insert(
            user_id.clone(),
            RelayPeer {
                user_id,
                connected_at: Utc::now(),
            },
        );
        gauge!("relay_connections").set(peers.len() as f64);
        Ok(())
    }

    pub async fn unregister_peer(&self, user_id: &UserId) {
        let mut peers = self.peers.write().await;
        if peers.remove(user_id).is_some() {
            gauge!("relay_connections").set(peers.len() as f64);
        }
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.peers.read().await.contains_key(user_id)
    }

    pub async fn list_peers(&self) -> Vec<RelayPeer> {
        self.peers.read().await.values().cloned().collect()
    }

    /// Queue a frame for one user
    pub fn send_to_peer(&self, to: &UserId, frame: String) {
        let _ = self.tx.send((to.clone(), frame));
    }

    fn send_error(&self, to: &UserId, code: &str, message: impl Into<String>) {
        let frame = json!({
            "type": "error",
            "code": code,
            "message": message.into(),
        });
        self.send_to_peer(to, frame.to_string());
    }

    /// Tell the sender which call message could not be delivered
    fn send_undeliverable(&self, to: &UserId, event: &SignalingEvent) {
        let frame = json!({
            "type": "error",
            "code": codec::PEER_NOT_FOUND,
            "message": format!("User {} is not connected", event.to_user_id),
            "sessionId": event.session_id,
            "rejectedType": event.kind,
        });
        self.send_to_peer(to, frame.to_string());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(UserId, String)> {
        self.tx.subscribe()
    }

    /// Validate and forward one frame received from `from`
    pub async fn route_frame(&self, from: &UserId, text: &str) {
        match codec::decode(text) {
            Ok(Inbound::Call(event)) => {
                if &event.from_user_id != from {
                    self.send_error(from, "SENDER_MISMATCH", "fromUserId does not match connection");
                    return;
                }
                if !self.is_online(&event.to_user_id).await {
                    self.send_undeliverable(from, &event);
                    return;
                }

                info!(
                    "Forwarding '{}' for session {} from {} to {}",
                    event.kind, event.session_id, from, event.to_user_id
                );
                match codec::encode(&event) {
                    Ok(frame) => self.send_to_peer(&event.to_user_id, frame),
                    Err(e) => error!("Failed to encode '{}': {}", event.kind, e),
                }
            }
            Ok(Inbound::Chat(kind)) => match chat_recipient(text) {
                Some(to) => {
                    debug!("Forwarding {:?} chat frame from {} to {}", kind, from, to);
                    self.send_to_peer(&to, text.to_string());
                }
                None => self.send_error(from, "MISSING_RECIPIENT", "chat frame has no toUserId"),
            },
            Ok(Inbound::RelayError { code, .. }) => {
                warn!("{} sent an error frame ({}); ignoring", from, code);
            }
            Err(e) => {
                counter!("signaling_protocol_errors_total").increment(1);
                warn!("Malformed frame from {}: {}", from, e);
                self.send_error(from, "PARSE_ERROR", format!("Invalid message format: {}", e));
            }
        }
    }
}

impl Default for SignalingRelay {
    fn default() -> Self {
        Self::new()
    }
}

fn chat_recipient(text: &str) -> Option<UserId> {
    let value: Value = serde_json::from_str(text).ok()?;
    match value.get("toUserId")? {
        Value::String(id) => UserId::parse(id).ok(),
        Value::Number(id) => id.as_u64().map(UserId::from),
        _ => None,
    }
}

/// Create the relay router
pub fn signaling_relay_router(state: Arc<SignalingRelay>) -> Router {
    Router::new()
        .route("/signaling/:user_id", get(websocket_handler))
        .route("/signaling/peers", get(list_peers))
        .with_state(state)
}

async fn list_peers(State(state): State<Arc<SignalingRelay>>) -> Response {
    axum::Json(state.list_peers().await).into_response()
}

/// WebSocket handler for signaling
async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<Arc<SignalingRelay>>,
) -> Response {
    let user_id = match UserId::parse(&user_id) {
        Ok(user_id) => user_id,
        Err(e) => return (StatusCode::BAD_REQUEST, e).into_response(),
    };
    if state.is_online(&user_id).await {
        return (
            StatusCode::CONFLICT,
            format!("{} is already connected", user_id),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: UserId, state: Arc<SignalingRelay>) {
    if let Err(e) = state.register_peer(user_id.clone()).await {
        warn!("Refusing signaling connection: {}", e);
        return;
    }
    info!("Signaling connection established for {}", user_id);

    let (mut sender, mut receiver) = socket.split();

    // Subscribe to frames
    let mut rx = state.subscribe();

    // Task to send frames to this user
    let user_clone = user_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok((to, frame)) if to == user_clone => {
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Relay lagged for {}, {} frames lost", user_clone, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Task to receive frames from this user
    let state_clone = state.clone();
    let user_clone = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    debug!("Received frame from {}: {}", user_clone, text);
                    state_clone.route_frame(&user_clone, &text).await;
                }
                Ok(Message::Close(_)) => {
                    info!("WebSocket closed for {}", user_clone);
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(_) => {
                    warn!("Received unexpected message type from {}", user_clone);
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", user_clone, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => {
            debug!("Send task finished for {}", user_id);
            recv_task.abort();
        }
        _ = &mut recv_task => {
            debug!("Receive task finished for {}", user_id);
            send_task.abort();
        }
    }

    // Cleanup
    state.unregister_peer(&user_id).await;
    info!("Signaling connection closed for {}", user_id);
}

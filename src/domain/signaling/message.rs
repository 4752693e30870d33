//! Call-control signaling messages

use crate::domain::call::value_object::MediaKind;
use crate::domain::shared::value_objects::{SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Call-control message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Initiate,
    Accept,
    Reject,
    End,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Initiate => "initiate",
            SignalType::Accept => "accept",
            SignalType::Reject => "reject",
            SignalType::End => "end",
        }
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "initiate" => Some(SignalType::Initiate),
            "accept" => Some(SignalType::Accept),
            "reject" => Some(SignalType::Reject),
            "end" => Some(SignalType::End),
            _ => None,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message types that share the channel with call control but are not
/// handled by the call core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Text,
    File,
    Notification,
}

impl ChatKind {
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "text" => Some(ChatKind::Text),
            "file" => Some(ChatKind::File),
            "notification" => Some(ChatKind::Notification),
            _ => None,
        }
    }
}

/// Inbound or outbound call-control message. Consumed once, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingEvent {
    #[serde(rename = "type")]
    pub kind: SignalType,
    pub session_id: SessionId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub media_kind: MediaKind,
}

impl SignalingEvent {
    pub fn new(
        kind: SignalType,
        session_id: SessionId,
        from_user_id: UserId,
        to_user_id: UserId,
        media_kind: MediaKind,
    ) -> Self {
        Self {
            kind,
            session_id,
            from_user_id,
            to_user_id,
            media_kind,
        }
    }
}

/// Delivery confirmation for an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub session_id: SessionId,
    pub kind: SignalType,
    pub sent_at: DateTime<Utc>,
}

impl Ack {
    pub fn for_event(event: &SignalingEvent) -> Self {
        Self {
            session_id: event.session_id.clone(),
            kind: event.kind,
            sent_at: Utc::now(),
        }
    }
}

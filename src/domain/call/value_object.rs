//! Call value objects

use crate::domain::shared::error::{DeviceError, SendError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side placed the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Placed by the local user
    Outgoing,
    /// Placed by the peer
    Incoming,
}

/// Media carried by a call, fixed for the session's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Tracks a capture of this kind is made of
    pub fn tracks(&self) -> &'static [TrackKind] {
        match self {
            MediaKind::Audio => &[TrackKind::Audio],
            MediaKind::Video => &[TrackKind::Audio, TrackKind::Video],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single device track inside a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// Why a call ended up in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "error")]
pub enum FailureReason {
    /// Camera or microphone could not be acquired, or a track died
    Device(DeviceError),
    /// A critical signaling message could not be delivered
    Signaling(SendError),
    /// Nobody answered, or signaling never came back
    Timeout,
}

impl FailureReason {
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureReason::Device(e) => e.user_message(),
            FailureReason::Signaling(SendError::NotConnected) => {
                "Call failed: you are offline."
            }
            FailureReason::Signaling(SendError::Timeout) => {
                "Call failed: the server did not respond."
            }
            FailureReason::Signaling(SendError::PeerUnreachable) => {
                "Call failed: the other side is offline."
            }
            FailureReason::Timeout => "No answer.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Device(_) => "device",
            FailureReason::Signaling(_) => "signaling",
            FailureReason::Timeout => "timeout",
        }
    }
}

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// No call, or a session that has not rung yet
    Idle,
    /// Waiting for the callee to answer
    Ringing,
    /// Answered, media still being set up
    Accepted,
    /// Both local and remote media flowing
    Active,
    /// Hung up by either party
    Ended,
    /// Declined before being answered
    Rejected,
    /// Aborted by a device, signaling or timeout failure
    Failed(FailureReason),
}

impl CallStatus {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_status: &CallStatus) -> bool {
        use CallStatus::*;

        match (self, new_status) {
            (Idle, Ringing) => true,
            (Idle, Failed(_)) => true,

            (Ringing, Accepted) => true,
            (Ringing, Rejected) => true,
            (Ringing, Ended) => true,
            (Ringing, Failed(_)) => true,

            (Accepted, Active) => true,
            (Accepted, Ended) => true,
            (Accepted, Failed(_)) => true,

            (Active, Ended) => true,
            (Active, Failed(_)) => true,

            // Terminal
            (Ended, _) | (Rejected, _) | (Failed(_), _) => false,

            _ => false,
        }
    }

    /// Ringing, accepted or active
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            CallStatus::Ringing | CallStatus::Accepted | CallStatus::Active
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Ended | CallStatus::Rejected | CallStatus::Failed(_)
        )
    }

    /// Whether a local stream must be held in this status
    pub fn holds_local_stream(&self) -> bool {
        matches!(self, CallStatus::Accepted | CallStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Idle => "idle",
            CallStatus::Ringing => "ringing",
            CallStatus::Accepted => "accepted",
            CallStatus::Active => "active",
            CallStatus::Ended => "ended",
            CallStatus::Rejected => "rejected",
            CallStatus::Failed(_) => "failed",
        }
    }
}

//! Domain errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Guard failures raised by the call state machine.
///
/// Returning one of these from a transition means the input was refused and
/// nothing about the session changed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Call controller stopped")]
    Stopped,
}

/// Capture device failures reported by the media stream manager
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceError {
    #[error("permission to use the camera or microphone was denied")]
    PermissionDenied,

    #[error("camera or microphone is unavailable")]
    Unavailable,

    #[error("a media track was lost")]
    TrackLost,
}

impl DeviceError {
    /// Message shown to the user next to the retry affordance
    pub fn user_message(&self) -> &'static str {
        match self {
            DeviceError::PermissionDenied => {
                "Camera or microphone access was denied. Allow access and try again."
            }
            DeviceError::Unavailable => "No camera or microphone is available.",
            DeviceError::TrackLost => "Your camera or microphone stopped working.",
        }
    }
}

/// Outbound signaling failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendError {
    #[error("signaling channel is not connected")]
    NotConnected,

    #[error("signaling send timed out")]
    Timeout,

    #[error("recipient is not connected to signaling")]
    PeerUnreachable,
}

/// Malformed inbound signaling frames. Dropped at the adapter boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("message has no 'type' field")]
    MissingType,

    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("malformed '{kind}' message: {reason}")]
    Malformed { kind: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DomainError>;

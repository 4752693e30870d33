//! Call domain events
//!
//! Recorded by the [`CallSession`](super::CallSession) aggregate and published
//! to the UI after each processed input.

use crate::domain::call::value_object::{CallDirection, FailureReason, MediaKind, TrackKind};
use crate::domain::shared::events::{DomainEvent, EventMetadata};
use crate::domain::shared::value_objects::{SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base struct for all call events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEventBase {
    pub metadata: EventMetadata,
    pub session_id: SessionId,
}

impl CallEventBase {
    pub fn new(event_type: &str, session_id: &SessionId) -> Self {
        Self {
            metadata: EventMetadata::new(event_type),
            session_id: session_id.clone(),
        }
    }
}

/// Call started ringing (outgoing) or an incoming call arrived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRinging {
    pub base: CallEventBase,
    pub peer: UserId,
    pub direction: CallDirection,
    pub media_kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAccepted {
    pub base: CallEventBase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallActivated {
    pub base: CallEventBase,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMuteToggled {
    pub base: CallEventBase,
    pub track: TrackKind,
    pub muted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnded {
    pub base: CallEventBase,
    pub by_peer: bool,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRejected {
    pub base: CallEventBase,
    pub by_peer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFailed {
    pub base: CallEventBase,
    pub reason: FailureReason,
}

/// A second incoming call was turned away because the line was busy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMissedWhileBusy {
    pub base: CallEventBase,
    pub peer: UserId,
    pub media_kind: MediaKind,
}

/// Union of all call events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallEvent {
    Ringing(CallRinging),
    Accepted(CallAccepted),
    Activated(CallActivated),
    MuteToggled(CallMuteToggled),
    Ended(CallEnded),
    Rejected(CallRejected),
    Failed(CallFailed),
    MissedWhileBusy(CallMissedWhileBusy),
}

impl CallEvent {
    fn base(&self) -> &CallEventBase {
        match self {
            CallEvent::Ringing(e) => &e.base,
            CallEvent::Accepted(e) => &e.base,
            CallEvent::Activated(e) => &e.base,
            CallEvent::MuteToggled(e) => &e.base,
            CallEvent::Ended(e) => &e.base,
            CallEvent::Rejected(e) => &e.base,
            CallEvent::Failed(e) => &e.base,
            CallEvent::MissedWhileBusy(e) => &e.base,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.base().session_id
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallEvent::Ended(_) | CallEvent::Rejected(_) | CallEvent::Failed(_)
        )
    }
}

impl DomainEvent for CallEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CallEvent::Ringing(_) => "call.ringing",
            CallEvent::Accepted(_) => "call.accepted",
            CallEvent::Activated(_) => "call.activated",
            CallEvent::MuteToggled(_) => "call.mute_toggled",
            CallEvent::Ended(_) => "call.ended",
            CallEvent::Rejected(_) => "call.rejected",
            CallEvent::Failed(_) => "call.failed",
            CallEvent::MissedWhileBusy(_) => "call.missed_while_busy",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.base().metadata.occurred_at
    }

    fn sequence(&self) -> u64 {
        self.base().metadata.sequence
    }
}

//! Side effects requested by call transitions
//!
//! Transitions are synchronous and never touch devices or the network; they
//! return effects which the controller executes.

use crate::domain::call::value_object::{MediaKind, TrackKind};
use crate::domain::media::{LocalStream, RemoteStreamRef};
use crate::domain::shared::value_objects::SessionId;
use crate::domain::signaling::SignalingEvent;

/// What to do when an outbound message cannot be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPolicy {
    /// Delivery failure fails the session (`initiate`, `accept`)
    Critical,
    /// Delivery failure is logged and suppressed (`reject`, `end`)
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send {
        event: SignalingEvent,
        policy: SendPolicy,
    },
    Acquire {
        session_id: SessionId,
        media_kind: MediaKind,
    },
    Release(LocalStream),
    SetTrackEnabled {
        session_id: SessionId,
        stream: LocalStream,
        track: TrackKind,
        enabled: bool,
    },
    AttachRemote {
        session_id: SessionId,
        remote: RemoteStreamRef,
    },
    DetachRemote(RemoteStreamRef),
    ArmRingTimeout {
        session_id: SessionId,
    },
    ArmReconnectTimeout {
        session_id: SessionId,
        outage: u64,
    },
    ScheduleTeardown {
        session_id: SessionId,
    },
}

impl Effect {
    pub fn send(event: SignalingEvent, policy: SendPolicy) -> Self {
        Effect::Send { event, policy }
    }
}

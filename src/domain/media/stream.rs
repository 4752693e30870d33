//! Local/remote stream handles and the media stream manager port

use crate::domain::call::value_object::{MediaKind, TrackKind};
use crate::domain::shared::error::DeviceError;
use crate::domain::shared::value_objects::StreamId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Handle to a local capture (camera and/or microphone).
///
/// Owned by exactly one call session. Cloning copies the handle, not the
/// capture; the device stays live until the manager releases it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStream {
    id: StreamId,
    media_kind: MediaKind,
}

impl LocalStream {
    pub fn new(id: StreamId, media_kind: MediaKind) -> Self {
        Self { id, media_kind }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    pub fn tracks(&self) -> &'static [TrackKind] {
        self.media_kind.tracks()
    }

    pub fn has_track(&self, track: TrackKind) -> bool {
        self.tracks().contains(&track)
    }
}

/// Reference to the peer's media. Never owned by the session: ending a call
/// detaches it from playback and nothing more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStreamRef {
    id: StreamId,
}

impl RemoteStreamRef {
    pub fn new(id: StreamId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }
}

/// Device capture lifecycle.
///
/// Implemented by the platform layer; the call controller is the only caller,
/// so mute flags never drift from actual track state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaStreamManager: Send + Sync {
    /// Request camera+mic for video, mic only for audio
    async fn acquire(&self, media_kind: MediaKind) -> Result<LocalStream, DeviceError>;

    /// Stop every track of the stream. Safe to call more than once.
    async fn release(&self, stream: &LocalStream);

    /// Mute/unmute one track without renegotiating the call
    async fn set_track_enabled(
        &self,
        stream: &LocalStream,
        track: TrackKind,
        enabled: bool,
    ) -> Result<(), DeviceError>;

    /// Bind the peer's media to playback
    async fn attach_remote(&self, remote: &RemoteStreamRef) -> Result<(), DeviceError>;

    /// Unbind the peer's media from playback
    async fn detach_remote(&self, remote: &RemoteStreamRef);
}

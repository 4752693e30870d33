//! Simulated capture devices
//!
//! In-memory stand-in for a camera and microphone. Availability and
//! permission can be flipped at runtime, and every acquisition/release is
//! counted so leaks and double releases are observable.

use crate::config::DevicesConfig;
use crate::domain::call::{MediaKind, TrackKind};
use crate::domain::media::{LocalStream, MediaStreamManager, RemoteStreamRef};
use crate::domain::shared::error::DeviceError;
use crate::domain::shared::value_objects::StreamId;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Counters since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub acquisitions: u64,
    pub releases: u64,
    /// `release()` calls for a stream that was already stopped
    pub redundant_releases: u64,
    pub failed_acquisitions: u64,
}

#[derive(Debug)]
struct Capture {
    media_kind: MediaKind,
    audio_enabled: bool,
    video_enabled: bool,
}

pub struct SimulatedDevices {
    config: RwLock<DevicesConfig>,
    captures: RwLock<HashMap<StreamId, Capture>>,
    playback: RwLock<HashSet<StreamId>>,
    acquisitions: AtomicU64,
    releases: AtomicU64,
    redundant_releases: AtomicU64,
    failed_acquisitions: AtomicU64,
}

impl SimulatedDevices {
    pub fn new(config: DevicesConfig) -> Self {
        Self {
            config: RwLock::new(config),
            captures: RwLock::new(HashMap::new()),
            playback: RwLock::new(HashSet::new()),
            acquisitions: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            redundant_releases: AtomicU64::new(0),
            failed_acquisitions: AtomicU64::new(0),
        }
    }

    /// Devices that are present, permitted and answer immediately
    pub fn instant() -> Self {
        Self::new(DevicesConfig {
            acquire_latency_ms: 0,
            ..DevicesConfig::default()
        })
    }

    pub async fn set_permission_granted(&self, granted: bool) {
        self.config.write().await.permission_granted = granted;
    }

    pub async fn set_camera_available(&self, available: bool) {
        self.config.write().await.camera_available = available;
    }

    pub async fn set_microphone_available(&self, available: bool) {
        self.config.write().await.microphone_available = available;
    }

    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            acquisitions: self.acquisitions.load(Ordering::SeqCst),
            releases: self.releases.load(Ordering::SeqCst),
            redundant_releases: self.redundant_releases.load(Ordering::SeqCst),
            failed_acquisitions: self.failed_acquisitions.load(Ordering::SeqCst),
        }
    }

    /// Streams acquired and not yet released
    pub async fn live_captures(&self) -> usize {
        self.captures.read().await.len()
    }

    pub async fn live_stream_ids(&self) -> Vec<StreamId> {
        self.captures.read().await.keys().copied().collect()
    }

    /// `None` if the stream is not live or has no such track
    pub async fn track_enabled(&self, stream: &StreamId, track: TrackKind) -> Option<bool> {
        let captures = self.captures.read().await;
        let capture = captures.get(stream)?;
        match track {
            TrackKind::Audio => Some(capture.audio_enabled),
            TrackKind::Video if capture.media_kind == MediaKind::Video => {
                Some(capture.video_enabled)
            }
            TrackKind::Video => None,
        }
    }

    pub async fn is_playing(&self, remote: &RemoteStreamRef) -> bool {
        self.playback.read().await.contains(&remote.id())
    }

    async fn check_devices(&self, media_kind: MediaKind) -> Result<(), DeviceError> {
        let config = self.config.read().await;
        if !config.permission_granted {
            return Err(DeviceError::PermissionDenied);
        }
        if !config.microphone_available {
            return Err(DeviceError::Unavailable);
        }
        if media_kind == MediaKind::Video && !config.camera_available {
            return Err(DeviceError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl MediaStreamManager for SimulatedDevices {
    async fn acquire(&self, media_kind: MediaKind) -> Result<LocalStream, DeviceError> {
        let latency = self.config.read().await.acquire_latency_ms;
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if let Err(e) = self.check_devices(media_kind).await {
            self.failed_acquisitions.fetch_add(1, Ordering::SeqCst);
            warn!("Could not acquire {} devices: {}", media_kind, e);
            return Err(e);
        }

        let stream = LocalStream::new(StreamId::new(), media_kind);
        self.captures.write().await.insert(
            stream.id(),
            Capture {
                media_kind,
                audio_enabled: true,
                video_enabled: media_kind == MediaKind::Video,
            },
        );
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        info!("Acquired {} capture {}", media_kind, stream.id());

        Ok(stream)
    }

    async fn release(&self, stream: &LocalStream) {
        if self.captures.write().await.remove(&stream.id()).is_some() {
            self.releases.fetch_add(1, Ordering::SeqCst);
            info!("Released capture {}", stream.id());
        } else {
            self.redundant_releases.fetch_add(1, Ordering::SeqCst);
            warn!("Capture {} was already released", stream.id());
        }
    }

    async fn set_track_enabled(
        &self,
        stream: &LocalStream,
        track: TrackKind,
        enabled: bool,
    ) -> Result<(), DeviceError> {
        let mut captures = self.captures.write().await;
        let capture = captures
            .get_mut(&stream.id())
            .ok_or(DeviceError::TrackLost)?;

        match track {
            TrackKind::Audio => capture.audio_enabled = enabled,
            TrackKind::Video if capture.media_kind == MediaKind::Video => {
                capture.video_enabled = enabled
            }
            TrackKind::Video => return Err(DeviceError::TrackLost),
        }
        debug!("{} track of {} enabled={}", track, stream.id(), enabled);
        Ok(())
    }

    async fn attach_remote(&self, remote: &RemoteStreamRef) -> Result<(), DeviceError> {
        self.playback.write().await.insert(remote.id());
        debug!("Playing remote stream {}", remote.id());
        Ok(())
    }

    async fn detach_remote(&self, remote: &RemoteStreamRef) {
        if self.playback.write().await.remove(&remote.id()) {
            debug!("Stopped remote stream {}", remote.id());
        }
    }
}

//! Call session aggregate root

use crate::domain::call::effect::{Effect, SendPolicy};
use crate::domain::call::event::{
    CallAccepted, CallActivated, CallEnded, CallEvent, CallEventBase, CallFailed,
    CallMuteToggled, CallRejected, CallRinging,
};
use crate::domain::call::value_object::{
    CallDirection, CallStatus, FailureReason, MediaKind, TrackKind,
};
use crate::domain::media::{LocalStream, RemoteStreamRef};
use crate::domain::shared::error::{DeviceError, DomainError};
use crate::domain::shared::error::Result;
use crate::domain::shared::value_objects::{SessionId, UserId};
use crate::domain::signaling::{SignalType, SignalingEvent};
use chrono::{DateTime, Utc};

/// The session's slot for the local capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalMedia {
    /// Nothing held
    Released,
    /// `acquire()` is in flight and its result belongs to this slot
    Acquiring,
    /// Capture is live and owned by the session
    Ready(LocalStream),
}

/// Call session aggregate root
///
/// Single source of truth for one call. Every mutation goes through a
/// transition method which either refuses the input with a [`DomainError`]
/// (leaving the session untouched) or applies it and returns the side
/// effects the controller must run.
#[derive(Debug, Clone)]
pub struct CallSession {
    id: SessionId,
    local_user: UserId,
    peer: UserId,
    direction: CallDirection,
    media_kind: MediaKind,
    status: CallStatus,
    /// Held iff status is accepted or active
    local_media: LocalMedia,
    /// Outgoing capture that completed while still ringing
    prefetched: Option<LocalStream>,
    /// An `acquire()` for this session has not resolved yet
    acquiring: bool,
    remote: Option<RemoteStreamRef>,
    audio_muted: bool,
    video_muted: bool,
    end_received: bool,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    events: Vec<CallEvent>,
}

impl CallSession {
    /// Session for a call the local user is placing
    pub fn outgoing(id: SessionId, local_user: UserId, peer: UserId, media_kind: MediaKind) -> Self {
        Self::new(id, local_user, peer, CallDirection::Outgoing, media_kind)
    }

    /// Session for a call the peer is placing
    pub fn incoming(id: SessionId, local_user: UserId, peer: UserId, media_kind: MediaKind) -> Self {
        Self::new(id, local_user, peer, CallDirection::Incoming, media_kind)
    }

    fn new(
        id: SessionId,
        local_user: UserId,
        peer: UserId,
        direction: CallDirection,
        media_kind: MediaKind,
    ) -> Self {
        Self {
            id,
            local_user,
            peer,
            direction,
            media_kind,
            status: CallStatus::Idle,
            local_media: LocalMedia::Released,
            prefetched: None,
            acquiring: false,
            remote: None,
            audio_muted: false,
            video_muted: false,
            end_received: false,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            events: Vec::new(),
        }
    }

    /// Start ringing.
    ///
    /// Outgoing calls announce themselves to the peer and start capturing in
    /// parallel. Incoming calls only prompt; devices are not touched until
    /// the user accepts.
    pub fn ring(&mut self) -> Result<Vec<Effect>> {
        self.transition_to(CallStatus::Ringing)?;

        self.record_event(CallEvent::Ringing(CallRinging {
            base: CallEventBase::new("call.ringing", &self.id),
            peer: self.peer.clone(),
            direction: self.direction,
            media_kind: self.media_kind,
        }));

        match self.direction {
            CallDirection::Outgoing => {
                self.acquiring = true;
                Ok(vec![
                    Effect::send(self.signal(SignalType::Initiate), SendPolicy::Critical),
                    Effect::Acquire {
                        session_id: self.id.clone(),
                        media_kind: self.media_kind,
                    },
                    Effect::ArmRingTimeout {
                        session_id: self.id.clone(),
                    },
                ])
            }
            CallDirection::Incoming => Ok(Vec::new()),
        }
    }

    /// Local user answers an incoming call
    pub fn accept(&mut self) -> Result<Vec<Effect>> {
        if self.direction != CallDirection::Incoming {
            return Err(DomainError::InvalidOperation(
                "Only incoming calls can be accepted".to_string(),
            ));
        }
        self.require_status(CallStatus::Ringing, "accept")?;
        self.transition_to(CallStatus::Accepted)?;

        self.local_media = LocalMedia::Acquiring;
        self.acquiring = true;
        self.record_accepted();

        Ok(vec![
            Effect::Acquire {
                session_id: self.id.clone(),
                media_kind: self.media_kind,
            },
            Effect::send(self.signal(SignalType::Accept), SendPolicy::Critical),
        ])
    }

    /// Peer answered our outgoing call
    pub fn peer_accepted(&mut self) -> Result<Vec<Effect>> {
        if self.direction != CallDirection::Outgoing {
            return Err(DomainError::InvalidOperation(
                "Peer can only accept an outgoing call".to_string(),
            ));
        }
        self.require_status(CallStatus::Ringing, "peer accept")?;
        self.transition_to(CallStatus::Accepted)?;
        self.record_accepted();

        let mut effects = Vec::new();
        self.local_media = match self.prefetched.take() {
            Some(stream) => LocalMedia::Ready(stream),
            None if self.acquiring => LocalMedia::Acquiring,
            None => {
                // Capture was never started (or was released); start it now.
                self.acquiring = true;
                effects.push(Effect::Acquire {
                    session_id: self.id.clone(),
                    media_kind: self.media_kind,
                });
                LocalMedia::Acquiring
            }
        };

        self.try_activate();
        Ok(effects)
    }

    /// An `acquire()` started for this session resolved successfully
    pub fn media_acquired(&mut self, stream: LocalStream) -> Vec<Effect> {
        self.acquiring = false;

        let slot_waiting = self.local_media == LocalMedia::Acquiring;
        match self.status {
            CallStatus::Ringing if self.direction == CallDirection::Outgoing => {
                if let Some(stale) = self.prefetched.replace(stream) {
                    return vec![Effect::Release(stale)];
                }
                Vec::new()
            }
            CallStatus::Accepted if slot_waiting => {
                self.local_media = LocalMedia::Ready(stream);
                self.try_activate();
                Vec::new()
            }
            // Session moved on (or already has a capture): nobody owns this one.
            _ => vec![Effect::Release(stream)],
        }
    }

    /// An `acquire()` started for this session failed
    pub fn acquisition_failed(&mut self, error: DeviceError) -> Result<Vec<Effect>> {
        if !self.acquiring {
            return Err(DomainError::InvalidOperation(
                "No capture was requested for this session".to_string(),
            ));
        }
        self.acquiring = false;
        self.fail(FailureReason::Device(error))
    }

    /// The peer's media arrived
    pub fn remote_media_arrived(&mut self, remote: RemoteStreamRef) -> Result<Vec<Effect>> {
        if !self.status.is_live() {
            return Err(DomainError::InvalidStateTransition(format!(
                "Remote media ignored in {:?}",
                self.status
            )));
        }
        if self.remote.as_ref() == Some(&remote) {
            return Ok(Vec::new());
        }

        let mut effects = Vec::new();
        if let Some(previous) = self.remote.replace(remote.clone()) {
            effects.push(Effect::DetachRemote(previous));
        }
        effects.push(Effect::AttachRemote {
            session_id: self.id.clone(),
            remote,
        });

        self.try_activate();
        Ok(effects)
    }

    /// Local user declines an incoming call
    pub fn reject(&mut self) -> Result<Vec<Effect>> {
        if self.direction != CallDirection::Incoming {
            return Err(DomainError::InvalidOperation(
                "Only incoming calls can be rejected; hang up instead".to_string(),
            ));
        }
        self.require_status(CallStatus::Ringing, "reject")?;
        self.transition_to(CallStatus::Rejected)?;
        self.mark_ended();

        self.record_event(CallEvent::Rejected(CallRejected {
            base: CallEventBase::new("call.rejected", &self.id),
            by_peer: false,
        }));

        let mut effects = vec![Effect::send(
            self.signal(SignalType::Reject),
            SendPolicy::BestEffort,
        )];
        effects.extend(self.release_media());
        effects.push(self.teardown());
        Ok(effects)
    }

    /// Peer declined
    pub fn peer_rejected(&mut self) -> Result<Vec<Effect>> {
        self.require_status(CallStatus::Ringing, "peer reject")?;
        self.transition_to(CallStatus::Rejected)?;
        self.mark_ended();

        self.record_event(CallEvent::Rejected(CallRejected {
            base: CallEventBase::new("call.rejected", &self.id),
            by_peer: true,
        }));

        let mut effects = self.release_media();
        effects.push(self.teardown());
        Ok(effects)
    }

    /// Local user hangs up. Always succeeds locally on a live call; the `end`
    /// message is best-effort.
    pub fn end_call(&mut self) -> Result<Vec<Effect>> {
        self.end(false)
    }

    /// Peer hung up
    pub fn peer_ended(&mut self) -> Result<Vec<Effect>> {
        self.end(true)
    }

    fn end(&mut self, by_peer: bool) -> Result<Vec<Effect>> {
        if !self.status.is_live() {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot end a call in {:?}",
                self.status
            )));
        }
        self.transition_to(CallStatus::Ended)?;
        self.end_received = by_peer;
        let ended_at = self.mark_ended();

        let duration_seconds = self
            .started_at
            .map(|started| (ended_at - started).num_seconds());

        self.record_event(CallEvent::Ended(CallEnded {
            base: CallEventBase::new("call.ended", &self.id),
            by_peer,
            ended_at,
            duration_seconds,
        }));

        let mut effects = Vec::new();
        if !by_peer {
            effects.push(Effect::send(self.signal(SignalType::End), SendPolicy::BestEffort));
        }
        effects.extend(self.release_media());
        effects.push(self.teardown());
        Ok(effects)
    }

    /// Outgoing call was not answered in time
    pub fn ring_timeout(&mut self) -> Result<Vec<Effect>> {
        if self.direction != CallDirection::Outgoing {
            return Err(DomainError::InvalidOperation(
                "Ring timeout only applies to outgoing calls".to_string(),
            ));
        }
        self.require_status(CallStatus::Ringing, "ring timeout")?;
        self.fail(FailureReason::Timeout)
    }

    /// Abort the call
    pub fn fail(&mut self, reason: FailureReason) -> Result<Vec<Effect>> {
        let peer_knows = self.status.is_live();
        self.transition_to(CallStatus::Failed(reason))?;
        self.mark_ended();

        self.record_event(CallEvent::Failed(CallFailed {
            base: CallEventBase::new("call.failed", &self.id),
            reason,
        }));

        let mut effects = Vec::new();
        // Tell the peer to stop ringing/streaming, unless the channel is what broke.
        if peer_knows && !matches!(reason, FailureReason::Signaling(_)) {
            effects.push(Effect::send(self.signal(SignalType::End), SendPolicy::BestEffort));
        }
        effects.extend(self.release_media());
        effects.push(self.teardown());
        Ok(effects)
    }

    /// Flip the mute flag of one track
    pub fn toggle_mute(&mut self, track: TrackKind) -> Result<Vec<Effect>> {
        self.require_status(CallStatus::Active, "toggle mute")?;

        let stream = match &self.local_media {
            LocalMedia::Ready(stream) => stream.clone(),
            _ => {
                return Err(DomainError::InvalidOperation(
                    "No local stream to mute".to_string(),
                ))
            }
        };
        if !stream.has_track(track) {
            return Err(DomainError::InvalidOperation(format!(
                "{} call has no {} track",
                self.media_kind, track
            )));
        }

        let muted = match track {
            TrackKind::Audio => {
                self.audio_muted = !self.audio_muted;
                self.audio_muted
            }
            TrackKind::Video => {
                self.video_muted = !self.video_muted;
                self.video_muted
            }
        };

        self.record_event(CallEvent::MuteToggled(CallMuteToggled {
            base: CallEventBase::new("call.mute_toggled", &self.id),
            track,
            muted,
        }));

        Ok(vec![Effect::SetTrackEnabled {
            session_id: self.id.clone(),
            stream,
            track,
            enabled: !muted,
        }])
    }

    /// Move to active once both sides' media is present
    fn try_activate(&mut self) {
        let ready = self.status == CallStatus::Accepted
            && matches!(self.local_media, LocalMedia::Ready(_))
            && self.remote.is_some();
        if !ready || self.transition_to(CallStatus::Active).is_err() {
            return;
        }

        let started_at = Utc::now();
        self.started_at = Some(started_at);
        self.record_event(CallEvent::Activated(CallActivated {
            base: CallEventBase::new("call.activated", &self.id),
            started_at,
        }));
    }

    /// Release everything the session owns and detach the remote reference
    fn release_media(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();

        if let LocalMedia::Ready(stream) =
            std::mem::replace(&mut self.local_media, LocalMedia::Released)
        {
            effects.push(Effect::Release(stream));
        }
        if let Some(stream) = self.prefetched.take() {
            effects.push(Effect::Release(stream));
        }
        if let Some(remote) = self.remote.take() {
            effects.push(Effect::DetachRemote(remote));
        }

        effects
    }

    fn teardown(&self) -> Effect {
        Effect::ScheduleTeardown {
            session_id: self.id.clone(),
        }
    }

    fn mark_ended(&mut self) -> DateTime<Utc> {
        let ended_at = Utc::now();
        self.ended_at = Some(ended_at);
        ended_at
    }

    fn record_accepted(&mut self) {
        self.record_event(CallEvent::Accepted(CallAccepted {
            base: CallEventBase::new("call.accepted", &self.id),
        }));
    }

    fn signal(&self, kind: SignalType) -> SignalingEvent {
        SignalingEvent::new(
            kind,
            self.id.clone(),
            self.local_user.clone(),
            self.peer.clone(),
            self.media_kind,
        )
    }

    fn require_status(&self, expected: CallStatus, action: &str) -> Result<()> {
        if self.status != expected {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot {} in {:?}",
                action, self.status
            )));
        }
        Ok(())
    }

    /// Transition to a new status
    fn transition_to(&mut self, new_status: CallStatus) -> Result<()> {
        if !self.status.can_transition_to(&new_status) {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot transition from {:?} to {:?}",
                self.status, new_status
            )));
        }

        self.status = new_status;
        Ok(())
    }

    /// Record a domain event
    fn record_event(&mut self, event: CallEvent) {
        self.events.push(event);
    }

    /// Take all pending events
    pub fn take_events(&mut self) -> Vec<CallEvent> {
        std::mem::take(&mut self.events)
    }

    // Getters
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    pub fn peer(&self) -> &UserId {
        &self.peer
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn local_media(&self) -> &LocalMedia {
        &self.local_media
    }

    /// The owned capture, once it is live and bound to the call
    pub fn local_stream(&self) -> Option<&LocalStream> {
        match &self.local_media {
            LocalMedia::Ready(stream) => Some(stream),
            _ => None,
        }
    }

    /// Whether the local stream slot is held (acquiring or ready)
    pub fn holds_local_stream(&self) -> bool {
        !matches!(self.local_media, LocalMedia::Released)
    }

    pub fn prefetched_stream(&self) -> Option<&LocalStream> {
        self.prefetched.as_ref()
    }

    pub fn is_acquiring(&self) -> bool {
        self.acquiring
    }

    pub fn remote_stream(&self) -> Option<&RemoteStreamRef> {
        self.remote.as_ref()
    }

    pub fn audio_muted(&self) -> bool {
        self.audio_muted
    }

    pub fn video_muted(&self) -> bool {
        self.video_muted
    }

    pub fn end_received(&self) -> bool {
        self.end_received
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    pub fn started_at(&self) -> Option<&DateTime<Utc>> {
        self.started_at.as_ref()
    }

    pub fn ended_at(&self) -> Option<&DateTime<Utc>> {
        self.ended_at.as_ref()
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.started_at
            .map(|started| self.ended_at.unwrap_or_else(Utc::now) - started)
    }

    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::error::SendError;
    use crate::domain::shared::value_objects::StreamId;

    fn outgoing_video() -> CallSession {
        CallSession::outgoing(
            SessionId::new(),
            UserId::from(1),
            UserId::from(42),
            MediaKind::Video,
        )
    }

    fn incoming_audio() -> CallSession {
        CallSession::incoming(
            SessionId::new(),
            UserId::from(1),
            UserId::from(7),
            MediaKind::Audio,
        )
    }

    fn stream(kind: MediaKind) -> LocalStream {
        LocalStream::new(StreamId::new(), kind)
    }

    fn remote() -> RemoteStreamRef {
        RemoteStreamRef::new(StreamId::new())
    }

    fn assert_stream_invariant(call: &CallSession) {
        assert_eq!(
            call.holds_local_stream(),
            call.status().holds_local_stream(),
            "local stream slot out of sync in {:?}",
            call.status()
        );
    }

    fn sent(effects: &[Effect]) -> Vec<(SignalType, SendPolicy)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send { event, policy } => Some((event.kind, *policy)),
                _ => None,
            })
            .collect()
    }

    fn released(effects: &[Effect]) -> usize {
        effects.iter().filter(|e| matches!(e, Effect::Release(_))).count()
    }

    #[test]
    fn test_outgoing_call_lifecycle() {
        let mut call = outgoing_video();
        assert_eq!(call.status(), CallStatus::Idle);

        let effects = call.ring().unwrap();
        assert_eq!(call.status(), CallStatus::Ringing);
        assert_eq!(sent(&effects), vec![(SignalType::Initiate, SendPolicy::Critical)]);
        assert!(effects.iter().any(|e| matches!(e, Effect::Acquire { media_kind: MediaKind::Video, .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::ArmRingTimeout { .. })));
        assert!(call.is_acquiring());
        assert_stream_invariant(&call);

        // Capture finishes before the peer answers: staged, not bound
        let local = stream(MediaKind::Video);
        assert!(call.media_acquired(local.clone()).is_empty());
        assert_eq!(call.prefetched_stream(), Some(&local));
        assert_stream_invariant(&call);

        call.peer_accepted().unwrap();
        assert_eq!(call.status(), CallStatus::Accepted);
        assert_eq!(call.local_stream(), Some(&local));
        assert_stream_invariant(&call);

        let effects = call.remote_media_arrived(remote()).unwrap();
        assert!(matches!(effects.as_slice(), [Effect::AttachRemote { .. }]));
        assert_eq!(call.status(), CallStatus::Active);
        assert!(call.started_at().is_some());

        let effects = call.end_call().unwrap();
        assert_eq!(call.status(), CallStatus::Ended);
        assert_eq!(sent(&effects), vec![(SignalType::End, SendPolicy::BestEffort)]);
        assert_eq!(released(&effects), 1);
        assert!(effects.iter().any(|e| matches!(e, Effect::DetachRemote(_))));
        assert!(effects.iter().any(|e| matches!(e, Effect::ScheduleTeardown { .. })));
        assert!(call.ended_at().is_some());
        assert!(call.remote_stream().is_none());
        assert_stream_invariant(&call);

        let events = call.take_events();
        assert_eq!(events.len(), 4); // Ringing, Accepted, Activated, Ended
        assert!(events.last().unwrap().is_terminal());
    }

    #[test]
    fn test_peer_accepts_before_capture_finishes() {
        let mut call = outgoing_video();
        call.ring().unwrap();

        let effects = call.peer_accepted().unwrap();
        assert!(effects.is_empty());
        assert_eq!(call.local_media(), &LocalMedia::Acquiring);
        assert_stream_invariant(&call);

        call.remote_media_arrived(remote()).unwrap();
        assert_eq!(call.status(), CallStatus::Accepted);

        let effects = call.media_acquired(stream(MediaKind::Video));
        assert!(effects.is_empty());
        assert_eq!(call.status(), CallStatus::Active);
    }

    #[test]
    fn test_incoming_call_defers_capture_until_accept() {
        let mut call = incoming_audio();
        let effects = call.ring().unwrap();
        assert!(effects.is_empty());
        assert!(!call.is_acquiring());

        let effects = call.accept().unwrap();
        assert_eq!(call.status(), CallStatus::Accepted);
        assert!(matches!(effects[0], Effect::Acquire { media_kind: MediaKind::Audio, .. }));
        assert_eq!(sent(&effects), vec![(SignalType::Accept, SendPolicy::Critical)]);
        assert_stream_invariant(&call);
    }

    #[test]
    fn test_local_reject_of_incoming_call() {
        let mut call = incoming_audio();
        call.ring().unwrap();

        let effects = call.reject().unwrap();
        assert_eq!(call.status(), CallStatus::Rejected);
        assert_eq!(sent(&effects), vec![(SignalType::Reject, SendPolicy::BestEffort)]);
        assert_eq!(released(&effects), 0);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Acquire { .. })));
    }

    #[test]
    fn test_outgoing_call_cannot_be_rejected_locally() {
        let mut call = outgoing_video();
        call.ring().unwrap();
        assert!(call.reject().is_err());
        assert_eq!(call.status(), CallStatus::Ringing);
    }

    #[test]
    fn test_peer_reject_releases_prefetched_stream() {
        let mut call = outgoing_video();
        call.ring().unwrap();
        call.media_acquired(stream(MediaKind::Video));

        let effects = call.peer_rejected().unwrap();
        assert_eq!(call.status(), CallStatus::Rejected);
        assert_eq!(released(&effects), 1);
        assert!(sent(&effects).is_empty());
        assert!(call.prefetched_stream().is_none());
    }

    #[test]
    fn test_acquisition_resolving_after_hangup_is_released() {
        let mut call = outgoing_video();
        call.ring().unwrap();
        call.end_call().unwrap();

        let late = stream(MediaKind::Video);
        let effects = call.media_acquired(late.clone());
        assert_eq!(effects, vec![Effect::Release(late)]);
        assert_eq!(call.status(), CallStatus::Ended);
    }

    #[test]
    fn test_peer_end_does_not_echo_end() {
        let mut call = incoming_audio();
        call.ring().unwrap();
        call.accept().unwrap();
        call.media_acquired(stream(MediaKind::Audio));

        let effects = call.peer_ended().unwrap();
        assert!(sent(&effects).is_empty());
        assert_eq!(released(&effects), 1);
        assert!(call.end_received());
    }

    #[test]
    fn test_terminal_states_ignore_further_events() {
        let mut call = incoming_audio();
        call.ring().unwrap();
        call.peer_ended().unwrap();
        call.take_events();

        assert!(call.peer_ended().is_err());
        assert!(call.end_call().is_err());
        assert!(call.accept().is_err());
        assert!(call.toggle_mute(TrackKind::Audio).is_err());
        assert!(call.fail(FailureReason::Timeout).is_err());
        assert!(call.remote_media_arrived(remote()).is_err());
        assert!(call.take_events().is_empty());
        assert_eq!(call.status(), CallStatus::Ended);
    }

    #[test]
    fn test_device_failure_notifies_peer() {
        let mut call = incoming_audio();
        call.ring().unwrap();
        call.accept().unwrap();

        let effects = call.acquisition_failed(DeviceError::PermissionDenied).unwrap();
        assert_eq!(
            call.status(),
            CallStatus::Failed(FailureReason::Device(DeviceError::PermissionDenied))
        );
        assert_eq!(sent(&effects), vec![(SignalType::End, SendPolicy::BestEffort)]);
        assert_stream_invariant(&call);
    }

    #[test]
    fn test_signaling_failure_does_not_send_end() {
        let mut call = outgoing_video();
        call.ring().unwrap();
        call.media_acquired(stream(MediaKind::Video));

        let effects = call.fail(FailureReason::Signaling(SendError::NotConnected)).unwrap();
        assert!(sent(&effects).is_empty());
        assert_eq!(released(&effects), 1);
    }

    #[test]
    fn test_ring_timeout() {
        let mut call = outgoing_video();
        call.ring().unwrap();
        call.media_acquired(stream(MediaKind::Video));

        let effects = call.ring_timeout().unwrap();
        assert_eq!(call.status(), CallStatus::Failed(FailureReason::Timeout));
        assert_eq!(released(&effects), 1);

        let mut answered = outgoing_video();
        answered.ring().unwrap();
        answered.peer_accepted().unwrap();
        assert!(answered.ring_timeout().is_err());
        assert_eq!(answered.status(), CallStatus::Accepted);
    }

    #[test]
    fn test_toggle_mute_only_while_active() {
        let mut call = outgoing_video();
        call.ring().unwrap();
        assert!(call.toggle_mute(TrackKind::Video).is_err());

        let local = stream(MediaKind::Video);
        call.media_acquired(local.clone());
        call.peer_accepted().unwrap();
        call.remote_media_arrived(remote()).unwrap();

        let effects = call.toggle_mute(TrackKind::Video).unwrap();
        assert!(call.video_muted());
        assert!(!call.audio_muted());
        assert_eq!(
            effects,
            vec![Effect::SetTrackEnabled {
                session_id: call.id().clone(),
                stream: local,
                track: TrackKind::Video,
                enabled: false,
            }]
        );

        call.toggle_mute(TrackKind::Video).unwrap();
        assert!(!call.video_muted());
        assert_eq!(call.status(), CallStatus::Active);
    }

    #[test]
    fn test_audio_call_has_no_video_to_mute() {
        let mut call = incoming_audio();
        call.ring().unwrap();
        call.accept().unwrap();
        call.media_acquired(stream(MediaKind::Audio));
        call.remote_media_arrived(remote()).unwrap();
        assert_eq!(call.status(), CallStatus::Active);

        assert!(call.toggle_mute(TrackKind::Video).is_err());
        assert!(!call.video_muted());
    }
}

//! Call session state machine
//!
//! Owns the (at most one) current [`CallSession`] of the local user and maps
//! every input (user intent, inbound signaling, device/network completion,
//! timer) onto a session transition. Synchronous and free of I/O: the
//! controller feeds it one input at a time and runs the returned effects.

use crate::application::projection::CallView;
use crate::domain::call::event::{CallEventBase, CallMissedWhileBusy};
use crate::domain::call::{CallEvent, CallSession, Effect, FailureReason, MediaKind, SendPolicy, TrackKind};
use crate::domain::media::{LocalStream, RemoteStreamRef};
use crate::domain::shared::error::{DeviceError, DomainError, SendError};
use crate::domain::shared::error::Result;
use crate::domain::shared::value_objects::{SessionId, UserId};
use crate::domain::signaling::{ConnectionState, SignalType, SignalingEvent};
use tracing::{debug, info, warn};

/// Who the machine is running for. Passed in explicitly rather than read
/// from ambient application state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub local_user: UserId,
}

impl CallContext {
    pub fn new(local_user: UserId) -> Self {
        Self { local_user }
    }
}

/// Everything that can drive the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallInput {
    /// Local user places a call
    Initiate {
        session_id: SessionId,
        peer: UserId,
        media_kind: MediaKind,
    },
    /// Local user answers the ringing incoming call
    Accept,
    /// Local user declines the ringing incoming call
    Reject,
    /// Local user hangs up
    EndCall,
    /// Local user mutes/unmutes a track
    ToggleMute(TrackKind),
    /// Inbound call-control message
    Signal(SignalingEvent),
    /// `acquire()` resolved
    MediaAcquired {
        session_id: SessionId,
        result: std::result::Result<LocalStream, DeviceError>,
    },
    /// The peer's media arrived
    RemoteMediaArrived {
        session_id: SessionId,
        remote: RemoteStreamRef,
    },
    /// A critical outbound message could not be delivered
    SendFailed {
        session_id: SessionId,
        kind: SignalType,
        error: SendError,
    },
    /// A device operation failed mid-call
    DeviceFault {
        session_id: SessionId,
        error: DeviceError,
    },
    /// Signaling connectivity changed
    ConnectionChanged(ConnectionState),
    RingTimeout {
        session_id: SessionId,
    },
    ReconnectTimeout {
        session_id: SessionId,
        /// Outage the timer was armed for
        outage: u64,
    },
    /// Grace period after a terminal status elapsed
    Teardown {
        session_id: SessionId,
    },
}

impl CallInput {
    pub fn name(&self) -> &'static str {
        match self {
            CallInput::Initiate { .. } => "initiate",
            CallInput::Accept => "accept",
            CallInput::Reject => "reject",
            CallInput::EndCall => "end_call",
            CallInput::ToggleMute(_) => "toggle_mute",
            CallInput::Signal(_) => "signal",
            CallInput::MediaAcquired { .. } => "media_acquired",
            CallInput::RemoteMediaArrived { .. } => "remote_media_arrived",
            CallInput::SendFailed { .. } => "send_failed",
            CallInput::DeviceFault { .. } => "device_fault",
            CallInput::ConnectionChanged(_) => "connection_changed",
            CallInput::RingTimeout { .. } => "ring_timeout",
            CallInput::ReconnectTimeout { .. } => "reconnect_timeout",
            CallInput::Teardown { .. } => "teardown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallSessionMachine {
    context: CallContext,
    session: Option<CallSession>,
    connection: ConnectionState,
    /// Bumped on every disconnect
    outage: u64,
    events: Vec<CallEvent>,
}

impl CallSessionMachine {
    pub fn new(context: CallContext, connection: ConnectionState) -> Self {
        Self {
            context,
            session: None,
            connection,
            outage: 0,
            events: Vec::new(),
        }
    }

    /// Apply one input.
    ///
    /// `Err` means the input was refused by a guard and nothing changed.
    pub fn handle(&mut self, input: CallInput) -> Result<Vec<Effect>> {
        let outcome = match input {
            CallInput::Initiate {
                session_id,
                peer,
                media_kind,
            } => self.initiate(session_id, peer, media_kind),
            CallInput::Accept => self.live_session()?.accept(),
            CallInput::Reject => self.live_session()?.reject(),
            CallInput::EndCall => self.live_session()?.end_call(),
            CallInput::ToggleMute(track) => self.live_session()?.toggle_mute(track),
            CallInput::Signal(event) => self.inbound(event),
            CallInput::MediaAcquired { session_id, result } => {
                self.media_acquired(session_id, result)
            }
            CallInput::RemoteMediaArrived { session_id, remote } => self
                .session_for(&session_id)?
                .remote_media_arrived(remote),
            CallInput::SendFailed {
                session_id,
                kind,
                error,
            } => {
                warn!("Failed to deliver '{}' for session {}: {}", kind, session_id, error);
                self.session_for(&session_id)?
                    .fail(FailureReason::Signaling(error))
            }
            CallInput::DeviceFault { session_id, error } => {
                warn!("Device fault in session {}: {}", session_id, error);
                self.session_for(&session_id)?
                    .fail(FailureReason::Device(error))
            }
            CallInput::ConnectionChanged(state) => Ok(self.connection_changed(state)),
            CallInput::RingTimeout { session_id } => {
                self.session_for(&session_id)?.ring_timeout()
            }
            CallInput::ReconnectTimeout { session_id, outage } => {
                self.reconnect_timeout(session_id, outage)
            }
            CallInput::Teardown { session_id } => self.teardown(session_id),
        };

        self.collect_events();
        outcome
    }

    fn initiate(
        &mut self,
        session_id: SessionId,
        peer: UserId,
        media_kind: MediaKind,
    ) -> Result<Vec<Effect>> {
        if peer == self.context.local_user {
            return Err(DomainError::ValidationError("Cannot call yourself".to_string()));
        }
        if let Some(current) = self.session.as_ref().filter(|s| s.is_live()) {
            return Err(DomainError::Conflict(format!(
                "Already in a call with {} ({})",
                current.peer(),
                current.status().as_str()
            )));
        }

        let mut session = CallSession::outgoing(
            session_id,
            self.context.local_user.clone(),
            peer,
            media_kind,
        );
        let effects = session.ring()?;
        info!(
            "Calling {} ({} call, session {})",
            session.peer(),
            media_kind,
            session.id()
        );
        self.replace_session(session);
        Ok(effects)
    }

    fn inbound(&mut self, event: SignalingEvent) -> Result<Vec<Effect>> {
        if event.to_user_id != self.context.local_user {
            return Err(DomainError::ValidationError(format!(
                "'{}' addressed to {} delivered to {}",
                event.kind, event.to_user_id, self.context.local_user
            )));
        }

        if event.kind == SignalType::Initiate {
            return self.incoming(event);
        }

        let session = self.session_for(&event.session_id)?;
        if session.peer() != &event.from_user_id {
            return Err(DomainError::ValidationError(format!(
                "'{}' for session {} came from {}, not {}",
                event.kind,
                event.session_id,
                event.from_user_id,
                session.peer()
            )));
        }

        match event.kind {
            SignalType::Accept => session.peer_accepted(),
            SignalType::Reject => session.peer_rejected(),
            SignalType::End => session.peer_ended(),
            SignalType::Initiate => Err(DomainError::InvalidOperation(
                "Initiate for an existing session".to_string(),
            )),
        }
    }

    fn incoming(&mut self, event: SignalingEvent) -> Result<Vec<Effect>> {
        if event.from_user_id == self.context.local_user {
            return Err(DomainError::ValidationError("Call from self".to_string()));
        }

        if let Some(current) = self.session.as_ref().filter(|s| s.is_live()) {
            if current.id() == &event.session_id {
                return Err(DomainError::Conflict(format!(
                    "Duplicate initiate for session {}",
                    event.session_id
                )));
            }

            info!(
                "Busy with {}; turning away {} call from {}",
                current.peer(),
                event.media_kind,
                event.from_user_id
            );
            self.events.push(CallEvent::MissedWhileBusy(CallMissedWhileBusy {
                base: CallEventBase::new("call.missed_while_busy", &event.session_id),
                peer: event.from_user_id.clone(),
                media_kind: event.media_kind,
            }));
            let reply = SignalingEvent::new(
                SignalType::Reject,
                event.session_id,
                self.context.local_user.clone(),
                event.from_user_id,
                event.media_kind,
            );
            return Ok(vec![Effect::send(reply, SendPolicy::BestEffort)]);
        }

        let mut session = CallSession::incoming(
            event.session_id,
            self.context.local_user.clone(),
            event.from_user_id,
            event.media_kind,
        );
        let effects = session.ring()?;
        info!(
            "Incoming {} call from {} (session {})",
            session.media_kind(),
            session.peer(),
            session.id()
        );
        self.replace_session(session);
        Ok(effects)
    }

    fn media_acquired(
        &mut self,
        session_id: SessionId,
        result: std::result::Result<LocalStream, DeviceError>,
    ) -> Result<Vec<Effect>> {
        let owner = self
            .session
            .as_mut()
            .filter(|s| s.id() == &session_id);

        match (owner, result) {
            (Some(session), Ok(stream)) => Ok(session.media_acquired(stream)),
            (Some(session), Err(error)) => session.acquisition_failed(error),
            (None, Ok(stream)) => {
                debug!("Capture for finished session {} resolved; releasing", session_id);
                Ok(vec![Effect::Release(stream)])
            }
            (None, Err(error)) => {
                debug!("Capture for finished session {} failed: {}", session_id, error);
                Ok(Vec::new())
            }
        }
    }

    fn connection_changed(&mut self, state: ConnectionState) -> Vec<Effect> {
        if self.connection == state {
            return Vec::new();
        }
        self.connection = state;
        if state == ConnectionState::Disconnected {
            self.outage += 1;
        }

        match (state, self.session.as_ref().filter(|s| s.is_live())) {
            (ConnectionState::Disconnected, Some(session)) => {
                warn!(
                    "Signaling lost during {} call with {}; waiting for reconnect",
                    session.status().as_str(),
                    session.peer()
                );
                vec![Effect::ArmReconnectTimeout {
                    session_id: session.id().clone(),
                    outage: self.outage,
                }]
            }
            (ConnectionState::Connected, Some(session)) => {
                info!("Signaling restored for session {}", session.id());
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn reconnect_timeout(&mut self, session_id: SessionId, outage: u64) -> Result<Vec<Effect>> {
        if self.connection == ConnectionState::Connected {
            return Err(DomainError::InvalidOperation(
                "Signaling already reconnected".to_string(),
            ));
        }
        if outage != self.outage {
            return Err(DomainError::InvalidOperation(format!(
                "Reconnect timer for outage {} outlived it; current outage is {}",
                outage, self.outage
            )));
        }
        self.session_for(&session_id)?.fail(FailureReason::Timeout)
    }

    fn teardown(&mut self, session_id: SessionId) -> Result<Vec<Effect>> {
        match &self.session {
            Some(session) if session.id() == &session_id && session.is_terminal() => {
                debug!("Destroying session {}", session_id);
                self.session = None;
                Ok(Vec::new())
            }
            _ => Err(DomainError::NotFound(format!(
                "No finished session {} to tear down",
                session_id
            ))),
        }
    }

    /// Swap in a new session. Only called when the current one (if any) is
    /// terminal, so it owns nothing anymore.
    fn replace_session(&mut self, session: CallSession) {
        self.collect_events();
        if let Some(previous) = self.session.replace(session) {
            debug_assert!(previous.is_terminal());
            debug!("Dropping finished session {} early", previous.id());
        }
    }

    fn live_session(&mut self) -> Result<&mut CallSession> {
        match self.session.as_mut() {
            Some(session) if !session.is_terminal() => Ok(session),
            _ => Err(DomainError::NotFound("No call in progress".to_string())),
        }
    }

    fn session_for(&mut self, session_id: &SessionId) -> Result<&mut CallSession> {
        match self.session.as_mut() {
            Some(session) if session.id() == session_id => Ok(session),
            _ => Err(DomainError::NotFound(format!("Unknown session {}", session_id))),
        }
    }

    fn collect_events(&mut self) {
        if let Some(session) = self.session.as_mut() {
            self.events.extend(session.take_events());
        }
    }

    /// Take every event recorded since the last call
    pub fn take_events(&mut self) -> Vec<CallEvent> {
        self.collect_events();
        std::mem::take(&mut self.events)
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Snapshot for the UI
    pub fn view(&self) -> CallView {
        CallView::project(self.session.as_ref(), self.connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::CallStatus;
    use crate::domain::shared::value_objects::StreamId;

    const ME: u64 = 1;

    fn machine() -> CallSessionMachine {
        CallSessionMachine::new(CallContext::new(UserId::from(ME)), ConnectionState::Connected)
    }

    fn signal(kind: SignalType, session_id: &SessionId, from: u64, media_kind: MediaKind) -> CallInput {
        CallInput::Signal(SignalingEvent::new(
            kind,
            session_id.clone(),
            UserId::from(from),
            UserId::from(ME),
            media_kind,
        ))
    }

    fn status(machine: &CallSessionMachine) -> CallStatus {
        machine.view().status
    }

    fn call_out(machine: &mut CallSessionMachine, peer: u64) -> SessionId {
        let session_id = SessionId::new();
        machine
            .handle(CallInput::Initiate {
                session_id: session_id.clone(),
                peer: UserId::from(peer),
                media_kind: MediaKind::Video,
            })
            .unwrap();
        session_id
    }

    #[test]
    fn test_second_outgoing_call_is_refused() {
        let mut machine = machine();
        call_out(&mut machine, 42);

        let result = machine.handle(CallInput::Initiate {
            session_id: SessionId::new(),
            peer: UserId::from(43),
            media_kind: MediaKind::Audio,
        });
        assert!(matches!(result, Err(DomainError::Conflict(_))));
        assert_eq!(machine.session().unwrap().peer(), &UserId::from(42));
    }

    #[test]
    fn test_cannot_call_yourself() {
        let mut machine = machine();
        let result = machine.handle(CallInput::Initiate {
            session_id: SessionId::new(),
            peer: UserId::from(ME),
            media_kind: MediaKind::Audio,
        });
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
        assert_eq!(status(&machine), CallStatus::Idle);
    }

    #[test]
    fn test_second_incoming_call_is_rejected_while_busy() {
        let mut machine = machine();
        let first = SessionId::new();
        machine.handle(signal(SignalType::Initiate, &first, 7, MediaKind::Audio)).unwrap();
        machine.take_events();

        let second = SessionId::new();
        let effects = machine
            .handle(signal(SignalType::Initiate, &second, 8, MediaKind::Video))
            .unwrap();

        match effects.as_slice() {
            [Effect::Send { event, policy: SendPolicy::BestEffort }] => {
                assert_eq!(event.kind, SignalType::Reject);
                assert_eq!(event.session_id, second);
                assert_eq!(event.to_user_id, UserId::from(8));
            }
            other => panic!("unexpected effects: {:?}", other),
        }
        assert_eq!(machine.session().unwrap().id(), &first);
        assert_eq!(status(&machine), CallStatus::Ringing);

        let events = machine.take_events();
        assert!(matches!(events.as_slice(), [CallEvent::MissedWhileBusy(_)]));
    }

    #[test]
    fn test_events_for_other_sessions_are_ignored() {
        let mut machine = machine();
        let session_id = call_out(&mut machine, 42);

        let stray = SessionId::new();
        assert!(machine.handle(signal(SignalType::Accept, &stray, 42, MediaKind::Video)).is_err());
        // Right session, wrong sender
        assert!(machine.handle(signal(SignalType::End, &session_id, 99, MediaKind::Video)).is_err());
        assert_eq!(status(&machine), CallStatus::Ringing);
    }

    #[test]
    fn test_messages_for_other_users_are_refused() {
        let mut machine = machine();
        let input = CallInput::Signal(SignalingEvent::new(
            SignalType::Initiate,
            SessionId::new(),
            UserId::from(7),
            UserId::from(99),
            MediaKind::Audio,
        ));
        assert!(machine.handle(input).is_err());
        assert!(machine.session().is_none());
    }

    #[test]
    fn test_duplicate_end_has_no_effect() {
        let mut machine = machine();
        let session_id = SessionId::new();
        machine.handle(signal(SignalType::Initiate, &session_id, 7, MediaKind::Audio)).unwrap();
        machine.handle(CallInput::Accept).unwrap();

        let effects = machine.handle(signal(SignalType::End, &session_id, 7, MediaKind::Audio)).unwrap();
        assert!(!effects.is_empty());
        assert_eq!(status(&machine), CallStatus::Ended);
        let view_after_first = machine.view();
        machine.take_events();

        assert!(machine.handle(signal(SignalType::End, &session_id, 7, MediaKind::Audio)).is_err());
        assert_eq!(machine.view(), view_after_first);
        assert!(machine.take_events().is_empty());
    }

    #[test]
    fn test_late_capture_after_teardown_is_released() {
        let mut machine = machine();
        let session_id = call_out(&mut machine, 42);
        machine.handle(CallInput::EndCall).unwrap();
        machine.handle(CallInput::Teardown { session_id: session_id.clone() }).unwrap();
        assert!(machine.session().is_none());

        let stream = LocalStream::new(StreamId::new(), MediaKind::Video);
        let effects = machine
            .handle(CallInput::MediaAcquired {
                session_id,
                result: Ok(stream.clone()),
            })
            .unwrap();
        assert_eq!(effects, vec![Effect::Release(stream)]);
    }

    #[test]
    fn test_teardown_only_applies_to_terminal_session() {
        let mut machine = machine();
        let session_id = call_out(&mut machine, 42);

        assert!(machine.handle(CallInput::Teardown { session_id: session_id.clone() }).is_err());
        assert!(machine.session().is_some());

        machine.handle(CallInput::EndCall).unwrap();
        machine.handle(CallInput::Teardown { session_id }).unwrap();
        assert!(machine.session().is_none());
        assert_eq!(status(&machine), CallStatus::Idle);
    }

    #[test]
    fn test_new_call_allowed_during_teardown_grace() {
        let mut machine = machine();
        let first = call_out(&mut machine, 42);
        machine.handle(CallInput::EndCall).unwrap();

        let second = call_out(&mut machine, 43);
        assert_eq!(machine.session().unwrap().id(), &second);

        // The first session's grace timer fires later and finds nothing to do
        assert!(machine.handle(CallInput::Teardown { session_id: first }).is_err());
        assert_eq!(status(&machine), CallStatus::Ringing);
    }

    #[test]
    fn test_disconnect_keeps_call_and_arms_reconnect_timeout() {
        let mut machine = machine();
        let session_id = call_out(&mut machine, 42);

        let effects = machine
            .handle(CallInput::ConnectionChanged(ConnectionState::Disconnected))
            .unwrap();
        assert_eq!(
            effects,
            vec![Effect::ArmReconnectTimeout {
                session_id: session_id.clone(),
                outage: 1
            }]
        );
        assert_eq!(status(&machine), CallStatus::Ringing);
        assert!(machine.view().reconnecting());

        machine
            .handle(CallInput::ConnectionChanged(ConnectionState::Connected))
            .unwrap();
        assert!(machine
            .handle(CallInput::ReconnectTimeout { session_id, outage: 1 })
            .is_err());
        assert_eq!(status(&machine), CallStatus::Ringing);
    }

    #[test]
    fn test_timer_from_earlier_outage_does_not_end_call() {
        let mut machine = machine();
        let session_id = call_out(&mut machine, 42);

        machine
            .handle(CallInput::ConnectionChanged(ConnectionState::Disconnected))
            .unwrap();
        machine
            .handle(CallInput::ConnectionChanged(ConnectionState::Connected))
            .unwrap();
        let effects = machine
            .handle(CallInput::ConnectionChanged(ConnectionState::Disconnected))
            .unwrap();
        assert_eq!(
            effects,
            vec![Effect::ArmReconnectTimeout {
                session_id: session_id.clone(),
                outage: 2
            }]
        );

        // First outage's timer expires while the second one is in progress
        assert!(machine
            .handle(CallInput::ReconnectTimeout {
                session_id: session_id.clone(),
                outage: 1
            })
            .is_err());
        assert_eq!(status(&machine), CallStatus::Ringing);
        assert!(machine.view().reconnecting());

        machine
            .handle(CallInput::ReconnectTimeout { session_id, outage: 2 })
            .unwrap();
        assert_eq!(status(&machine), CallStatus::Failed(FailureReason::Timeout));
    }

    #[test]
    fn test_reconnect_timeout_fails_call() {
        let mut machine = machine();
        let session_id = call_out(&mut machine, 42);
        machine
            .handle(CallInput::ConnectionChanged(ConnectionState::Disconnected))
            .unwrap();

        machine
            .handle(CallInput::ReconnectTimeout { session_id, outage: 1 })
            .unwrap();
        assert_eq!(status(&machine), CallStatus::Failed(FailureReason::Timeout));
    }

    #[test]
    fn test_critical_send_failure_fails_call() {
        let mut machine = machine();
        let session_id = call_out(&mut machine, 42);

        machine
            .handle(CallInput::SendFailed {
                session_id,
                kind: SignalType::Initiate,
                error: SendError::NotConnected,
            })
            .unwrap();
        assert_eq!(
            status(&machine),
            CallStatus::Failed(FailureReason::Signaling(SendError::NotConnected))
        );
    }

    #[test]
    fn test_user_intents_without_call_are_refused() {
        let mut machine = machine();
        for input in [
            CallInput::Accept,
            CallInput::Reject,
            CallInput::EndCall,
            CallInput::ToggleMute(TrackKind::Audio),
        ] {
            assert!(matches!(machine.handle(input), Err(DomainError::NotFound(_))));
        }
    }
}

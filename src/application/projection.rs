//! Call UI projection
//!
//! A renderable snapshot derived from the state machine after every input.
//! Every flag the UI needs is computed from `status` and the connection
//! state, never tracked on its own, so the view cannot drift from the
//! session.

use crate::domain::call::{CallDirection, CallSession, CallStatus, FailureReason, MediaKind};
use crate::domain::shared::value_objects::{SessionId, UserId};
use crate::domain::signaling::ConnectionState;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallView {
    pub status: CallStatus,
    pub session_id: Option<SessionId>,
    pub peer: Option<UserId>,
    pub direction: Option<CallDirection>,
    pub media_kind: Option<MediaKind>,
    pub audio_muted: bool,
    pub video_muted: bool,
    pub connection: ConnectionState,
    /// Whether the peer's hang-up ended the call
    pub ended_by_peer: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Message shown once a call is over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TerminalNotice {
    Ended { by_peer: bool },
    Declined,
    Failed { reason: FailureReason },
}

impl TerminalNotice {
    pub fn message(&self) -> &'static str {
        match self {
            TerminalNotice::Ended { by_peer: true } => "The other side hung up",
            TerminalNotice::Ended { by_peer: false } => "Call ended",
            TerminalNotice::Declined => "Call declined",
            TerminalNotice::Failed { reason } => reason.user_message(),
        }
    }
}

impl CallView {
    /// View with no call
    pub fn idle(connection: ConnectionState) -> Self {
        Self {
            status: CallStatus::Idle,
            session_id: None,
            peer: None,
            direction: None,
            media_kind: None,
            audio_muted: false,
            video_muted: false,
            connection,
            ended_by_peer: false,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn project(session: Option<&CallSession>, connection: ConnectionState) -> Self {
        let Some(session) = session else {
            return Self::idle(connection);
        };

        Self {
            status: session.status(),
            session_id: Some(session.id().clone()),
            peer: Some(session.peer().clone()),
            direction: Some(session.direction()),
            media_kind: Some(session.media_kind()),
            audio_muted: session.audio_muted(),
            video_muted: session.video_muted(),
            connection,
            ended_by_peer: session.end_received(),
            started_at: session.started_at().copied(),
            ended_at: session.ended_at().copied(),
        }
    }

    /// Ringing or accepted but media not flowing yet
    pub fn is_connecting(&self) -> bool {
        matches!(self.status, CallStatus::Ringing | CallStatus::Accepted)
    }

    /// Answer/decline prompt for an incoming call
    pub fn show_incoming_prompt(&self) -> bool {
        self.status == CallStatus::Ringing && self.direction == Some(CallDirection::Incoming)
    }

    /// "Calling..." screen with a cancel button
    pub fn show_outgoing_ringing(&self) -> bool {
        self.status == CallStatus::Ringing && self.direction == Some(CallDirection::Outgoing)
    }

    /// Mute and hang-up controls
    pub fn show_call_controls(&self) -> bool {
        self.status == CallStatus::Active
    }

    pub fn can_toggle_video(&self) -> bool {
        self.show_call_controls() && self.media_kind == Some(MediaKind::Video)
    }

    /// Signaling is down while the call is still in progress
    pub fn reconnecting(&self) -> bool {
        self.status.is_live() && self.connection == ConnectionState::Disconnected
    }

    pub fn terminal_notice(&self) -> Option<TerminalNotice> {
        match self.status {
            CallStatus::Ended => Some(TerminalNotice::Ended {
                by_peer: self.ended_by_peer,
            }),
            CallStatus::Rejected => Some(TerminalNotice::Declined),
            CallStatus::Failed(reason) => Some(TerminalNotice::Failed { reason }),
            _ => None,
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.reconnecting() {
            return "Reconnecting...";
        }
        match self.status {
            CallStatus::Idle => "",
            CallStatus::Ringing => match self.direction {
                Some(CallDirection::Incoming) => match self.media_kind {
                    Some(MediaKind::Video) => "Incoming video call",
                    _ => "Incoming voice call",
                },
                _ => "Calling...",
            },
            CallStatus::Accepted => "Connecting...",
            CallStatus::Active => "Connected",
            CallStatus::Ended | CallStatus::Rejected | CallStatus::Failed(_) => self
                .terminal_notice()
                .map(|notice| notice.message())
                .unwrap_or_default(),
        }
    }

    /// Elapsed talk time as `MM:SS` (or `H:MM:SS`)
    pub fn duration_formatted(&self, now: DateTime<Utc>) -> Option<String> {
        let started = self.started_at?;
        let until = self.ended_at.unwrap_or(now);
        let secs = (until - started).num_seconds().max(0);

        let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        Some(if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::media::{LocalStream, RemoteStreamRef};
    use crate::domain::shared::error::DeviceError;
    use crate::domain::shared::value_objects::StreamId;

    fn incoming() -> CallSession {
        let mut session = CallSession::incoming(
            SessionId::new(),
            UserId::from(1),
            UserId::from(2),
            MediaKind::Video,
        );
        session.ring().unwrap();
        session
    }

    #[test]
    fn test_idle_view_shows_nothing() {
        let view = CallView::project(None, ConnectionState::Connected);
        assert_eq!(view.status, CallStatus::Idle);
        assert!(!view.is_connecting());
        assert!(!view.show_incoming_prompt());
        assert!(!view.show_call_controls());
        assert!(view.terminal_notice().is_none());
        assert_eq!(view.status_label(), "");
    }

    #[test]
    fn test_incoming_ringing_shows_prompt() {
        let session = incoming();
        let view = CallView::project(Some(&session), ConnectionState::Connected);
        assert!(view.show_incoming_prompt());
        assert!(!view.show_outgoing_ringing());
        assert!(view.is_connecting());
        assert_eq!(view.status_label(), "Incoming video call");
    }

    #[test]
    fn test_active_call_shows_controls() {
        let mut session = incoming();
        session.accept().unwrap();
        session.media_acquired(LocalStream::new(StreamId::new(), MediaKind::Video));
        session
            .remote_media_arrived(RemoteStreamRef::new(StreamId::new()))
            .unwrap();

        let view = CallView::project(Some(&session), ConnectionState::Connected);
        assert_eq!(view.status, CallStatus::Active);
        assert!(view.show_call_controls());
        assert!(view.can_toggle_video());
        assert!(!view.is_connecting());
        assert_eq!(view.duration_formatted(Utc::now()).as_deref(), Some("00:00"));
    }

    #[test]
    fn test_reconnecting_only_while_live() {
        let mut session = incoming();
        let view = CallView::project(Some(&session), ConnectionState::Disconnected);
        assert!(view.reconnecting());
        assert_eq!(view.status_label(), "Reconnecting...");

        session.reject().unwrap();
        let view = CallView::project(Some(&session), ConnectionState::Disconnected);
        assert!(!view.reconnecting());
    }

    #[test]
    fn test_terminal_notices_are_distinct() {
        let mut declined = incoming();
        declined.reject().unwrap();

        let mut hung_up = incoming();
        hung_up.peer_ended().unwrap();

        let mut failed = incoming();
        failed.accept().unwrap();
        failed.acquisition_failed(DeviceError::PermissionDenied).unwrap();

        let messages: Vec<&str> = [&declined, &hung_up, &failed]
            .iter()
            .map(|s| CallView::project(Some(*s), ConnectionState::Connected))
            .map(|v| v.terminal_notice().unwrap().message())
            .collect();

        assert_eq!(messages[0], "Call declined");
        assert_eq!(messages[1], "The other side hung up");
        assert_eq!(messages[2], DeviceError::PermissionDenied.user_message());
        assert_ne!(messages[0], messages[1]);
    }

    #[test]
    fn test_duration_formatting() {
        let started = Utc::now();
        let view = CallView {
            status: CallStatus::Ended,
            started_at: Some(started),
            ended_at: Some(started + chrono::Duration::seconds(3725)),
            ..CallView::idle(ConnectionState::Connected)
        };
        assert_eq!(view.duration_formatted(Utc::now()).as_deref(), Some("1:02:05"));
    }
}

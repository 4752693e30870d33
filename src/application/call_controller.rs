//! Call controller
//!
//! Async driver around [`CallSessionMachine`]. One task owns the machine and
//! takes inputs from a single queue, so transitions never interleave. Work
//! that suspends runs elsewhere and reports back through the same queue:
//!
//! - outbound messages go through one ordered sender task
//! - release / track / playback operations go through one ordered media task
//! - every `acquire()` runs in its own task
//! - timers are sleeping tasks that post their expiry

use crate::application::call_machine::{CallContext, CallInput, CallSessionMachine};
use crate::application::projection::CallView;
use crate::config::CallConfig;
use crate::domain::call::{CallDirection, CallEvent, Effect, MediaKind, SendPolicy, TrackKind};
use crate::domain::media::{LocalStream, MediaStreamManager, RemoteStreamRef};
use crate::domain::shared::error::{DeviceError, DomainError, Result};
use crate::domain::shared::events::DomainEvent;
use crate::domain::shared::value_objects::{SessionId, UserId};
use crate::domain::signaling::{ChannelEvent, SignalingChannel, SignalingEvent};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Timer durations used by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeouts {
    /// Outgoing call gives up if unanswered
    pub ring: Duration,
    /// Live call fails if signaling stays down this long
    pub reconnect: Duration,
    /// Terminal session is kept for display this long
    pub teardown_grace: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            ring: Duration::from_secs(60),
            reconnect: Duration::from_secs(30),
            teardown_grace: Duration::from_millis(3000),
        }
    }
}

impl From<&CallConfig> for CallTimeouts {
    fn from(config: &CallConfig) -> Self {
        Self {
            ring: Duration::from_secs(config.ring_timeout_secs),
            reconnect: Duration::from_secs(config.reconnect_timeout_secs),
            teardown_grace: Duration::from_millis(config.teardown_grace_ms),
        }
    }
}

enum Command {
    Input {
        input: CallInput,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    Shutdown(oneshot::Sender<()>),
}

impl Command {
    fn input(input: CallInput) -> Self {
        Command::Input { input, reply: None }
    }
}

enum MediaJob {
    Release(LocalStream),
    SetTrackEnabled {
        session_id: SessionId,
        stream: LocalStream,
        track: TrackKind,
        enabled: bool,
    },
    Attach {
        session_id: SessionId,
        remote: RemoteStreamRef,
    },
    Detach(RemoteStreamRef),
}

/// Cloneable entry point for user intents and UI subscriptions
#[derive(Clone)]
pub struct CallHandle {
    local_user: UserId,
    commands: mpsc::UnboundedSender<Command>,
    views: watch::Receiver<CallView>,
    events: broadcast::Sender<CallEvent>,
}

impl CallHandle {
    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    /// Place a call. Returns the new session's id once the call is ringing.
    pub async fn initiate(&self, peer: UserId, media_kind: MediaKind) -> Result<SessionId> {
        let session_id = SessionId::new();
        self.submit(CallInput::Initiate {
            session_id: session_id.clone(),
            peer,
            media_kind,
        })
        .await?;
        Ok(session_id)
    }

    pub async fn accept(&self) -> Result<()> {
        self.submit(CallInput::Accept).await
    }

    pub async fn reject(&self) -> Result<()> {
        self.submit(CallInput::Reject).await
    }

    pub async fn end_call(&self) -> Result<()> {
        self.submit(CallInput::EndCall).await
    }

    pub async fn toggle_mute(&self, track: TrackKind) -> Result<()> {
        self.submit(CallInput::ToggleMute(track)).await
    }

    /// The transport delivered the peer's media for a session
    pub async fn remote_media_arrived(
        &self,
        session_id: SessionId,
        remote: RemoteStreamRef,
    ) -> Result<()> {
        self.submit(CallInput::RemoteMediaArrived { session_id, remote })
            .await
    }

    /// A device stopped working mid-call
    pub async fn report_device_fault(&self, session_id: SessionId, error: DeviceError) -> Result<()> {
        self.submit(CallInput::DeviceFault { session_id, error }).await
    }

    /// Latest snapshot
    pub fn view(&self) -> CallView {
        self.views.borrow().clone()
    }

    /// Receiver notified whenever the snapshot changes
    pub fn watch(&self) -> watch::Receiver<CallView> {
        self.views.clone()
    }

    /// Wait until the snapshot satisfies `predicate`
    pub async fn wait_for(&self, predicate: impl FnMut(&CallView) -> bool) -> Result<CallView> {
        let mut views = self.views.clone();
        let view = views
            .wait_for(predicate)
            .await
            .map_err(|_| DomainError::Stopped)?;
        Ok(view.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Hang up any live call, flush pending sends and releases, then stop
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown(reply)).is_ok() {
            let _ = done.await;
        }
    }

    async fn submit(&self, input: CallInput) -> Result<()> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::Input {
                input,
                reply: Some(reply),
            })
            .map_err(|_| DomainError::Stopped)?;
        outcome.await.map_err(|_| DomainError::Stopped)?
    }
}

pub struct CallController {
    machine: CallSessionMachine,
    timeouts: CallTimeouts,
    commands: mpsc::UnboundedSender<Command>,
    outbound: mpsc::UnboundedSender<(SignalingEvent, SendPolicy)>,
    media_jobs: mpsc::UnboundedSender<MediaJob>,
    media: Arc<dyn MediaStreamManager>,
    views: watch::Sender<CallView>,
    events: broadcast::Sender<CallEvent>,
}

impl CallController {
    /// Wire the machine to its ports and start the controller tasks
    pub fn spawn(
        context: CallContext,
        timeouts: CallTimeouts,
        signaling: Arc<dyn SignalingChannel>,
        media: Arc<dyn MediaStreamManager>,
    ) -> CallHandle {
        let local_user = context.local_user.clone();
        let machine = CallSessionMachine::new(context, signaling.connection_state());

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (views, view_rx) = watch::channel(machine.view());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let inbound = commands.clone();
        signaling.on_event(Arc::new(move |event| {
            let input = match event {
                ChannelEvent::Message(message) => CallInput::Signal(message),
                ChannelEvent::Connection(state) => CallInput::ConnectionChanged(state),
                ChannelEvent::Undeliverable {
                    session_id,
                    kind,
                    error,
                } => CallInput::SendFailed {
                    session_id,
                    kind,
                    error,
                },
            };
            let _ = inbound.send(Command::input(input));
        }));

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let sender_task = tokio::spawn(run_sender(signaling, outbound_rx, commands.clone()));

        let (media_jobs, media_rx) = mpsc::unbounded_channel();
        let media_task = tokio::spawn(run_media(media.clone(), media_rx, commands.clone()));

        let controller = CallController {
            machine,
            timeouts,
            commands: commands.clone(),
            outbound,
            media_jobs,
            media,
            views,
            events: events.clone(),
        };
        tokio::spawn(controller.run(command_rx, sender_task, media_task));

        CallHandle {
            local_user,
            commands,
            views: view_rx,
            events,
        }
    }

    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        sender_task: JoinHandle<()>,
        media_task: JoinHandle<()>,
    ) {
        info!(
            "Call controller started for user {}",
            self.machine.context().local_user
        );

        let mut stopped = None;
        while let Some(command) = command_rx.recv().await {
            match command {
                Command::Input { input, reply } => {
                    let outcome = self.apply(input);
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                }
                Command::Shutdown(reply) => {
                    if self.machine.session().is_some_and(|s| s.is_live()) {
                        let _ = self.apply(CallInput::EndCall);
                    }
                    stopped = Some(reply);
                    break;
                }
            }
        }

        // Late completions still queued get their streams released; anything
        // resolving after this point is released by the acquiring task itself.
        command_rx.close();
        while let Some(command) = command_rx.recv().await {
            match command {
                Command::Input {
                    reply: Some(reply), ..
                } => {
                    let _ = reply.send(Err(DomainError::Stopped));
                }
                Command::Input { input, reply: None } => {
                    let _ = self.apply(input);
                }
                Command::Shutdown(reply) => {
                    let _ = reply.send(());
                }
            }
        }

        drop(self);
        let _ = sender_task.await;
        let _ = media_task.await;
        info!("Call controller stopped");

        if let Some(reply) = stopped {
            let _ = reply.send(());
        }
    }

    /// Feed one input to the machine, run its effects, publish the outcome
    fn apply(&mut self, input: CallInput) -> Result<()> {
        let name = input.name();
        let before = self.machine.view().status;

        let outcome = match self.machine.handle(input) {
            Ok(effects) => {
                for effect in effects {
                    self.dispatch(effect);
                }
                Ok(())
            }
            Err(e) => {
                debug!("Ignored {}: {}", name, e);
                Err(e)
            }
        };

        for event in self.machine.take_events() {
            debug!(
                "Event #{} {} for {}",
                event.sequence(),
                event.event_type(),
                event.session_id()
            );
            record_metrics(&event);
            let _ = self.events.send(event);
        }

        let view = self.machine.view();
        if view.status != before {
            info!(
                "Call {} -> {} ({})",
                before.as_str(),
                view.status.as_str(),
                name
            );
        }
        self.views.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });

        outcome
    }

    fn dispatch(&self, effect: Effect) {
        match effect {
            Effect::Send { event, policy } => {
                if self.outbound.send((event, policy)).is_err() {
                    warn!("Signaling sender stopped; message dropped");
                }
            }
            Effect::Acquire {
                session_id,
                media_kind,
            } => self.acquire(session_id, media_kind),
            Effect::Release(stream) => self.enqueue_media(MediaJob::Release(stream)),
            Effect::SetTrackEnabled {
                session_id,
                stream,
                track,
                enabled,
            } => self.enqueue_media(MediaJob::SetTrackEnabled {
                session_id,
                stream,
                track,
                enabled,
            }),
            Effect::AttachRemote { session_id, remote } => {
                self.enqueue_media(MediaJob::Attach { session_id, remote })
            }
            Effect::DetachRemote(remote) => self.enqueue_media(MediaJob::Detach(remote)),
            Effect::ArmRingTimeout { session_id } => {
                self.after(self.timeouts.ring, CallInput::RingTimeout { session_id })
            }
            Effect::ArmReconnectTimeout { session_id, outage } => self.after(
                self.timeouts.reconnect,
                CallInput::ReconnectTimeout { session_id, outage },
            ),
            Effect::ScheduleTeardown { session_id } => self.after(
                self.timeouts.teardown_grace,
                CallInput::Teardown { session_id },
            ),
        }
    }

    fn acquire(&self, session_id: SessionId, media_kind: MediaKind) {
        let media = self.media.clone();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let result = media.acquire(media_kind).await;
            let late = commands.send(Command::input(CallInput::MediaAcquired {
                session_id: session_id.clone(),
                result,
            }));

            // Controller is gone; nobody else will ever release this capture.
            if let Err(mpsc::error::SendError(Command::Input {
                input:
                    CallInput::MediaAcquired {
                        result: Ok(stream), ..
                    },
                ..
            })) = late
            {
                debug!("Releasing capture for session {} after shutdown", session_id);
                media.release(&stream).await;
            }
        });
    }

    fn enqueue_media(&self, job: MediaJob) {
        if self.media_jobs.send(job).is_err() {
            warn!("Media task stopped; device operation dropped");
        }
    }

    fn after(&self, delay: Duration, input: CallInput) {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(Command::input(input));
        });
    }
}

async fn run_sender(
    signaling: Arc<dyn SignalingChannel>,
    mut outbound: mpsc::UnboundedReceiver<(SignalingEvent, SendPolicy)>,
    commands: mpsc::UnboundedSender<Command>,
) {
    while let Some((event, policy)) = outbound.recv().await {
        match signaling.send(&event).await {
            Ok(ack) => debug!("'{}' for session {} delivered", ack.kind, ack.session_id),
            Err(error) => match policy {
                SendPolicy::Critical => {
                    let _ = commands.send(Command::input(CallInput::SendFailed {
                        session_id: event.session_id,
                        kind: event.kind,
                        error,
                    }));
                }
                SendPolicy::BestEffort => warn!(
                    "Could not deliver '{}' for session {} to {}: {}",
                    event.kind, event.session_id, event.to_user_id, error
                ),
            },
        }
    }
}

async fn run_media(
    media: Arc<dyn MediaStreamManager>,
    mut jobs: mpsc::UnboundedReceiver<MediaJob>,
    commands: mpsc::UnboundedSender<Command>,
) {
    let fault = |session_id: SessionId, error: DeviceError| {
        let _ = commands.send(Command::input(CallInput::DeviceFault { session_id, error }));
    };

    while let Some(job) = jobs.recv().await {
        match job {
            MediaJob::Release(stream) => media.release(&stream).await,
            MediaJob::SetTrackEnabled {
                session_id,
                stream,
                track,
                enabled,
            } => {
                if let Err(error) = media.set_track_enabled(&stream, track, enabled).await {
                    fault(session_id, error);
                }
            }
            MediaJob::Attach { session_id, remote } => {
                if let Err(error) = media.attach_remote(&remote).await {
                    fault(session_id, error);
                }
            }
            MediaJob::Detach(remote) => media.detach_remote(&remote).await,
        }
    }
}

fn record_metrics(event: &CallEvent) {
    match event {
        CallEvent::Ringing(e) if e.direction == CallDirection::Outgoing => {
            counter!("calls_initiated_total").increment(1)
        }
        CallEvent::Ringing(_) => counter!("calls_received_total").increment(1),
        CallEvent::Ended(_) => counter!("calls_terminated_total", "status" => "ended").increment(1),
        CallEvent::Rejected(_) => {
            counter!("calls_terminated_total", "status" => "rejected").increment(1)
        }
        CallEvent::Failed(e) => counter!(
            "calls_terminated_total",
            "status" => "failed",
            "reason" => e.reason.as_str()
        )
        .increment(1),
        CallEvent::MissedWhileBusy(_) => counter!("calls_missed_busy_total").increment(1),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::CallStatus;
    use crate::domain::media::MockMediaStreamManager;
    use crate::domain::shared::error::SendError;
    use crate::domain::shared::value_objects::StreamId;
    use crate::domain::signaling::{
        Ack, ConnectionState, EventHandler, MockSignalingChannel, SignalType,
    };
    use std::sync::Mutex;

    fn fast() -> CallTimeouts {
        CallTimeouts {
            ring: Duration::from_secs(5),
            reconnect: Duration::from_secs(5),
            teardown_grace: Duration::from_millis(100),
        }
    }

    /// Signaling mock that records outbound messages and exposes the handler
    fn signaling(
        fail_with: Option<SendError>,
    ) -> (
        MockSignalingChannel,
        Arc<Mutex<Vec<SignalingEvent>>>,
        Arc<Mutex<Option<EventHandler>>>,
    ) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(Mutex::new(None));

        let mut mock = MockSignalingChannel::new();
        mock.expect_connection_state()
            .return_const(ConnectionState::Connected);
        let slot = handler.clone();
        mock.expect_on_event().returning(move |h| {
            *slot.lock().unwrap() = Some(h);
        });
        let log = sent.clone();
        mock.expect_send().returning(move |event| {
            log.lock().unwrap().push(event.clone());
            match fail_with {
                Some(error) => Err(error),
                None => Ok(Ack::for_event(event)),
            }
        });

        (mock, sent, handler)
    }

    fn devices(result: std::result::Result<(), DeviceError>) -> (MockMediaStreamManager, Arc<Mutex<u32>>) {
        let releases = Arc::new(Mutex::new(0));
        let mut mock = MockMediaStreamManager::new();
        mock.expect_acquire().returning(move |kind| {
            result.map(|_| LocalStream::new(StreamId::new(), kind))
        });
        let counter = releases.clone();
        mock.expect_release().returning(move |_| {
            *counter.lock().unwrap() += 1;
        });
        mock.expect_set_track_enabled().returning(|_, _, _| Ok(()));
        mock.expect_attach_remote().returning(|_| Ok(()));
        mock.expect_detach_remote().returning(|_| ());
        (mock, releases)
    }

    fn spawn(signaling: MockSignalingChannel, media: MockMediaStreamManager) -> CallHandle {
        CallController::spawn(
            CallContext::new(UserId::from(1)),
            fast(),
            Arc::new(signaling),
            Arc::new(media),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_outgoing_call_sends_initiate() {
        let (signaling, sent, _) = signaling(None);
        let (media, _) = devices(Ok(()));
        let handle = spawn(signaling, media);

        let session_id = handle.initiate(UserId::from(2), MediaKind::Audio).await.unwrap();
        assert_eq!(handle.view().status, CallStatus::Ringing);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let sent = sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, SignalType::Initiate);
        assert_eq!(sent[0].session_id, session_id);
        assert_eq!(sent[0].to_user_id, UserId::from(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_errors_reach_caller() {
        let (signaling, _, _) = signaling(None);
        let (media, _) = devices(Ok(()));
        let handle = spawn(signaling, media);

        assert!(matches!(handle.accept().await, Err(DomainError::NotFound(_))));
        handle.initiate(UserId::from(2), MediaKind::Video).await.unwrap();
        assert!(matches!(
            handle.initiate(UserId::from(3), MediaKind::Video).await,
            Err(DomainError::Conflict(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undeliverable_initiate_fails_call() {
        let (signaling, _, _) = signaling(Some(SendError::NotConnected));
        let (media, releases) = devices(Ok(()));
        let handle = spawn(signaling, media);

        handle.initiate(UserId::from(2), MediaKind::Video).await.unwrap();
        let view = handle
            .wait_for(|v| v.status.is_terminal())
            .await
            .unwrap();
        assert_eq!(
            view.terminal_notice().unwrap().message(),
            "Call failed: you are offline."
        );

        // The prefetched capture is released exactly once, whenever it lands
        handle.wait_for(|v| v.status == CallStatus::Idle).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*releases.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_call_times_out() {
        let (signaling, sent, _) = signaling(None);
        let (media, releases) = devices(Ok(()));
        let handle = spawn(signaling, media);

        handle.initiate(UserId::from(2), MediaKind::Audio).await.unwrap();
        let view = handle.wait_for(|v| v.status.is_terminal()).await.unwrap();
        assert_eq!(view.status, CallStatus::Failed(crate::domain::call::FailureReason::Timeout));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*releases.lock().unwrap(), 1);
        let kinds: Vec<SignalType> = sent.lock().unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![SignalType::Initiate, SignalType::End]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incoming_call_answered_by_local_user() {
        let (signaling, sent, handler) = signaling(None);
        let (media, releases) = devices(Ok(()));
        let handle = spawn(signaling, media);
        let mut events = handle.subscribe();

        let session_id = SessionId::new();
        let deliver = handler.lock().unwrap().clone().unwrap();
        deliver(ChannelEvent::Message(SignalingEvent::new(
            SignalType::Initiate,
            session_id.clone(),
            UserId::from(7),
            UserId::from(1),
            MediaKind::Video,
        )));

        let view = handle.wait_for(|v| v.show_incoming_prompt()).await.unwrap();
        assert_eq!(view.peer, Some(UserId::from(7)));
        assert!(matches!(events.recv().await.unwrap(), CallEvent::Ringing(_)));

        handle.accept().await.unwrap();
        handle
            .remote_media_arrived(session_id.clone(), RemoteStreamRef::new(StreamId::new()))
            .await
            .unwrap();
        handle.wait_for(|v| v.show_call_controls()).await.unwrap();

        handle.toggle_mute(TrackKind::Video).await.unwrap();
        assert!(handle.view().video_muted);

        handle.end_call().await.unwrap();
        handle.wait_for(|v| v.status == CallStatus::Idle).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*releases.lock().unwrap(), 1);
        let kinds: Vec<SignalType> = sent.lock().unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![SignalType::Accept, SignalType::End]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_window_restarts_on_each_outage() {
        let (signaling, _, handler) = signaling(None);
        let (media, _) = devices(Ok(()));
        let handle = spawn(signaling, media);

        let deliver = handler.lock().unwrap().clone().unwrap();
        deliver(ChannelEvent::Message(SignalingEvent::new(
            SignalType::Initiate,
            SessionId::new(),
            UserId::from(7),
            UserId::from(1),
            MediaKind::Audio,
        )));
        handle.wait_for(|v| v.show_incoming_prompt()).await.unwrap();
        handle.accept().await.unwrap();

        deliver(ChannelEvent::Connection(ConnectionState::Disconnected));
        tokio::time::sleep(Duration::from_secs(1)).await;
        deliver(ChannelEvent::Connection(ConnectionState::Connected));
        tokio::time::sleep(Duration::from_secs(3)).await;
        deliver(ChannelEvent::Connection(ConnectionState::Disconnected));

        // The first outage's timer has expired by now
        tokio::time::sleep(Duration::from_millis(4900)).await;
        let view = handle.view();
        assert_eq!(view.status, CallStatus::Accepted);
        assert!(view.reconnecting());

        let view = handle.wait_for(|v| v.status.is_terminal()).await.unwrap();
        assert_eq!(
            view.status,
            CallStatus::Failed(crate::domain::call::FailureReason::Timeout)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_hangs_up() {
        let (signaling, sent, _) = signaling(None);
        let (media, _) = devices(Ok(()));
        let handle = spawn(signaling, media);

        handle.initiate(UserId::from(2), MediaKind::Audio).await.unwrap();
        handle.shutdown().await;

        let kinds: Vec<SignalType> = sent.lock().unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![SignalType::Initiate, SignalType::End]);
        assert!(matches!(handle.end_call().await, Err(DomainError::Stopped)));
    }
}

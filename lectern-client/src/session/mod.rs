mod commands;
mod frames;
mod internal;
mod peer;

use crate::chat::ChatLog;
use crate::error::{SessionError, TransportError};
use crate::link::{LinkEvent, PeerLinkFactory, RemoteTrack};
use crate::media::{CaptureRequest, MediaSource, MediaStream};
use crate::session::peer::PeerHandle;
use crate::transport::SignalTransport;
use lectern_core::{
    ChatMessage, ClientFrame, LectureId, ParticipantInfo, Role, ServerFrame, SessionId,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub lecture_id: LectureId,
    pub email: String,
    pub role: Role,
    pub name: String,
    /// How long a negotiation may run before it reaches a first remote
    /// track. Expiry fails that peer only.
    pub negotiation_timeout: Duration,
}

impl SessionConfig {
    pub fn new(
        lecture_id: impl Into<LectureId>,
        email: impl Into<String>,
        role: Role,
        name: impl Into<String>,
    ) -> Self {
        Self {
            lecture_id: lecture_id.into(),
            email: email.into(),
            role,
            name: name.into(),
            negotiation_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Joined,
    Connected,
    Leaving,
}

/// What the session surfaces to its consumer (the UI layer).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),
    RosterReplaced(Vec<ParticipantInfo>),
    ParticipantJoined(ParticipantInfo),
    ParticipantLeft(SessionId),
    /// First (and any further) inbound media for a remote session.
    RemoteStream {
        session_id: SessionId,
        track: RemoteTrack,
    },
    Chat(ChatMessage),
    ScreenShareChanged(bool),
    Error(SessionError),
    /// The room terminated (the instructor left or the lecture ended).
    Ended,
}

pub(crate) enum UserCommand {
    SendChat(String),
    StartScreenShare,
    StopScreenShare,
    SetMuted(bool),
    SetVideoEnabled(bool),
    Leave,
}

/// Completions of spawned negotiation steps, fed back into the driver so
/// the read loop never blocks on them.
pub(crate) enum Internal {
    OfferReady { target: SessionId, sdp: Value },
    AnswerReady { target: SessionId, sdp: Value },
    RemoteDescribed { target: SessionId },
    NegotiationFailed { target: SessionId, message: String },
    NegotiationTimeout { target: SessionId },
    ScreenCaptureEnded,
}

/// Cloneable control surface for a running session. Dropping every handle
/// tears the session down.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<UserCommand>,
}

impl SessionHandle {
    pub fn send_chat(&self, message: impl Into<String>) {
        let _ = self.tx.send(UserCommand::SendChat(message.into()));
    }

    pub fn start_screen_share(&self) {
        let _ = self.tx.send(UserCommand::StartScreenShare);
    }

    pub fn stop_screen_share(&self) {
        let _ = self.tx.send(UserCommand::StopScreenShare);
    }

    /// Local-only: toggles the shared mic tracks, no renegotiation.
    pub fn set_muted(&self, muted: bool) {
        let _ = self.tx.send(UserCommand::SetMuted(muted));
    }

    /// Local-only: toggles the shared camera tracks.
    pub fn set_video_enabled(&self, enabled: bool) {
        let _ = self.tx.send(UserCommand::SetVideoEnabled(enabled));
    }

    pub fn leave(&self) {
        let _ = self.tx.send(UserCommand::Leave);
    }
}

/// Per-client orchestrator: owns local media and one peer link per remote
/// session, and translates server frames into the negotiation sequence.
pub struct LectureSession {
    pub(crate) config: SessionConfig,
    pub(crate) media: Arc<dyn MediaSource>,
    pub(crate) links: Arc<dyn PeerLinkFactory>,
    pub(crate) state: SessionState,
    pub(crate) outbound: mpsc::Sender<ClientFrame>,
    pub(crate) events: mpsc::UnboundedSender<SessionEvent>,
    pub(crate) internal_tx: mpsc::UnboundedSender<Internal>,
    pub(crate) link_events_tx: mpsc::UnboundedSender<(SessionId, LinkEvent)>,
    pub(crate) peers: HashMap<SessionId, PeerHandle>,
    pub(crate) roster: HashMap<SessionId, ParticipantInfo>,
    pub(crate) local: Option<MediaStream>,
    pub(crate) screen: Option<MediaStream>,
    pub(crate) screen_sharing: bool,
    pub(crate) chat: ChatLog,
    /// The server never tells a session its own id and never echoes its
    /// chat; local echo entries are keyed with this surrogate.
    pub(crate) local_chat_id: SessionId,
    pub(crate) misc_tasks: Vec<AbortHandle>,
}

impl LectureSession {
    /// Acquire local media, open the signaling channel, send the join and
    /// spawn the driver task. Media failure is non-fatal: it is surfaced
    /// and the session proceeds without local tracks.
    pub async fn connect(
        config: SessionConfig,
        media: Arc<dyn MediaSource>,
        links: Arc<dyn PeerLinkFactory>,
        transport: Arc<dyn SignalTransport>,
    ) -> Result<(SessionHandle, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let request = if config.role.is_instructor() {
            CaptureRequest {
                video: true,
                audio: true,
            }
        } else {
            CaptureRequest {
                video: false,
                audio: true,
            }
        };
        let local = match media.capture(request).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "local capture failed, continuing without media");
                let _ = event_tx.send(SessionEvent::Error(SessionError::MediaAccess(e)));
                None
            }
        };

        let channel = transport
            .connect(&config.lecture_id)
            .await
            .map_err(SessionError::SignalingChannel)?;
        channel
            .outbound
            .send(ClientFrame::Join {
                lecture_id: config.lecture_id.clone(),
                email: config.email.clone(),
                role: config.role,
                name: config.name.clone(),
            })
            .await
            .map_err(|_| SessionError::SignalingChannel(TransportError::Closed))?;

        let (user_tx, user_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        let session = LectureSession {
            config,
            media,
            links,
            state: SessionState::Connecting,
            outbound: channel.outbound,
            events: event_tx,
            internal_tx,
            link_events_tx: link_tx,
            peers: HashMap::new(),
            roster: HashMap::new(),
            local,
            screen: None,
            screen_sharing: false,
            chat: ChatLog::new(),
            local_chat_id: SessionId::new(),
            misc_tasks: Vec::new(),
        };
        session.emit(SessionEvent::StateChanged(SessionState::Connecting));

        tokio::spawn(session.run(channel.inbound, user_rx, internal_rx, link_rx));

        Ok((SessionHandle { tx: user_tx }, event_rx))
    }

    async fn run(
        mut self,
        mut inbound: mpsc::Receiver<ServerFrame>,
        mut user_rx: mpsc::UnboundedReceiver<UserCommand>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
        mut link_rx: mpsc::UnboundedReceiver<(SessionId, LinkEvent)>,
    ) {
        loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(frame) => {
                        if self.handle_frame(frame).await {
                            break;
                        }
                    }
                    None => {
                        if !matches!(self.state, SessionState::Leaving | SessionState::Idle) {
                            self.emit(SessionEvent::Error(SessionError::SignalingChannel(
                                TransportError::Closed,
                            )));
                        }
                        self.teardown(false).await;
                        break;
                    }
                },
                cmd = user_rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_user(cmd).await {
                            break;
                        }
                    }
                    // every handle is gone: leave gracefully
                    None => {
                        self.teardown(true).await;
                        break;
                    }
                },
                Some(ev) = internal_rx.recv() => self.handle_internal(ev).await,
                Some((session_id, ev)) = link_rx.recv() => {
                    self.handle_link_event(session_id, ev).await;
                }
            }
        }
        debug!("session driver finished");
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) async fn send_frame(&self, frame: ClientFrame) {
        if self.outbound.send(frame).await.is_err() {
            debug!("signaling channel gone, frame dropped");
        }
    }

    pub(crate) fn local_chat_message(&self, message: String) -> ChatMessage {
        ChatMessage {
            from_session_id: self.local_chat_id,
            from_email: self.config.email.clone(),
            from_name: self.config.name.clone(),
            from_role: self.config.role,
            message,
            timestamp: now_millis(),
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

use crate::error::RoomError;
use crate::room::{JoinAck, JoinIdentity, RoomCommand};
use lectern_core::{ChatMessage, ClientFrame, LectureId, ParticipantInfo, ServerFrame, SessionId};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub max_participants: usize,
    pub max_chat_len: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_participants: 100,
            max_chat_len: 2000,
        }
    }
}

struct Participant {
    info: ParticipantInfo,
    sink: mpsc::UnboundedSender<ServerFrame>,
}

/// One live lecture room. Runs as its own task consuming commands in
/// arrival order, which is what preserves per-sender relay ordering.
pub struct Room {
    lecture_id: LectureId,
    config: RoomConfig,
    participants: HashMap<SessionId, Participant>,
    instructor: Option<SessionId>,
    screen_sharing: bool,
    last_chat_ts: i64,
    command_rx: mpsc::Receiver<RoomCommand>,
}

impl Room {
    pub fn new(
        lecture_id: LectureId,
        config: RoomConfig,
        command_rx: mpsc::Receiver<RoomCommand>,
    ) -> Self {
        Self {
            lecture_id,
            config,
            participants: HashMap::new(),
            instructor: None,
            screen_sharing: false,
            last_chat_ts: 0,
            command_rx,
        }
    }

    /// Consume commands until the room terminates: the instructor leaves,
    /// the roster drains, or every command sender is dropped.
    pub async fn run(mut self) {
        info!(lecture = %self.lecture_id, "room started");

        while let Some(cmd) = self.command_rx.recv().await {
            if self.handle_command(cmd) {
                break;
            }
        }

        info!(lecture = %self.lecture_id, "room closed");
    }

    /// Returns true when the room should shut down.
    fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                identity,
                sink,
                reply,
            } => {
                let res = self.handle_join(identity, sink);
                let _ = reply.send(res);
                false
            }
            RoomCommand::Frame { session_id, frame } => self.handle_frame(session_id, frame),
            RoomCommand::Disconnect { session_id } => self.remove_session(session_id),
        }
    }

    fn handle_join(
        &mut self,
        identity: JoinIdentity,
        sink: mpsc::UnboundedSender<ServerFrame>,
    ) -> Result<JoinAck, RoomError> {
        // Same identity joining again is a reconnect: the stale session is
        // evicted first so its peers tear down their connections.
        let stale = self
            .participants
            .iter()
            .find(|(_, p)| p.info.email == identity.email)
            .map(|(id, _)| *id);
        if let Some(old) = stale {
            info!(lecture = %self.lecture_id, session = %old, "reconnect, evicting stale session");
            self.evict(old);
        }

        if identity.role.is_instructor() && self.instructor.is_some() {
            return Err(RoomError::InstructorPresent(self.lecture_id.clone()));
        }
        if self.participants.len() >= self.config.max_participants {
            return Err(RoomError::RoomFull(self.lecture_id.clone()));
        }

        let session_id = SessionId::new();
        let info = ParticipantInfo {
            session_id,
            email: identity.email,
            role: identity.role,
            name: identity.name,
        };

        // Roster snapshot to the joiner (its own entry excluded), then the
        // delta to everyone already present.
        let roster: Vec<ParticipantInfo> =
            self.participants.values().map(|p| p.info.clone()).collect();
        let _ = sink.send(ServerFrame::Participants {
            participants: roster,
        });
        self.broadcast(ServerFrame::UserJoined {
            session_id,
            email: info.email.clone(),
            role: info.role,
            name: info.name.clone(),
        });

        if info.role.is_instructor() {
            self.instructor = Some(session_id);
            // a reconnected instructor must re-announce any screen share
            self.screen_sharing = false;
        } else if let Some(instructor) = self.instructor {
            // The instructor always initiates toward each student, which
            // bounds the room to O(n) connections.
            self.send_to(
                instructor,
                ServerFrame::CreateOffer {
                    target_session_id: session_id,
                },
            );
        }

        info!(
            lecture = %self.lecture_id,
            session = %session_id,
            email = %info.email,
            role = ?info.role,
            "participant joined"
        );
        self.participants.insert(session_id, Participant { info, sink });

        Ok(JoinAck { session_id })
    }

    fn handle_frame(&mut self, session_id: SessionId, frame: ClientFrame) -> bool {
        if !self.participants.contains_key(&session_id) {
            // Evicted while frames were in flight; nothing to do.
            debug!(lecture = %self.lecture_id, session = %session_id, "frame from stale session");
            return false;
        }

        match frame {
            ClientFrame::Offer {
                target_session_id,
                sdp,
            } => self.relay(
                target_session_id,
                ServerFrame::Offer {
                    from_session_id: session_id,
                    sdp,
                },
            ),
            ClientFrame::Answer {
                target_session_id,
                sdp,
            } => self.relay(
                target_session_id,
                ServerFrame::Answer {
                    from_session_id: session_id,
                    sdp,
                },
            ),
            ClientFrame::IceCandidate {
                target_session_id,
                candidate,
            } => self.relay(
                target_session_id,
                ServerFrame::IceCandidate {
                    from_session_id: session_id,
                    candidate,
                },
            ),
            ClientFrame::Chat { message } => self.handle_chat(session_id, message),
            ClientFrame::ScreenShareStart => self.set_screen_share(session_id, true),
            ClientFrame::ScreenShareStop => self.set_screen_share(session_id, false),
            ClientFrame::Leave => return self.remove_session(session_id),
            ClientFrame::Join { .. } => {
                warn!(lecture = %self.lecture_id, session = %session_id, "join frame after joining");
                self.send_to(session_id, ServerFrame::error("already joined"));
            }
        }

        false
    }

    /// Forward a signaling payload verbatim. A target that left in the
    /// meantime is a no-op, not an error.
    fn relay(&self, target: SessionId, frame: ServerFrame) {
        match self.participants.get(&target) {
            Some(p) => {
                let _ = p.sink.send(frame);
            }
            None => debug!(lecture = %self.lecture_id, target = %target, "relay target gone"),
        }
    }

    fn handle_chat(&mut self, session_id: SessionId, message: String) {
        if message.trim().is_empty() {
            self.send_to(
                session_id,
                ServerFrame::error(RoomError::InvalidChat("empty message").to_string()),
            );
            return;
        }
        if message.len() > self.config.max_chat_len {
            self.send_to(
                session_id,
                ServerFrame::error(RoomError::InvalidChat("message too long").to_string()),
            );
            return;
        }

        let Some(sender) = self.participants.get(&session_id) else {
            return;
        };

        // Clamped so a clock step back never reorders a sender's messages.
        let ts = now_millis().max(self.last_chat_ts);
        self.last_chat_ts = ts;

        let msg = ChatMessage {
            from_session_id: session_id,
            from_email: sender.info.email.clone(),
            from_name: sender.info.name.clone(),
            from_role: sender.info.role,
            message,
            timestamp: ts,
        };
        self.broadcast_except(session_id, ServerFrame::Chat(msg));
    }

    fn set_screen_share(&mut self, session_id: SessionId, on: bool) {
        let is_instructor = self
            .participants
            .get(&session_id)
            .map(|p| p.info.role.is_instructor())
            .unwrap_or(false);
        if !is_instructor {
            self.send_to(
                session_id,
                ServerFrame::error(RoomError::NotInstructor.to_string()),
            );
            return;
        }
        if self.screen_sharing == on {
            return;
        }

        self.screen_sharing = on;
        info!(lecture = %self.lecture_id, sharing = on, "screen share toggled");
        self.broadcast(if on {
            ServerFrame::ScreenShareStart
        } else {
            ServerFrame::ScreenShareStop
        });
    }

    /// Remove a session and notify the room. Terminates the room when the
    /// instructor leaves (no secondary source of the primary stream) or the
    /// roster drains. Idempotent for already-removed sessions.
    fn remove_session(&mut self, session_id: SessionId) -> bool {
        let Some(participant) = self.participants.remove(&session_id) else {
            return false;
        };
        info!(
            lecture = %self.lecture_id,
            session = %session_id,
            email = %participant.info.email,
            "participant left"
        );
        self.broadcast(ServerFrame::UserLeft { session_id });

        if self.instructor == Some(session_id) {
            info!(lecture = %self.lecture_id, "instructor left, ending lecture room");
            self.instructor = None;
            self.screen_sharing = false;
            self.broadcast(ServerFrame::LectureEnded);
            self.participants.clear();
            return true;
        }

        self.participants.is_empty()
    }

    /// Remove a stale session during a reconnect without the
    /// instructor-termination path.
    fn evict(&mut self, session_id: SessionId) {
        self.participants.remove(&session_id);
        if self.instructor == Some(session_id) {
            self.instructor = None;
        }
        self.broadcast(ServerFrame::UserLeft { session_id });
    }

    fn send_to(&self, session_id: SessionId, frame: ServerFrame) {
        if let Some(p) = self.participants.get(&session_id) {
            let _ = p.sink.send(frame);
        }
    }

    fn broadcast(&self, frame: ServerFrame) {
        for p in self.participants.values() {
            let _ = p.sink.send(frame.clone());
        }
    }

    fn broadcast_except(&self, excluded: SessionId, frame: ServerFrame) {
        for (id, p) in &self.participants {
            if *id != excluded {
                let _ = p.sink.send(frame.clone());
            }
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

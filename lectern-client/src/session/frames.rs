use crate::error::SessionError;
use crate::media::MediaTrack;
use crate::session::peer::{NegotiationRole, PeerHandle};
use crate::session::{Internal, LectureSession, SessionEvent, SessionState};
use lectern_core::{ParticipantInfo, ServerFrame, SessionId};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::link::PeerLink;

impl LectureSession {
    /// Dispatch one server frame. Returns true when the session is over.
    /// Negotiation work is spawned, never awaited here, so handling a slow
    /// peer cannot stall the frames behind it.
    pub(crate) async fn handle_frame(&mut self, frame: ServerFrame) -> bool {
        match frame {
            ServerFrame::Participants { participants } => {
                self.roster = participants
                    .iter()
                    .map(|p| (p.session_id, p.clone()))
                    .collect();
                self.state = SessionState::Joined;
                self.emit(SessionEvent::RosterReplaced(participants));
                self.emit(SessionEvent::StateChanged(SessionState::Joined));
            }

            ServerFrame::UserJoined {
                session_id,
                email,
                role,
                name,
            } => {
                let info = ParticipantInfo {
                    session_id,
                    email,
                    role,
                    name,
                };
                self.roster.insert(session_id, info.clone());
                self.emit(SessionEvent::ParticipantJoined(info));
            }

            ServerFrame::UserLeft { session_id } => {
                self.roster.remove(&session_id);
                self.drop_peer(session_id);
                self.emit(SessionEvent::ParticipantLeft(session_id));
            }

            ServerFrame::CreateOffer { target_session_id } => {
                self.begin_offer(target_session_id).await;
            }

            ServerFrame::Offer {
                from_session_id,
                sdp,
            } => self.begin_answer(from_session_id, sdp).await,

            ServerFrame::Answer {
                from_session_id,
                sdp,
            } => self.apply_answer(from_session_id, sdp),

            ServerFrame::IceCandidate {
                from_session_id,
                candidate,
            } => self.apply_candidate(from_session_id, candidate),

            ServerFrame::Chat(msg) => {
                self.chat.append(msg.clone());
                self.emit(SessionEvent::Chat(msg));
            }

            // Our own toggle is authoritative locally; only the echo of a
            // remote instructor's toggle is surfaced.
            ServerFrame::ScreenShareStart => {
                if !self.config.role.is_instructor() {
                    self.emit(SessionEvent::ScreenShareChanged(true));
                }
            }
            ServerFrame::ScreenShareStop => {
                if !self.config.role.is_instructor() {
                    self.emit(SessionEvent::ScreenShareChanged(false));
                }
            }

            ServerFrame::LectureEnded => {
                self.emit(SessionEvent::Ended);
                self.teardown(false).await;
                return true;
            }

            ServerFrame::Error { message } => {
                if self.state == SessionState::Connecting {
                    // Rejected before the roster: the join failed.
                    self.emit(SessionEvent::Error(SessionError::RoomState(message)));
                    self.teardown(false).await;
                    return true;
                }
                self.emit(SessionEvent::Error(SessionError::Protocol(message)));
            }
        }

        false
    }

    /// Offerer side: the server directed us to initiate toward a student.
    async fn begin_offer(&mut self, target: SessionId) {
        if self.peers.contains_key(&target) {
            // re-issued directive: start over with a clean link
            self.drop_peer(target);
        }
        let Some(link) = self.create_link(target, NegotiationRole::Offerer).await else {
            return;
        };

        let tracks = self.outgoing_tracks();
        let tx = self.internal_tx.clone();
        let task = tokio::spawn(async move {
            for track in &tracks {
                if let Err(e) = link.add_track(track).await {
                    let _ = tx.send(Internal::NegotiationFailed {
                        target,
                        message: e.to_string(),
                    });
                    return;
                }
            }
            match link.create_offer().await {
                Ok(sdp) => {
                    let _ = tx.send(Internal::OfferReady { target, sdp });
                }
                Err(e) => {
                    let _ = tx.send(Internal::NegotiationFailed {
                        target,
                        message: e.to_string(),
                    });
                }
            }
        });
        if let Some(peer) = self.peers.get_mut(&target) {
            peer.track_task(task.abort_handle());
        }
    }

    /// Answerer side. An offer for an already-live link is a renegotiation
    /// (new tracks on the other side): reuse the link, skip track attach.
    async fn begin_answer(&mut self, from: SessionId, sdp: Value) {
        let (link, attach) = match self.peers.get(&from) {
            Some(peer) => (peer.link.clone(), false),
            None => {
                let Some(link) = self.create_link(from, NegotiationRole::Answerer).await else {
                    return;
                };
                (link, true)
            }
        };

        let tracks = if attach {
            self.outgoing_tracks()
        } else {
            Vec::new()
        };
        let tx = self.internal_tx.clone();
        let task = tokio::spawn(async move {
            for track in &tracks {
                if let Err(e) = link.add_track(track).await {
                    let _ = tx.send(Internal::NegotiationFailed {
                        target: from,
                        message: e.to_string(),
                    });
                    return;
                }
            }
            match link.accept_offer(sdp).await {
                Ok(answer) => {
                    let _ = tx.send(Internal::AnswerReady {
                        target: from,
                        sdp: answer,
                    });
                }
                Err(e) => {
                    let _ = tx.send(Internal::NegotiationFailed {
                        target: from,
                        message: e.to_string(),
                    });
                }
            }
        });
        if let Some(peer) = self.peers.get_mut(&from) {
            peer.track_task(task.abort_handle());
        }
    }

    fn apply_answer(&mut self, from: SessionId, sdp: Value) {
        let Some(peer) = self.peers.get_mut(&from) else {
            debug!(%from, "answer for unknown peer");
            return;
        };
        let link = peer.link.clone();
        let tx = self.internal_tx.clone();
        let task = tokio::spawn(async move {
            match link.accept_answer(sdp).await {
                Ok(()) => {
                    let _ = tx.send(Internal::RemoteDescribed { target: from });
                }
                Err(e) => {
                    let _ = tx.send(Internal::NegotiationFailed {
                        target: from,
                        message: e.to_string(),
                    });
                }
            }
        });
        peer.track_task(task.abort_handle());
    }

    fn apply_candidate(&mut self, from: SessionId, candidate: Value) {
        let Some(peer) = self.peers.get_mut(&from) else {
            debug!(%from, "candidate for unknown peer");
            return;
        };
        if !peer.remote_described {
            peer.pending_candidates.push(candidate);
            return;
        }
        let link = peer.link.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = link.add_ice_candidate(candidate).await {
                warn!(%from, error = %e, "failed to add ice candidate");
            }
        });
        peer.track_task(task.abort_handle());
    }

    async fn create_link(
        &mut self,
        target: SessionId,
        role: NegotiationRole,
    ) -> Option<Arc<dyn PeerLink>> {
        match self.links.create(target, self.link_events_tx.clone()).await {
            Ok(link) => {
                debug!(%target, ?role, "peer link created");
                let mut peer = PeerHandle::new(link.clone(), role);

                let tx = self.internal_tx.clone();
                let timeout = self.config.negotiation_timeout;
                let deadline = tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    let _ = tx.send(Internal::NegotiationTimeout { target });
                });
                peer.set_deadline(deadline.abort_handle());

                self.peers.insert(target, peer);
                Some(link)
            }
            Err(e) => {
                self.emit(SessionEvent::Error(SessionError::Negotiation(
                    target,
                    e.to_string(),
                )));
                None
            }
        }
    }

    /// Camera/mic tracks plus any active screen tracks, for attaching to a
    /// fresh link. Handles are shared, not copied.
    pub(crate) fn outgoing_tracks(&self) -> Vec<MediaTrack> {
        let mut tracks: Vec<MediaTrack> = self
            .local
            .iter()
            .flat_map(|s| s.tracks.iter().cloned())
            .collect();
        if let Some(screen) = &self.screen {
            tracks.extend(screen.tracks.iter().cloned());
        }
        tracks
    }

    pub(crate) fn drop_peer(&mut self, session_id: SessionId) {
        if let Some(mut peer) = self.peers.remove(&session_id) {
            peer.abort_pending();
            debug!(%session_id, role = ?peer.role, "peer link dropped");
            let link = peer.link;
            tokio::spawn(async move {
                link.close().await;
            });
        }
    }
}

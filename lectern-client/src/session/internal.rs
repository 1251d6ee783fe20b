use crate::error::SessionError;
use crate::link::{LinkEvent, LinkState};
use crate::session::{Internal, LectureSession, SessionEvent, SessionState};
use lectern_core::{ClientFrame, SessionId};
use tracing::{debug, warn};

impl LectureSession {
    pub(crate) async fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::OfferReady { target, sdp } => {
                // The peer may have been torn down while the offer was
                // being produced.
                if self.peers.contains_key(&target) {
                    self.send_frame(ClientFrame::Offer {
                        target_session_id: target,
                        sdp,
                    })
                    .await;
                }
            }

            Internal::AnswerReady { target, sdp } => {
                let known = match self.peers.get_mut(&target) {
                    Some(peer) => {
                        // accept_offer installed the remote description
                        peer.remote_described = true;
                        true
                    }
                    None => false,
                };
                if known {
                    self.flush_pending(target);
                    self.send_frame(ClientFrame::Answer {
                        target_session_id: target,
                        sdp,
                    })
                    .await;
                }
            }

            Internal::RemoteDescribed { target } => {
                if let Some(peer) = self.peers.get_mut(&target) {
                    peer.remote_described = true;
                }
                self.flush_pending(target);
            }

            Internal::NegotiationFailed { target, message } => {
                warn!(%target, %message, "negotiation failed");
                self.emit(SessionEvent::Error(SessionError::Negotiation(
                    target, message,
                )));
                self.drop_peer(target);
            }

            Internal::NegotiationTimeout { target } => {
                let expired = self.peers.get(&target).is_some_and(|p| !p.connected);
                if expired {
                    self.emit(SessionEvent::Error(SessionError::Negotiation(
                        target,
                        "negotiation timed out".into(),
                    )));
                    self.drop_peer(target);
                }
            }

            Internal::ScreenCaptureEnded => {
                // Same path as an explicit stop.
                self.stop_screen_share().await;
            }
        }
    }

    pub(crate) async fn handle_link_event(&mut self, session_id: SessionId, event: LinkEvent) {
        match event {
            LinkEvent::LocalCandidate(candidate) => {
                if !self.peers.contains_key(&session_id) {
                    return;
                }
                // Relayed individually as they surface, in gathering order.
                self.send_frame(ClientFrame::IceCandidate {
                    target_session_id: session_id,
                    candidate,
                })
                .await;
            }

            LinkEvent::RemoteTrack(track) => {
                let Some(peer) = self.peers.get_mut(&session_id) else {
                    return;
                };
                let first = !peer.connected;
                if first {
                    peer.connected = true;
                    peer.clear_deadline();
                }
                if first && self.state == SessionState::Joined {
                    self.state = SessionState::Connected;
                    self.emit(SessionEvent::StateChanged(SessionState::Connected));
                }
                self.emit(SessionEvent::RemoteStream { session_id, track });
            }

            LinkEvent::StateChanged(LinkState::Failed) => {
                if self.peers.contains_key(&session_id) {
                    self.emit(SessionEvent::Error(SessionError::Negotiation(
                        session_id,
                        "peer connection failed".into(),
                    )));
                    self.drop_peer(session_id);
                }
            }

            LinkEvent::StateChanged(state) => {
                debug!(%session_id, ?state, "link state changed");
            }
        }
    }

    /// Apply candidates buffered while the remote description was pending,
    /// in arrival order.
    fn flush_pending(&mut self, target: SessionId) {
        let Some(peer) = self.peers.get_mut(&target) else {
            return;
        };
        if peer.pending_candidates.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut peer.pending_candidates);
        let link = peer.link.clone();
        let task = tokio::spawn(async move {
            for candidate in pending {
                if let Err(e) = link.add_ice_candidate(candidate).await {
                    warn!(%target, error = %e, "failed to apply buffered candidate");
                }
            }
        });
        peer.track_task(task.abort_handle());
    }
}

use crate::error::SessionError;
use crate::media::TrackKind;
use crate::session::{Internal, LectureSession, SessionEvent, SessionState, UserCommand};
use lectern_core::{ClientFrame, SessionId};
use tracing::warn;

impl LectureSession {
    /// Returns true when the session should stop.
    pub(crate) async fn handle_user(&mut self, cmd: UserCommand) -> bool {
        match cmd {
            UserCommand::SendChat(message) => {
                self.send_frame(ClientFrame::Chat {
                    message: message.clone(),
                })
                .await;
                // The server does not echo; record our own copy.
                let msg = self.local_chat_message(message);
                self.chat.append(msg.clone());
                self.emit(SessionEvent::Chat(msg));
            }

            UserCommand::StartScreenShare => self.start_screen_share().await,
            UserCommand::StopScreenShare => self.stop_screen_share().await,

            UserCommand::SetMuted(muted) => {
                if let Some(local) = &self.local {
                    local.set_enabled(TrackKind::Audio, !muted);
                }
            }
            UserCommand::SetVideoEnabled(enabled) => {
                if let Some(local) = &self.local {
                    local.set_enabled(TrackKind::Video, enabled);
                }
            }

            UserCommand::Leave => {
                self.teardown(true).await;
                return true;
            }
        }

        false
    }

    pub(crate) async fn start_screen_share(&mut self) {
        if self.screen_sharing {
            return;
        }
        if !self.config.role.is_instructor() {
            self.emit(SessionEvent::Error(SessionError::Protocol(
                "screen share is instructor-only".into(),
            )));
            return;
        }

        let (stream, ended) = match self.media.capture_display().await {
            Ok(captured) => captured,
            Err(e) => {
                warn!(error = %e, "display capture failed");
                self.emit(SessionEvent::Error(SessionError::MediaAccess(e)));
                return;
            }
        };
        self.screen = Some(stream.clone());
        self.screen_sharing = true;

        // Fan-out: the new tracks ride every established link through a
        // plain renegotiation offer; no dedicated message type.
        let connected: Vec<SessionId> = self
            .peers
            .iter()
            .filter(|(_, p)| p.connected)
            .map(|(id, _)| *id)
            .collect();
        for target in connected {
            let Some(peer) = self.peers.get_mut(&target) else {
                continue;
            };
            let link = peer.link.clone();
            let tracks = stream.tracks.clone();
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
            peer.track_task(task.abort_handle());
        }

        self.send_frame(ClientFrame::ScreenShareStart).await;
        self.emit(SessionEvent::ScreenShareChanged(true));

        // A device-side stop ("stop sharing" in the browser chrome) runs
        // the same stop path as an explicit one.
        let tx = self.internal_tx.clone();
        let watcher = tokio::spawn(async move {
            let _ = ended.await;
            let _ = tx.send(Internal::ScreenCaptureEnded);
        });
        self.misc_tasks.push(watcher.abort_handle());
    }

    pub(crate) async fn stop_screen_share(&mut self) {
        if !self.screen_sharing {
            return;
        }
        self.screen_sharing = false;
        if let Some(stream) = self.screen.take() {
            stream.stop_all();
        }
        self.send_frame(ClientFrame::ScreenShareStop).await;
        self.emit(SessionEvent::ScreenShareChanged(false));
    }

    /// Tear down every peer link, stop local media, clear room state and
    /// return to Idle. Safe to call repeatedly.
    pub(crate) async fn teardown(&mut self, graceful: bool) {
        if self.state == SessionState::Idle {
            return;
        }
        self.state = SessionState::Leaving;
        self.emit(SessionEvent::StateChanged(SessionState::Leaving));

        let peers: Vec<SessionId> = self.peers.keys().copied().collect();
        for session_id in peers {
            self.drop_peer(session_id);
        }
        for task in self.misc_tasks.drain(..) {
            task.abort();
        }
        if let Some(local) = self.local.take() {
            local.stop_all();
        }
        if let Some(screen) = self.screen.take() {
            screen.stop_all();
        }
        self.screen_sharing = false;
        self.roster.clear();
        self.chat.clear();

        if graceful {
            self.send_frame(ClientFrame::Leave).await;
        }

        self.state = SessionState::Idle;
        self.emit(SessionEvent::StateChanged(SessionState::Idle));
    }
}

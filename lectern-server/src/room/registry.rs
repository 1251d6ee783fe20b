use crate::error::RoomError;
use crate::lecture::LectureDirectory;
use crate::room::{JoinIdentity, Room, RoomCommand, RoomConfig};
use dashmap::DashMap;
use lectern_core::{LectureId, LectureStatus, ServerFrame, SessionId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

/// Sharded table of live rooms, one actor per lecture. Unrelated lectures
/// never share a lock: the map only hands out command senders.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<LectureId, mpsc::Sender<RoomCommand>>>,
    directory: Arc<dyn LectureDirectory>,
    config: RoomConfig,
}

impl RoomRegistry {
    pub fn new(directory: Arc<dyn LectureDirectory>, config: RoomConfig) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            directory,
            config,
        }
    }

    /// Admit a connection into a lecture room, creating the room on first
    /// join. Returns the allocated session id and the room's command sender
    /// for the connection's subsequent frames.
    pub async fn join(
        &self,
        lecture_id: &LectureId,
        identity: JoinIdentity,
        sink: mpsc::UnboundedSender<ServerFrame>,
    ) -> Result<(SessionId, mpsc::Sender<RoomCommand>), RoomError> {
        let status = self.directory.status(lecture_id).await?;
        if status != LectureStatus::Live {
            return Err(RoomError::NotLive(lecture_id.clone(), status));
        }

        // A terminated room can race its registry cleanup; drop the dead
        // entry and retry once against a fresh room.
        for _ in 0..2 {
            let tx = self.room_sender(lecture_id);
            let (reply_tx, reply_rx) = oneshot::channel();
            let cmd = RoomCommand::Join {
                identity: identity.clone(),
                sink: sink.clone(),
                reply: reply_tx,
            };

            if tx.send(cmd).await.is_err() {
                self.remove_entry(lecture_id, &tx);
                continue;
            }
            match reply_rx.await {
                Ok(res) => return res.map(|ack| (ack.session_id, tx)),
                Err(_) => {
                    self.remove_entry(lecture_id, &tx);
                    continue;
                }
            }
        }

        Err(RoomError::RoomEnded)
    }

    fn room_sender(&self, lecture_id: &LectureId) -> mpsc::Sender<RoomCommand> {
        self.rooms
            .entry(lecture_id.clone())
            .or_insert_with(|| self.spawn_room(lecture_id))
            .clone()
    }

    fn spawn_room(&self, lecture_id: &LectureId) -> mpsc::Sender<RoomCommand> {
        info!(lecture = %lecture_id, "creating room");
        let (tx, rx) = mpsc::channel(100);
        let room = Room::new(lecture_id.clone(), self.config.clone(), rx);

        let rooms = Arc::clone(&self.rooms);
        let id = lecture_id.clone();
        let tx_guard = tx.clone();
        tokio::spawn(async move {
            room.run().await;
            // Only unlink our own entry; a successor room may already
            // occupy the slot.
            rooms.remove_if(&id, |_, v| v.same_channel(&tx_guard));
        });

        tx
    }

    fn remove_entry(&self, lecture_id: &LectureId, tx: &mpsc::Sender<RoomCommand>) {
        self.rooms.remove_if(lecture_id, |_, v| v.same_channel(tx));
    }

    /// Number of currently registered rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

use crate::room::{JoinIdentity, RoomCommand, RoomRegistry};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use lectern_core::{ClientFrame, LectureId, ServerFrame};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One WebSocket per client per lecture: `GET /ws/lecture/{lecture_id}`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(lecture_id): Path<String>,
    State(registry): State<RoomRegistry>,
) -> impl IntoResponse {
    let lecture_id = LectureId::from(lecture_id);
    ws.on_upgrade(move |socket| handle_socket(socket, lecture_id, registry))
}

async fn handle_socket(socket: WebSocket, lecture_id: LectureId, registry: RoomRegistry) {
    info!(lecture = %lecture_id, "new signaling connection");

    let (mut sender, mut receiver) = socket.split();

    // The handshake: the first frame must be a join for this lecture.
    let identity = loop {
        let text = match receiver.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(_)) => continue,
        };
        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::Join {
                lecture_id: joined,
                email,
                role,
                name,
            }) => {
                if joined != lecture_id {
                    send_frame(&mut sender, &ServerFrame::error("lectureId mismatch")).await;
                    return;
                }
                break JoinIdentity { email, role, name };
            }
            Ok(_) => {
                send_frame(&mut sender, &ServerFrame::error("expected join")).await;
                return;
            }
            Err(e) => {
                warn!(lecture = %lecture_id, error = %e, "malformed join frame");
                send_frame(&mut sender, &ServerFrame::error("malformed frame")).await;
                return;
            }
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    let (session_id, room) = match registry.join(&lecture_id, identity, tx.clone()).await {
        Ok(joined) => joined,
        Err(e) => {
            info!(lecture = %lecture_id, error = %e, "join rejected");
            send_frame(&mut sender, &ServerFrame::error(e.to_string())).await;
            return;
        }
    };

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let room = room.clone();
        let errors = tx.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                        Ok(frame) => {
                            let leaving = matches!(frame, ClientFrame::Leave);
                            let cmd = RoomCommand::Frame { session_id, frame };
                            if room.send(cmd).await.is_err() {
                                // room terminated; nothing left to relay to
                                break;
                            }
                            if leaving {
                                break;
                            }
                        }
                        Err(e) => {
                            // Malformed frames are dropped; the channel
                            // stays open.
                            warn!(session = %session_id, error = %e, "malformed frame");
                            let _ = errors.send(ServerFrame::error("malformed frame"));
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }

            let _ = room.send(RoomCommand::Disconnect { session_id }).await;
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    info!(lecture = %lecture_id, session = %session_id, "signaling connection closed");
}

async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &ServerFrame) {
    if let Ok(text) = serde_json::to_string(frame) {
        let _ = sender.send(Message::Text(text.into())).await;
    }
}

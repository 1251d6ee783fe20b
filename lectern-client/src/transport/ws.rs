use crate::error::TransportError;
use crate::transport::{SignalChannel, SignalTransport};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use lectern_core::{ClientFrame, LectureId, ServerFrame};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

const CHANNEL_CAPACITY: usize = 64;

/// WebSocket signaling transport speaking to `/ws/lecture/{lecture_id}`.
pub struct WsTransport {
    base_url: String,
}

impl WsTransport {
    /// `base_url` is the server root, e.g. `ws://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SignalTransport for WsTransport {
    async fn connect(&self, lecture_id: &LectureId) -> Result<SignalChannel, TransportError> {
        let url = format!(
            "{}/ws/lecture/{}",
            self.base_url.trim_end_matches('/'),
            lecture_id
        );
        info!(%url, "connecting signaling channel");

        let (socket, _) = connect_async(&url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let (out_tx, mut out_rx) = mpsc::channel::<ClientFrame>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<ServerFrame>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let Ok(text) = serde_json::to_string(&frame) else {
                    continue;
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(Ok(msg)) = stream.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(frame) => {
                            if in_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        // Malformed inbound frames are dropped; the channel
                        // stays open.
                        Err(e) => warn!(error = %e, "malformed server frame"),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        Ok(SignalChannel {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

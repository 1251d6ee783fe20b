mod ws;

pub use ws::*;

use crate::error::TransportError;
use async_trait::async_trait;
use lectern_core::{ClientFrame, LectureId, ServerFrame};
use tokio::sync::mpsc;

/// An open signaling channel. The contract the session relies on: frames
/// arrive in order, reliably, without duplication, on one logical stream.
/// The inbound side closing means the channel is gone.
pub struct SignalChannel {
    pub outbound: mpsc::Sender<ClientFrame>,
    pub inbound: mpsc::Receiver<ServerFrame>,
}

#[async_trait]
pub trait SignalTransport: Send + Sync {
    async fn connect(&self, lecture_id: &LectureId) -> Result<SignalChannel, TransportError>;
}

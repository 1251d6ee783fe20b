mod rtc;

pub use rtc::*;

use crate::error::LinkError;
use crate::media::{MediaTrack, TrackKind};
use async_trait::async_trait;
use lectern_core::SessionId;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// An inbound media track surfaced by a link.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTrack {
    pub stream_id: String,
    pub kind: TrackKind,
}

/// What a link reports back to its owning session.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A locally gathered ICE candidate, to be relayed to the remote.
    LocalCandidate(Value),
    RemoteTrack(RemoteTrack),
    StateChanged(LinkState),
}

/// One media negotiation toward one remote session. SDP and candidates are
/// opaque JSON; the orchestrator never looks inside them.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Produce the local offer and install it as the local description.
    async fn create_offer(&self) -> Result<Value, LinkError>;

    /// Install the remote offer, produce the answer and install it locally.
    async fn accept_offer(&self, sdp: Value) -> Result<Value, LinkError>;

    /// Install the remote answer.
    async fn accept_answer(&self, sdp: Value) -> Result<(), LinkError>;

    async fn add_ice_candidate(&self, candidate: Value) -> Result<(), LinkError>;

    /// Attach an outgoing track. Renegotiation is the caller's job.
    async fn add_track(&self, track: &MediaTrack) -> Result<(), LinkError>;

    async fn close(&self);
}

#[async_trait]
pub trait PeerLinkFactory: Send + Sync {
    /// Build a link toward `remote`, reporting its events tagged with that
    /// session id.
    async fn create(
        &self,
        remote: SessionId,
        events: mpsc::UnboundedSender<(SessionId, LinkEvent)>,
    ) -> Result<Arc<dyn PeerLink>, LinkError>;
}

use lectern_core::SessionId;
use thiserror::Error;

/// Camera, microphone or display capture failed. Never fatal: the session
/// continues without the tracks.
#[derive(Debug, Error, Clone)]
pub enum MediaError {
    #[error("capture denied: {0}")]
    Denied(String),

    #[error("capture unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("signaling channel closed")]
    Closed,
}

/// A single peer connection failed; other peers are unaffected.
#[derive(Debug, Error, Clone)]
pub enum LinkError {
    #[error("peer connection: {0}")]
    Connection(String),

    #[error("sdp: {0}")]
    Sdp(String),

    #[error("ice: {0}")]
    Ice(String),

    #[error("track: {0}")]
    Track(String),
}

#[derive(Debug, Error, Clone)]
pub enum SessionError {
    #[error("media access: {0}")]
    MediaAccess(#[from] MediaError),

    #[error("signaling channel: {0}")]
    SignalingChannel(#[from] TransportError),

    #[error("negotiation with {0} failed: {1}")]
    Negotiation(SessionId, String),

    #[error("room rejected the join: {0}")]
    RoomState(String),

    #[error("protocol: {0}")]
    Protocol(String),
}

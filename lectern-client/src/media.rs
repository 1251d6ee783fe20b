use crate::error::MediaError;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureRequest {
    pub video: bool,
    pub audio: bool,
}

/// A capture track handle. Every attached peer connection references the
/// same handle, so disabling it mutes all of them at once.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

/// A set of tracks captured together (camera+mic, or a display capture).
#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    pub tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) {
        for track in self.tracks.iter().filter(|t| t.kind() == kind) {
            track.set_enabled(enabled);
        }
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Fires when the device layer ends a display capture on its own (the
/// browser's "stop sharing" button).
pub type ScreenEnded = oneshot::Receiver<()>;

/// Capture capability owned by the device/browser layer.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn capture(&self, request: CaptureRequest) -> Result<MediaStream, MediaError>;

    async fn capture_display(&self) -> Result<(MediaStream, ScreenEnded), MediaError>;
}

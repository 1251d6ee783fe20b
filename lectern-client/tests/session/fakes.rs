use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

use lectern_client::{
    CaptureRequest, LinkError, LinkEvent, LinkState, MediaError, MediaSource, MediaStream,
    MediaTrack, PeerLink, PeerLinkFactory, RemoteTrack, ScreenEnded, SessionEvent, SignalChannel,
    SignalTransport, TrackKind, TransportError,
};
use lectern_core::{ClientFrame, LectureId, ServerFrame, SessionId};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll a condition until it holds or the timeout elapses.
pub async fn wait_until<F: FnMut() -> bool>(mut pred: F, timeout_ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if pred() {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn event_matching<F>(
    rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    mut pred: F,
) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    let deadline = Instant::now() + RECV_TIMEOUT;
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .expect("timed out waiting for a matching event");
        let event = tokio::time::timeout(remaining, rx.recv())
            .await
            .expect("timed out waiting for a matching event")
            .expect("event stream closed");
        if pred(&event) {
            return event;
        }
    }
}

// ---------------------------------------------------------------------------
// media

pub struct FakeMedia {
    fail_capture: bool,
    fail_display: bool,
    captured: Mutex<Vec<MediaStream>>,
    screen_ended: Mutex<Option<oneshot::Sender<()>>>,
}

impl FakeMedia {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_capture: false,
            fail_display: false,
            captured: Mutex::new(Vec::new()),
            screen_ended: Mutex::new(None),
        })
    }

    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            fail_capture: true,
            fail_display: true,
            captured: Mutex::new(Vec::new()),
            screen_ended: Mutex::new(None),
        })
    }

    /// Simulate the browser-native "stop sharing" button.
    pub fn end_screen_capture(&self) {
        if let Some(tx) = self.screen_ended.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }

    pub fn captured_streams(&self) -> Vec<MediaStream> {
        self.captured.lock().unwrap().clone()
    }

    pub fn all_tracks_stopped(&self) -> bool {
        self.captured
            .lock()
            .unwrap()
            .iter()
            .flat_map(|s| s.tracks.iter())
            .all(|t| t.is_stopped())
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn capture(&self, request: CaptureRequest) -> Result<MediaStream, MediaError> {
        if self.fail_capture {
            return Err(MediaError::Denied("camera blocked".into()));
        }
        let mut tracks = Vec::new();
        if request.audio {
            tracks.push(MediaTrack::new("mic", TrackKind::Audio));
        }
        if request.video {
            tracks.push(MediaTrack::new("cam", TrackKind::Video));
        }
        let stream = MediaStream::new(tracks);
        self.captured.lock().unwrap().push(stream.clone());
        Ok(stream)
    }

    async fn capture_display(&self) -> Result<(MediaStream, ScreenEnded), MediaError> {
        if self.fail_display {
            return Err(MediaError::Denied("display blocked".into()));
        }
        let stream = MediaStream::new(vec![MediaTrack::new("screen", TrackKind::Video)]);
        self.captured.lock().unwrap().push(stream.clone());
        let (tx, rx) = oneshot::channel();
        *self.screen_ended.lock().unwrap() = Some(tx);
        Ok((stream, rx))
    }
}

// ---------------------------------------------------------------------------
// peer links

pub struct FakeLink {
    remote: SessionId,
    events: mpsc::UnboundedSender<(SessionId, LinkEvent)>,
    delay: Duration,
    fail_offer: bool,
    pub added_tracks: Mutex<Vec<MediaTrack>>,
    pub applied_candidates: Mutex<Vec<Value>>,
    pub remote_descriptions: Mutex<Vec<Value>>,
    pub offers_created: AtomicUsize,
    pub closed: AtomicBool,
}

impl FakeLink {
    pub fn emit_track(&self, stream_id: &str) {
        let _ = self.events.send((
            self.remote,
            LinkEvent::RemoteTrack(RemoteTrack {
                stream_id: stream_id.to_owned(),
                kind: TrackKind::Video,
            }),
        ));
    }

    pub fn emit_candidate(&self, candidate: Value) {
        let _ = self
            .events
            .send((self.remote, LinkEvent::LocalCandidate(candidate)));
    }

    pub fn emit_state(&self, state: LinkState) {
        let _ = self.events.send((self.remote, LinkEvent::StateChanged(state)));
    }

    pub fn track_count(&self) -> usize {
        self.added_tracks.lock().unwrap().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerLink for FakeLink {
    async fn create_offer(&self) -> Result<Value, LinkError> {
        tokio::time::sleep(self.delay).await;
        if self.fail_offer {
            return Err(LinkError::Sdp("offer refused".into()));
        }
        let n = self.offers_created.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"type": "offer", "sdp": format!("sdp-offer-{n}")}))
    }

    async fn accept_offer(&self, sdp: Value) -> Result<Value, LinkError> {
        tokio::time::sleep(self.delay).await;
        self.remote_descriptions.lock().unwrap().push(sdp);
        Ok(json!({"type": "answer", "sdp": "sdp-answer"}))
    }

    async fn accept_answer(&self, sdp: Value) -> Result<(), LinkError> {
        tokio::time::sleep(self.delay).await;
        self.remote_descriptions.lock().unwrap().push(sdp);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: Value) -> Result<(), LinkError> {
        self.applied_candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<(), LinkError> {
        self.added_tracks.lock().unwrap().push(track.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeLinkFactory {
    links: Mutex<HashMap<SessionId, Arc<FakeLink>>>,
    /// Per-creation latency applied to the next links, front first.
    delays: Mutex<VecDeque<Duration>>,
    fail_offers: AtomicBool,
}

impl FakeLinkFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_delay(&self, delay: Duration) {
        self.delays.lock().unwrap().push_back(delay);
    }

    pub fn fail_offers(&self) {
        self.fail_offers.store(true, Ordering::SeqCst);
    }

    pub fn link(&self, remote: SessionId) -> Option<Arc<FakeLink>> {
        self.links.lock().unwrap().get(&remote).cloned()
    }

    pub async fn wait_link(&self, remote: SessionId) -> Arc<FakeLink> {
        assert!(
            wait_until(|| self.link(remote).is_some(), 2000).await,
            "link toward {remote} was never created"
        );
        self.link(remote).unwrap()
    }
}

#[async_trait]
impl PeerLinkFactory for FakeLinkFactory {
    async fn create(
        &self,
        remote: SessionId,
        events: mpsc::UnboundedSender<(SessionId, LinkEvent)>,
    ) -> Result<Arc<dyn PeerLink>, LinkError> {
        let delay = self
            .delays
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Duration::ZERO);
        let link = Arc::new(FakeLink {
            remote,
            events,
            delay,
            fail_offer: self.fail_offers.load(Ordering::SeqCst),
            added_tracks: Mutex::new(Vec::new()),
            applied_candidates: Mutex::new(Vec::new()),
            remote_descriptions: Mutex::new(Vec::new()),
            offers_created: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        self.links.lock().unwrap().insert(remote, link.clone());
        Ok(link)
    }
}

// ---------------------------------------------------------------------------
// transport

/// Loopback transport: the test plays the server on the other end of the
/// channel pair. In-order, reliable, non-duplicating, like the contract
/// demands.
#[derive(Default)]
pub struct FakeTransport {
    server_end: Mutex<Option<ServerEnd>>,
    refuse: bool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            server_end: Mutex::new(None),
            refuse: true,
        })
    }

    /// The server side of the channel opened by `connect`.
    pub fn take_server_end(&self) -> ServerEnd {
        self.server_end
            .lock()
            .unwrap()
            .take()
            .expect("connect was not called")
    }
}

#[async_trait]
impl SignalTransport for FakeTransport {
    async fn connect(&self, _lecture_id: &LectureId) -> Result<SignalChannel, TransportError> {
        if self.refuse {
            return Err(TransportError::Connect("connection refused".into()));
        }
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        *self.server_end.lock().unwrap() = Some(ServerEnd {
            to_client: in_tx,
            from_client: out_rx,
        });
        Ok(SignalChannel {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

pub struct ServerEnd {
    pub to_client: mpsc::Sender<ServerFrame>,
    pub from_client: mpsc::Receiver<ClientFrame>,
}

impl ServerEnd {
    pub async fn send(&self, frame: ServerFrame) {
        self.to_client.send(frame).await.expect("client gone");
    }

    pub async fn recv(&mut self) -> ClientFrame {
        tokio::time::timeout(RECV_TIMEOUT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client channel closed")
    }

    pub async fn recv_matching<F>(&mut self, mut pred: F) -> ClientFrame
    where
        F: FnMut(&ClientFrame) -> bool,
    {
        let deadline = Instant::now() + RECV_TIMEOUT;
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .expect("timed out waiting for a matching client frame");
            let frame = tokio::time::timeout(remaining, self.from_client.recv())
                .await
                .expect("timed out waiting for a matching client frame")
                .expect("client channel closed");
            if pred(&frame) {
                return frame;
            }
        }
    }

    pub fn drain(&mut self) -> Vec<ClientFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

// ---------------------------------------------------------------------------
// rig

use lectern_client::{LectureSession, SessionConfig, SessionHandle, SessionState};
use lectern_core::{ParticipantInfo, Role};

/// A session wired to fakes, with the test holding the server end.
pub struct Rig {
    pub media: Arc<FakeMedia>,
    pub links: Arc<FakeLinkFactory>,
    pub handle: SessionHandle,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub server: ServerEnd,
}

pub async fn connect_rig(role: Role) -> Rig {
    connect_rig_with(role, FakeMedia::new(), Duration::from_secs(30)).await
}

pub async fn connect_rig_with(
    role: Role,
    media: Arc<FakeMedia>,
    negotiation_timeout: Duration,
) -> Rig {
    let links = FakeLinkFactory::new();
    let transport = FakeTransport::new();

    let (email, name) = match role {
        Role::Instructor => ("ada@uni.edu", "Ada"),
        Role::Student => ("s1@uni.edu", "S1"),
    };
    let mut config = SessionConfig::new("lec-1", email, role, name);
    config.negotiation_timeout = negotiation_timeout;

    let (handle, events) =
        LectureSession::connect(config, media.clone(), links.clone(), transport.clone())
            .await
            .expect("session connects");

    let mut server = transport.take_server_end();
    let join = server.recv().await;
    assert!(matches!(join, ClientFrame::Join { .. }), "join goes first");

    Rig {
        media,
        links,
        handle,
        events,
        server,
    }
}

pub fn participant(session_id: SessionId, email: &str, role: Role) -> ParticipantInfo {
    ParticipantInfo {
        session_id,
        email: email.to_owned(),
        role,
        name: email.split('@').next().unwrap_or(email).to_owned(),
    }
}

/// Deliver the roster snapshot and wait for the Joined transition.
pub async fn join_room(rig: &mut Rig, roster: Vec<ParticipantInfo>) {
    rig.server
        .send(ServerFrame::Participants {
            participants: roster,
        })
        .await;
    event_matching(&mut rig.events, |e| {
        matches!(e, SessionEvent::StateChanged(SessionState::Joined))
    })
    .await;
}

/// Run the instructor-side negotiation toward one student to completion:
/// create-offer directive, offer out, answer back, first remote track.
pub async fn connect_peer(rig: &mut Rig, student: SessionId) -> Arc<FakeLink> {
    rig.server
        .send(ServerFrame::CreateOffer {
            target_session_id: student,
        })
        .await;
    rig.server
        .recv_matching(
            |f| matches!(f, ClientFrame::Offer { target_session_id, .. } if *target_session_id == student),
        )
        .await;
    rig.server
        .send(ServerFrame::Answer {
            from_session_id: student,
            sdp: json!({"type": "answer", "sdp": "sdp-answer"}),
        })
        .await;

    let link = rig.links.wait_link(student).await;
    link.emit_track("camera-mic");
    event_matching(&mut rig.events, |e| {
        matches!(e, SessionEvent::RemoteStream { session_id, .. } if *session_id == student)
    })
    .await;
    link
}

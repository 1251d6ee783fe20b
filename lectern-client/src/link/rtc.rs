use crate::error::LinkError;
use crate::link::{LinkEvent, LinkState, PeerLink, PeerLinkFactory, RemoteTrack};
use crate::media::{MediaTrack, TrackKind};
use async_trait::async_trait;
use lectern_core::SessionId;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaEngine};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Builds `webrtc`-crate peer links. One factory per session is enough; it
/// only carries the ICE server list.
pub struct RtcLinkFactory {
    ice_servers: Vec<String>,
}

impl RtcLinkFactory {
    pub fn new(ice_servers: Vec<String>) -> Self {
        Self { ice_servers }
    }
}

impl Default for RtcLinkFactory {
    fn default() -> Self {
        Self::new(vec![
            "stun:stun.l.google.com:19302".to_owned(),
            "stun:stun1.l.google.com:19302".to_owned(),
            "stun:stun2.l.google.com:19302".to_owned(),
        ])
    }
}

#[async_trait]
impl PeerLinkFactory for RtcLinkFactory {
    async fn create(
        &self,
        remote: SessionId,
        events: mpsc::UnboundedSender<(SessionId, LinkEvent)>,
    ) -> Result<Arc<dyn PeerLink>, LinkError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| LinkError::Connection(e.to_string()))?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| LinkError::Connection(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| LinkError::Connection(e.to_string()))?,
        );

        // Trickle ICE: every locally gathered candidate goes up as an event.
        let ice_events = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = ice_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                match serde_json::to_value(&init) {
                    Ok(json) => {
                        let _ = events.send((remote, LinkEvent::LocalCandidate(json)));
                    }
                    Err(e) => warn!(%remote, error = %e, "candidate serialization failed"),
                }
            })
        }));

        let track_events = events.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let events = track_events.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    _ => TrackKind::Video,
                };
                debug!(%remote, ?kind, "remote track arrived");
                let _ = events.send((
                    remote,
                    LinkEvent::RemoteTrack(RemoteTrack {
                        stream_id: track.stream_id(),
                        kind,
                    }),
                ));
            })
        }));

        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let events = events.clone();
            Box::pin(async move {
                let mapped = match state {
                    RTCPeerConnectionState::New => LinkState::New,
                    RTCPeerConnectionState::Connecting => LinkState::Connecting,
                    RTCPeerConnectionState::Connected => LinkState::Connected,
                    RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                        LinkState::Failed
                    }
                    _ => LinkState::Closed,
                };
                let _ = events.send((remote, LinkEvent::StateChanged(mapped)));
            })
        }));

        Ok(Arc::new(RtcPeerLink { pc }))
    }
}

pub struct RtcPeerLink {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerLink for RtcPeerLink {
    async fn create_offer(&self) -> Result<Value, LinkError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| LinkError::Sdp(e.to_string()))?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(|e| LinkError::Sdp(e.to_string()))?;
        serde_json::to_value(&offer).map_err(|e| LinkError::Sdp(e.to_string()))
    }

    async fn accept_offer(&self, sdp: Value) -> Result<Value, LinkError> {
        let offer: RTCSessionDescription =
            serde_json::from_value(sdp).map_err(|e| LinkError::Sdp(e.to_string()))?;
        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| LinkError::Sdp(e.to_string()))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| LinkError::Sdp(e.to_string()))?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(|e| LinkError::Sdp(e.to_string()))?;
        serde_json::to_value(&answer).map_err(|e| LinkError::Sdp(e.to_string()))
    }

    async fn accept_answer(&self, sdp: Value) -> Result<(), LinkError> {
        let answer: RTCSessionDescription =
            serde_json::from_value(sdp).map_err(|e| LinkError::Sdp(e.to_string()))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| LinkError::Sdp(e.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: Value) -> Result<(), LinkError> {
        let init: RTCIceCandidateInit =
            serde_json::from_value(candidate).map_err(|e| LinkError::Ice(e.to_string()))?;
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| LinkError::Ice(e.to_string()))
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<(), LinkError> {
        // Sample pacing is owned by the capture layer; the link only wires
        // the track into the connection.
        let capability = match track.kind() {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
        };
        let local = Arc::new(TrackLocalStaticSample::new(
            capability,
            track.id().to_owned(),
            "lectern".to_owned(),
        ));
        self.pc
            .add_track(local)
            .await
            .map(|_| ())
            .map_err(|e| LinkError::Track(e.to_string()))
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            warn!(error = %e, "peer connection close failed");
        }
    }
}

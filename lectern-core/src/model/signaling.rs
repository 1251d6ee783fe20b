use crate::model::{ChatMessage, LectureId, ParticipantInfo, Role, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames sent by a client over its signaling channel. SDP and ICE payloads
/// are opaque to the server and relayed verbatim.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    Join {
        lecture_id: LectureId,
        email: String,
        role: Role,
        name: String,
    },
    Offer {
        target_session_id: SessionId,
        sdp: Value,
    },
    Answer {
        target_session_id: SessionId,
        sdp: Value,
    },
    IceCandidate {
        target_session_id: SessionId,
        candidate: Value,
    },
    Chat {
        message: String,
    },
    ScreenShareStart,
    ScreenShareStop,
    Leave,
}

/// Frames sent by the server to a client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// Full roster snapshot, sent once to a joiner (its own entry excluded).
    Participants { participants: Vec<ParticipantInfo> },
    UserJoined {
        session_id: SessionId,
        email: String,
        role: Role,
        name: String,
    },
    UserLeft {
        session_id: SessionId,
    },
    /// Tells the instructor to initiate a connection toward a student.
    CreateOffer {
        target_session_id: SessionId,
    },
    Offer {
        from_session_id: SessionId,
        sdp: Value,
    },
    Answer {
        from_session_id: SessionId,
        sdp: Value,
    },
    IceCandidate {
        from_session_id: SessionId,
        candidate: Value,
    },
    Chat(ChatMessage),
    ScreenShareStart,
    ScreenShareStop,
    /// The instructor is gone; the room no longer exists.
    LectureEnded,
    Error {
        message: String,
    },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }
}

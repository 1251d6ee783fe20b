use crate::error::RoomError;
use lectern_core::{ClientFrame, Role, ServerFrame, SessionId};
use tokio::sync::{mpsc, oneshot};

/// Identity presented at join time, before a session id exists.
#[derive(Debug, Clone)]
pub struct JoinIdentity {
    pub email: String,
    pub role: Role,
    pub name: String,
}

#[derive(Debug)]
pub struct JoinAck {
    pub session_id: SessionId,
}

/// Commands fed into a room actor by the signaling layer.
pub enum RoomCommand {
    /// A new connection wants in. The sink is the participant's outbound
    /// frame channel; the reply carries the allocated session id or the
    /// rejection.
    Join {
        identity: JoinIdentity,
        sink: mpsc::UnboundedSender<ServerFrame>,
        reply: oneshot::Sender<Result<JoinAck, RoomError>>,
    },

    /// A frame from an already-joined session.
    Frame {
        session_id: SessionId,
        frame: ClientFrame,
    },

    /// The signaling channel dropped without a leave frame.
    Disconnect { session_id: SessionId },
}

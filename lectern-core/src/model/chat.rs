use crate::model::{Role, SessionId};
use serde::{Deserialize, Serialize};

/// A chat broadcast, stamped by the server with the sender's identity and a
/// unix-millis timestamp. Lives only as long as the room does.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub from_session_id: SessionId,
    pub from_email: String,
    pub from_name: String,
    pub from_role: Role,
    pub message: String,
    pub timestamp: i64,
}

use crate::model::SessionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Instructor,
    Student,
}

impl Role {
    pub fn is_instructor(&self) -> bool {
        matches!(self, Role::Instructor)
    }
}

/// Roster entry for one connected session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub session_id: SessionId,
    pub email: String,
    pub role: Role,
    pub name: String,
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lecture ids are allocated by the course platform; the signaling layer
/// treats them as opaque room keys.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq)]
#[serde(transparent)]
pub struct LectureId(pub String);

impl From<&str> for LectureId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for LectureId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for LectureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a scheduled lecture. Joins are only accepted while `Live`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LectureStatus {
    Scheduled,
    Live,
    Completed,
    Cancelled,
}

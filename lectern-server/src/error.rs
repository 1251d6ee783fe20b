use lectern_core::{LectureId, LectureStatus};
use thiserror::Error;

/// Lookup failures against the lecture directory collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DirectoryError {
    #[error("lecture {0} not found")]
    NotFound(LectureId),

    #[error("lecture directory unavailable: {0}")]
    Unavailable(String),
}

/// Why a join or an in-room operation was rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoomError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("lecture {0} is {1:?}, not LIVE")]
    NotLive(LectureId, LectureStatus),

    #[error("room for lecture {0} is full")]
    RoomFull(LectureId),

    #[error("lecture {0} already has an instructor")]
    InstructorPresent(LectureId),

    #[error("room has ended")]
    RoomEnded,

    #[error("instructor role required")]
    NotInstructor,

    #[error("invalid chat message: {0}")]
    InvalidChat(&'static str),
}

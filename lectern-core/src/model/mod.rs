mod chat;
mod lecture;
mod participant;
mod session;
mod signaling;

pub use chat::ChatMessage;
pub use lecture::{LectureId, LectureStatus};
pub use participant::{ParticipantInfo, Role};
pub use session::SessionId;
pub use signaling::{ClientFrame, ServerFrame};

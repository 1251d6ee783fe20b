use crate::error::DirectoryError;
use async_trait::async_trait;
use dashmap::DashMap;
use lectern_core::{LectureId, LectureStatus};
use tracing::info;

/// The course platform owns lecture scheduling; the signaling layer only
/// needs to read and transition a lecture's status.
#[async_trait]
pub trait LectureDirectory: Send + Sync {
    async fn status(&self, id: &LectureId) -> Result<LectureStatus, DirectoryError>;

    async fn set_status(&self, id: &LectureId, status: LectureStatus) -> Result<(), DirectoryError>;
}

/// In-process directory backing the standalone server binary and the tests.
#[derive(Default)]
pub struct MemoryLectureDirectory {
    lectures: DashMap<LectureId, LectureStatus>,
}

impl MemoryLectureDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lecture as scheduled. Replaces any previous entry.
    pub fn register(&self, id: LectureId) {
        info!(lecture = %id, "lecture registered");
        self.lectures.insert(id, LectureStatus::Scheduled);
    }
}

#[async_trait]
impl LectureDirectory for MemoryLectureDirectory {
    async fn status(&self, id: &LectureId) -> Result<LectureStatus, DirectoryError> {
        self.lectures
            .get(id)
            .map(|s| *s)
            .ok_or_else(|| DirectoryError::NotFound(id.clone()))
    }

    async fn set_status(&self, id: &LectureId, status: LectureStatus) -> Result<(), DirectoryError> {
        let mut entry = self
            .lectures
            .get_mut(id)
            .ok_or_else(|| DirectoryError::NotFound(id.clone()))?;
        info!(lecture = %id, ?status, "lecture status changed");
        *entry = status;
        Ok(())
    }
}

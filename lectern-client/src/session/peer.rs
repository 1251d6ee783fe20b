use crate::link::PeerLink;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NegotiationRole {
    Offerer,
    Answerer,
}

/// One remote session's negotiation state. Aborting a peer's pending work
/// never touches any other peer.
pub(crate) struct PeerHandle {
    pub(crate) link: Arc<dyn PeerLink>,
    pub(crate) role: NegotiationRole,
    /// Candidates must wait for the remote description; they are queued
    /// here and flushed once it lands, never dropped.
    pub(crate) pending_candidates: Vec<Value>,
    pub(crate) remote_described: bool,
    pub(crate) connected: bool,
    tasks: Vec<AbortHandle>,
    deadline: Option<AbortHandle>,
}

impl PeerHandle {
    pub(crate) fn new(link: Arc<dyn PeerLink>, role: NegotiationRole) -> Self {
        Self {
            link,
            role,
            pending_candidates: Vec::new(),
            remote_described: false,
            connected: false,
            tasks: Vec::new(),
            deadline: None,
        }
    }

    pub(crate) fn track_task(&mut self, handle: AbortHandle) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(handle);
    }

    pub(crate) fn set_deadline(&mut self, handle: AbortHandle) {
        self.clear_deadline();
        self.deadline = Some(handle);
    }

    pub(crate) fn clear_deadline(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }
    }

    pub(crate) fn abort_pending(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.clear_deadline();
    }
}

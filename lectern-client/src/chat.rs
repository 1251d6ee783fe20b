use lectern_core::{ChatMessage, SessionId};

/// Key for one chat entry: sender, server timestamp, local arrival sequence.
/// The sequence disambiguates messages a sender posted within the same
/// millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatKey {
    pub from: SessionId,
    pub timestamp: i64,
    pub seq: u64,
}

#[derive(Debug, Clone)]
pub struct ChatEntry {
    pub key: ChatKey,
    pub message: ChatMessage,
}

/// Insertion-ordered, room-scoped chat log. A client joining mid-lecture
/// only ever sees messages sent after it joined.
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: Vec<ChatEntry>,
    next_seq: u64,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) -> ChatKey {
        let key = ChatKey {
            from: message.from_session_id,
            timestamp: message.timestamp,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.push(ChatEntry { key, message });
        key
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

use crate::Message;
use std::collections::HashSet;

/// Ordered, append-only sequence of messages, unique by id.
///
/// An id index is kept alongside the ordered sequence so membership tests
/// stay cheap as history grows. Appends are monotonic: never reordered,
/// never truncated for the life of the session.
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    messages: Vec<Message>,
    seen: HashSet<String>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline from a chronological history load. A redelivered id inside
    /// the history itself collapses to its first occurrence.
    pub fn from_history(history: Vec<Message>) -> Self {
        let mut list = Self::new();
        for message in history {
            list.merge(message);
        }
        list
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Append iff the id is unseen, preserving arrival order. Returns
    /// whether the message was appended. Membership is checked against the
    /// live list, never a stale snapshot.
    pub fn merge(&mut self, message: Message) -> bool {
        if self.seen.contains(&message.id) {
            return false;
        }
        self.seen.insert(message.id.clone());
        self.messages.push(message);
        true
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

use crate::message::ChatMessage;
use std::collections::HashSet;

/// Ordered, deduplicated message sequence for the active conversation.
///
/// Ordered ascending by `created_at`; equal timestamps keep arrival order.
/// A `message_id` appears at most once.
#[derive(Debug, Default)]
pub struct MessageTimeline {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl MessageTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with a fetched history.
    ///
    /// Messages already merged from the live feed are kept, so a subscription
    /// opened before the fetch loses nothing.
    pub fn load_history(&mut self, history: Vec<ChatMessage>) {
        let live = std::mem::take(&mut self.messages);
        self.ids.clear();
        for msg in history.into_iter().chain(live) {
            if self.ids.insert(msg.message_id.clone()) {
                self.messages.push(msg);
            }
        }
        // stable: ties stay in arrival order
        self.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }

    /// Merge one message. Returns `false` if its id is already present.
    pub fn merge(&mut self, msg: ChatMessage) -> bool {
        if self.ids.contains(&msg.message_id) {
            tracing::debug!(message_id = %msg.message_id, "duplicate message ignored");
            return false;
        }
        let at = self
            .messages
            .partition_point(|m| m.created_at <= msg.created_at);
        self.ids.insert(msg.message_id.clone());
        self.messages.insert(at, msg);
        true
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.ids.contains(message_id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn ids(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.message_id.as_str()).collect()
    }
}

use crate::error::ChatError;
use crate::filter::Filter;
use crate::message::{ChatMessage, NewMessage, UserId};
use crate::{CHATS_TABLE, TASK_MESSAGES_TABLE};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

/// What the caller asked to open, before identity is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationTarget {
    /// Ad-hoc chat with another user, across all tasks.
    Peer { other_user_id: UserId },
    /// Chat attached to one help request.
    Task {
        task_id: String,
        other_user_id: UserId,
    },
}

impl ConversationTarget {
    pub fn other_user_id(&self) -> &str {
        match self {
            ConversationTarget::Peer { other_user_id }
            | ConversationTarget::Task { other_user_id, .. } => other_user_id,
        }
    }
}

/// All messages exchanged between two users, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairwiseScope {
    pub current_user_id: UserId,
    pub other_user_id: UserId,
}

/// All messages tied to one task. The participants only address new messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskScope {
    pub task_id: String,
    pub current_user_id: UserId,
    pub other_user_id: UserId,
}

/// The set of messages that make up one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationScope {
    Pairwise(PairwiseScope),
    Task(TaskScope),
}

impl ConversationScope {
    /// Resolve a target for the authenticated caller.
    ///
    /// A pairwise target naming the caller fails with [`ChatError::SelfChat`].
    /// Task targets skip that check: task authorship already keeps the two
    /// participants apart.
    pub fn resolve(current_user_id: &str, target: &ConversationTarget) -> Result<Self, ChatError> {
        match target {
            ConversationTarget::Peer { other_user_id } => {
                if other_user_id == current_user_id {
                    return Err(ChatError::SelfChat);
                }
                Ok(ConversationScope::Pairwise(PairwiseScope {
                    current_user_id: current_user_id.to_string(),
                    other_user_id: other_user_id.clone(),
                }))
            }
            ConversationTarget::Task {
                task_id,
                other_user_id,
            } => Ok(ConversationScope::Task(TaskScope {
                task_id: task_id.clone(),
                current_user_id: current_user_id.to_string(),
                other_user_id: other_user_id.clone(),
            })),
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            ConversationScope::Pairwise(_) => CHATS_TABLE,
            ConversationScope::Task(_) => TASK_MESSAGES_TABLE,
        }
    }

    /// The one predicate both the history fetch and the live feed use.
    pub fn filter(&self) -> Filter {
        match self {
            ConversationScope::Pairwise(p) => Filter::any(vec![
                Filter::all(vec![
                    Filter::eq("sender_id", &p.current_user_id),
                    Filter::eq("receiver_id", &p.other_user_id),
                ]),
                Filter::all(vec![
                    Filter::eq("sender_id", &p.other_user_id),
                    Filter::eq("receiver_id", &p.current_user_id),
                ]),
            ]),
            ConversationScope::Task(t) => Filter::eq("task_id", &t.task_id),
        }
    }

    /// Whether a raw row belongs to this conversation.
    pub fn matches_row(&self, row: &Value) -> bool {
        self.filter().matches(row)
    }

    /// Whether a decoded message belongs to this conversation.
    pub fn matches(&self, msg: &ChatMessage) -> bool {
        match self {
            ConversationScope::Pairwise(p) => {
                (msg.sender_id == p.current_user_id && msg.receiver_id == p.other_user_id)
                    || (msg.sender_id == p.other_user_id && msg.receiver_id == p.current_user_id)
            }
            ConversationScope::Task(t) => msg.task_id.as_deref() == Some(t.task_id.as_str()),
        }
    }

    /// `(current, other)`.
    pub fn participants(&self) -> (&str, &str) {
        (self.current_user_id(), self.other_user_id())
    }

    pub fn current_user_id(&self) -> &str {
        match self {
            ConversationScope::Pairwise(p) => &p.current_user_id,
            ConversationScope::Task(t) => &t.current_user_id,
        }
    }

    pub fn other_user_id(&self) -> &str {
        match self {
            ConversationScope::Pairwise(p) => &p.other_user_id,
            ConversationScope::Task(t) => &t.other_user_id,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            ConversationScope::Pairwise(_) => None,
            ConversationScope::Task(t) => Some(&t.task_id),
        }
    }

    /// Name of the live channel for this conversation.
    pub fn channel_name(&self) -> String {
        match self {
            ConversationScope::Pairwise(p) => {
                format!("messages_{}_{}", p.current_user_id, p.other_user_id)
            }
            ConversationScope::Task(t) => format!("task_messages_{}", t.task_id),
        }
    }

    /// Identifiers a send must validate, labelled for error messages.
    pub fn identifier_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![
            ("Current User ID", self.current_user_id()),
            ("Other User ID", self.other_user_id()),
        ];
        if let Some(task_id) = self.task_id() {
            fields.push(("Task ID", task_id));
        }
        fields
    }

    /// Row for a new message from the caller to the other participant.
    pub(crate) fn new_message_row(&self, content: &str, created_at: DateTime<Utc>) -> Value {
        let row = NewMessage {
            sender_id: self.current_user_id(),
            receiver_id: self.other_user_id(),
            content,
            created_at,
            task_id: self.task_id(),
        };
        // Plain strings and a timestamp always serialize.
        serde_json::to_value(row).unwrap_or(Value::Null)
    }
}

impl fmt::Display for ConversationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationScope::Pairwise(p) => {
                write!(f, "pair({}, {})", p.current_user_id, p.other_user_id)
            }
            ConversationScope::Task(t) => write!(f, "task({})", t.task_id),
        }
    }
}

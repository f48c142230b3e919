use thiserror::Error;

/// Everything that can go wrong while opening or using a conversation.
///
/// Backend adapters report `anyhow` errors; they are folded into one of these
/// variants at the boundary where they occur, so nothing escapes the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Could not resolve current user ID")]
    Unauthenticated,

    #[error("You cannot chat with yourself")]
    SelfChat,

    #[error("Invalid UUID(s): {}. Please provide valid UUIDs.", .0.join(", "))]
    InvalidIds(Vec<String>),

    #[error("message content is empty")]
    EmptyMessage,

    #[error("Could not fetch {what}: {reason}")]
    Fetch { what: &'static str, reason: String },

    #[error("Could not send message: {0}")]
    Send(String),

    /// The insert went through but the stored row could not be read back.
    #[error("Message sent, but it could not be displayed: {0}")]
    Unconfirmed(String),

    #[error("Could not set up message updates: {0}")]
    Subscribe(String),
}

impl ChatError {
    pub(crate) fn fetch(what: &'static str, err: &anyhow::Error) -> Self {
        ChatError::Fetch {
            what,
            reason: format!("{err:#}"),
        }
    }

    /// Fatal errors replace the whole conversation view; the rest are shown
    /// inline and the user may correct and retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChatError::Unauthenticated | ChatError::SelfChat | ChatError::Fetch { .. }
        )
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Unauthenticated => "unauthenticated",
            ChatError::SelfChat => "self_chat",
            ChatError::InvalidIds(_) => "invalid_ids",
            ChatError::EmptyMessage => "empty_message",
            ChatError::Fetch { .. } => "fetch_failed",
            ChatError::Send(_) => "send_failed",
            ChatError::Unconfirmed(_) => "send_unconfirmed",
            ChatError::Subscribe(_) => "subscribe_failed",
        }
    }
}

//! Direct messaging core for the helf help exchange.
//!
//! Conversations are either pairwise (two users, any task) or task-scoped.
//! A [`session::ChatSession`] resolves the caller's identity once, loads the
//! history for the resolved [`scope::ConversationScope`], keeps a live
//! subscription open and merges both into one deduplicated timeline.

pub mod backend;
pub mod directory;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod identity;
pub mod ids;
pub mod memory;
pub mod message;
pub mod scope;
pub mod session;
pub mod subscription;
pub mod timeline;

pub use backend::Backend;
pub use error::ChatError;
pub use message::{ChatMessage, PeerProfile, UserId};
pub use scope::{ConversationScope, ConversationTarget};
pub use session::{ChatSession, SendOutcome, ViewStatus};

/// Table holding user profile metadata.
pub const USERS_TABLE: &str = "users";

/// Table holding pairwise messages.
pub const CHATS_TABLE: &str = "chats";

/// Table holding task-scoped messages.
pub const TASK_MESSAGES_TABLE: &str = "messages";

use super::{ADA, BOB, CLEO};
use helf_chat::memory::MemoryBackend;
use helf_chat::{Backend, ChatSession};
use serde_json::Value;
use std::sync::Arc;

/// Three registered users on one shared in-memory backend.
pub struct TestCommunity {
    pub mem: Arc<MemoryBackend>,
}

impl TestCommunity {
    pub async fn new() -> Self {
        super::init_tracing();
        let mem = MemoryBackend::new();
        mem.add_user(ADA, "Ada", Some("ada/portrait.png")).await;
        mem.add_user(BOB, "Bob", None).await;
        mem.add_user(CLEO, "Cleo", None).await;
        Self { mem }
    }

    pub fn backend_for(&self, user_id: &str) -> Backend {
        self.mem.backend_as(Some(user_id))
    }

    /// A fresh, unopened session signed in as `user_id`.
    pub fn session_for(&self, user_id: &str) -> ChatSession {
        ChatSession::new(self.backend_for(user_id))
    }

    pub fn signed_out_session(&self) -> ChatSession {
        ChatSession::new(self.mem.backend_as(None))
    }

    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        for row in rows {
            self.mem.seed(table, row).await;
        }
    }
}

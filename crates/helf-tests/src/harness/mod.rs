pub mod broad_store;
pub mod community;
pub mod live_race;
pub mod unreadable_insert;

use helf_chat::{ChatSession, ConversationTarget};
use serde_json::{Value, json};
use std::time::Duration;

pub const ADA: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
pub const BOB: &str = "16fd2706-8baf-433b-82eb-8c7fada847da";
pub const CLEO: &str = "e9b1f0c4-3a6d-4c1e-9f2a-5b7d8c9e0f1a";
pub const TASK: &str = "0b7c2a1e-5f4d-4e3b-8a9c-1d2e3f4a5b6c";
pub const OTHER_TASK: &str = "5d6e7f80-91a2-4b3c-8d4e-5f60718293a4";

pub fn peer(other: &str) -> ConversationTarget {
    ConversationTarget::Peer {
        other_user_id: other.to_string(),
    }
}

pub fn task(task_id: &str, other: &str) -> ConversationTarget {
    ConversationTarget::Task {
        task_id: task_id.to_string(),
        other_user_id: other.to_string(),
    }
}

/// A stored pairwise message row at `secs` seconds past a fixed epoch.
pub fn chat_row(id: &str, from: &str, to: &str, content: &str, secs: u32) -> Value {
    json!({
        "message_id": id,
        "sender_id": from,
        "receiver_id": to,
        "content": content,
        "created_at": timestamp(secs),
    })
}

/// A stored task message row.
pub fn task_row(id: &str, task_id: &str, from: &str, to: &str, content: &str, secs: u32) -> Value {
    let mut row = chat_row(id, from, to, content, secs);
    row["task_id"] = Value::String(task_id.to_string());
    row
}

pub fn timestamp(secs: u32) -> String {
    format!(
        "2024-03-01T{:02}:{:02}:{:02}Z",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    )
}

/// Wait for the session's next live event, failing the test on timeout.
pub async fn next_live_within(session: &mut ChatSession, timeout: Duration) -> Option<bool> {
    tokio::time::timeout(timeout, session.next_live())
        .await
        .unwrap_or_else(|_| panic!("no live event within {timeout:?}"))
}

/// Initialize tracing for tests (only once per process).
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("helf_chat=debug,helf_tests=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

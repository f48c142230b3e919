//! Seeded in-process community for `--memory`.

use anyhow::{Context, Result};
use helf_chat::backend::{ChangeFeed, FeedSpec};
use helf_chat::filter::Filter;
use helf_chat::gateway::MessageGateway;
use helf_chat::memory::MemoryBackend;
use helf_chat::{CHATS_TABLE, ChatMessage, ConversationScope, ConversationTarget};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const ADA: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
pub const BOB: &str = "16fd2706-8baf-433b-82eb-8c7fada847da";
pub const CLEO: &str = "e9b1f0c4-3a6d-4c1e-9f2a-5b7d8c9e0f1a";

const USERS: &[(&str, &str, Option<&str>)] = &[
    ("ada", ADA, Some("ada/portrait.png")),
    ("bob", BOB, None),
    ("cleo", CLEO, Some("cleo/avatar.jpg")),
];

/// Map a demo user name to its id; anything else passes through.
pub fn resolve_user(name_or_id: &str) -> &str {
    USERS
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(name_or_id))
        .map(|(_, id, _)| *id)
        .unwrap_or(name_or_id)
}

pub async fn community() -> Arc<MemoryBackend> {
    let mem = MemoryBackend::new();
    for (name, id, picture) in USERS {
        let mut display = name.to_string();
        display[..1].make_ascii_uppercase();
        mem.add_user(id, &display, *picture).await;
    }
    for (id, from, to, content, at) in [
        ("seed-1", ADA, BOB, "Could you help me move a sofa on Saturday?", "2024-06-01T09:00:00Z"),
        ("seed-2", BOB, ADA, "Sure, what time?", "2024-06-01T09:05:00Z"),
        ("seed-3", CLEO, BOB, "Thanks for the groceries!", "2024-06-01T10:00:00Z"),
    ] {
        mem.seed(
            CHATS_TABLE,
            json!({
                "message_id": id,
                "sender_id": from,
                "receiver_id": to,
                "content": content,
                "created_at": at,
            }),
        )
        .await;
    }
    mem
}

/// Answer every pairwise message sent to `user_id` with an echo.
pub async fn spawn_echo(mem: Arc<MemoryBackend>, user_id: &'static str) -> Result<JoinHandle<()>> {
    let mut channel = mem
        .subscribe(FeedSpec {
            channel: format!("echo_{user_id}"),
            table: CHATS_TABLE.to_string(),
            filter: Filter::eq("receiver_id", user_id),
        })
        .await
        .context("subscribe echo peer")?;
    let gateway = MessageGateway::new(mem);

    Ok(tokio::spawn(async move {
        while let Some(row) = channel.recv().await {
            let Ok(msg) = ChatMessage::from_row(&row) else {
                continue;
            };
            let target = ConversationTarget::Peer {
                other_user_id: msg.sender_id.clone(),
            };
            let Ok(scope) = ConversationScope::resolve(user_id, &target) else {
                continue;
            };
            if let Err(e) = gateway.send(&scope, &format!("echo: {}", msg.content)).await {
                tracing::warn!(err = %e, "echo reply failed");
            }
        }
    }))
}

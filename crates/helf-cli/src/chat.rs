use anyhow::{Result, bail};
use chrono::Local;
use helf_chat::{Backend, ChatMessage, ChatSession, ConversationTarget, SendOutcome, ViewStatus};
use std::collections::HashSet;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive conversation: print history, then send stdin lines and print
/// live messages until `/quit` or end of input.
pub async fn run(backend: Backend, target: ConversationTarget) -> Result<()> {
    let mut session = ChatSession::new(backend);
    session.open(target).await;
    if let ViewStatus::Failed(e) = session.status() {
        bail!("{e}");
    }

    let title = session.peer().map(|p| p.display_name()).unwrap_or("User");
    match session.scope().and_then(|s| s.task_id()) {
        Some(task) => println!("── {title} · task {task} ──"),
        None => println!("── {title} ──"),
    }
    if !session.is_live() {
        eprintln!("(live updates unavailable; showing history only)");
    }
    let mut printed = HashSet::new();
    print_new(&session, &mut printed);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                None => break,
                Some(line) if line.trim() == "/quit" => break,
                Some(line) => {
                    session.set_compose(line);
                    match session.send().await {
                        SendOutcome::Sent(_) => print_new(&session, &mut printed),
                        SendOutcome::Ignored => {}
                        SendOutcome::Rejected(e) | SendOutcome::Unconfirmed(e) => eprintln!("! {e}"),
                    }
                }
            },
            changed = session.next_live(), if session.is_live() => match changed {
                Some(true) => print_new(&session, &mut printed),
                Some(false) => {}
                None => eprintln!("(live updates stopped; showing history only)"),
            },
        }
    }

    session.close().await;
    Ok(())
}

fn print_new(session: &ChatSession, printed: &mut HashSet<String>) {
    let me = session.current_user_id().unwrap_or_default();
    let peer = session.peer().map(|p| p.display_name()).unwrap_or("User");
    for msg in session.messages() {
        if printed.insert(msg.message_id.clone()) {
            println!("{}", format_line(msg, me, peer));
        }
    }
}

fn format_line(msg: &ChatMessage, me: &str, peer: &str) -> String {
    let who = if msg.is_from(me) { "You" } else { peer };
    let at = msg.created_at.with_timezone(&Local).format("%H:%M");
    format!("[{at}] {who}: {}", msg.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn own_messages_are_labelled_you() {
        let msg = ChatMessage::from_row(&json!({
            "message_id": "m",
            "sender_id": "me",
            "receiver_id": "them",
            "content": "hi",
            "created_at": "2024-01-01T00:00:00Z",
        }))
        .unwrap();
        assert!(format_line(&msg, "me", "Bob").ends_with("] You: hi"));
        assert!(format_line(&msg, "them", "Ada").ends_with("] Ada: hi"));
    }
}

use crate::USERS_TABLE;
use crate::backend::RelationalStore;
use crate::error::ChatError;
use crate::filter::{Filter, Query};
use crate::ids;
use crate::message::{ChatMessage, PeerProfile};
use crate::scope::ConversationScope;
use chrono::Utc;
use std::sync::Arc;

/// History reads, message inserts and profile lookups against the store.
#[derive(Clone)]
pub struct MessageGateway {
    store: Arc<dyn RelationalStore>,
}

impl MessageGateway {
    pub fn new(store: Arc<dyn RelationalStore>) -> Self {
        Self { store }
    }

    /// All messages of the conversation, ascending by `created_at`.
    ///
    /// Rows are re-checked against the scope predicate after the select, so a
    /// store that over-matches (an OR on sender or receiver alone, say) cannot
    /// leak third-party messages into a pairwise conversation.
    pub async fn fetch_history(
        &self,
        scope: &ConversationScope,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let filter = scope.filter();
        let query = Query::new()
            .filter(filter.clone())
            .order_by("created_at", true);

        let rows = self
            .store
            .select(scope.table(), &query)
            .await
            .map_err(|e| {
                tracing::error!(scope = %scope, err = %e, "history fetch failed");
                ChatError::fetch("messages", &e)
            })?;

        let fetched = rows.len();
        let mut messages: Vec<ChatMessage> = rows
            .iter()
            .filter(|row| filter.matches(row))
            .filter_map(|row| match ChatMessage::from_row(row) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    tracing::warn!(scope = %scope, err = %e, "skipping malformed message row");
                    None
                }
            })
            .collect();
        if messages.len() < fetched {
            tracing::debug!(
                scope = %scope,
                dropped = fetched - messages.len(),
                "discarded rows outside the conversation"
            );
        }
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    /// Validate and insert a message from the caller, returning the stored row.
    ///
    /// Blank content and malformed identifiers are rejected before the store
    /// is touched. Failures are not retried. A row that was stored but cannot
    /// be decoded is reported as [`ChatError::Unconfirmed`], never as `Send`.
    pub async fn send(
        &self,
        scope: &ConversationScope,
        content: &str,
    ) -> Result<ChatMessage, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let invalid = ids::invalid_fields(&scope.identifier_fields());
        if !invalid.is_empty() {
            return Err(ChatError::InvalidIds(
                invalid.into_iter().map(String::from).collect(),
            ));
        }

        let row = scope.new_message_row(content, Utc::now());
        let stored = self.store.insert(scope.table(), row).await.map_err(|e| {
            tracing::error!(scope = %scope, err = %e, "message insert failed");
            ChatError::Send(format!("{e:#}"))
        })?;

        let msg = ChatMessage::from_row(&stored).map_err(|e| {
            tracing::warn!(scope = %scope, err = %e, "stored message row unreadable");
            ChatError::Unconfirmed(format!("{e:#}"))
        })?;
        tracing::debug!(scope = %scope, message_id = %msg.message_id, "message sent");
        Ok(msg)
    }

    /// Profile of one user.
    pub async fn fetch_peer(&self, user_id: &str) -> Result<PeerProfile, ChatError> {
        let query = Query::new()
            .filter(Filter::eq("user_id", user_id))
            .limit(1);
        let rows = self
            .store
            .select(USERS_TABLE, &query)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %user_id, err = %e, "user lookup failed");
                ChatError::fetch("user details", &e)
            })?;

        let Some(row) = rows.first() else {
            return Err(ChatError::Fetch {
                what: "user details",
                reason: format!("no user {user_id}"),
            });
        };
        PeerProfile::from_row(row).map_err(|e| ChatError::fetch("user details", &e))
    }
}

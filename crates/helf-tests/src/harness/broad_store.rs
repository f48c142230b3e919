use anyhow::Result;
use async_trait::async_trait;
use helf_chat::CHATS_TABLE;
use helf_chat::backend::RelationalStore;
use helf_chat::filter::{Filter, Query};
use serde_json::Value;
use std::sync::Arc;

/// A store that answers pairwise history selects with every message the
/// user sent or received, whoever the other party was.
pub struct BroadOrStore {
    inner: Arc<dyn RelationalStore>,
    user_id: String,
}

impl BroadOrStore {
    pub fn new(inner: Arc<dyn RelationalStore>, user_id: &str) -> Self {
        Self {
            inner,
            user_id: user_id.to_string(),
        }
    }
}

#[async_trait]
impl RelationalStore for BroadOrStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        if table != CHATS_TABLE {
            return self.inner.select(table, query).await;
        }
        let broad = Query {
            filter: Some(Filter::any(vec![
                Filter::eq("sender_id", &self.user_id),
                Filter::eq("receiver_id", &self.user_id),
            ])),
            ..query.clone()
        };
        self.inner.select(table, &broad).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<()> {
        self.inner.update(table, filter, patch).await
    }
}

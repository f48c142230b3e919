use anyhow::Result;
use async_trait::async_trait;
use helf_chat::backend::RelationalStore;
use helf_chat::filter::{Filter, Query};
use serde_json::Value;
use std::sync::Arc;

/// Stores inserts normally but answers with a row missing `created_at`.
pub struct UnreadableInsertStore {
    inner: Arc<dyn RelationalStore>,
}

impl UnreadableInsertStore {
    pub fn new(inner: Arc<dyn RelationalStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RelationalStore for UnreadableInsertStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        self.inner.select(table, query).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let mut stored = self.inner.insert(table, row).await?;
        if let Some(fields) = stored.as_object_mut() {
            fields.remove("created_at");
        }
        Ok(stored)
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<()> {
        self.inner.update(table, filter, patch).await
    }
}

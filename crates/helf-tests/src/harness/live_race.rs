use anyhow::Result;
use async_trait::async_trait;
use helf_chat::backend::RelationalStore;
use helf_chat::filter::{Filter, Query};
use helf_chat::memory::MemoryBackend;
use serde_json::Value;
use std::sync::Arc;

/// Delivers `live` rows to subscribers at the moment `table` is selected,
/// so they land in the feed while history is still being read.
pub struct LiveDuringSelect {
    mem: Arc<MemoryBackend>,
    table: &'static str,
    live: Vec<Value>,
}

impl LiveDuringSelect {
    pub fn new(mem: Arc<MemoryBackend>, table: &'static str, live: Vec<Value>) -> Self {
        Self { mem, table, live }
    }
}

#[async_trait]
impl RelationalStore for LiveDuringSelect {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        if table == self.table {
            for row in &self.live {
                self.mem.inject_live(table, row.clone()).await;
            }
        }
        self.mem.select(table, query).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        self.mem.insert(table, row).await
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<()> {
        self.mem.update(table, filter, patch).await
    }
}

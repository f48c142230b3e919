//! Interfaces to the hosted backend.
//!
//! Every component receives these explicitly (usually through [`Backend`]),
//! so tests and the demo mode can substitute [`crate::memory::MemoryBackend`].

use crate::filter::{Filter, Query};
use crate::message::UserId;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Ambient authentication session.
///
/// Implementations fail soft: errors are logged and reported as `None`.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_user_id(&self) -> Option<UserId>;
    async fn current_user_email(&self) -> Option<String>;
}

/// Relational table access.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>>;

    /// Insert one row and return it as stored (with generated columns).
    async fn insert(&self, table: &str, row: Value) -> Result<Value>;

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<()>;
}

/// What a live channel listens to: inserts into `table` matching `filter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSpec {
    pub channel: String,
    pub table: String,
    pub filter: Filter,
}

/// An open live channel. Yields inserted rows until the feed closes it.
#[derive(Debug)]
pub struct FeedChannel {
    id: u64,
    name: String,
    rows: mpsc::Receiver<Value>,
}

impl FeedChannel {
    pub fn new(id: u64, name: impl Into<String>, rows: mpsc::Receiver<Value>) -> Self {
        Self {
            id,
            name: name.into(),
            rows,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next inserted row, or `None` once the feed side has gone away.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rows.recv().await
    }

    /// A row that is already buffered, without waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rows.try_recv().ok()
    }
}

/// Push-based change feed.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, spec: FeedSpec) -> Result<FeedChannel>;

    /// Release the channel. Must not fail; problems are logged.
    async fn unsubscribe(&self, channel: FeedChannel);
}

/// Maps a stored object path (e.g. a profile picture) to a public URL.
pub trait AvatarResolver: Send + Sync {
    fn public_url(&self, path: &str) -> String;
}

/// The injected collaborators a chat session works against.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthProvider>,
    pub store: Arc<dyn RelationalStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub avatars: Arc<dyn AvatarResolver>,
}

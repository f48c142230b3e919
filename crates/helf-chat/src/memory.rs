//! In-process backend: tables of JSON rows plus a change feed that fans
//! inserts out to matching subscriptions.
//!
//! Backs the CLI's demo mode and every test. Failure switches and call
//! counters let tests observe exactly which backend operations ran.

use crate::backend::{
    AuthProvider, AvatarResolver, Backend, ChangeFeed, FeedChannel, FeedSpec, RelationalStore,
};
use crate::filter::{Filter, Query};
use crate::message::UserId;
use crate::{CHATS_TABLE, TASK_MESSAGES_TABLE, USERS_TABLE};
use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

/// Buffered rows per subscription before the feed starts dropping.
const FEED_BUFFER: usize = 256;

/// Tables whose rows get a generated `message_id` on insert.
const GENERATED_IDS: &[&str] = &[CHATS_TABLE, TASK_MESSAGES_TABLE];

/// Count of each backend operation performed so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallStats {
    pub selects: usize,
    pub inserts: usize,
    pub updates: usize,
    pub subscribes: usize,
    pub unsubscribes: usize,
}

#[derive(Default)]
struct Faults {
    fail_selects: bool,
    failing_tables: HashSet<String>,
    fail_inserts: bool,
    reject_subscriptions: bool,
}

struct Subscriber {
    id: u64,
    table: String,
    filter: Filter,
    tx: mpsc::Sender<Value>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Value>>,
    subscribers: Vec<Subscriber>,
    next_channel_id: u64,
    stats: CallStats,
    faults: Faults,
}

impl Inner {
    /// Deliver a row to every live subscriber on `table` whose filter matches.
    fn fan_out(&mut self, table: &str, row: &Value) {
        self.subscribers.retain(|s| !s.tx.is_closed());
        for sub in self
            .subscribers
            .iter()
            .filter(|s| s.table == table && s.filter.matches(row))
        {
            if let Err(e) = sub.tx.try_send(row.clone()) {
                tracing::warn!(channel_id = sub.id, err = %e, "live row dropped");
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A [`Backend`] that authenticates as `user_id` (`None` = signed out).
    pub fn backend_as(self: &Arc<Self>, user_id: Option<&str>) -> Backend {
        Backend {
            auth: Arc::new(StaticAuth::new(user_id)),
            store: self.clone(),
            feed: self.clone(),
            avatars: self.clone(),
        }
    }

    /// Add a row to the `users` table.
    pub async fn add_user(&self, user_id: &str, name: &str, profile_picture: Option<&str>) {
        self.seed(
            USERS_TABLE,
            json!({
                "user_id": user_id,
                "name": name,
                "profile_picture": profile_picture,
            }),
        )
        .await;
    }

    /// Store a row without notifying subscribers or counting an insert.
    pub async fn seed(&self, table: &str, row: Value) {
        let mut inner = self.inner.lock().await;
        inner.tables.entry(table.to_string()).or_default().push(row);
    }

    /// Deliver a row to live subscribers without storing it, as a feed
    /// redelivery would.
    pub async fn inject_live(&self, table: &str, row: Value) {
        self.inner.lock().await.fan_out(table, &row);
    }

    pub async fn rows(&self, table: &str) -> Vec<Value> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).cloned().unwrap_or_default()
    }

    pub async fn stats(&self) -> CallStats {
        self.inner.lock().await.stats
    }

    /// Subscriptions that are still open.
    pub async fn open_subscriptions(&self) -> usize {
        let inner = self.inner.lock().await;
        inner
            .subscribers
            .iter()
            .filter(|s| !s.tx.is_closed())
            .count()
    }

    pub async fn set_fail_selects(&self, fail: bool) {
        self.inner.lock().await.faults.fail_selects = fail;
    }

    /// Fail selects on one table only.
    pub async fn set_fail_selects_on(&self, table: &str) {
        let mut inner = self.inner.lock().await;
        inner.faults.failing_tables.insert(table.to_string());
    }

    pub async fn set_fail_inserts(&self, fail: bool) {
        self.inner.lock().await.faults.fail_inserts = fail;
    }

    pub async fn set_reject_subscriptions(&self, reject: bool) {
        self.inner.lock().await.faults.reject_subscriptions = reject;
    }
}

#[async_trait]
impl RelationalStore for MemoryBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let mut inner = self.inner.lock().await;
        inner.stats.selects += 1;
        if inner.faults.fail_selects || inner.faults.failing_tables.contains(table) {
            bail!("select on {table} failed");
        }
        Ok(inner
            .tables
            .get(table)
            .map(|rows| query.apply(rows.iter()))
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let mut inner = self.inner.lock().await;
        inner.stats.inserts += 1;
        if inner.faults.fail_inserts {
            bail!("insert into {table} failed");
        }
        let Value::Object(mut fields) = row else {
            bail!("insert into {table}: row must be an object");
        };
        if GENERATED_IDS.contains(&table) && !fields.contains_key("message_id") {
            fields.insert(
                "message_id".to_string(),
                Value::String(Uuid::new_v4().to_string()),
            );
        }
        let stored = Value::Object(fields);
        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());
        inner.fan_out(table, &stored);
        Ok(stored)
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.stats.updates += 1;
        let Value::Object(patch) = patch else {
            bail!("update {table}: patch must be an object");
        };
        for row in inner.tables.entry(table.to_string()).or_default() {
            if filter.matches(row)
                && let Value::Object(fields) = row
            {
                fields.extend(patch.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryBackend {
    async fn subscribe(&self, spec: FeedSpec) -> Result<FeedChannel> {
        let mut inner = self.inner.lock().await;
        inner.stats.subscribes += 1;
        if inner.faults.reject_subscriptions {
            bail!("channel {} rejected", spec.channel);
        }
        inner.next_channel_id += 1;
        let id = inner.next_channel_id;
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        inner.subscribers.push(Subscriber {
            id,
            table: spec.table,
            filter: spec.filter,
            tx,
        });
        Ok(FeedChannel::new(id, spec.channel, rx))
    }

    async fn unsubscribe(&self, channel: FeedChannel) {
        let mut inner = self.inner.lock().await;
        inner.stats.unsubscribes += 1;
        inner.subscribers.retain(|s| s.id != channel.id());
    }
}

impl AvatarResolver for MemoryBackend {
    fn public_url(&self, path: &str) -> String {
        format!("memory://avatars/{path}")
    }
}

/// Auth provider with a fixed identity.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    user_id: Option<UserId>,
}

impl StaticAuth {
    pub fn new(user_id: Option<&str>) -> Self {
        Self {
            user_id: user_id.map(str::to_string),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn current_user_id(&self) -> Option<UserId> {
        self.user_id.clone()
    }

    async fn current_user_email(&self) -> Option<String> {
        self.user_id.as_ref().map(|id| format!("{id}@memory.local"))
    }
}

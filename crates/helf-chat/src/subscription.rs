use crate::backend::{ChangeFeed, FeedChannel, FeedSpec};
use crate::error::ChatError;
use crate::filter::Filter;
use crate::message::ChatMessage;
use crate::scope::ConversationScope;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Subscribing,
    Subscribed,
    /// The feed rejected or dropped the channel. History stays usable.
    Failed(String),
    Closed,
}

/// Live insert feed for one conversation scope.
pub struct LiveSubscription {
    feed: Arc<dyn ChangeFeed>,
    scope: ConversationScope,
    filter: Filter,
    state: SubscriptionState,
    channel: Option<FeedChannel>,
}

impl LiveSubscription {
    /// Subscribe to inserts for `scope`.
    ///
    /// Never fails: a rejected subscribe leaves the subscription in
    /// [`SubscriptionState::Failed`] and the caller carries on without live
    /// updates.
    pub async fn open(feed: Arc<dyn ChangeFeed>, scope: ConversationScope) -> Self {
        let filter = scope.filter();
        let mut sub = Self {
            feed,
            scope,
            filter,
            state: SubscriptionState::Idle,
            channel: None,
        };

        sub.state = SubscriptionState::Subscribing;
        let spec = FeedSpec {
            channel: sub.scope.channel_name(),
            table: sub.scope.table().to_string(),
            filter: sub.filter.clone(),
        };
        match sub.feed.subscribe(spec).await {
            Ok(channel) => {
                tracing::info!(scope = %sub.scope, channel = %channel.name(), "live updates subscribed");
                sub.channel = Some(channel);
                sub.state = SubscriptionState::Subscribed;
            }
            Err(e) => {
                tracing::warn!(scope = %sub.scope, err = %e, "live updates unavailable, history only");
                sub.state = SubscriptionState::Failed(format!("{e:#}"));
            }
        }
        sub
    }

    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    pub fn scope(&self) -> &ConversationScope {
        &self.scope
    }

    pub fn is_live(&self) -> bool {
        self.state == SubscriptionState::Subscribed
    }

    /// The subscribe failure, if any, as a [`ChatError::Subscribe`].
    pub fn error(&self) -> Option<ChatError> {
        match &self.state {
            SubscriptionState::Failed(reason) => Some(ChatError::Subscribe(reason.clone())),
            _ => None,
        }
    }

    /// Next live message in this conversation.
    ///
    /// Rows outside the scope or that fail to decode are dropped. Returns
    /// `None` when not subscribed, or once the feed ends. An ended feed is
    /// released right away and the subscription moves to `Failed`.
    pub async fn next(&mut self) -> Option<ChatMessage> {
        loop {
            let channel = self.channel.as_mut()?;
            let Some(row) = channel.recv().await else {
                tracing::warn!(scope = %self.scope, "live feed ended");
                if let Some(channel) = self.channel.take() {
                    self.feed.unsubscribe(channel).await;
                }
                self.state = SubscriptionState::Failed("feed closed".to_string());
                return None;
            };
            if let Some(msg) = self.accept(&row) {
                return Some(msg);
            }
        }
    }

    /// Next already-buffered live message, without waiting.
    pub fn try_next(&mut self) -> Option<ChatMessage> {
        loop {
            let row = self.channel.as_mut()?.try_recv()?;
            if let Some(msg) = self.accept(&row) {
                return Some(msg);
            }
        }
    }

    fn accept(&self, row: &Value) -> Option<ChatMessage> {
        if !self.filter.matches(row) {
            tracing::debug!(scope = %self.scope, "dropping live row outside conversation");
            return None;
        }
        match ChatMessage::from_row(row) {
            Ok(msg) => Some(msg),
            Err(e) => {
                tracing::debug!(scope = %self.scope, err = %e, "dropping undecodable live row");
                None
            }
        }
    }

    /// Release the channel. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.state == SubscriptionState::Closed {
            return;
        }
        if let Some(channel) = self.channel.take() {
            self.feed.unsubscribe(channel).await;
            tracing::info!(scope = %self.scope, "live updates closed");
        }
        self.state = SubscriptionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CHATS_TABLE;
    use crate::memory::MemoryBackend;
    use crate::scope::ConversationTarget;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    const A: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
    const B: &str = "16fd2706-8baf-433b-82eb-8c7fada847da";
    const C: &str = "e9b1f0c4-3a6d-4c1e-9f2a-5b7d8c9e0f1a";

    fn pair() -> ConversationScope {
        ConversationScope::resolve(
            A,
            &ConversationTarget::Peer {
                other_user_id: B.to_string(),
            },
        )
        .unwrap()
    }

    fn row(id: &str, from: &str, to: &str) -> Value {
        json!({
            "message_id": id,
            "sender_id": from,
            "receiver_id": to,
            "content": "x",
            "created_at": "2024-01-01T00:00:00Z",
        })
    }

    #[tokio::test]
    async fn delivers_matching_rows_only() {
        let mem = MemoryBackend::new();
        let mut sub = LiveSubscription::open(mem.clone(), pair()).await;
        assert!(sub.is_live());

        mem.inject_live(CHATS_TABLE, row("c", C, A)).await;
        mem.inject_live(CHATS_TABLE, row("1", B, A)).await;
        assert_eq!(sub.next().await.unwrap().message_id, "1");
        assert!(sub.try_next().is_none());
    }

    #[tokio::test]
    async fn undecodable_row_is_skipped() {
        let mem = MemoryBackend::new();
        let mut sub = LiveSubscription::open(mem.clone(), pair()).await;
        mem.inject_live(CHATS_TABLE, json!({"sender_id": A, "receiver_id": B}))
            .await;
        mem.inject_live(CHATS_TABLE, row("2", A, B)).await;
        assert_eq!(sub.try_next().unwrap().message_id, "2");
    }

    #[tokio::test]
    async fn rejected_subscribe_degrades() {
        let mem = MemoryBackend::new();
        mem.set_reject_subscriptions(true).await;
        let mut sub = LiveSubscription::open(mem.clone(), pair()).await;
        assert!(matches!(sub.state(), SubscriptionState::Failed(_)));
        assert!(matches!(sub.error(), Some(ChatError::Subscribe(_))));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mem = MemoryBackend::new();
        let mut sub = LiveSubscription::open(mem.clone(), pair()).await;
        sub.close().await;
        sub.close().await;
        assert_eq!(sub.state(), &SubscriptionState::Closed);
        assert_eq!(mem.stats().await.unsubscribes, 1);
        assert_eq!(mem.open_subscriptions().await, 0);
        assert!(sub.next().await.is_none());
    }

    /// Hands out channels whose sending side is already gone.
    #[derive(Default)]
    struct DeadFeed {
        unsubscribes: AtomicUsize,
    }

    #[async_trait]
    impl ChangeFeed for DeadFeed {
        async fn subscribe(&self, spec: FeedSpec) -> Result<FeedChannel> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(FeedChannel::new(1, spec.channel, rx))
        }

        async fn unsubscribe(&self, _channel: FeedChannel) {
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn ended_feed_is_released_once() {
        let feed = Arc::new(DeadFeed::default());
        let mut sub = LiveSubscription::open(feed.clone(), pair()).await;
        assert!(sub.is_live());

        assert!(sub.next().await.is_none());
        assert!(matches!(sub.state(), SubscriptionState::Failed(_)));
        assert_eq!(feed.unsubscribes.load(Ordering::SeqCst), 1);

        sub.close().await;
        assert_eq!(sub.state(), &SubscriptionState::Closed);
        assert_eq!(feed.unsubscribes.load(Ordering::SeqCst), 1);
    }
}

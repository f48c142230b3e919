//! Conversation view-model.
//!
//! [`ChatSession`] owns everything one open conversation needs: the cached
//! identity, the resolved scope, the live subscription and the merged
//! timeline. A presentation layer reads its accessors and drives it with
//! [`ChatSession::open`], [`ChatSession::send`] and [`ChatSession::next_live`].

use crate::backend::Backend;
use crate::error::ChatError;
use crate::gateway::MessageGateway;
use crate::identity::IdentityResolver;
use crate::message::{ChatMessage, PeerProfile};
use crate::scope::{ConversationScope, ConversationTarget};
use crate::subscription::{LiveSubscription, SubscriptionState};
use crate::timeline::MessageTimeline;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewStatus {
    Loading,
    Ready,
    /// Replaces the whole view. Carries a fatal [`ChatError`].
    Failed(ChatError),
    Closed,
}

/// Result of [`ChatSession::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Stored; carries the new `message_id`.
    Sent(String),
    /// Nothing to send, or no conversation is open. The store was not called.
    Ignored,
    /// Validation or insert failed; the compose text is kept.
    Rejected(ChatError),
    /// Stored, but the returned row could not be decoded. The compose text
    /// is cleared so a retry does not store the message twice.
    Unconfirmed(ChatError),
}

pub struct ChatSession {
    backend: Backend,
    gateway: MessageGateway,
    identity: IdentityResolver,
    target: Option<ConversationTarget>,
    scope: Option<ConversationScope>,
    subscription: Option<LiveSubscription>,
    timeline: MessageTimeline,
    status: ViewStatus,
    notice: Option<ChatError>,
    compose: String,
    peer: Option<PeerProfile>,
    scroll_epoch: u64,
}

impl ChatSession {
    pub fn new(backend: Backend) -> Self {
        Self {
            gateway: MessageGateway::new(backend.store.clone()),
            backend,
            identity: IdentityResolver::new(),
            target: None,
            scope: None,
            subscription: None,
            timeline: MessageTimeline::new(),
            status: ViewStatus::Loading,
            notice: None,
            compose: String::new(),
            peer: None,
            scroll_epoch: 0,
        }
    }

    /// Open a conversation, tearing down whatever was open before.
    ///
    /// On return the status is either `Ready` or `Failed`. The live feed is
    /// subscribed before history is fetched; rows that arrive in between are
    /// merged by id, so none are lost or doubled.
    pub async fn open(&mut self, target: ConversationTarget) {
        self.teardown().await;
        self.status = ViewStatus::Loading;
        self.target = Some(target.clone());

        match self.load(&target).await {
            Ok(()) => {
                self.status = ViewStatus::Ready;
                while let Some(msg) = self.subscription.as_mut().and_then(LiveSubscription::try_next) {
                    self.timeline.merge(msg);
                }
                self.scroll_epoch += 1;
                tracing::debug!(
                    scope = %self.scope.as_ref().map(ToString::to_string).unwrap_or_default(),
                    messages = self.timeline.len(),
                    live = self.is_live(),
                    "conversation ready"
                );
            }
            Err(e) => {
                tracing::error!(code = e.code(), err = %e, "conversation failed to open");
                if let Some(mut sub) = self.subscription.take() {
                    sub.close().await;
                }
                self.status = ViewStatus::Failed(e);
            }
        }
    }

    async fn load(&mut self, target: &ConversationTarget) -> Result<(), ChatError> {
        let me = self.identity.resolve(self.backend.auth.as_ref()).await?;
        let scope = ConversationScope::resolve(&me, target)?;
        self.scope = Some(scope.clone());

        let peer = self.gateway.fetch_peer(scope.other_user_id()).await?;
        self.peer = Some(peer.with_avatar(self.backend.avatars.as_ref()));

        self.subscription =
            Some(LiveSubscription::open(self.backend.feed.clone(), scope.clone()).await);

        let history = self.gateway.fetch_history(&scope).await?;
        self.timeline.load_history(history);
        Ok(())
    }

    /// Close the current conversation, clear the timeline and open `target`.
    pub async fn switch(&mut self, target: ConversationTarget) {
        self.open(target).await;
    }

    pub fn set_compose(&mut self, text: impl Into<String>) {
        self.compose = text.into();
    }

    /// Send the compose buffer.
    pub async fn send(&mut self) -> SendOutcome {
        if self.status != ViewStatus::Ready || self.compose.trim().is_empty() {
            return SendOutcome::Ignored;
        }
        let Some(scope) = &self.scope else {
            return SendOutcome::Ignored;
        };

        match self.gateway.send(scope, &self.compose).await {
            Ok(msg) => {
                let id = msg.message_id.clone();
                self.timeline.merge(msg);
                self.compose.clear();
                self.notice = None;
                self.scroll_epoch += 1;
                SendOutcome::Sent(id)
            }
            Err(ChatError::EmptyMessage) => SendOutcome::Ignored,
            Err(e @ ChatError::Unconfirmed(_)) => {
                self.compose.clear();
                self.notice = Some(e.clone());
                SendOutcome::Unconfirmed(e)
            }
            Err(e) => {
                tracing::error!(code = e.code(), err = %e, "send rejected");
                self.notice = Some(e.clone());
                SendOutcome::Rejected(e)
            }
        }
    }

    /// Merge one live message. Returns whether the timeline changed.
    ///
    /// Ignored unless the conversation is `Ready`, which keeps late events
    /// from touching a closed or failed view.
    pub fn reconcile_live(&mut self, msg: ChatMessage) -> bool {
        if self.status != ViewStatus::Ready {
            return false;
        }
        if !self.scope.as_ref().is_some_and(|s| s.matches(&msg)) {
            return false;
        }
        let merged = self.timeline.merge(msg);
        if merged {
            self.scroll_epoch += 1;
        }
        merged
    }

    /// Wait for the next live message and merge it.
    ///
    /// `Some(changed)` per event; `None` once there is no live feed.
    pub async fn next_live(&mut self) -> Option<bool> {
        if self.status != ViewStatus::Ready {
            return None;
        }
        let msg = self.subscription.as_mut()?.next().await?;
        Some(self.reconcile_live(msg))
    }

    /// Unmount. Closes the subscription; later events change nothing.
    pub async fn close(&mut self) {
        self.teardown().await;
        self.target = None;
        self.status = ViewStatus::Closed;
    }

    async fn teardown(&mut self) {
        if let Some(mut sub) = self.subscription.take() {
            sub.close().await;
        }
        self.timeline.clear();
        self.scope = None;
        self.peer = None;
        self.notice = None;
        self.compose.clear();
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn status(&self) -> &ViewStatus {
        &self.status
    }

    pub fn notice(&self) -> Option<&ChatError> {
        self.notice.as_ref()
    }

    pub fn compose(&self) -> &str {
        &self.compose
    }

    pub fn peer(&self) -> Option<&PeerProfile> {
        self.peer.as_ref()
    }

    pub fn target(&self) -> Option<&ConversationTarget> {
        self.target.as_ref()
    }

    pub fn scope(&self) -> Option<&ConversationScope> {
        self.scope.as_ref()
    }

    pub fn current_user_id(&self) -> Option<&str> {
        self.identity.user_id()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.timeline.as_slice()
    }

    pub fn timeline(&self) -> &MessageTimeline {
        &self.timeline
    }

    /// Bumped whenever the view should scroll to the latest message.
    pub fn scroll_epoch(&self) -> u64 {
        self.scroll_epoch
    }

    pub fn is_live(&self) -> bool {
        self.subscription.as_ref().is_some_and(LiveSubscription::is_live)
    }

    pub fn subscription_state(&self) -> Option<&SubscriptionState> {
        self.subscription.as_ref().map(LiveSubscription::state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::{CHATS_TABLE, TASK_MESSAGES_TABLE};
    use serde_json::json;
    use std::sync::Arc;

    const A: &str = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
    const B: &str = "16fd2706-8baf-433b-82eb-8c7fada847da";
    const T: &str = "0b7c2a1e-5f4d-4e3b-8a9c-1d2e3f4a5b6c";

    fn peer(other: &str) -> ConversationTarget {
        ConversationTarget::Peer {
            other_user_id: other.to_string(),
        }
    }

    async fn community() -> Arc<MemoryBackend> {
        let mem = MemoryBackend::new();
        mem.add_user(A, "Ada", Some("a.png")).await;
        mem.add_user(B, "Bob", None).await;
        mem
    }

    fn row(id: &str, from: &str, to: &str, secs: u32) -> serde_json::Value {
        json!({
            "message_id": id,
            "sender_id": from,
            "receiver_id": to,
            "content": format!("msg {id}"),
            "created_at": format!("2024-01-01T00:00:{secs:02}Z"),
        })
    }

    #[tokio::test]
    async fn open_loads_history_and_peer() {
        let mem = community().await;
        mem.seed(CHATS_TABLE, row("1", A, B, 1)).await;
        let mut session = ChatSession::new(mem.backend_as(Some(B)));
        session.open(peer(A)).await;

        assert_eq!(session.status(), &ViewStatus::Ready);
        assert_eq!(session.timeline().ids(), vec!["1"]);
        let p = session.peer().unwrap();
        assert_eq!(p.display_name(), "Ada");
        assert_eq!(p.avatar_url.as_deref(), Some("memory://avatars/a.png"));
        assert!(session.is_live());
        assert_eq!(session.scroll_epoch(), 1);
    }

    #[tokio::test]
    async fn unauthenticated_is_fatal() {
        let mem = community().await;
        let mut session = ChatSession::new(mem.backend_as(None));
        session.open(peer(A)).await;
        assert_eq!(
            session.status(),
            &ViewStatus::Failed(ChatError::Unauthenticated)
        );
        assert_eq!(mem.stats().await.selects, 0);
    }

    #[tokio::test]
    async fn send_appends_confirmed_row_once() {
        let mem = community().await;
        let mut session = ChatSession::new(mem.backend_as(Some(A)));
        session.open(peer(B)).await;

        session.set_compose("  hello ");
        let SendOutcome::Sent(id) = session.send().await else {
            panic!("send failed");
        };
        // own insert also comes back over the live feed
        assert_eq!(session.next_live().await, Some(false));
        assert_eq!(session.timeline().ids(), vec![id.as_str()]);
        assert_eq!(session.messages()[0].content, "hello");
        assert_eq!(session.compose(), "");
    }

    #[tokio::test]
    async fn failed_send_keeps_compose_and_sets_notice() {
        let mem = community().await;
        let mut session = ChatSession::new(mem.backend_as(Some(A)));
        session.open(peer(B)).await;
        mem.set_fail_inserts(true).await;

        session.set_compose("keep me");
        assert!(matches!(
            session.send().await,
            SendOutcome::Rejected(ChatError::Send(_))
        ));
        assert_eq!(session.compose(), "keep me");
        assert!(matches!(session.notice(), Some(ChatError::Send(_))));
        assert_eq!(session.status(), &ViewStatus::Ready);
        session.dismiss_notice();
        assert!(session.notice().is_none());
    }

    #[tokio::test]
    async fn blank_send_is_ignored() {
        let mem = community().await;
        let mut session = ChatSession::new(mem.backend_as(Some(A)));
        session.open(peer(B)).await;
        session.set_compose("   ");
        assert_eq!(session.send().await, SendOutcome::Ignored);
        assert_eq!(mem.stats().await.inserts, 0);
        assert!(session.notice().is_none());
    }

    #[tokio::test]
    async fn reconcile_ignored_after_close() {
        let mem = community().await;
        let mut session = ChatSession::new(mem.backend_as(Some(A)));
        session.open(peer(B)).await;
        session.close().await;

        let late = ChatMessage::from_row(&row("9", B, A, 9)).unwrap();
        assert!(!session.reconcile_live(late));
        assert!(session.messages().is_empty());
        assert_eq!(session.status(), &ViewStatus::Closed);
        assert_eq!(session.next_live().await, None);
        assert_eq!(mem.open_subscriptions().await, 0);
    }

    #[tokio::test]
    async fn switch_closes_old_subscription_first() {
        let mem = community().await;
        mem.seed(CHATS_TABLE, row("1", A, B, 1)).await;
        let mut session = ChatSession::new(mem.backend_as(Some(A)));
        session.open(peer(B)).await;

        session
            .switch(ConversationTarget::Task {
                task_id: T.to_string(),
                other_user_id: B.to_string(),
            })
            .await;
        assert_eq!(session.status(), &ViewStatus::Ready);
        assert!(session.messages().is_empty());
        assert_eq!(mem.open_subscriptions().await, 1);
        assert_eq!(mem.stats().await.unsubscribes, 1);
        assert_eq!(session.scope().unwrap().table(), TASK_MESSAGES_TABLE);
    }

    #[tokio::test]
    async fn degraded_subscription_still_ready() {
        let mem = community().await;
        mem.set_reject_subscriptions(true).await;
        let mut session = ChatSession::new(mem.backend_as(Some(A)));
        session.open(peer(B)).await;
        assert_eq!(session.status(), &ViewStatus::Ready);
        assert!(!session.is_live());
        assert_eq!(session.next_live().await, None);
    }
}

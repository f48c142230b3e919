use crate::backend::AuthProvider;
use crate::error::ChatError;
use crate::message::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    Unresolved,
    Resolved(UserId),
    /// Terminal; no automatic retry.
    Failed,
}

/// Resolves the caller's identity once and caches it for the session.
#[derive(Debug)]
pub struct IdentityResolver {
    state: IdentityState,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self {
            state: IdentityState::Unresolved,
        }
    }

    /// Start from an identity the caller already resolved.
    pub fn resolved(user_id: impl Into<UserId>) -> Self {
        Self {
            state: IdentityState::Resolved(user_id.into()),
        }
    }

    pub fn state(&self) -> &IdentityState {
        &self.state
    }

    pub fn user_id(&self) -> Option<&str> {
        match &self.state {
            IdentityState::Resolved(id) => Some(id),
            _ => None,
        }
    }

    /// Ask the auth provider at most once; later calls return the cached
    /// outcome.
    pub async fn resolve(&mut self, auth: &dyn AuthProvider) -> Result<UserId, ChatError> {
        match &self.state {
            IdentityState::Resolved(id) => return Ok(id.clone()),
            IdentityState::Failed => return Err(ChatError::Unauthenticated),
            IdentityState::Unresolved => {}
        }

        match auth.current_user_id().await {
            Some(id) if !id.is_empty() => {
                tracing::debug!(user_id = %id, "identity resolved");
                self.state = IdentityState::Resolved(id.clone());
                Ok(id)
            }
            _ => {
                tracing::warn!("no authenticated user, conversation unavailable");
                self.state = IdentityState::Failed;
                Err(ChatError::Unauthenticated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAuth {
        user: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthProvider for CountingAuth {
        async fn current_user_id(&self) -> Option<UserId> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.user.map(str::to_string)
        }

        async fn current_user_email(&self) -> Option<String> {
            None
        }
    }

    fn auth(user: Option<&'static str>) -> CountingAuth {
        CountingAuth {
            user,
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn resolves_once_and_caches() {
        let auth = auth(Some("user-1"));
        let mut resolver = IdentityResolver::new();
        assert_eq!(resolver.state(), &IdentityState::Unresolved);
        assert_eq!(resolver.resolve(&auth).await.unwrap(), "user-1");
        assert_eq!(resolver.resolve(&auth).await.unwrap(), "user-1");
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.user_id(), Some("user-1"));
    }

    #[tokio::test]
    async fn failure_is_terminal() {
        let auth = auth(None);
        let mut resolver = IdentityResolver::new();
        assert_eq!(
            resolver.resolve(&auth).await,
            Err(ChatError::Unauthenticated)
        );
        assert_eq!(
            resolver.resolve(&auth).await,
            Err(ChatError::Unauthenticated)
        );
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.state(), &IdentityState::Failed);
    }

    #[tokio::test]
    async fn pre_resolved_never_asks() {
        let auth = auth(Some("someone-else"));
        let mut resolver = IdentityResolver::resolved("me");
        assert_eq!(resolver.resolve(&auth).await.unwrap(), "me");
        assert_eq!(auth.calls.load(Ordering::SeqCst), 0);
    }
}

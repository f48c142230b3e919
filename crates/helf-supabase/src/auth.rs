use crate::config::SupabaseConfig;
use crate::store::check;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use helf_chat::UserId;
use helf_chat::backend::AuthProvider;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens returned by a password sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUser,
}

/// GoTrue client (`/auth/v1`).
pub struct SupabaseAuth {
    client: reqwest::Client,
    config: SupabaseConfig,
    user: Mutex<Option<AuthUser>>,
}

impl SupabaseAuth {
    pub fn new(client: reqwest::Client, config: SupabaseConfig) -> Self {
        Self {
            client,
            config,
            user: Mutex::new(None),
        }
    }

    /// The signed-in user, fetched once from `/auth/v1/user`.
    pub async fn user(&self) -> Result<AuthUser> {
        let mut cached = self.user.lock().await;
        if let Some(user) = cached.as_ref() {
            return Ok(user.clone());
        }
        let Some(token) = self.config.access_token.as_deref() else {
            bail!("not signed in");
        };
        let resp = self
            .client
            .get(self.config.endpoint("/auth/v1/user"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .context("fetch current user")?;
        let user: AuthUser = check(resp, "fetch current user")
            .await?
            .json()
            .await
            .context("decode current user")?;
        *cached = Some(user.clone());
        Ok(user)
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthSession> {
        let resp = self
            .client
            .post(self.config.endpoint("/auth/v1/token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .context("sign in")?;
        let session: AuthSession = check(resp, "sign in")
            .await?
            .json()
            .await
            .context("decode sign-in response")?;
        tracing::info!(user_id = %session.user.id, "signed in");
        *self.user.lock().await = Some(session.user.clone());
        Ok(session)
    }

    /// Register a new account. Returns the created user; depending on project
    /// settings the address may need confirming before sign-in works.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser> {
        let resp = self
            .client
            .post(self.config.endpoint("/auth/v1/signup"))
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .context("sign up")?;
        let body: serde_json::Value = check(resp, "sign up")
            .await?
            .json()
            .await
            .context("decode sign-up response")?;
        // Confirmed projects answer with a session, unconfirmed ones with the bare user.
        let user = body.get("user").cloned().unwrap_or(body);
        serde_json::from_value(user).context("decode signed-up user")
    }

    /// Revoke the access token server-side.
    pub async fn sign_out(&self) -> Result<()> {
        let Some(token) = self.config.access_token.as_deref() else {
            return Ok(());
        };
        let resp = self
            .client
            .post(self.config.endpoint("/auth/v1/logout"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .context("sign out")?;
        check(resp, "sign out").await?;
        *self.user.lock().await = None;
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn current_user_id(&self) -> Option<UserId> {
        match self.user().await {
            Ok(user) => Some(user.id),
            Err(e) => {
                tracing::warn!(err = %e, "could not resolve current user");
                None
            }
        }
    }

    async fn current_user_email(&self) -> Option<String> {
        match self.user().await {
            Ok(user) => user.email,
            Err(e) => {
                tracing::warn!(err = %e, "could not resolve current user email");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_decodes_gotrue_token_response() {
        let body = json!({
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "r",
            "user": { "id": "u-1", "email": "ada@example.com", "role": "authenticated" }
        });
        let session: AuthSession = serde_json::from_value(body).unwrap();
        assert_eq!(session.user.id, "u-1");
        assert_eq!(session.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn signed_out_fails_soft_without_network() {
        let config = SupabaseConfig::new("http://127.0.0.1:9", "anon").unwrap();
        let auth = SupabaseAuth::new(reqwest::Client::new(), config);
        assert!(auth.current_user_id().await.is_none());
        assert!(auth.current_user_email().await.is_none());
        auth.sign_out().await.unwrap();
    }
}

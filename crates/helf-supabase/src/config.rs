use anyhow::{Result, bail};
use std::fmt;

/// Where the hosted project lives and how to authenticate against it.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`. No trailing slash.
    pub url: String,
    /// Public anonymous key, sent as `apikey` on every request.
    pub anon_key: String,
    /// User access token from a password sign-in, if any.
    pub access_token: Option<String>,
}

impl SupabaseConfig {
    pub fn new(url: &str, anon_key: &str) -> Result<Self> {
        let url = url.trim().trim_end_matches('/');
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            bail!("project URL must start with http:// or https://, got {url:?}");
        }
        if anon_key.trim().is_empty() {
            bail!("anon key is empty");
        }
        Ok(Self {
            url: url.to_string(),
            anon_key: anon_key.trim().to_string(),
            access_token: None,
        })
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Token for the `Authorization: Bearer` header. Falls back to the anon key.
    pub fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.url)
    }

    /// Realtime websocket URL (`ws`/`wss` matching the project scheme).
    pub fn realtime_url(&self) -> String {
        let ws_base = match self.url.strip_prefix("https://") {
            Some(rest) => format!("wss://{rest}"),
            None => format!("ws://{}", self.url.trim_start_matches("http://")),
        };
        format!(
            "{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.anon_key
        )
    }
}

impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

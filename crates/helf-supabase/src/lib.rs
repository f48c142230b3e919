//! Hosted backend adapter: GoTrue auth, PostgREST tables, object storage
//! URLs and the realtime change feed, wired into a [`helf_chat::Backend`].

pub mod auth;
pub mod config;
pub mod realtime;
pub mod storage;
pub mod store;

pub use auth::{AuthSession, AuthUser, SupabaseAuth};
pub use config::SupabaseConfig;

use anyhow::Result;
use helf_chat::Backend;
use std::sync::Arc;

/// Shared HTTP client for all REST calls.
pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(format!("helf/{}", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// A [`Backend`] talking to the project in `config`.
pub fn backend(config: &SupabaseConfig) -> Result<Backend> {
    let client = http_client()?;
    Ok(Backend {
        auth: Arc::new(SupabaseAuth::new(client.clone(), config.clone())),
        store: Arc::new(store::SupabaseStore::new(client, config.clone())),
        feed: Arc::new(realtime::SupabaseRealtime::new(config.clone())),
        avatars: Arc::new(storage::SupabaseStorage::new(
            &config.url,
            storage::AVATARS_BUCKET,
        )),
    })
}

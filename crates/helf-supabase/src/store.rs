use crate::config::SupabaseConfig;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use helf_chat::backend::RelationalStore;
use helf_chat::filter::{Filter, Query};
use reqwest::Method;
use serde_json::Value;

/// Table access over the PostgREST API (`/rest/v1/{table}`).
pub struct SupabaseStore {
    client: reqwest::Client,
    config: SupabaseConfig,
}

impl SupabaseStore {
    pub fn new(client: reqwest::Client, config: SupabaseConfig) -> Self {
        Self { client, config }
    }

    fn request(&self, method: Method, table: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.config.endpoint(&format!("/rest/v1/{table}")))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.config.bearer())
    }
}

/// Turn a non-2xx response into an error carrying PostgREST's message.
pub(crate) async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or(body);
    bail!("{what}: {status}: {message}")
}

#[async_trait]
impl RelationalStore for SupabaseStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let resp = self
            .request(Method::GET, table)
            .query(&query.to_postgrest())
            .send()
            .await
            .with_context(|| format!("select from {table}"))?;
        check(resp, &format!("select from {table}"))
            .await?
            .json()
            .await
            .with_context(|| format!("decode rows from {table}"))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let resp = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .with_context(|| format!("insert into {table}"))?;
        let rows: Vec<Value> = check(resp, &format!("insert into {table}"))
            .await?
            .json()
            .await
            .with_context(|| format!("decode inserted row from {table}"))?;
        rows.into_iter()
            .next()
            .with_context(|| format!("insert into {table} returned no row"))
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Value) -> Result<()> {
        let resp = self
            .request(Method::PATCH, table)
            .query(&filter.to_postgrest())
            .json(&patch)
            .send()
            .await
            .with_context(|| format!("update {table}"))?;
        check(resp, &format!("update {table}")).await?;
        Ok(())
    }
}

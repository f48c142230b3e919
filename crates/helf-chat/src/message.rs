use crate::backend::AvatarResolver;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Stable identifier of an authenticated user (canonical UUID text).
pub type UserId = String;

/// One stored direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(deserialize_with = "row_id")]
    pub message_id: String,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    #[serde(deserialize_with = "utc_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Set only for task-scoped messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl ChatMessage {
    /// Decode a row as returned by the store or the live feed.
    pub fn from_row(row: &Value) -> Result<Self> {
        serde_json::from_value(row.clone()).context("invalid message row")
    }

    /// Whether `user_id` wrote this message.
    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }
}

/// Text or integer primary key, kept as text.
fn row_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "message_id must be text or a number, got {other}"
        ))),
    }
}

/// RFC 3339, or a bare `timestamp` column value read as UTC.
fn utc_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(t) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|t| t.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("bad timestamp {raw:?}: {e}")))
}

/// Row shape inserted into the store. `message_id` is assigned by the store.
#[derive(Debug, Serialize)]
pub(crate) struct NewMessage<'a> {
    pub sender_id: &'a str,
    pub receiver_id: &'a str,
    pub content: &'a str,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<&'a str>,
}

/// Public profile of another user, as read from the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerProfile {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    /// Public URL of `profile_picture`, filled in by [`PeerProfile::with_avatar`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl PeerProfile {
    pub fn from_row(row: &Value) -> Result<Self> {
        serde_json::from_value(row.clone()).context("invalid user row")
    }

    /// Resolve the stored picture path to a public URL.
    pub fn with_avatar(mut self, avatars: &dyn AvatarResolver) -> Self {
        self.avatar_url = self
            .profile_picture
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| avatars.public_url(p));
        self
    }

    /// Name to show in headers; blank names fall back to "User".
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "User"
        } else {
            &self.name
        }
    }
}

use crate::USERS_TABLE;
use crate::backend::Backend;
use crate::error::ChatError;
use crate::filter::{Filter, Query};
use crate::message::PeerProfile;

/// Everyone the caller can start a chat with, optionally narrowed by a
/// case-insensitive name search.
pub async fn list_peers(
    backend: &Backend,
    current_user_id: &str,
    search: &str,
) -> Result<Vec<PeerProfile>, ChatError> {
    let query = Query::new()
        .filter(Filter::neq("user_id", current_user_id))
        .order_by("name", true);
    let rows = backend
        .store
        .select(USERS_TABLE, &query)
        .await
        .map_err(|e| {
            tracing::error!(err = %e, "user listing failed");
            ChatError::fetch("users", &e)
        })?;

    let needle = search.trim().to_lowercase();
    let mut peers: Vec<PeerProfile> = rows
        .iter()
        .filter_map(|row| match PeerProfile::from_row(row) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(err = %e, "skipping malformed user row");
                None
            }
        })
        .filter(|p| p.user_id != current_user_id)
        .filter(|p| needle.is_empty() || p.name.to_lowercase().contains(&needle))
        .map(|p| p.with_avatar(backend.avatars.as_ref()))
        .collect();
    peers.sort_by_key(|p| p.name.to_lowercase());
    Ok(peers)
}

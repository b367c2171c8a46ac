//! Delta endpoint: the pull half of the sync protocol.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::error::Result;
use crate::journal;
use crate::server::AppState;
use crate::types::{Identity, JournalEntry, Version};

#[derive(Debug, Deserialize)]
pub struct DeltaQuery {
    since: Option<String>,
}

/// `GET /api/sync?since=<version>`
///
/// Returns every journal row with `version > since` for the caller's
/// tenant, ascending. `since` defaults to 0 when omitted or unparseable, so
/// a fresh client always gets the full history. Never blocks and never
/// long-polls; reads come from the store's WAL snapshot, so a concurrent
/// write either appears whole or not at all.
pub async fn get_deltas(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<DeltaQuery>,
) -> Result<Json<Vec<JournalEntry>>> {
    let since = query
        .since
        .as_deref()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(0);

    let store = state.stores.open(&identity.tenant).await?;
    let entries = store
        .read(|conn| journal::read_since(conn, Version::from_raw(since)))
        .await?;
    Ok(Json(entries))
}

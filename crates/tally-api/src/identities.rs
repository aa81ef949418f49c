//! Handlers for identity lookup and history.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/platforms/{platform}/identities/{platform_id}` | 404 if not found |
//! | `GET`  | `/identities/{id}/snapshots` | Optional `?from=&to=&limit=`; 404 if the identity is unknown |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::NaiveDate;
use serde::Deserialize;
use tally_core::{
  identity::{CreatorIdentity, Platform},
  snapshot::StatSnapshot,
  store::{CreatorStore, SnapshotQuery},
};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /platforms/{platform}/identities/{platform_id}`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path((platform, platform_id)): Path<(String, String)>,
) -> Result<Json<CreatorIdentity>, ApiError>
where
  S: CreatorStore + 'static,
{
  let not_found = || ApiError::NotFound(format!("identity {platform}/{platform_id} not found"));

  let Ok(parsed) = Platform::parse(&platform) else {
    return Err(not_found());
  };
  let identity = state
    .store
    .find_identity(parsed, &platform_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(not_found)?;
  Ok(Json(identity))
}

// ─── Snapshot history ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct HistoryParams {
  /// Inclusive lower bound, `YYYY-MM-DD`.
  pub from:  Option<NaiveDate>,
  /// Inclusive upper bound, `YYYY-MM-DD`.
  pub to:    Option<NaiveDate>,
  pub limit: Option<usize>,
}

/// `GET /identities/{id}/snapshots[?from=...][&to=...][&limit=...]`
pub async fn snapshots<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<StatSnapshot>>, ApiError>
where
  S: CreatorStore + 'static,
{
  if let (Some(from), Some(to)) = (params.from, params.to)
    && from > to
  {
    return Err(ApiError::BadRequest(format!("`from` ({from}) is after `to` ({to})")));
  }

  state
    .store
    .get_identity(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("identity {id} not found")))?;

  let query = SnapshotQuery {
    identity_id: id,
    from:        params.from,
    to:          params.to,
    limit:       params.limit,
  };
  let history = state.store.list_snapshots(&query).await.map_err(ApiError::store)?;
  Ok(Json(history))
}

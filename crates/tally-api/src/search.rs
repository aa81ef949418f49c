//! Handler for `GET /search`.

use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use tally_core::{
  identity::{CreatorIdentity, Platform},
  store::CreatorStore,
};

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize, Default)]
pub struct SearchParams {
  /// Free-text query; missing is the same as empty.
  pub q:        Option<String>,
  /// Platform name, e.g. `youtube`. Unknown names match nothing.
  pub platform: Option<String>,
  /// Kept as text so a malformed value degrades instead of failing the
  /// request.
  pub limit:    Option<String>,
}

/// `GET /search?q=...[&platform=...][&limit=...]`
///
/// Malformed input is never an error: an unknown platform, a limit that is
/// not a non-negative integer, or a query that is too short yields `[]`.
pub async fn handler<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<Vec<CreatorIdentity>>, ApiError>
where
  S: CreatorStore + 'static,
{
  let platform = match params.platform.as_deref().map(str::trim) {
    None | Some("") => None,
    Some(name) => match Platform::parse(name) {
      Ok(platform) => Some(platform),
      Err(_) => return Ok(Json(Vec::new())),
    },
  };

  let limit = match params.limit.as_deref().map(str::trim) {
    None | Some("") => None,
    Some(raw) => match raw.parse::<usize>() {
      Ok(limit) => Some(limit),
      Err(_) => return Ok(Json(Vec::new())),
    },
  };

  let query = params.q.unwrap_or_default();
  let found = state.search.search(&query, platform, limit).await?;
  Ok(Json(found))
}

//! Handler for `POST /observations`.
//!
//! | Outcome | Status |
//! |---------|--------|
//! | inserted | `201 Created` |
//! | replaced | `200 OK` |
//! | rejected, duplicate for date | `409 Conflict` |
//! | rejected, any other rule | `422 Unprocessable Entity` |
//! | no usable username | `400 Bad Request` |

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tally_core::{identity::CreatorIdentity, store::CreatorStore, validate::Rejection};
use tally_ops::{IntakeOutcome, Observation};

use crate::{ApiState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
  pub identity: CreatorIdentity,
  #[serde(flatten)]
  pub outcome:  IntakeOutcome,
}

/// `POST /observations` — body: an [`Observation`].
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(observation): Json<Observation>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CreatorStore + 'static,
{
  let (identity, outcome) = state.intake.ingest(observation).await?;

  let status = match &outcome {
    IntakeOutcome::Inserted { .. } => StatusCode::CREATED,
    IntakeOutcome::Replaced { .. } => StatusCode::OK,
    IntakeOutcome::Rejected { reason: Rejection::DuplicateForDate } => StatusCode::CONFLICT,
    IntakeOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
  };
  Ok((status, Json(IngestResponse { identity, outcome })))
}

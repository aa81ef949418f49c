//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use tally_core::store::{FaultClass, StoreFault};
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The store stayed unreachable after retries.
  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Wrap an error from a direct store call.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + StoreFault + Send + Sync + 'static,
  {
    if e.class().is_transient() {
      ApiError::Unavailable(e.to_string())
    } else {
      ApiError::Store(Box::new(e))
    }
  }
}

impl From<tally_ops::Error> for ApiError {
  fn from(e: tally_ops::Error) -> Self {
    match e {
      tally_ops::Error::Core(e) => ApiError::BadRequest(e.to_string()),
      tally_ops::Error::Store { class: FaultClass::Unavailable | FaultClass::Timeout, source } => {
        ApiError::Unavailable(source.to_string())
      }
      other => ApiError::Store(Box::new(other)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store error while handling request");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

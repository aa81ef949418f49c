//! JSON REST API for Tally.
//!
//! Exposes an axum [`Router`] backed by any [`tally_core::store::CreatorStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tally_api::api_router(state))
//! ```

pub mod error;
pub mod identities;
pub mod observations;
pub mod search;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use tally_core::store::CreatorStore;
use tally_ops::{SearchEngine, SnapshotIntake};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:  Arc<S>,
  pub search: SearchEngine<S>,
  pub intake: SnapshotIntake<S>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      search: self.search.clone(),
      intake: self.intake.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: CreatorStore + 'static,
{
  Router::new()
    // Search
    .route("/search", get(search::handler::<S>))
    // Intake
    .route("/observations", post(observations::create::<S>))
    // Identities
    .route("/platforms/{platform}/identities/{platform_id}", get(identities::get_one::<S>))
    .route("/identities/{id}/snapshots", get(identities::snapshots::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests;

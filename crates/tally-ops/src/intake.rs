//! Write path for observations coming from the platform collectors.
//!
//! An observation names an upstream account and carries its counters at a
//! moment in time. Intake resolves (or creates) the identity, pins the
//! observation to a calendar date in the operating zone, and persists it
//! only if the [`SnapshotValidator`] accepts it.
//!
//! The existence pre-check is advisory. Two writers racing on the same
//! `(identity_id, recorded_at)` are settled by the store's uniqueness
//! constraint, whose violation is reported as
//! [`Rejection::DuplicateForDate`] (or turned into an upsert when the
//! policy is [`DuplicatePolicy::Overwrite`]).
//!
//! Each insert carries an id chosen before the first attempt. An attempt
//! that timed out may still have committed, so when a retry hits the
//! constraint the stored row is compared against that id before the write
//! is treated as a duplicate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{
  clock::Clock,
  identity::{CreatorIdentity, NewIdentity, Platform},
  normalize::derive_username,
  snapshot::{Metrics, NewSnapshot, StatSnapshot},
  store::{CreatorStore, FaultClass, SnapshotQuery, StoreFault as _},
  validate::{DuplicatePolicy, Rejection, SnapshotValidator, Verdict, correct_metrics},
};

use uuid::Uuid;

use crate::{
  Error, Result,
  retry::{RetryPolicy, with_retry},
};

// ─── Types ────────────────────────────────────────────────────────────────────

/// One raw measurement of an upstream account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
  pub platform:     Platform,
  pub platform_id:  String,
  #[serde(default)]
  pub display_name: Option<String>,
  #[serde(flatten)]
  pub metrics:      Metrics,
  pub observed_at:  DateTime<Utc>,
}

/// What happened to a submitted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntakeOutcome {
  Inserted { snapshot: StatSnapshot },
  /// An existing snapshot for the same date was overwritten.
  Replaced { snapshot: StatSnapshot },
  Rejected { reason: Rejection },
}

// ─── Service ──────────────────────────────────────────────────────────────────

pub struct SnapshotIntake<S> {
  store:     Arc<S>,
  validator: SnapshotValidator,
  clock:     Arc<dyn Clock>,
  retry:     RetryPolicy,
}

impl<S> Clone for SnapshotIntake<S> {
  fn clone(&self) -> Self {
    Self {
      store:     Arc::clone(&self.store),
      validator: self.validator,
      clock:     Arc::clone(&self.clock),
      retry:     self.retry,
    }
  }
}

impl<S: CreatorStore> SnapshotIntake<S> {
  pub fn new(store: Arc<S>, validator: SnapshotValidator, clock: Arc<dyn Clock>) -> Self {
    Self { store, validator, clock, retry: RetryPolicy::default() }
  }

  pub fn with_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn clock(&self) -> &dyn Clock { self.clock.as_ref() }

  /// Record one observation: register its identity, then submit the
  /// snapshot dated in the operating zone.
  pub async fn ingest(
    &self,
    observation: Observation,
  ) -> Result<(CreatorIdentity, IntakeOutcome)> {
    let identity = self
      .register_identity(
        observation.platform,
        &observation.platform_id,
        observation.display_name.as_deref(),
      )
      .await?;

    let outcome = self
      .submit(NewSnapshot {
        identity_id: identity.identity_id,
        recorded_at: self.clock.date_of(observation.observed_at),
        metrics:     observation.metrics,
      })
      .await?;

    Ok((identity, outcome))
  }

  /// Find the identity for `(platform, platform_id)`, creating it with a
  /// derived username if it does not exist yet.
  ///
  /// A changed upstream display name is persisted; the username is left
  /// alone. Fails with [`tally_core::Error::InvalidIdentityInput`] when a
  /// new identity would get an empty username.
  pub async fn register_identity(
    &self,
    platform: Platform,
    platform_id: &str,
    display_name: Option<&str>,
  ) -> Result<CreatorIdentity> {
    let store = &*self.store;

    let existing = with_retry("find_identity", &self.retry, move || {
      store.find_identity(platform, platform_id)
    })
    .await
    .map_err(Error::store)?;

    let identity = match existing {
      Some(identity) => identity,
      None => {
        let input = NewIdentity {
          platform,
          platform_id: platform_id.to_owned(),
          username: derive_username(display_name, platform_id)?,
          display_name: display_name.map(str::to_owned),
        };

        match with_retry("create_identity", &self.retry, move || {
          store.create_identity(input.clone())
        })
        .await
        {
          Ok(created) => {
            tracing::info!(
              identity_id = %created.identity_id,
              platform = %created.platform,
              username = %created.username,
              "identity registered"
            );
            return Ok(created);
          }
          Err(e) if e.class() == FaultClass::ConstraintViolation => {
            tracing::debug!(%platform, platform_id, "identity registered concurrently");
            with_retry("find_identity", &self.retry, move || {
              store.find_identity(platform, platform_id)
            })
            .await
            .map_err(Error::store)?
            .ok_or_else(|| Error::store(e))?
          }
          Err(e) => return Err(Error::store(e)),
        }
      }
    };

    self.refresh_display_name(identity, display_name).await
  }

  async fn refresh_display_name(
    &self,
    mut identity: CreatorIdentity,
    display_name: Option<&str>,
  ) -> Result<CreatorIdentity> {
    let Some(name) = display_name else {
      return Ok(identity);
    };
    if identity.display_name.as_deref() == Some(name) {
      return Ok(identity);
    }

    let store = &*self.store;
    let id = identity.identity_id;
    let new_name = name.to_owned();
    with_retry("set_display_name", &self.retry, move || {
      store.set_display_name(id, Some(new_name.clone()))
    })
    .await
    .map_err(Error::store)?;

    tracing::debug!(identity_id = %id, display_name = name, "display name refreshed");
    identity.display_name = Some(name.to_owned());
    Ok(identity)
  }

  /// Validate and persist a snapshot for an existing identity.
  ///
  /// Negative secondary counters are cleared first. Rejections are an
  /// outcome, not an error.
  pub async fn submit(&self, mut candidate: NewSnapshot) -> Result<IntakeOutcome> {
    if let Some(corrected) = correct_metrics(&candidate.metrics) {
      tracing::debug!(
        identity_id = %candidate.identity_id,
        "cleared negative secondary metrics"
      );
      candidate.metrics = corrected;
    }

    let today = self.clock.today();

    // Row rules first, so a bad row never costs a store round trip.
    if let Verdict::Reject(reason) = self.validator.validate(&candidate, today, false) {
      return Ok(self.rejected(&candidate, reason));
    }

    let store = &*self.store;
    let (identity_id, recorded_at) = (candidate.identity_id, candidate.recorded_at);
    let exists = with_retry("snapshot_exists", &self.retry, move || {
      store.snapshot_exists(identity_id, recorded_at)
    })
    .await
    .map_err(Error::store)?;

    match self.validator.validate(&candidate, today, exists) {
      Verdict::Reject(reason) => Ok(self.rejected(&candidate, reason)),
      Verdict::ReplaceExisting => self.replace(candidate).await,
      Verdict::Accept => {
        let snapshot_id = Uuid::new_v4();
        let input = candidate.clone();
        match with_retry("insert_snapshot", &self.retry, move || {
          store.insert_snapshot(snapshot_id, input.clone())
        })
        .await
        {
          Ok(snapshot) => {
            tracing::debug!(
              identity_id = %snapshot.identity_id,
              recorded_at = %snapshot.recorded_at,
              "snapshot inserted"
            );
            Ok(IntakeOutcome::Inserted { snapshot })
          }
          Err(e) if e.class() == FaultClass::ConstraintViolation => {
            if let Some(snapshot) = self.stored_with_id(&candidate, snapshot_id).await? {
              tracing::debug!(
                identity_id = %snapshot.identity_id,
                recorded_at = %snapshot.recorded_at,
                "snapshot insert committed after its attempt timed out"
              );
              return Ok(IntakeOutcome::Inserted { snapshot });
            }
            match self.validator.policy() {
              DuplicatePolicy::Reject => {
                Ok(self.rejected(&candidate, Rejection::DuplicateForDate))
              }
              DuplicatePolicy::Overwrite => self.replace(candidate).await,
            }
          }
          Err(e) => Err(Error::store(e)),
        }
      }
    }
  }

  /// The stored snapshot for the candidate's identity and date, if it is
  /// the one written under `snapshot_id`.
  async fn stored_with_id(
    &self,
    candidate: &NewSnapshot,
    snapshot_id: Uuid,
  ) -> Result<Option<StatSnapshot>> {
    let store = &*self.store;
    let query = SnapshotQuery {
      identity_id: candidate.identity_id,
      from:        Some(candidate.recorded_at),
      to:          Some(candidate.recorded_at),
      limit:       Some(1),
    };
    let query = &query;
    let stored = with_retry("list_snapshots", &self.retry, move || store.list_snapshots(query))
      .await
      .map_err(Error::store)?;

    Ok(stored.into_iter().find(|s| s.snapshot_id == snapshot_id))
  }

  async fn replace(&self, candidate: NewSnapshot) -> Result<IntakeOutcome> {
    let store = &*self.store;
    let snapshot = with_retry("upsert_snapshot", &self.retry, move || {
      store.upsert_snapshot(candidate.clone())
    })
    .await
    .map_err(Error::store)?;

    tracing::info!(
      identity_id = %snapshot.identity_id,
      recorded_at = %snapshot.recorded_at,
      "snapshot replaced"
    );
    Ok(IntakeOutcome::Replaced { snapshot })
  }

  fn rejected(&self, candidate: &NewSnapshot, reason: Rejection) -> IntakeOutcome {
    tracing::info!(
      identity_id = %candidate.identity_id,
      recorded_at = %candidate.recorded_at,
      %reason,
      "snapshot rejected"
    );
    IntakeOutcome::Rejected { reason }
  }
}

//! Daily statistics snapshots.
//!
//! A snapshot is one calendar-day measurement of an identity's counters. At
//! most one snapshot exists per `(identity_id, recorded_at)`; the store
//! enforces this with a UNIQUE constraint.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The counters carried by a snapshot.
///
/// Values are signed so that corrupt upstream data (zero or negative counts)
/// can be represented and rejected rather than silently wrapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
  /// Subscribers or followers, depending on the platform.
  pub subscribers: Option<i64>,
  pub total_views: Option<i64>,
  pub total_posts: Option<i64>,
}

/// A persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSnapshot {
  pub snapshot_id: Uuid,
  pub identity_id: Uuid,
  /// Calendar date in the operating time zone; not a timestamp.
  pub recorded_at: NaiveDate,
  #[serde(flatten)]
  pub metrics:     Metrics,
  /// Server-assigned; refreshed when an overwrite replaces the metrics.
  pub ingested_at: DateTime<Utc>,
}

/// Input to [`crate::store::CreatorStore::insert_snapshot`] and
/// [`crate::store::CreatorStore::upsert_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnapshot {
  pub identity_id: Uuid,
  pub recorded_at: NaiveDate,
  pub metrics:     Metrics,
}

/// A corrective overwrite of a stored snapshot's metrics, applied by the
/// integrity sweeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotCorrection {
  pub snapshot_id: Uuid,
  pub metrics:     Metrics,
}

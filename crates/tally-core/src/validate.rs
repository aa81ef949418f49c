//! Snapshot acceptance rules.
//!
//! Validation is a pure decision: the caller supplies "today" (in the
//! operating time zone) and the result of the existence check, so no store
//! or wall clock is consulted here.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::snapshot::{Metrics, NewSnapshot, StatSnapshot};

/// What to do when a snapshot already exists for the same identity and
/// date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
  /// The existing snapshot wins; the newcomer is rejected.
  #[default]
  Reject,
  /// The newcomer replaces the existing snapshot (last write wins).
  Overwrite,
}

/// Why a snapshot was refused.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Rejection {
  /// `subscribers` is absent or not positive.
  ZeroOrNullMetric,
  /// `recorded_at` lies after today in the operating zone.
  FutureDated,
  /// A snapshot already exists for this identity and date.
  DuplicateForDate,
}

/// Outcome of [`SnapshotValidator::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
  Accept,
  /// Valid, but the caller must upsert over the existing row.
  ReplaceExisting,
  Reject(Rejection),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotValidator {
  policy: DuplicatePolicy,
}

impl SnapshotValidator {
  pub fn new(policy: DuplicatePolicy) -> Self { Self { policy } }

  pub fn policy(&self) -> DuplicatePolicy { self.policy }

  /// Decide whether `candidate` may be persisted.
  ///
  /// `already_exists` is the caller's pre-check for a snapshot with the same
  /// `(identity_id, recorded_at)`. It is advisory: the store's uniqueness
  /// constraint remains authoritative.
  pub fn validate(
    &self,
    candidate: &NewSnapshot,
    today: NaiveDate,
    already_exists: bool,
  ) -> Verdict {
    if let Some(reason) = check_row(&candidate.metrics, candidate.recorded_at, today) {
      return Verdict::Reject(reason);
    }
    match (already_exists, self.policy) {
      (false, _) => Verdict::Accept,
      (true, DuplicatePolicy::Reject) => Verdict::Reject(Rejection::DuplicateForDate),
      (true, DuplicatePolicy::Overwrite) => Verdict::ReplaceExisting,
    }
  }
}

/// Apply the per-row rules to an already-persisted snapshot.
///
/// The duplicate rule does not apply: the store cannot hold two rows for
/// the same identity and date.
pub fn check_stored(snapshot: &StatSnapshot, today: NaiveDate) -> Option<Rejection> {
  check_row(&snapshot.metrics, snapshot.recorded_at, today)
}

fn check_row(metrics: &Metrics, recorded_at: NaiveDate, today: NaiveDate) -> Option<Rejection> {
  if !metrics.subscribers.is_some_and(|n| n > 0) {
    return Some(Rejection::ZeroOrNullMetric);
  }
  if recorded_at > today {
    return Some(Rejection::FutureDated);
  }
  None
}

/// Clear negative secondary counters.
///
/// Returns the corrected metrics, or `None` when nothing needed fixing.
/// `subscribers` is never touched here; a bad primary metric is not
/// repairable.
pub fn correct_metrics(metrics: &Metrics) -> Option<Metrics> {
  let negative = |v: Option<i64>| v.is_some_and(|n| n < 0);
  if !negative(metrics.total_views) && !negative(metrics.total_posts) {
    return None;
  }
  Some(Metrics {
    subscribers: metrics.subscribers,
    total_views: metrics.total_views.filter(|n| *n >= 0),
    total_posts: metrics.total_posts.filter(|n| *n >= 0),
  })
}

//! The `CreatorStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `tally-store-sqlite`).
//! Higher layers (`tally-ops`, `tally-api`) depend on this abstraction, not
//! on any concrete backend.

use std::{future::Future, time::Duration};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  identity::{CreatorIdentity, NewIdentity, Platform},
  rank::SearchTerms,
  snapshot::{NewSnapshot, SnapshotCorrection, StatSnapshot},
};

// ─── Fault classification ────────────────────────────────────────────────────

/// Coarse classification of a store error, used to decide between retrying,
/// treating the error as a business outcome, and giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FaultClass {
  /// The backend could not be reached or is busy.
  Unavailable,
  /// The call did not finish within its deadline.
  Timeout,
  /// A uniqueness constraint refused the write.
  ConstraintViolation,
  /// Anything else; not retried.
  Other,
}

impl FaultClass {
  /// Whether a retry of the same call may succeed.
  pub fn is_transient(self) -> bool { matches!(self, Self::Unavailable | Self::Timeout) }
}

/// Implemented by store error types so callers can branch on the fault
/// class without knowing the backend.
pub trait StoreFault {
  fn class(&self) -> FaultClass;
}

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`CreatorStore::search_candidates`].
///
/// A backend returns every identity whose folded username or display name
/// contains `sanitized`, or whose stripped form contains `stripped`. It must
/// not truncate: ranking happens afterwards.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
  pub sanitized: String,
  pub stripped:  String,
  pub platform:  Option<Platform>,
}

impl CandidateQuery {
  pub fn new(terms: &SearchTerms, platform: Option<Platform>) -> Self {
    Self {
      sanitized: terms.sanitized.clone(),
      stripped: terms.stripped.clone(),
      platform,
    }
  }
}

/// Parameters for [`CreatorStore::list_snapshots`]. Date bounds are
/// inclusive.
#[derive(Debug, Clone)]
pub struct SnapshotQuery {
  pub identity_id: Uuid,
  pub from:        Option<NaiveDate>,
  pub to:          Option<NaiveDate>,
  pub limit:       Option<usize>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Tally store backend.
///
/// Backends must enforce two uniqueness constraints and report violations
/// with [`FaultClass::ConstraintViolation`]:
/// - `(platform, platform_id)` for identities;
/// - `(identity_id, recorded_at)` for snapshots.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait CreatorStore: Send + Sync {
  type Error: std::error::Error + StoreFault + Send + Sync + 'static;

  // ── Identities ────────────────────────────────────────────────────────

  /// Create and persist a new identity.
  fn create_identity(
    &self,
    input: NewIdentity,
  ) -> impl Future<Output = Result<CreatorIdentity, Self::Error>> + Send + '_;

  /// Retrieve an identity by id. Returns `None` if not found.
  fn get_identity(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<CreatorIdentity>, Self::Error>> + Send + '_;

  /// Retrieve an identity by its upstream key.
  fn find_identity<'a>(
    &'a self,
    platform: Platform,
    platform_id: &'a str,
  ) -> impl Future<Output = Result<Option<CreatorIdentity>, Self::Error>> + Send + 'a;

  /// All identities whose stored username equals `username` exactly,
  /// optionally restricted to one platform. Ordered by creation.
  fn find_by_username<'a>(
    &'a self,
    platform: Option<Platform>,
    username: &'a str,
  ) -> impl Future<Output = Result<Vec<CreatorIdentity>, Self::Error>> + Send + 'a;

  /// Replace an identity's username.
  fn set_username(
    &self,
    id: Uuid,
    username: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Replace an identity's display name.
  fn set_display_name(
    &self,
    id: Uuid,
    display_name: Option<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Identities that may match a search; see [`CandidateQuery`].
  fn search_candidates<'a>(
    &'a self,
    query: &'a CandidateQuery,
  ) -> impl Future<Output = Result<Vec<CreatorIdentity>, Self::Error>> + Send + 'a;

  // ── Snapshots ─────────────────────────────────────────────────────────

  /// Insert a snapshot under a caller-chosen id. Fails with a constraint
  /// violation if one already exists for the same identity and date. No
  /// validation is applied.
  ///
  /// The id lets a caller whose write timed out recognise the row if the
  /// write committed anyway.
  fn insert_snapshot(
    &self,
    snapshot_id: Uuid,
    input: NewSnapshot,
  ) -> impl Future<Output = Result<StatSnapshot, Self::Error>> + Send + '_;

  /// Insert, or replace the metrics of the existing snapshot for the same
  /// identity and date.
  fn upsert_snapshot(
    &self,
    input: NewSnapshot,
  ) -> impl Future<Output = Result<StatSnapshot, Self::Error>> + Send + '_;

  fn snapshot_exists(
    &self,
    identity_id: Uuid,
    recorded_at: NaiveDate,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Snapshots of one identity, oldest first.
  fn list_snapshots<'a>(
    &'a self,
    query: &'a SnapshotQuery,
  ) -> impl Future<Output = Result<Vec<StatSnapshot>, Self::Error>> + Send + 'a;

  /// Keyset scan over all snapshots ordered by `snapshot_id`, starting
  /// strictly after `after`.
  fn scan_snapshots(
    &self,
    after: Option<Uuid>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<StatSnapshot>, Self::Error>> + Send + '_;

  /// Delete the given snapshots atomically. Returns the number removed by
  /// this call; ids that are already gone are not counted.
  fn delete_snapshots(
    &self,
    ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Overwrite the metrics of the given snapshots atomically. Returns the
  /// number of rows changed.
  fn correct_snapshots(
    &self,
    corrections: Vec<SnapshotCorrection>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Leases ────────────────────────────────────────────────────────────

  /// Claim the named lease for `holder` until `ttl` from now.
  ///
  /// Succeeds if the lease is free, expired, or already held by `holder`
  /// (which extends it). Returns `false` while another holder's lease is
  /// live. Visible to every process sharing the store.
  fn acquire_lease<'a>(
    &'a self,
    name: &'a str,
    holder: Uuid,
    ttl: Duration,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Give up the named lease if `holder` still has it.
  fn release_lease<'a>(
    &'a self,
    name: &'a str,
    holder: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

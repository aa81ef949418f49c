//! Integrity sweeper.
//!
//! Walks every stored snapshot in `snapshot_id` order and repairs what the
//! write path should have refused:
//!
//! - rows with a zero or missing `subscribers` count are deleted;
//! - rows dated after today are flagged for an operator, never deleted;
//! - negative secondary counters are cleared in place.
//!
//! Rows are fetched in pages of at most [`MAX_FETCH_BATCH`] and changed in
//! sub-batches of at most [`MAX_MUTATE_BATCH`], each applied atomically by
//! the store. A sub-batch that keeps failing is recorded and skipped; a page
//! that cannot be fetched ends the scan, since the cursor cannot advance,
//! and the report is marked `truncated`.
//!
//! Only one sweep runs at a time per store. The guard is a store lease
//! ([`SWEEP_LEASE`]), so it also holds between separate processes. The
//! lease is renewed before every page and expires on its own if the holder
//! dies.

use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use serde::Serialize;
use tally_core::{
  clock::Clock,
  report::{BatchLedger, ItemFailure},
  snapshot::SnapshotCorrection,
  store::CreatorStore,
  validate::{Rejection, check_stored, correct_metrics},
};
use uuid::Uuid;

use crate::{
  CancelToken, Error, Result,
  retry::{RetryPolicy, with_retry},
};

/// Upper bound on rows fetched per page.
pub const MAX_FETCH_BATCH: usize = 1000;

/// Upper bound on rows changed per transaction.
pub const MAX_MUTATE_BATCH: usize = 50;

/// Store lease held for the duration of a sweep.
pub const SWEEP_LEASE: &str = "sweep";

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(600);

// ─── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
  pub fetch_batch:  usize,
  pub mutate_batch: usize,
}

impl Default for SweepConfig {
  fn default() -> Self { Self { fetch_batch: MAX_FETCH_BATCH, mutate_batch: MAX_MUTATE_BATCH } }
}

impl SweepConfig {
  /// Batch sizes clamped to `1..=MAX_*`.
  pub fn new(fetch_batch: usize, mutate_batch: usize) -> Self {
    Self {
      fetch_batch:  fetch_batch.clamp(1, MAX_FETCH_BATCH),
      mutate_batch: mutate_batch.clamp(1, MAX_MUTATE_BATCH),
    }
  }
}

// ─── Report ───────────────────────────────────────────────────────────────────

/// A stored row that breaks a rule the sweeper does not fix by itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedSnapshot {
  pub snapshot_id: Uuid,
  pub identity_id: Uuid,
  pub recorded_at: NaiveDate,
  pub reason:      Rejection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
  pub scanned:     usize,
  pub corrected:   usize,
  /// Rows confirmed gone after a successful delete batch.
  pub removed:     usize,
  pub flagged:     Vec<FlaggedSnapshot>,
  /// Sub-batches (or the page fetch) that failed after retries.
  pub failed:      Vec<ItemFailure>,
  /// Stopped on request.
  pub interrupted: bool,
  /// Stopped early because a page could not be fetched or the lease was
  /// lost; rows past `scanned` were not looked at.
  pub truncated:   bool,
}

// ─── Sweeper ──────────────────────────────────────────────────────────────────

/// Runs integrity sweeps.
pub struct Sweeper<S> {
  store:     Arc<S>,
  clock:     Arc<dyn Clock>,
  retry:     RetryPolicy,
  config:    SweepConfig,
  lease_ttl: Duration,
}

impl<S> Clone for Sweeper<S> {
  fn clone(&self) -> Self {
    Self {
      store:     Arc::clone(&self.store),
      clock:     Arc::clone(&self.clock),
      retry:     self.retry,
      config:    self.config,
      lease_ttl: self.lease_ttl,
    }
  }
}

impl<S: CreatorStore> Sweeper<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
    Self {
      store,
      clock,
      retry: RetryPolicy::default(),
      config: SweepConfig::default(),
      lease_ttl: DEFAULT_LEASE_TTL,
    }
  }

  pub fn with_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_config(mut self, config: SweepConfig) -> Self {
    self.config = SweepConfig::new(config.fetch_batch, config.mutate_batch);
    self
  }

  /// How long the lease survives without renewal. Must exceed the time one
  /// page takes to process.
  pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
    self.lease_ttl = ttl;
    self
  }

  pub async fn sweep(&self) -> Result<SweepReport> { self.sweep_with(&CancelToken::new()).await }

  /// Run one sweep. Fails with [`Error::AlreadyRunning`] while another
  /// sweep against the same store, from any process, holds the lease.
  ///
  /// `cancel` is checked before each page; the report of an interrupted
  /// sweep has `interrupted` set.
  pub async fn sweep_with(&self, cancel: &CancelToken) -> Result<SweepReport> {
    let holder = Uuid::new_v4();
    if !self.claim_lease(holder).await.map_err(Error::store)? {
      tracing::info!("sweep skipped, another run holds the lease");
      return Err(Error::AlreadyRunning);
    }

    let report = self.run(holder, cancel).await;

    let store = &*self.store;
    if let Err(e) = with_retry("release_lease", &self.retry, move || {
      store.release_lease(SWEEP_LEASE, holder)
    })
    .await
    {
      tracing::warn!(error = %e, "sweep lease not released, it will expire");
    }
    Ok(report)
  }

  async fn claim_lease(&self, holder: Uuid) -> Result<bool, S::Error> {
    let store = &*self.store;
    let ttl = self.lease_ttl;
    with_retry("acquire_lease", &self.retry, move || {
      store.acquire_lease(SWEEP_LEASE, holder, ttl)
    })
    .await
  }

  /// Extend the lease before the next page. A renewal that errors keeps
  /// the sweep going; one refused because another run took over stops it.
  async fn renew_lease(&self, holder: Uuid) -> bool {
    match self.claim_lease(holder).await {
      Ok(true) => true,
      Ok(false) => {
        tracing::error!("sweep lease taken over by another run, stopping");
        false
      }
      Err(e) => {
        tracing::warn!(error = %e, "sweep lease renewal failed");
        true
      }
    }
  }

  async fn run(&self, holder: Uuid, cancel: &CancelToken) -> SweepReport {
    let today = self.clock.today();
    let SweepConfig { fetch_batch, mutate_batch } = self.config;
    let store = &*self.store;

    let mut report = SweepReport::default();
    let mut ledger = BatchLedger::new();
    let mut cursor: Option<Uuid> = None;

    tracing::info!(%today, fetch_batch, mutate_batch, "sweep started");

    loop {
      if cancel.is_cancelled() {
        tracing::warn!(scanned = report.scanned, "sweep interrupted");
        report.interrupted = true;
        break;
      }

      let after = cursor;
      if after.is_some() && !self.renew_lease(holder).await {
        ledger.fail("lease", "taken over by another sweep");
        report.truncated = true;
        break;
      }

      let page = match with_retry("scan_snapshots", &self.retry, move || {
        store.scan_snapshots(after, fetch_batch)
      })
      .await
      {
        Ok(page) => page,
        Err(e) => {
          let item = match after {
            Some(id) => format!("scan after {id}"),
            None => "scan from start".to_owned(),
          };
          tracing::error!(%item, error = %e, "sweep scan failed, stopping");
          ledger.fail(item, e);
          report.truncated = true;
          break;
        }
      };

      let Some(last) = page.last() else { break };
      cursor = Some(last.snapshot_id);
      report.scanned += page.len();

      let mut doomed = Vec::new();
      let mut corrections = Vec::new();
      for snapshot in &page {
        match check_stored(snapshot, today) {
          Some(Rejection::ZeroOrNullMetric) => {
            doomed.push(snapshot.snapshot_id);
            continue;
          }
          Some(reason) => report.flagged.push(FlaggedSnapshot {
            snapshot_id: snapshot.snapshot_id,
            identity_id: snapshot.identity_id,
            recorded_at: snapshot.recorded_at,
            reason,
          }),
          None => {}
        }
        if let Some(metrics) = correct_metrics(&snapshot.metrics) {
          corrections.push(SnapshotCorrection { snapshot_id: snapshot.snapshot_id, metrics });
        }
      }

      for chunk in doomed.chunks(mutate_batch) {
        let ids = chunk.to_vec();
        match with_retry("delete_snapshots", &self.retry, move || {
          store.delete_snapshots(ids.clone())
        })
        .await
        {
          // A timed-out attempt may already have committed; success means
          // every id in the chunk is gone.
          Ok(_) => {
            report.removed += chunk.len();
            ledger.succeed();
          }
          Err(e) => {
            let item = chunk_label("delete", chunk);
            tracing::warn!(%item, error = %e, "sweep delete batch failed");
            ledger.fail(item, e);
          }
        }
      }

      for chunk in corrections.chunks(mutate_batch) {
        let fixes = chunk.to_vec();
        match with_retry("correct_snapshots", &self.retry, move || {
          store.correct_snapshots(fixes.clone())
        })
        .await
        {
          Ok(n) => {
            report.corrected += n;
            ledger.succeed();
          }
          Err(e) => {
            let ids: Vec<Uuid> = chunk.iter().map(|c| c.snapshot_id).collect();
            let item = chunk_label("correct", &ids);
            tracing::warn!(%item, error = %e, "sweep correction batch failed");
            ledger.fail(item, e);
          }
        }
      }

      tracing::debug!(
        page = page.len(),
        removed = report.removed,
        corrected = report.corrected,
        "sweep page done"
      );

      if page.len() < fetch_batch {
        break;
      }
    }

    report.failed = ledger.failed;
    tracing::info!(
      scanned = report.scanned,
      removed = report.removed,
      corrected = report.corrected,
      flagged = report.flagged.len(),
      failed = report.failed.len(),
      batches = ledger.succeeded,
      interrupted = report.interrupted,
      truncated = report.truncated,
      "sweep finished"
    );
    report
  }
}

fn chunk_label(action: &str, ids: &[Uuid]) -> String {
  match ids {
    [] => action.to_owned(),
    [only] => format!("{action} {only}"),
    [first, .., last] => format!("{action} {first}..{last} ({} rows)", ids.len()),
  }
}

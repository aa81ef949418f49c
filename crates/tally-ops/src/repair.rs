//! Username repair.
//!
//! Restores identities whose stored username was overwritten with a
//! sentinel (for example the literal string `"undefined"`) by re-deriving
//! the slug from the display name and platform id.

use std::sync::Arc;

use serde::Serialize;
use tally_core::{
  identity::CreatorIdentity,
  normalize::{derive_username, fallback_username},
  report::{BatchLedger, ItemFailure},
  store::CreatorStore,
};

use crate::{
  CancelToken, Error, Result,
  retry::{RetryPolicy, with_retry},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
  /// Identities that carried the sentinel when the run started.
  pub scanned:     usize,
  pub restored:    usize,
  pub failed:      Vec<ItemFailure>,
  pub interrupted: bool,
}

pub struct UsernameRepair<S> {
  store: Arc<S>,
  retry: RetryPolicy,
}

impl<S> Clone for UsernameRepair<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store), retry: self.retry } }
}

impl<S: CreatorStore> UsernameRepair<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store, retry: RetryPolicy::default() } }

  pub fn with_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub async fn repair_usernames(&self, sentinel: &str) -> Result<RepairReport> {
    self.repair_usernames_with(sentinel, &CancelToken::new()).await
  }

  /// Repair every identity whose username equals `sentinel`.
  ///
  /// Each identity is handled once; a failure is recorded against its id
  /// and the run moves on. `cancel` is checked before each identity.
  pub async fn repair_usernames_with(
    &self,
    sentinel: &str,
    cancel: &CancelToken,
  ) -> Result<RepairReport> {
    let store = &*self.store;
    let targets = with_retry("find_by_username", &self.retry, move || {
      store.find_by_username(None, sentinel)
    })
    .await
    .map_err(Error::store)?;

    tracing::info!(sentinel, count = targets.len(), "username repair started");

    let mut ledger = BatchLedger::new();
    let mut interrupted = false;

    for identity in &targets {
      if cancel.is_cancelled() {
        tracing::warn!(done = ledger.succeeded, "username repair interrupted");
        interrupted = true;
        break;
      }

      match self.repair_one(identity, sentinel).await {
        Ok(username) => {
          tracing::debug!(identity_id = %identity.identity_id, %username, "username restored");
          ledger.succeed();
        }
        Err(e) => {
          tracing::warn!(identity_id = %identity.identity_id, error = %e, "username repair failed");
          ledger.fail(identity.identity_id, e);
        }
      }
    }

    let report = RepairReport {
      scanned: targets.len(),
      restored: ledger.succeeded,
      failed: ledger.failed,
      interrupted,
    };
    tracing::info!(
      scanned = report.scanned,
      restored = report.restored,
      failed = report.failed.len(),
      "username repair finished"
    );
    Ok(report)
  }

  async fn repair_one(&self, identity: &CreatorIdentity, sentinel: &str) -> Result<String> {
    let derived = derive_username(identity.display_name.as_deref(), &identity.platform_id)?;

    let username = if derived != sentinel && !self.is_taken(identity, &derived).await? {
      derived
    } else {
      let fallback = fallback_username(&identity.platform_id)
        .filter(|slug| slug != sentinel && *slug != derived)
        .ok_or_else(|| no_free_username(identity))?;
      if self.is_taken(identity, &fallback).await? {
        return Err(no_free_username(identity));
      }
      fallback
    };

    let store = &*self.store;
    let id = identity.identity_id;
    let new_username = username.clone();
    with_retry("set_username", &self.retry, move || {
      store.set_username(id, new_username.clone())
    })
    .await
    .map_err(Error::store)?;

    Ok(username)
  }

  /// Whether another identity on the same platform already uses `username`.
  async fn is_taken(&self, identity: &CreatorIdentity, username: &str) -> Result<bool> {
    let store = &*self.store;
    let platform = identity.platform;
    let holders = with_retry("find_by_username", &self.retry, move || {
      store.find_by_username(Some(platform), username)
    })
    .await
    .map_err(Error::store)?;

    Ok(holders.iter().any(|other| other.identity_id != identity.identity_id))
  }
}

fn no_free_username(identity: &CreatorIdentity) -> Error {
  Error::Core(tally_core::Error::InvalidIdentityInput {
    display_name: identity.display_name.clone(),
    platform_id:  identity.platform_id.clone(),
  })
}

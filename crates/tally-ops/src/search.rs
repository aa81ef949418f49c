//! Tiered fuzzy search over creator identities.

use std::sync::Arc;

use tally_core::{
  identity::{CreatorIdentity, Platform},
  rank::{DEFAULT_LIMIT, SearchTerms, effective_limit, rank},
  store::{CandidateQuery, CreatorStore},
};

use crate::{
  Error, Result,
  retry::{RetryPolicy, with_retry},
};

/// Resolves free-text queries against the store.
///
/// The store pre-filters candidates on folded search keys; every candidate
/// is then re-checked and ordered by [`rank`], so results do not depend on
/// how loosely a backend matches.
pub struct SearchEngine<S> {
  store:         Arc<S>,
  retry:         RetryPolicy,
  default_limit: usize,
}

impl<S> Clone for SearchEngine<S> {
  fn clone(&self) -> Self {
    Self {
      store:         Arc::clone(&self.store),
      retry:         self.retry,
      default_limit: self.default_limit,
    }
  }
}

impl<S: CreatorStore> SearchEngine<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, retry: RetryPolicy::default(), default_limit: DEFAULT_LIMIT }
  }

  pub fn with_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  /// Limit used when the caller does not pass one. Still capped.
  pub fn with_default_limit(mut self, limit: usize) -> Self {
    self.default_limit = limit;
    self
  }

  /// Search for identities matching `query`.
  ///
  /// Queries with fewer than two significant characters return an empty
  /// list without touching the store. Only store faults that survive the
  /// retry policy are errors.
  pub async fn search(
    &self,
    query: &str,
    platform: Option<Platform>,
    limit: Option<usize>,
  ) -> Result<Vec<CreatorIdentity>> {
    let Some(terms) = SearchTerms::parse(query) else {
      tracing::debug!(query, "search query too short");
      return Ok(Vec::new());
    };
    let limit = effective_limit(limit, self.default_limit);
    if limit == 0 {
      return Ok(Vec::new());
    }

    let candidate_query = CandidateQuery::new(&terms, platform);
    let store = &*self.store;
    let q = &candidate_query;
    let candidates = with_retry("search_candidates", &self.retry, move || {
      store.search_candidates(q)
    })
    .await
    .map_err(Error::store)?;

    let considered = candidates.len();
    let results = rank(&terms, candidates, platform, limit);
    tracing::debug!(
      query = %terms.sanitized,
      ?platform,
      considered,
      returned = results.len(),
      "search ranked"
    );
    Ok(results)
  }
}

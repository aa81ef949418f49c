//! Tiered relevance ranking for creator search.
//!
//! Both sides of every comparison are folded the same way: lower-cased,
//! and for the "stripped" form, with `.`, `_`, `-` and whitespace removed.
//! Storage backends persist the folded forms of each identity (see
//! [`SearchKeys`]) so their candidate pre-filter agrees with [`SearchTerms::tier`].

use serde::{Deserialize, Serialize};

use crate::identity::{CreatorIdentity, Platform};

/// Result count used when the caller does not ask for one.
pub const DEFAULT_LIMIT: usize = 20;

/// Hard ceiling on a single result page.
pub const MAX_LIMIT: usize = 100;

/// Queries whose stripped form is shorter than this are not ranked.
pub const MIN_QUERY_LEN: usize = 2;

/// A relevance bucket. Lower is better.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
  Exact = 1,
  Prefix = 2,
  Substring = 3,
  DisplayName = 4,
}

/// Lower-case and trim.
pub fn fold(s: &str) -> String { s.trim().to_lowercase() }

/// Remove `.`, `_`, `-` and whitespace.
pub fn strip_separators(s: &str) -> String {
  s.chars()
    .filter(|c| !matches!(c, '.' | '_' | '-') && !c.is_whitespace())
    .collect()
}

/// The folded forms of an identity's searchable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchKeys {
  pub username:         String,
  pub username_key:     String,
  pub display_name:     String,
  pub display_name_key: String,
}

impl SearchKeys {
  pub fn new(username: &str, display_name: Option<&str>) -> Self {
    let username = fold(username);
    let display_name = display_name.map(fold).unwrap_or_default();
    Self {
      username_key: strip_separators(&username),
      display_name_key: strip_separators(&display_name),
      username,
      display_name,
    }
  }

  pub fn of(identity: &CreatorIdentity) -> Self {
    Self::new(&identity.username, identity.display_name.as_deref())
  }
}

/// A sanitized query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerms {
  /// Lower-cased, trimmed query.
  pub sanitized: String,
  /// `sanitized` without separators.
  pub stripped:  String,
}

impl SearchTerms {
  /// Sanitize `query`. Returns `None` when it is too short to rank.
  pub fn parse(query: &str) -> Option<Self> {
    let sanitized = fold(query);
    let stripped = strip_separators(&sanitized);
    if stripped.chars().count() < MIN_QUERY_LEN {
      return None;
    }
    Some(Self { sanitized, stripped })
  }

  /// The best tier `identity` qualifies for, or `None` if it is not a
  /// candidate at all.
  pub fn tier(&self, identity: &CreatorIdentity) -> Option<MatchTier> {
    self.tier_for_keys(&SearchKeys::of(identity))
  }

  pub fn tier_for_keys(&self, keys: &SearchKeys) -> Option<MatchTier> {
    let (s, t) = (self.sanitized.as_str(), self.stripped.as_str());
    let (u, uk) = (keys.username.as_str(), keys.username_key.as_str());

    if u == s || uk == t {
      Some(MatchTier::Exact)
    } else if u.starts_with(s) || uk.starts_with(t) {
      Some(MatchTier::Prefix)
    } else if u.contains(s) || uk.contains(t) {
      Some(MatchTier::Substring)
    } else if keys.display_name.contains(s) || keys.display_name_key.contains(t) {
      Some(MatchTier::DisplayName)
    } else {
      None
    }
  }
}

/// Resolve a caller-supplied limit against `default`, capped at
/// [`MAX_LIMIT`].
pub fn effective_limit(limit: Option<usize>, default: usize) -> usize {
  limit.unwrap_or(default).min(MAX_LIMIT)
}

/// Rank `candidates` for `terms` and keep the first `limit`.
///
/// Candidates that do not match, or sit on another platform than
/// `platform`, are dropped. Ordering is by tier, then creation time, then
/// identity id, so repeated calls over the same input agree. Truncation
/// happens after the sort.
pub fn rank(
  terms: &SearchTerms,
  candidates: Vec<CreatorIdentity>,
  platform: Option<Platform>,
  limit: usize,
) -> Vec<CreatorIdentity> {
  let mut scored: Vec<(MatchTier, CreatorIdentity)> = candidates
    .into_iter()
    .filter(|c| platform.is_none_or(|p| c.platform == p))
    .filter_map(|c| terms.tier(&c).map(|tier| (tier, c)))
    .collect();

  scored.sort_by(|(ta, a), (tb, b)| {
    ta.cmp(tb)
      .then_with(|| a.created_at.cmp(&b.created_at))
      .then_with(|| a.identity_id.cmp(&b.identity_id))
  });

  scored.into_iter().take(limit).map(|(_, c)| c).collect()
}

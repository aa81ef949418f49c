//! Username slug derivation.
//!
//! A slug is the canonical, URL-safe username of an identity: lowercase
//! ASCII letters and digits only, between 1 and [`MAX_USERNAME_LEN`]
//! characters.

use crate::{Error, Result};

/// Upper bound on a derived slug.
pub const MAX_USERNAME_LEN: usize = 50;

/// Upper bound on a slug taken from the platform id fallback.
pub const FALLBACK_USERNAME_LEN: usize = 24;

fn slug_chars(input: &str) -> impl Iterator<Item = char> + '_ {
  input
    .chars()
    .flat_map(char::to_lowercase)
    .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Derive the canonical username for an identity.
///
/// The display name is lower-cased, stripped of everything outside
/// `[a-z0-9]` and truncated to [`MAX_USERNAME_LEN`]. If nothing survives,
/// the platform id is used instead (same character rules, truncated to
/// [`FALLBACK_USERNAME_LEN`]).
///
/// Fails with [`Error::InvalidIdentityInput`] only when both inputs yield an
/// empty slug.
pub fn derive_username(
  display_name: Option<&str>,
  platform_id: &str,
) -> Result<String> {
  let from_name: String = display_name
    .map(|name| slug_chars(name).take(MAX_USERNAME_LEN).collect())
    .unwrap_or_default();
  if !from_name.is_empty() {
    return Ok(from_name);
  }

  fallback_username(platform_id).ok_or_else(|| Error::InvalidIdentityInput {
    display_name: display_name.map(str::to_owned),
    platform_id:  platform_id.to_owned(),
  })
}

/// The slug derived from the platform id alone, if it has any usable
/// characters.
pub fn fallback_username(platform_id: &str) -> Option<String> {
  let slug: String = slug_chars(platform_id).take(FALLBACK_USERNAME_LEN).collect();
  (!slug.is_empty()).then_some(slug)
}

/// Whether `username` already satisfies the slug grammar.
pub fn is_canonical_username(username: &str) -> bool {
  !username.is_empty()
    && username.len() <= MAX_USERNAME_LEN
    && username
      .bytes()
      .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

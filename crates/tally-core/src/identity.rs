//! Creator identities — one canonical record per platform account.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

/// The upstream platform an identity lives on.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::AsRefStr,
  strum::EnumString,
  strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
  Youtube,
  Twitch,
  Kick,
  Instagram,
  Bluesky,
  Tiktok,
}

impl Platform {
  /// Parse a platform name, mapping failures into the crate error.
  pub fn parse(s: &str) -> crate::Result<Self> {
    Self::from_str(s.trim()).map_err(|_| Error::UnknownPlatform(s.to_owned()))
  }
}

/// A creator's canonical record for one platform, keyed by
/// `(platform, platform_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorIdentity {
  pub identity_id:  Uuid,
  pub platform:     Platform,
  /// Opaque upstream identifier; never changes once assigned.
  pub platform_id:  String,
  /// Canonical slug. Repairable after creation.
  pub username:     String,
  pub display_name: Option<String>,
  /// Server-assigned; the secondary ordering key for search results.
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::CreatorStore::create_identity`].
/// `identity_id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewIdentity {
  pub platform:     Platform,
  pub platform_id:  String,
  pub username:     String,
  pub display_name: Option<String>,
}

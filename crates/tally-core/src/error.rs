//! Error types for `tally-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Neither the display name nor the platform id yields any slug
  /// character.
  #[error("cannot derive a username from display name {display_name:?} and platform id {platform_id:?}")]
  InvalidIdentityInput {
    display_name: Option<String>,
    platform_id:  String,
  },

  #[error("unknown platform: {0:?}")]
  UnknownPlatform(String),

  #[error("invalid time zone offset: {0:?}")]
  InvalidTimeZone(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

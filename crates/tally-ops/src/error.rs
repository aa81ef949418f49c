//! Error type for `tally-ops`.

use tally_core::store::{FaultClass, StoreFault};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] tally_core::Error),

  /// A store call failed and retries, if any applied, were exhausted.
  #[error("store error ({class}): {source}")]
  Store {
    class:  FaultClass,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("a sweep is already running")]
  AlreadyRunning,
}

impl Error {
  /// Wrap a backend error, keeping its fault class.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + StoreFault + Send + Sync + 'static,
  {
    Self::Store { class: e.class(), source: Box::new(e) }
  }

  /// The fault class of a store error; `None` for everything else.
  pub fn fault_class(&self) -> Option<FaultClass> {
    match self {
      Self::Store { class, .. } => Some(*class),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

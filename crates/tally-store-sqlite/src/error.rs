//! Error type for `tally-store-sqlite`.

use std::time::Duration;

use tally_core::store::{FaultClass, StoreFault};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tally_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("store call exceeded {0:?}")]
  Timeout(Duration),

  #[error("identity not found: {0}")]
  IdentityNotFound(uuid::Uuid),
}

impl StoreFault for Error {
  fn class(&self) -> FaultClass {
    match self {
      Error::Timeout(_) => FaultClass::Timeout,
      Error::Database(e) => classify_database(e),
      _ => FaultClass::Other,
    }
  }
}

fn classify_database(e: &tokio_rusqlite::Error) -> FaultClass {
  match e {
    tokio_rusqlite::Error::ConnectionClosed => FaultClass::Unavailable,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(f, _)) => match f.code {
      rusqlite::ErrorCode::ConstraintViolation
        if matches!(
          f.extended_code,
          rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ) =>
      {
        FaultClass::ConstraintViolation
      }
      rusqlite::ErrorCode::DatabaseBusy
      | rusqlite::ErrorCode::DatabaseLocked
      | rusqlite::ErrorCode::CannotOpen => FaultClass::Unavailable,
      _ => FaultClass::Other,
    },
    _ => FaultClass::Other,
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

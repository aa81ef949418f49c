//! SQLite backend for the Tally creator store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every call is bounded by a timeout.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_TIMEOUT, SqliteStore};

#[cfg(test)]
mod tests;

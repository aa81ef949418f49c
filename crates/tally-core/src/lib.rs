//! Core types and pure logic for the Tally creator-statistics core.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! It holds the identity and snapshot model, slug derivation, snapshot
//! validation, search ranking, and the [`store::CreatorStore`] trait that
//! storage backends implement.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod error;
pub mod identity;
pub mod normalize;
pub mod rank;
pub mod report;
pub mod snapshot;
pub mod store;
pub mod validate;

pub use error::{Error, Result};

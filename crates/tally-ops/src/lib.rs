//! Store-backed services for Tally.
//!
//! Everything here is generic over [`tally_core::store::CreatorStore`] and
//! holds the store as an `Arc`, so services are cheap to clone and share
//! between request handlers and maintenance jobs.
//!
//! | Service | Purpose |
//! |---------|---------|
//! | [`SearchEngine`] | Tiered fuzzy search over identities |
//! | [`SnapshotIntake`] | Identity registration and snapshot validation on write |
//! | [`UsernameRepair`] | Restores usernames clobbered with a sentinel value |
//! | [`Sweeper`] | Batch integrity scan over stored snapshots |

pub mod cancel;
pub mod error;
pub mod intake;
pub mod repair;
pub mod retry;
pub mod search;
pub mod sweep;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use intake::{IntakeOutcome, Observation, SnapshotIntake};
pub use repair::{RepairReport, UsernameRepair};
pub use retry::RetryPolicy;
pub use search::SearchEngine;
pub use sweep::{SweepConfig, SweepReport, Sweeper};

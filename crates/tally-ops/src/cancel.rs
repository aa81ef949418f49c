//! Cooperative cancellation for batch jobs.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

/// A shared flag checked by batch jobs between batches.
///
/// Clones observe the same flag. Cancelling never interrupts a batch that
/// has already started.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self { Self::default() }

  pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }

  pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

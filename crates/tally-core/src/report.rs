//! Accumulator for best-effort batch operations.
//!
//! Batch jobs never abort on a single bad item; they count what worked and
//! list what did not, then hand the ledger back to the operator.

use serde::{Deserialize, Serialize};

/// One item a batch operation could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
  /// Identifies the item (an identity id, a batch range, ...).
  pub item:   String,
  pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLedger {
  pub succeeded: usize,
  pub failed:    Vec<ItemFailure>,
}

impl BatchLedger {
  pub fn new() -> Self { Self::default() }

  pub fn succeed(&mut self) { self.succeeded += 1; }

  pub fn succeed_many(&mut self, n: usize) { self.succeeded += n; }

  pub fn fail(&mut self, item: impl ToString, reason: impl ToString) {
    self.failed.push(ItemFailure {
      item:   item.to_string(),
      reason: reason.to_string(),
    });
  }

  pub fn is_clean(&self) -> bool { self.failed.is_empty() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ledger_counts_and_lists() {
    let mut ledger = BatchLedger::new();
    ledger.succeed();
    ledger.succeed_many(3);
    assert!(ledger.is_clean());

    ledger.fail("abc", "store timeout");
    assert_eq!(ledger.succeeded, 4);
    assert_eq!(ledger.failed, vec![ItemFailure {
      item:   "abc".into(),
      reason: "store timeout".into(),
    }]);
    assert!(!ledger.is_clean());
  }
}

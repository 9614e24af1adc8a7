use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::PageBatch;

/// Shared per-run agent count map.
///
/// The single mutable resource of a collection run: every mutation is an
/// increment performed inside the lock, and the map is only read once all
/// pages are accounted for. Batches merge commutatively, so arrival order
/// across pages does not affect the final counts.
#[derive(Debug, Default)]
pub struct AgentTally {
    counts: Mutex<HashMap<String, u64>>,
}

impl AgentTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one page batch. The lock is held only for the duration of
    /// the increments.
    pub fn apply(&self, batch: PageBatch) {
        let mut counts = self.counts.lock().expect("tally lock poisoned");
        for listing in batch {
            *counts.entry(listing.agent_name).or_insert(0) += 1;
        }
    }

    /// Copy of the counts. Called once per run, after the join.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counts.lock().expect("tally lock poisoned").clone()
    }
}

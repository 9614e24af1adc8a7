use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting semaphore bounding the number of simultaneously in-flight
/// feed requests. Capacity is the only backpressure mechanism against
/// the upstream; request pacing is handled separately by the collector.
#[derive(Debug, Clone)]
pub struct TokenPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl TokenPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for a free slot. The returned permit must be dropped as soon
    /// as the network call returns, before decode or retry handling.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .expect("token pool semaphore is never closed")
    }
}

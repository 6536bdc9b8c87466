use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::RecordId;

/// Held while a mutation against one record id is in flight.
pub struct QueueTicket {
    _guard: OwnedMutexGuard<()>,
}

/// Per-record async locks so mutations on the same id run one after another.
///
/// Lazily creates one lock per id and returns the same `Arc` for repeated
/// lookups. Locks nobody holds or waits on are pruned on the next acquire.
#[derive(Default)]
pub struct MutationQueue {
    locks: Mutex<HashMap<RecordId, Arc<AsyncMutex<()>>>>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for every earlier mutation on `id` to settle, then take the slot.
    pub async fn acquire(&self, id: &RecordId) -> QueueTicket {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry(id.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        QueueTicket {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of ids with a held or awaited lock.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

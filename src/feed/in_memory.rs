//! InMemoryChangeFeed - channel-backed change feed for testing and development.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use super::{ChangeEvent, ChangeFeed, ChangeFilter, ChangeSubscription};
use crate::BackendError;

struct Subscriber {
    filter: ChangeFilter,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

struct FeedState {
    next_id: u64,
    available: bool,
    subscribers: HashMap<u64, Subscriber>,
}

/// In-memory change feed.
///
/// Every subscriber gets its own unbounded channel; `publish` fans an event
/// out to the subscribers whose filter matches. Clone-friendly via Arc.
///
/// ## Example
///
/// ```ignore
/// let feed = InMemoryChangeFeed::new();
/// let mut sub = feed.subscribe(ChangeFilter::new("ideas", UserId::new("u1")))?;
///
/// feed.publish(ChangeEvent::new("ideas", ChangeKind::Insert, RecordId::new("1"), UserId::new("u1")));
/// assert!(sub.recv().await.is_some());
/// ```
#[derive(Clone)]
pub struct InMemoryChangeFeed {
    state: Arc<Mutex<FeedState>>,
}

impl Default for InMemoryChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChangeFeed {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState {
                next_id: 0,
                available: true,
                subscribers: HashMap::new(),
            })),
        }
    }

    /// Deliver `event` to every matching subscriber. Returns how many got it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let mut state = self.state();
        let mut delivered = 0;
        state.subscribers.retain(|_, sub| {
            if !sub.filter.matches(&event) {
                return true;
            }
            match sub.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        debug!(table = %event.table, kind = ?event.kind, id = %event.record_id, delivered, "change published");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    /// Close every open subscription, as a dropped transport would.
    pub fn disconnect_all(&self) {
        let dropped = std::mem::take(&mut self.state().subscribers);
        debug!(count = dropped.len(), "change feed disconnected");
    }

    /// While unavailable, `subscribe` fails with [`BackendError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChangeFeed for InMemoryChangeFeed {
    fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeSubscription, BackendError> {
        let mut state = self.state();
        if !state.available {
            return Err(BackendError::Unavailable("change feed offline".into()));
        }

        let id = state.next_id;
        state.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(table = %filter.table, owner = %filter.owner, id, "subscribed");
        state.subscribers.insert(id, Subscriber { filter, tx });

        let weak: Weak<Mutex<FeedState>> = Arc::downgrade(&self.state);
        Ok(ChangeSubscription::new(rx).on_drop(move || {
            if let Some(state) = weak.upgrade() {
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .subscribers
                    .remove(&id);
            }
        }))
    }
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::config::{ResyncStrategy, SyncConfig};
use crate::feed::{ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind, ChangeSubscription};
use crate::notify::{Notification, Notifier};
use crate::runner::settle;
use crate::service::EntityService;
use crate::store::{Change, OptimisticStore};
use crate::{Payload, SyncError, UserId};

/// Statistics from a bridge run, returned by [`RealtimeBridge::stop`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BridgeStats {
    pub events: usize,
    pub resyncs: usize,
    pub deltas: usize,
    pub failures: usize,
    pub reconnects: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Unsubscribed,
    Subscribed,
}

struct ActiveSubscription {
    owner: UserId,
    stop: CancellationToken,
    handle: JoinHandle<BridgeStats>,
}

/// Subscribes to the change feed for the session's owner and resynchronizes
/// the store on every change.
///
/// At most one subscription is active per bridge. Dropping the bridge signals
/// the task to stop without waiting for it.
///
/// ## Example
///
/// ```ignore
/// let bridge = RealtimeBridge::new(service, store.clone(), feed, notifier, SyncConfig::default());
/// bridge.start().await?;
///
/// // ... changes from other devices land in `store` ...
///
/// let stats = bridge.stop().await;
/// ```
pub struct RealtimeBridge<P, B, F> {
    worker: Worker<P, B, F>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl<P, B, F> RealtimeBridge<P, B, F>
where
    P: Payload,
    B: Backend + 'static,
    F: ChangeFeed + 'static,
{
    pub fn new(
        service: EntityService<P, B>,
        store: OptimisticStore<P>,
        feed: Arc<F>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Self {
        Self {
            worker: Worker {
                service,
                store,
                feed,
                notifier,
                config,
            },
            active: Mutex::new(None),
        }
    }

    /// Subscribe for the session's current owner.
    ///
    /// Returns `Ok(false)` when already subscribed for that owner. A
    /// subscription for a different owner is stopped first.
    pub async fn start(&self) -> Result<bool, SyncError> {
        let owner = self
            .worker
            .service
            .session()
            .owner()
            .ok_or(SyncError::Unauthenticated)?;

        let previous = {
            let mut active = self.active();
            let running = active
                .as_ref()
                .is_some_and(|current| current.owner == owner && !current.handle.is_finished());
            if running {
                return Ok(false);
            }
            active.take()
        };
        if let Some(previous) = previous {
            debug!(table = P::TABLE, owner = %previous.owner, "owner changed, stopping previous subscription");
            Self::join(previous).await;
        }

        let filter = ChangeFilter::for_payload::<P>(owner.clone());
        let subscription = self.worker.feed.subscribe(filter.clone())?;
        info!(table = P::TABLE, owner = %owner, "realtime subscribed");

        let stop = CancellationToken::new();
        let worker = self.worker.clone();
        let handle = tokio::spawn(worker.run(filter, subscription, stop.clone()));
        *self.active() = Some(ActiveSubscription {
            owner,
            stop,
            handle,
        });
        Ok(true)
    }

    /// Unsubscribe and wait for the task. `None` when not subscribed.
    pub async fn stop(&self) -> Option<BridgeStats> {
        let active = self.active().take()?;
        info!(table = P::TABLE, owner = %active.owner, "realtime unsubscribing");
        Self::join(active).await
    }

    pub fn is_subscribed(&self) -> bool {
        self.active()
            .as_ref()
            .is_some_and(|a| !a.handle.is_finished())
    }

    pub fn state(&self) -> BridgeState {
        if self.is_subscribed() {
            BridgeState::Subscribed
        } else {
            BridgeState::Unsubscribed
        }
    }

    /// Owner of the active subscription.
    pub fn owner(&self) -> Option<UserId> {
        self.active().as_ref().map(|a| a.owner.clone())
    }

    async fn join(active: ActiveSubscription) -> Option<BridgeStats> {
        active.stop.cancel();
        match active.handle.await {
            Ok(stats) => Some(stats),
            Err(err) => {
                warn!(table = P::TABLE, error = %err, "realtime task failed");
                None
            }
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveSubscription>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P, B, F> Drop for RealtimeBridge<P, B, F> {
    fn drop(&mut self) {
        let active = self.active.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = active.take() {
            active.stop.cancel();
        }
    }
}

/// Everything the background task owns.
struct Worker<P, B, F> {
    service: EntityService<P, B>,
    store: OptimisticStore<P>,
    feed: Arc<F>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
}

impl<P, B, F> Clone for Worker<P, B, F> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            store: self.store.clone(),
            feed: Arc::clone(&self.feed),
            notifier: Arc::clone(&self.notifier),
            config: self.config.clone(),
        }
    }
}

impl<P, B, F> Worker<P, B, F>
where
    P: Payload,
    B: Backend,
    F: ChangeFeed,
{
    async fn run(
        self,
        filter: ChangeFilter,
        mut subscription: ChangeSubscription,
        stop: CancellationToken,
    ) -> BridgeStats {
        let mut stats = BridgeStats::default();

        loop {
            let event = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                event = subscription.recv() => event,
            };

            match event {
                Some(event) => {
                    stats.events += 1;
                    self.on_change(&event, &stop, &mut stats).await;
                }
                None => {
                    warn!(table = P::TABLE, "change feed closed, reconnecting");
                    match self.reconnect(&filter, &stop, &mut stats).await {
                        Some(next) => {
                            subscription = next;
                            // Changes made while disconnected were never delivered.
                            self.resync(&stop, &mut stats).await;
                        }
                        None => break,
                    }
                }
            }
        }

        debug!(table = P::TABLE, ?stats, "realtime task stopped");
        stats
    }

    async fn on_change(&self, event: &ChangeEvent, stop: &CancellationToken, stats: &mut BridgeStats) {
        debug!(table = P::TABLE, kind = ?event.kind, id = %event.record_id, "change received");
        match self.config.resync_strategy {
            ResyncStrategy::Full => self.resync(stop, stats).await,
            ResyncStrategy::Delta => match self.delta(event) {
                Some(change) => {
                    self.store.apply(change);
                    stats.deltas += 1;
                }
                None => self.resync(stop, stats).await,
            },
        }
    }

    /// The store change carried by `event`, or `None` when only a full
    /// refetch can tell what changed.
    fn delta(&self, event: &ChangeEvent) -> Option<Change<P>> {
        if event.kind == ChangeKind::Delete {
            return Some(Change::Remove(event.record_id.clone()));
        }
        match event.record::<P>()? {
            Ok(record) => {
                let group = self.service.session().get().group;
                if record.in_group(group.as_ref()) {
                    Some(Change::Upsert(record))
                } else {
                    Some(Change::Remove(record.id))
                }
            }
            Err(err) => {
                debug!(table = P::TABLE, error = %err, "row did not decode, refetching");
                None
            }
        }
    }

    async fn resync(&self, stop: &CancellationToken, stats: &mut BridgeStats) {
        let fetched = settle(self.service.fetch_all(), self.config.fetch_timeout(), Some(stop)).await;
        match fetched {
            Ok(records) => {
                stats.resyncs += 1;
                self.store.replace_all(records);
            }
            Err(SyncError::Cancelled) => {}
            Err(err) => {
                stats.failures += 1;
                warn!(table = P::TABLE, error = %err, "resync failed, keeping local state");
                self.notifier.notify(Notification::error(
                    format!("Failed to refresh {}", P::TABLE),
                    err.user_message(),
                ));
            }
        }
    }

    async fn reconnect(
        &self,
        filter: &ChangeFilter,
        stop: &CancellationToken,
        stats: &mut BridgeStats,
    ) -> Option<ChangeSubscription> {
        let mut delay = self.config.reconnect_initial();
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            match self.feed.subscribe(filter.clone()) {
                Ok(subscription) => {
                    stats.reconnects += 1;
                    info!(table = P::TABLE, owner = %filter.owner, "realtime resubscribed");
                    return Some(subscription);
                }
                Err(err) => {
                    stats.failures += 1;
                    warn!(table = P::TABLE, error = %err, retry_in = ?delay, "resubscribe failed");
                    delay = (delay * 2).min(self.config.reconnect_max());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::content::Idea;
    use crate::feed::InMemoryChangeFeed;
    use crate::notify::RecordingNotifier;
    use crate::service::{Session, SharedSession};
    use crate::store::StoreOptions;

    fn bridge(
        session: Session,
        feed: &InMemoryChangeFeed,
    ) -> RealtimeBridge<Idea, InMemoryBackend, InMemoryChangeFeed> {
        let service = EntityService::new(Arc::new(InMemoryBackend::new()), SharedSession::new(session));
        RealtimeBridge::new(
            service,
            OptimisticStore::new(StoreOptions::default()),
            Arc::new(feed.clone()),
            Arc::new(RecordingNotifier::new()),
            SyncConfig::default(),
        )
    }

    #[tokio::test]
    async fn start_requires_an_owner() {
        let feed = InMemoryChangeFeed::new();
        let bridge = bridge(Session::new(), &feed);
        assert_eq!(bridge.start().await, Err(SyncError::Unauthenticated));
        assert_eq!(bridge.state(), BridgeState::Unsubscribed);
    }

    #[tokio::test]
    async fn one_subscription_per_owner() {
        let feed = InMemoryChangeFeed::new();
        let bridge = bridge(Session::signed_in("u1"), &feed);

        assert_eq!(bridge.start().await, Ok(true));
        assert_eq!(bridge.start().await, Ok(false));
        assert_eq!(feed.subscriber_count(), 1);

        bridge.worker.service.session().set_owner(Some(UserId::new("u2")));
        assert_eq!(bridge.start().await, Ok(true));
        assert_eq!(feed.subscriber_count(), 1);
        assert_eq!(bridge.owner(), Some(UserId::new("u2")));

        let stats = bridge.stop().await.unwrap();
        assert_eq!(stats, BridgeStats::default());
        assert_eq!(feed.subscriber_count(), 0);
        assert!(bridge.stop().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_bridge_unsubscribes() {
        let feed = InMemoryChangeFeed::new();
        let bridge = bridge(Session::signed_in("u1"), &feed);
        bridge.start().await.unwrap();
        drop(bridge);

        for _ in 0..100 {
            if feed.subscriber_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(feed.subscriber_count(), 0);
    }
}

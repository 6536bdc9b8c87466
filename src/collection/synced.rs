use std::sync::Arc;

use tokio::sync::watch;

use crate::backend::Backend;
use crate::config::SyncConfig;
use crate::content::{Idea, IdeaPatch, IdeaStatus, Review, Script};
use crate::feed::ChangeFeed;
use crate::notify::{Notification, Notifier};
use crate::realtime::{BridgeState, BridgeStats, RealtimeBridge};
use crate::runner::{ExecuteOptions, OperationRunner};
use crate::service::EntityService;
use crate::store::{MutationHooks, OptimisticStore, StoreOptions};
use crate::{OperationError, Payload, Record, RecordId, SyncError};

/// A live, optimistic list of one entity kind for the signed-in owner.
///
/// Mutations apply locally first and notify on success and on failure.
/// `start` subscribes to changes and loads the list; `stop` tears both down.
///
/// ## Example
///
/// ```ignore
/// let ideas: Ideas<_, _> = SyncedCollection::new(service, feed, notifier, SyncConfig::default());
/// ideas.start().await?;
///
/// let saved = ideas.create(Idea::new("Tip #1", Platform::Instagram)).await?;
/// ideas.update(&saved.id, IdeaPatch::default().title("Tip #1 revised")).await?;
/// ```
pub struct SyncedCollection<P, B, F> {
    service: EntityService<P, B>,
    store: OptimisticStore<P>,
    bridge: RealtimeBridge<P, B, F>,
    runner: OperationRunner,
    notifier: Arc<dyn Notifier>,
}

impl<P, B, F> SyncedCollection<P, B, F>
where
    P: Payload,
    B: Backend + 'static,
    F: ChangeFeed + 'static,
{
    pub fn new(
        service: EntityService<P, B>,
        feed: Arc<F>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Self {
        let store = OptimisticStore::new(StoreOptions::from(&config));
        let runner =
            OperationRunner::new(Arc::clone(&notifier)).with_default_timeout(config.operation_timeout());
        let bridge = RealtimeBridge::new(
            service.clone(),
            store.clone(),
            feed,
            Arc::clone(&notifier),
            config,
        );
        Self {
            service,
            store,
            bridge,
            runner,
            notifier,
        }
    }

    /// Subscribe to changes for the current owner, then load the list.
    ///
    /// Returns `Ok(false)` when already running for this owner.
    pub async fn start(&self) -> Result<bool, SyncError> {
        let started = self.bridge.start().await?;
        if started {
            self.refresh().await;
        }
        Ok(started)
    }

    /// Unsubscribe and abort in-flight mutations, which roll back.
    pub async fn stop(&self) -> Option<BridgeStats> {
        let stats = self.bridge.stop().await;
        self.store.cancel_pending();
        stats
    }

    /// Reload the list from the backend. Returns `false` when the fetch
    /// failed; the current list is kept and an error is notified.
    pub async fn refresh(&self) -> bool {
        let service = self.service.clone();
        let fetched = self
            .runner
            .execute(
                move || async move { service.fetch_all().await.map_err(|err| err.user_message()) },
                ExecuteOptions::new().error_message(format!("Failed to load {}", P::TABLE)),
            )
            .await;
        match fetched {
            Some(records) => {
                self.store.replace_all(records);
                true
            }
            None => false,
        }
    }

    pub async fn create(&self, payload: P) -> Result<Record<P>, SyncError> {
        let draft = match self.service.draft(payload.clone()) {
            Ok(draft) => draft,
            Err(err) => return Err(self.failed("create", err)),
        };
        let service = self.service.clone();
        let result = self
            .store
            .add_optimistically(
                draft,
                move || async move { service.create(payload).await },
                MutationHooks::new(),
            )
            .await;
        self.settle(result, "create", "created")
    }

    pub async fn update(&self, id: &RecordId, patch: P::Patch) -> Result<Record<P>, SyncError> {
        if let Err(err) = self.service.scope() {
            return Err(self.failed("update", err));
        }
        let service = self.service.clone();
        let target = id.clone();
        let persisted = patch.clone();
        let result = self
            .store
            .update_optimistically(
                id,
                &patch,
                move || async move { service.update(&target, &persisted).await },
                MutationHooks::new(),
            )
            .await;
        self.settle(result, "update", "updated")
    }

    /// Returns `Ok(false)` when no record has this id.
    pub async fn remove(&self, id: &RecordId) -> Result<bool, SyncError> {
        if let Err(err) = self.service.scope() {
            return Err(self.failed("delete", err));
        }
        let service = self.service.clone();
        let target = id.clone();
        let result = self
            .store
            .remove_optimistically(
                id,
                move || async move { service.remove(&target).await },
                MutationHooks::new(),
            )
            .await;
        match result {
            Ok(true) => {
                self.succeeded("deleted");
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(err) => Err(self.failed("delete", err)),
        }
    }

    pub fn items(&self) -> Vec<Record<P>> {
        self.store.items()
    }

    pub fn get(&self, id: &str) -> Option<Record<P>> {
        self.store.get(id)
    }

    pub fn is_optimistic(&self, id: &str) -> bool {
        self.store.is_optimistic(id)
    }

    /// True while a list load is in flight.
    pub fn is_loading(&self) -> bool {
        self.runner.is_loading()
    }

    /// Error from the most recent failed load.
    pub fn last_error(&self) -> Option<OperationError> {
        self.runner.error()
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.store.watch()
    }

    pub fn realtime_state(&self) -> BridgeState {
        self.bridge.state()
    }

    pub fn service(&self) -> &EntityService<P, B> {
        &self.service
    }

    pub fn store(&self) -> &OptimisticStore<P> {
        &self.store
    }

    fn settle(
        &self,
        result: Result<Record<P>, SyncError>,
        action: &str,
        done: &str,
    ) -> Result<Record<P>, SyncError> {
        match result {
            Ok(record) => {
                self.succeeded(done);
                Ok(record)
            }
            Err(err) => Err(self.failed(action, err)),
        }
    }

    fn succeeded(&self, done: &str) {
        self.notifier.notify(Notification::success(
            format!("{} {}", P::LABEL, done),
            format!("Your {} has been {}.", P::LABEL.to_lowercase(), done),
        ));
    }

    fn failed(&self, action: &str, err: SyncError) -> SyncError {
        self.notifier.notify(Notification::error(
            format!("Failed to {} {}", action, P::LABEL.to_lowercase()),
            err.user_message(),
        ));
        err
    }
}

impl<B, F> SyncedCollection<Idea, B, F>
where
    B: Backend + 'static,
    F: ChangeFeed + 'static,
{
    pub async fn submit_for_review(&self, id: &RecordId) -> Result<Record<Idea>, SyncError> {
        self.update(id, IdeaPatch::default().status(IdeaStatus::PendingReview))
            .await
    }

    /// Approve or reject an idea; the new status shows immediately.
    pub async fn review(&self, id: &RecordId, review: Review) -> Result<Record<Idea>, SyncError> {
        self.update(id, review.into_patch()).await
    }

    /// Ideas currently in `status`, in list order.
    pub fn with_status(&self, status: IdeaStatus) -> Vec<Record<Idea>> {
        self.items()
            .into_iter()
            .filter(|r| r.payload.status == status)
            .collect()
    }
}

impl<B, F> SyncedCollection<Script, B, F>
where
    B: Backend + 'static,
    F: ChangeFeed + 'static,
{
    /// Scripts in the list written from `idea_id`.
    pub fn for_idea(&self, idea_id: &RecordId) -> Vec<Record<Script>> {
        self.items()
            .into_iter()
            .filter(|r| r.payload.idea_id.as_ref() == Some(idea_id))
            .collect()
    }
}

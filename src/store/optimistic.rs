use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::hooks::MutationHooks;
use super::queue::{MutationQueue, QueueTicket};
use crate::config::{RollbackPolicy, SyncConfig};
use crate::runner::settle;
use crate::{Payload, Record, RecordId, SyncError};

/// Tuning for an [`OptimisticStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub rollback_policy: RollbackPolicy,
    pub serialize_mutations: bool,
    pub persist_timeout: Option<Duration>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for StoreOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            rollback_policy: config.rollback_policy,
            serialize_mutations: config.serialize_mutations,
            persist_timeout: config.persist_timeout(),
        }
    }
}

/// A single row-level change applied outside the optimistic flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<P> {
    /// Replace the record with the same id, or prepend it when absent.
    Upsert(Record<P>),
    /// Drop the record with this id, if present.
    Remove(RecordId),
}

struct State<P> {
    items: Vec<Record<P>>,
    pending: HashMap<RecordId, Chain<P>>,
}

/// Mutations in flight on one id, and the state to restore when one fails.
struct Chain<P> {
    count: usize,
    undo: Undo<P>,
}

/// What a failed mutation needs to put back.
#[derive(Clone)]
enum Undo<P> {
    Snapshot(Vec<Record<P>>),
    Entity { index: usize, original: Record<P> },
    Nothing,
}

impl<P: Clone> Undo<P> {
    /// Rebase on a mutation the backend accepted. `persisted` is `None` for
    /// a removal.
    fn confirmed(self, id: &RecordId, persisted: Option<&Record<P>>) -> Self {
        match (self, persisted) {
            (Undo::Snapshot(mut items), Some(record)) => {
                if let Some(slot) = items.iter_mut().find(|r| &r.id == id) {
                    *slot = record.clone();
                }
                Undo::Snapshot(items)
            }
            (Undo::Snapshot(mut items), None) => {
                items.retain(|r| &r.id != id);
                Undo::Snapshot(items)
            }
            (Undo::Entity { index, .. }, Some(record)) => Undo::Entity {
                index,
                original: record.clone(),
            },
            (Undo::Entity { .. }, None) | (Undo::Nothing, _) => Undo::Nothing,
        }
    }
}

struct Inner<P> {
    state: Mutex<State<P>>,
    queue: MutationQueue,
    options: StoreOptions,
    cancel: Mutex<CancellationToken>,
    version: watch::Sender<u64>,
}

/// Ordered in-memory list of records with optimistic create/update/remove.
///
/// Every mutation applies its change locally first, marks the id pending,
/// awaits the caller-supplied `persist` future, then either reconciles with
/// the canonical record or rolls back. Clone-friendly via `Arc`: clones share
/// the same list.
///
/// With `serialize_mutations` on, the local change still shows immediately
/// but `persist` calls on one id run one after another. Mutations stacked on
/// an id share one rollback point: a failure restores the state from before
/// the oldest of them, minus whatever the backend has since confirmed.
///
/// ## Example
///
/// ```ignore
/// let store = OptimisticStore::<Idea>::new(StoreOptions::default());
/// let draft = Record::draft(owner, None, Idea::new("Tip #1", Platform::Instagram));
///
/// let saved = store
///     .add_optimistically(draft, || service.create(payload), MutationHooks::new())
///     .await?;
/// assert!(!saved.is_temporary());
/// ```
pub struct OptimisticStore<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for OptimisticStore<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Payload> Default for OptimisticStore<P> {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

impl<P: Payload> OptimisticStore<P> {
    pub fn new(options: StoreOptions) -> Self {
        Self::with_items(options, Vec::new())
    }

    pub fn with_items(options: StoreOptions, items: Vec<Record<P>>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    items,
                    pending: HashMap::new(),
                }),
                queue: MutationQueue::new(),
                options,
                cancel: Mutex::new(CancellationToken::new()),
                version,
            }),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Snapshot of the current list, in display order.
    pub fn items(&self) -> Vec<Record<P>> {
        self.state().items.clone()
    }

    pub fn get(&self, id: &str) -> Option<Record<P>> {
        self.state().items.iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    /// True while a mutation on `id` is awaiting backend confirmation.
    pub fn is_optimistic(&self, id: &str) -> bool {
        self.state().pending.contains_key(id)
    }

    pub fn pending_ids(&self) -> Vec<RecordId> {
        self.state().pending.keys().cloned().collect()
    }

    /// Receiver bumped after every change to the list.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    /// Replace the whole list, e.g. with a fresh fetch. The pending set is
    /// left alone; in-flight mutations still settle against the new list.
    pub fn replace_all(&self, records: Vec<Record<P>>) {
        debug!(table = P::TABLE, count = records.len(), "replacing list");
        self.state().items = records;
        self.changed();
    }

    /// Apply a single row change without touching the pending set.
    pub fn apply(&self, change: Change<P>) {
        {
            let mut state = self.state();
            match change {
                Change::Upsert(record) => {
                    match state.items.iter_mut().find(|r| r.id == record.id) {
                        Some(slot) => *slot = record,
                        None => state.items.insert(0, record),
                    }
                }
                Change::Remove(id) => state.items.retain(|r| r.id != id),
            }
        }
        self.changed();
    }

    /// Abort every in-flight mutation, including ones still queued behind
    /// another on the same id. Each rolls back and settles with
    /// [`SyncError::Cancelled`]; queued ones never call `persist`.
    pub fn cancel_pending(&self) {
        let previous = {
            let mut token = self.inner.cancel.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *token, CancellationToken::new())
        };
        previous.cancel();
    }

    /// Prepend `record` (carrying a temporary id) and persist it.
    ///
    /// On success the record is replaced in the same slot by the persisted
    /// one, which carries the canonical id. On failure the temporary record
    /// is removed. The pending marker is cleared either way.
    pub async fn add_optimistically<F, Fut>(
        &self,
        record: Record<P>,
        persist: F,
        mut hooks: MutationHooks<P>,
    ) -> Result<Record<P>, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Record<P>, SyncError>>,
    {
        let token = self.cancel_token();
        let temp_id = record.id.clone();
        debug!(table = P::TABLE, id = %temp_id, "optimistic add");
        {
            let mut state = self.state();
            state.items.insert(0, record);
            state.pending.insert(
                temp_id.clone(),
                Chain {
                    count: 1,
                    undo: Undo::Nothing,
                },
            );
        }
        self.changed();

        let outcome = self.persist(persist(), &token).await;

        {
            let mut state = self.state();
            state.pending.remove(&temp_id);
            match &outcome {
                Ok(persisted) => {
                    if state.items.iter().any(|r| r.id == temp_id) {
                        // A realtime delta may already have delivered the canonical row.
                        state.items.retain(|r| r.id != persisted.id);
                        if let Some(slot) = state.items.iter_mut().find(|r| r.id == temp_id) {
                            *slot = persisted.clone();
                        }
                    }
                }
                Err(_) => state.items.retain(|r| r.id != temp_id),
            }
        }
        self.changed();

        match outcome {
            Ok(persisted) => {
                debug!(table = P::TABLE, temp = %temp_id, id = %persisted.id, "add confirmed");
                Ok(persisted)
            }
            Err(err) => {
                warn!(table = P::TABLE, id = %temp_id, error = %err, "add failed, removed");
                hooks.failed(&err);
                Err(err)
            }
        }
    }

    /// Shallow-merge `patch` into the record with `id` and persist it.
    ///
    /// On success the record is replaced by the canonical result. On failure
    /// the list is rolled back per the store's [`RollbackPolicy`], then
    /// `on_revert` and `on_error` fire.
    pub async fn update_optimistically<F, Fut>(
        &self,
        id: &RecordId,
        patch: &P::Patch,
        persist: F,
        mut hooks: MutationHooks<P>,
    ) -> Result<Record<P>, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Record<P>, SyncError>>,
    {
        let token = self.cancel_token();
        debug!(table = P::TABLE, id = %id, "optimistic update");
        {
            let mut state = self.state();
            self.begin(&mut state, id);
            if let Some(record) = state.items.iter_mut().find(|r| &r.id == id) {
                record.apply_patch(patch);
            }
        }
        self.changed();

        let outcome = match self.ticket(id, &token).await {
            Ok(_ticket) => self.persist(persist(), &token).await,
            Err(err) => Err(err),
        };

        let restored = {
            let mut state = self.state();
            match &outcome {
                Ok(persisted) => {
                    if Self::settle_ok(&mut state, id, Some(persisted)) {
                        if let Some(slot) = state.items.iter_mut().find(|r| &r.id == id) {
                            *slot = persisted.clone();
                        }
                    }
                    None
                }
                Err(_) => {
                    Self::settle_err(&mut state, id);
                    Some(state.items.clone())
                }
            }
        };
        self.changed();

        match outcome {
            Ok(persisted) => Ok(persisted),
            Err(err) => {
                warn!(table = P::TABLE, id = %id, error = %err, "update failed, rolled back");
                if let Some(restored) = restored {
                    hooks.reverted(&restored);
                }
                hooks.failed(&err);
                Err(err)
            }
        }
    }

    /// Remove the record with `id` and persist the removal.
    ///
    /// Returns `Ok(false)` without calling `persist` when no record has this
    /// id. On failure the list is rolled back and the hooks fire.
    pub async fn remove_optimistically<F, Fut>(
        &self,
        id: &RecordId,
        persist: F,
        mut hooks: MutationHooks<P>,
    ) -> Result<bool, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), SyncError>>,
    {
        let token = self.cancel_token();
        {
            let mut state = self.state();
            let Some(index) = state.items.iter().position(|r| &r.id == id) else {
                debug!(table = P::TABLE, id = %id, "remove of unknown id ignored");
                return Ok(false);
            };
            self.begin(&mut state, id);
            state.items.remove(index);
        }
        debug!(table = P::TABLE, id = %id, "optimistic remove");
        self.changed();

        let outcome = match self.ticket(id, &token).await {
            Ok(_ticket) => self.persist(persist(), &token).await,
            Err(err) => Err(err),
        };

        let restored = {
            let mut state = self.state();
            match &outcome {
                Ok(()) => {
                    Self::settle_ok(&mut state, id, None);
                    None
                }
                Err(_) => {
                    Self::settle_err(&mut state, id);
                    Some(state.items.clone())
                }
            }
        };
        self.changed();

        match outcome {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(table = P::TABLE, id = %id, error = %err, "remove failed, rolled back");
                if let Some(restored) = restored {
                    hooks.reverted(&restored);
                }
                hooks.failed(&err);
                Err(err)
            }
        }
    }

    /// Wait for this id's turn. Cancellation while waiting settles the
    /// mutation without running it.
    async fn ticket(
        &self,
        id: &RecordId,
        token: &CancellationToken,
    ) -> Result<Option<QueueTicket>, SyncError> {
        if !self.inner.options.serialize_mutations {
            return Ok(None);
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(SyncError::Cancelled),
            ticket = self.inner.queue.acquire(id) => Ok(Some(ticket)),
        }
    }

    fn cancel_token(&self) -> CancellationToken {
        self.inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn persist<T, Fut>(&self, fut: Fut, token: &CancellationToken) -> Result<T, SyncError>
    where
        Fut: Future<Output = Result<T, SyncError>>,
    {
        settle(fut, self.inner.options.persist_timeout, Some(token)).await
    }

    /// Mark `id` pending. The first mutation in a chain records the
    /// rollback point.
    fn begin(&self, state: &mut State<P>, id: &RecordId) {
        if let Some(chain) = state.pending.get_mut(id) {
            chain.count += 1;
            return;
        }
        let undo = self.undo_for(state, id);
        state.pending.insert(id.clone(), Chain { count: 1, undo });
    }

    /// Close a confirmed mutation. Returns true when it was the last one in
    /// flight on `id`; otherwise the chain's rollback point moves forward.
    fn settle_ok(state: &mut State<P>, id: &RecordId, persisted: Option<&Record<P>>) -> bool {
        let Some(chain) = state.pending.get_mut(id) else {
            return true;
        };
        chain.count -= 1;
        if chain.count == 0 {
            state.pending.remove(id);
            return true;
        }
        let undo = std::mem::replace(&mut chain.undo, Undo::Nothing);
        chain.undo = undo.confirmed(id, persisted);
        false
    }

    /// Close a failed mutation and roll back to the chain's rollback point.
    fn settle_err(state: &mut State<P>, id: &RecordId) {
        let Some(chain) = state.pending.get_mut(id) else {
            return;
        };
        chain.count -= 1;
        let undo = if chain.count == 0 {
            state.pending.remove(id).map(|chain| chain.undo)
        } else {
            Some(chain.undo.clone())
        };
        if let Some(undo) = undo {
            Self::rollback(state, id, undo);
        }
    }

    fn undo_for(&self, state: &State<P>, id: &RecordId) -> Undo<P> {
        match self.inner.options.rollback_policy {
            RollbackPolicy::Snapshot => Undo::Snapshot(state.items.clone()),
            RollbackPolicy::Entity => state
                .items
                .iter()
                .position(|r| &r.id == id)
                .map(|index| Undo::Entity {
                    index,
                    original: state.items[index].clone(),
                })
                .unwrap_or(Undo::Nothing),
        }
    }

    fn rollback(state: &mut State<P>, id: &RecordId, undo: Undo<P>) {
        match undo {
            Undo::Snapshot(items) => state.items = items,
            Undo::Entity { index, original } => {
                match state.items.iter_mut().find(|r| &r.id == id) {
                    Some(slot) => *slot = original,
                    None => {
                        let at = index.min(state.items.len());
                        state.items.insert(at, original);
                    }
                }
            }
            Undo::Nothing => {}
        }
    }

    fn changed(&self) {
        self.inner.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn state(&self) -> MutexGuard<'_, State<P>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Idea, IdeaPatch, Platform};
    use crate::UserId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn saved(id: &str, title: &str) -> Record<Idea> {
        let mut record = Record::draft(UserId::new("u1"), None, Idea::new(title, Platform::Instagram));
        record.id = RecordId::new(id);
        record
    }

    fn store_with(items: Vec<Record<Idea>>) -> OptimisticStore<Idea> {
        OptimisticStore::with_items(StoreOptions::default(), items)
    }

    fn ids(store: &OptimisticStore<Idea>) -> Vec<String> {
        store.items().iter().map(|r| r.id.to_string()).collect()
    }

    #[tokio::test]
    async fn add_replaces_temp_in_place() {
        let store = store_with(vec![saved("a", "A")]);
        let draft = Record::draft(UserId::new("u1"), None, Idea::new("B", Platform::Tiktok));
        let temp = draft.id.clone();

        let (tx, rx) = oneshot::channel::<()>();
        let task = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .add_optimistically(
                        draft,
                        || async move {
                            rx.await.ok();
                            Ok(saved("b", "B"))
                        },
                        MutationHooks::new(),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert_eq!(ids(&store), vec![temp.to_string(), "a".to_string()]);
        assert!(store.is_optimistic(temp.as_str()));

        tx.send(()).unwrap();
        let persisted = task.await.unwrap().unwrap();

        assert_eq!(persisted.id, "b");
        assert_eq!(ids(&store), vec!["b", "a"]);
        assert!(!store.is_optimistic(temp.as_str()));
        assert!(store.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn failed_add_removes_temp_and_calls_error_hook() {
        let store = store_with(vec![saved("a", "A")]);
        let draft = Record::draft(UserId::new("u1"), None, Idea::new("B", Platform::Tiktok));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let err = store
            .add_optimistically(
                draft,
                || async { Err(SyncError::Persistence("insert rejected".into())) },
                MutationHooks::new().on_error(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap_err();

        assert_eq!(err, SyncError::Persistence("insert rejected".into()));
        assert_eq!(ids(&store), vec!["a"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn add_drops_duplicate_delivered_by_delta() {
        let store = store_with(vec![]);
        let draft = Record::draft(UserId::new("u1"), None, Idea::new("B", Platform::Tiktok));
        let echo = store.clone();

        store
            .add_optimistically(
                draft,
                || async move {
                    echo.apply(Change::Upsert(saved("b", "B")));
                    Ok(saved("b", "B"))
                },
                MutationHooks::new(),
            )
            .await
            .unwrap();

        assert_eq!(ids(&store), vec!["b"]);
    }

    #[tokio::test]
    async fn update_rolls_back_to_snapshot() {
        let store = store_with(vec![saved("a", "Old")]);
        let restored = Arc::new(Mutex::new(Vec::new()));
        let sink = restored.clone();

        let result = store
            .update_optimistically(
                &RecordId::new("a"),
                &IdeaPatch::default().title("New"),
                || async { Err(SyncError::Persistence("update rejected".into())) },
                MutationHooks::new().on_revert(move |items: &[Record<Idea>]| {
                    *sink.lock().unwrap() = items.to_vec();
                }),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(store.get("a").unwrap().payload.title, "Old");
        assert_eq!(restored.lock().unwrap().len(), 1);
        assert!(!store.is_optimistic("a"));
    }

    #[tokio::test]
    async fn update_shows_patch_while_pending() {
        let store = store_with(vec![saved("a", "Old")]);
        let (tx, rx) = oneshot::channel::<()>();
        let task = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut canonical = saved("a", "New");
                canonical.payload.description = "from server".into();
                store
                    .update_optimistically(
                        &RecordId::new("a"),
                        &IdeaPatch::default().title("New"),
                        || async move {
                            rx.await.ok();
                            Ok(canonical)
                        },
                        MutationHooks::new(),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert_eq!(store.get("a").unwrap().payload.title, "New");
        assert!(store.is_optimistic("a"));

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();

        let record = store.get("a").unwrap();
        assert_eq!(record.payload.description, "from server");
        assert!(!store.is_optimistic("a"));
    }

    #[tokio::test]
    async fn update_of_unknown_id_still_persists() {
        let store = store_with(vec![saved("a", "A")]);
        let called = Arc::new(AtomicUsize::new(0));
        let counter = called.clone();

        let out = store
            .update_optimistically(
                &RecordId::new("ghost"),
                &IdeaPatch::default().title("X"),
                || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(saved("ghost", "X"))
                },
                MutationHooks::new(),
            )
            .await
            .unwrap();

        assert_eq!(out.id, "ghost");
        assert_eq!(called.load(Ordering::SeqCst), 1);
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[tokio::test]
    async fn remove_restores_position_on_failure() {
        let store = store_with(vec![saved("a", "A"), saved("b", "B"), saved("c", "C")]);

        let out = store
            .remove_optimistically(
                &RecordId::new("b"),
                || async { Err(SyncError::Persistence("delete rejected".into())) },
                MutationHooks::new(),
            )
            .await;

        assert!(out.is_err());
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn remove_of_unknown_id_is_noop() {
        let store = store_with(vec![saved("a", "A")]);
        let called = Arc::new(AtomicUsize::new(0));
        let counter = called.clone();

        let removed = store
            .remove_optimistically(
                &RecordId::new("ghost"),
                || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                MutationHooks::new(),
            )
            .await
            .unwrap();

        assert!(!removed);
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn entity_rollback_keeps_concurrent_changes() {
        let options = StoreOptions {
            rollback_policy: RollbackPolicy::Entity,
            ..StoreOptions::default()
        };
        let store = OptimisticStore::with_items(options, vec![saved("a", "Old"), saved("b", "B")]);
        let other = store.clone();

        store
            .update_optimistically(
                &RecordId::new("a"),
                &IdeaPatch::default().title("New"),
                || async move {
                    other.apply(Change::Upsert(saved("c", "C")));
                    Err(SyncError::Persistence("update rejected".into()))
                },
                MutationHooks::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(ids(&store), vec!["c", "a", "b"]);
        assert_eq!(store.get("a").unwrap().payload.title, "Old");
    }

    #[tokio::test]
    async fn snapshot_rollback_discards_concurrent_changes() {
        let store = store_with(vec![saved("a", "Old")]);
        let other = store.clone();

        store
            .update_optimistically(
                &RecordId::new("a"),
                &IdeaPatch::default().title("New"),
                || async move {
                    other.apply(Change::Upsert(saved("c", "C")));
                    Err(SyncError::Persistence("update rejected".into()))
                },
                MutationHooks::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(ids(&store), vec!["a"]);
    }

    #[tokio::test]
    async fn entity_rollback_restores_removed_record_in_place() {
        let options = StoreOptions {
            rollback_policy: RollbackPolicy::Entity,
            ..StoreOptions::default()
        };
        let store = OptimisticStore::with_items(
            options,
            vec![saved("a", "A"), saved("b", "B"), saved("c", "C")],
        );
        let other = store.clone();

        store
            .remove_optimistically(
                &RecordId::new("b"),
                || async move {
                    other.apply(Change::Upsert(saved("c", "C2")));
                    Err(SyncError::Persistence("delete rejected".into()))
                },
                MutationHooks::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(ids(&store), vec!["a", "b", "c"]);
        assert_eq!(store.get("c").unwrap().payload.title, "C2");
        assert!(!store.is_optimistic("b"));
    }

    #[tokio::test]
    async fn mutations_on_same_id_are_serialized() {
        let store = store_with(vec![saved("a", "A")]);
        let (tx, rx) = oneshot::channel::<()>();
        let second_calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update_optimistically(
                        &RecordId::new("a"),
                        &IdeaPatch::default().title("first"),
                        || async move {
                            rx.await.ok();
                            Ok(saved("a", "first"))
                        },
                        MutationHooks::new(),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        let second = {
            let store = store.clone();
            let calls = second_calls.clone();
            tokio::spawn(async move {
                store
                    .update_optimistically(
                        &RecordId::new("a"),
                        &IdeaPatch::default().title("second"),
                        || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(saved("a", "second"))
                        },
                        MutationHooks::new(),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        // Shown at once, persisted only after the first settles.
        assert_eq!(store.get("a").unwrap().payload.title, "second");
        assert!(store.is_optimistic("a"));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);

        tx.send(()).unwrap();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("a").unwrap().payload.title, "second");
        assert!(store.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn failed_first_mutation_keeps_queued_one_pending() {
        let store = store_with(vec![saved("a", "A")]);
        let (tx, rx) = oneshot::channel::<()>();

        let first = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update_optimistically(
                        &RecordId::new("a"),
                        &IdeaPatch::default().title("first"),
                        || async move {
                            rx.await.ok();
                            Err(SyncError::Persistence("update rejected".into()))
                        },
                        MutationHooks::new(),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        let (release, hold) = oneshot::channel::<()>();
        let second = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update_optimistically(
                        &RecordId::new("a"),
                        &IdeaPatch::default().title("second"),
                        || async move {
                            hold.await.ok();
                            Ok(saved("a", "second"))
                        },
                        MutationHooks::new(),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        tx.send(()).unwrap();
        assert!(first.await.unwrap().is_err());
        assert_eq!(store.get("a").unwrap().payload.title, "A");
        assert!(store.is_optimistic("a"));

        release.send(()).unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(store.get("a").unwrap().payload.title, "second");
        assert!(!store.is_optimistic("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_persist_times_out_and_rolls_back() {
        let options = StoreOptions {
            persist_timeout: Some(Duration::from_secs(2)),
            ..StoreOptions::default()
        };
        let store = OptimisticStore::with_items(options, vec![saved("a", "A")]);

        let err = store
            .remove_optimistically(
                &RecordId::new("a"),
                || std::future::pending::<Result<(), SyncError>>(),
                MutationHooks::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err, SyncError::Timeout(Duration::from_secs(2)));
        assert_eq!(ids(&store), vec!["a"]);
        assert!(!store.is_optimistic("a"));
    }

    #[tokio::test]
    async fn cancel_pending_settles_in_flight_mutations() {
        let store = store_with(vec![saved("a", "A")]);
        let task = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .remove_optimistically(
                        &RecordId::new("a"),
                        || std::future::pending::<Result<(), SyncError>>(),
                        MutationHooks::new(),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(store.is_empty());

        store.cancel_pending();

        assert_eq!(task.await.unwrap(), Err(SyncError::Cancelled));
        assert_eq!(ids(&store), vec!["a"]);
    }

    #[tokio::test]
    async fn cancel_pending_reaches_queued_mutations() {
        let store = store_with(vec![saved("a", "A")]);
        let queued_calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update_optimistically(
                        &RecordId::new("a"),
                        &IdeaPatch::default().title("first"),
                        || std::future::pending::<Result<Record<Idea>, SyncError>>(),
                        MutationHooks::new(),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        let second = {
            let store = store.clone();
            let calls = queued_calls.clone();
            tokio::spawn(async move {
                store
                    .update_optimistically(
                        &RecordId::new("a"),
                        &IdeaPatch::default().title("second"),
                        || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(saved("a", "second"))
                        },
                        MutationHooks::new(),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(store.get("a").unwrap().payload.title, "second");

        store.cancel_pending();

        assert_eq!(first.await.unwrap(), Err(SyncError::Cancelled));
        assert_eq!(second.await.unwrap(), Err(SyncError::Cancelled));
        assert_eq!(queued_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.get("a").unwrap().payload.title, "A");
        assert!(store.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn watch_sees_every_change() {
        let store = store_with(vec![]);
        let mut rx = store.watch();

        store.replace_all(vec![saved("a", "A")]);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        store.apply(Change::Remove(RecordId::new("a")));
        assert!(rx.has_changed().unwrap());
        assert!(store.is_empty());
    }
}

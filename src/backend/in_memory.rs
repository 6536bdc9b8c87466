//! InMemoryBackend - HashMap-backed row storage for testing and development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::{Backend, Scope};
use crate::feed::{ChangeEvent, ChangeKind, InMemoryChangeFeed};
use crate::{BackendError, NewRecord, Payload, Record, RecordId};

/// Internal stored representation of a row.
struct StoredRow {
    seq: u64,
    row: serde_json::Value,
}

/// In-memory backend storing rows as JSON.
///
/// Storage key is `"TABLE:id"`. Clone-friendly via Arc. When a change feed is
/// attached, every write publishes a [`ChangeEvent`] carrying the new row.
///
/// ## Example
///
/// ```ignore
/// let feed = InMemoryChangeFeed::new();
/// let backend = InMemoryBackend::new().with_feed(feed.clone());
///
/// let saved = backend
///     .insert(NewRecord::new(owner, None, Idea::new("Tip #1", Platform::Instagram)))
///     .await?;
/// assert!(!saved.is_temporary());
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    storage: Arc<RwLock<HashMap<String, StoredRow>>>,
    seq: Arc<AtomicU64>,
    online: Arc<AtomicBool>,
    rejection: Arc<Mutex<Option<String>>>,
    latency: Option<Duration>,
    feed: Option<InMemoryChangeFeed>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            seq: Arc::new(AtomicU64::new(0)),
            online: Arc::new(AtomicBool::new(true)),
            rejection: Arc::new(Mutex::new(None)),
            latency: None,
            feed: None,
        }
    }

    /// Publish every write to `feed`.
    pub fn with_feed(mut self, feed: InMemoryChangeFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// While offline every call fails with [`BackendError::Unavailable`].
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Reject every write with `message` until cleared with `None`.
    pub fn reject_writes(&self, message: Option<&str>) {
        *self.rejection.lock().unwrap_or_else(PoisonError::into_inner) = message.map(str::to_string);
    }

    /// Store a canonical row written outside the client (another device, a
    /// backend job) and publish it.
    pub fn put<P: Payload>(&self, record: &Record<P>) -> Result<(), BackendError> {
        let key = Self::make_key(P::TABLE, record.id.as_str());
        let row = serde_json::to_value(record)?;
        let kind = {
            let mut storage = self.write_lock()?;
            let kind = if storage.contains_key(&key) {
                ChangeKind::Update
            } else {
                ChangeKind::Insert
            };
            let seq = storage
                .get(&key)
                .map(|s| s.seq)
                .unwrap_or_else(|| self.next_seq());
            storage.insert(key, StoredRow { seq, row: row.clone() });
            kind
        };
        self.publish::<P>(kind, record, Some(row));
        Ok(())
    }

    /// Delete a row outside the client and publish the removal.
    pub fn erase<P: Payload>(&self, id: &RecordId) -> Result<bool, BackendError> {
        let removed = self.remove_row::<P>(id)?;
        if let Some(record) = &removed {
            self.publish::<P>(ChangeKind::Delete, record, None);
        }
        Ok(removed.is_some())
    }

    pub fn row_count(&self, table: &str) -> usize {
        let prefix = format!("{}:", table);
        self.storage
            .read()
            .map(|s| s.keys().filter(|k| k.starts_with(&prefix)).count())
            .unwrap_or(0)
    }

    fn make_key(table: &str, id: &str) -> String {
        format!("{}:{}", table, id)
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    fn write_lock(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, StoredRow>>, BackendError> {
        self.storage
            .write()
            .map_err(|_| BackendError::Storage("lock poisoned".into()))
    }

    async fn gate(&self, write: bool) -> Result<(), BackendError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("backend offline".into()));
        }
        if write {
            let rejection = self
                .rejection
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(message) = rejection {
                return Err(BackendError::Rejected(message));
            }
        }
        Ok(())
    }

    fn remove_row<P: Payload>(&self, id: &RecordId) -> Result<Option<Record<P>>, BackendError> {
        let key = Self::make_key(P::TABLE, id.as_str());
        let removed = self.write_lock()?.remove(&key);
        removed
            .map(|stored| serde_json::from_value(stored.row).map_err(BackendError::from))
            .transpose()
    }

    fn publish<P: Payload>(&self, kind: ChangeKind, record: &Record<P>, row: Option<serde_json::Value>) {
        if let Some(feed) = &self.feed {
            let mut event = ChangeEvent::new(P::TABLE, kind, record.id.clone(), record.owner.clone());
            event.row = row;
            feed.publish(event);
        }
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn select<P: Payload>(&self, scope: &Scope) -> Result<Vec<Record<P>>, BackendError> {
        self.gate(false).await?;
        let prefix = format!("{}:", P::TABLE);
        let mut rows = {
            let storage = self
                .storage
                .read()
                .map_err(|_| BackendError::Storage("lock poisoned".into()))?;
            storage
                .iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .map(|(_, stored)| {
                    serde_json::from_value::<Record<P>>(stored.row.clone())
                        .map(|record| (stored.seq, record))
                        .map_err(BackendError::from)
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        rows.retain(|(_, record)| scope.contains(record));
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(rows.into_iter().map(|(_, record)| record).collect())
    }

    async fn insert<P: Payload>(&self, new: NewRecord<P>) -> Result<Record<P>, BackendError> {
        self.gate(true).await?;
        let now = Utc::now();
        let record = Record {
            id: RecordId::generate(),
            owner: new.owner,
            group_key: new.group_key,
            payload: new.payload,
            created_at: now,
            updated_at: now,
        };
        let row = serde_json::to_value(&record)?;
        {
            let seq = self.next_seq();
            self.write_lock()?.insert(
                Self::make_key(P::TABLE, record.id.as_str()),
                StoredRow { seq, row: row.clone() },
            );
        }
        debug!(table = P::TABLE, id = %record.id, "row inserted");
        self.publish::<P>(ChangeKind::Insert, &record, Some(row));
        Ok(record)
    }

    async fn update<P: Payload>(
        &self,
        id: &RecordId,
        patch: &P::Patch,
    ) -> Result<Record<P>, BackendError> {
        self.gate(true).await?;
        let key = Self::make_key(P::TABLE, id.as_str());
        let (record, row) = {
            let mut storage = self.write_lock()?;
            let stored = storage.get_mut(&key).ok_or_else(|| BackendError::NotFound {
                table: P::TABLE.to_string(),
                id: id.to_string(),
            })?;
            let mut record: Record<P> = serde_json::from_value(stored.row.clone())?;
            record.apply_patch(patch);
            record.updated_at = Utc::now();
            stored.row = serde_json::to_value(&record)?;
            (record, stored.row.clone())
        };
        debug!(table = P::TABLE, id = %id, "row updated");
        self.publish::<P>(ChangeKind::Update, &record, Some(row));
        Ok(record)
    }

    async fn delete<P: Payload>(&self, id: &RecordId) -> Result<(), BackendError> {
        self.gate(true).await?;
        if let Some(record) = self.remove_row::<P>(id)? {
            debug!(table = P::TABLE, id = %id, "row deleted");
            self.publish::<P>(ChangeKind::Delete, &record, None);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Idea, IdeaPatch, Platform, Script};
    use crate::feed::{ChangeFeed, ChangeFilter};
    use crate::{BrandId, UserId};

    fn new_idea(owner: &str, brand: Option<&str>, title: &str) -> NewRecord<Idea> {
        NewRecord::new(
            UserId::new(owner),
            brand.map(BrandId::new),
            Idea::new(title, Platform::Instagram),
        )
    }

    #[tokio::test]
    async fn select_is_scoped_and_newest_first() {
        let backend = InMemoryBackend::new();
        backend.insert(new_idea("u1", Some("b1"), "first")).await.unwrap();
        backend.insert(new_idea("u1", Some("b2"), "second")).await.unwrap();
        backend.insert(new_idea("u2", None, "other")).await.unwrap();
        backend.insert(new_idea("u1", Some("b1"), "third")).await.unwrap();

        let all: Vec<Record<Idea>> = backend
            .select(&Scope::new(UserId::new("u1"), None))
            .await
            .unwrap();
        let titles: Vec<_> = all.iter().map(|r| r.payload.title.as_str()).collect();
        assert_eq!(titles, vec!["third", "second", "first"]);

        let brand: Vec<Record<Idea>> = backend
            .select(&Scope::new(UserId::new("u1"), Some(BrandId::new("b1"))))
            .await
            .unwrap();
        assert_eq!(brand.len(), 2);
    }

    #[tokio::test]
    async fn tables_are_separate() {
        let backend = InMemoryBackend::new();
        backend.insert(new_idea("u1", None, "idea")).await.unwrap();

        let scripts: Vec<Record<Script>> = backend
            .select(&Scope::new(UserId::new("u1"), None))
            .await
            .unwrap();
        assert!(scripts.is_empty());
        assert_eq!(backend.row_count("ideas"), 1);
    }

    #[tokio::test]
    async fn update_merges_patch() {
        let backend = InMemoryBackend::new();
        let saved = backend.insert(new_idea("u1", None, "Tip #1")).await.unwrap();

        let updated = backend
            .update::<Idea>(&saved.id, &IdeaPatch::default().title("Tip #1 revised"))
            .await
            .unwrap();
        assert_eq!(updated.id, saved.id);
        assert_eq!(updated.payload.title, "Tip #1 revised");
        assert_eq!(updated.created_at, saved.created_at);
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let backend = InMemoryBackend::new();
        let err = backend
            .update::<Idea>(&RecordId::new("nope"), &IdeaPatch::default().title("X"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rejection_and_outage() {
        let backend = InMemoryBackend::new();
        backend.reject_writes(Some("row violates policy"));
        let err = backend.insert(new_idea("u1", None, "x")).await.unwrap_err();
        assert_eq!(err, BackendError::Rejected("row violates policy".into()));

        backend.reject_writes(None);
        backend.set_online(false);
        let err = backend
            .select::<Idea>(&Scope::new(UserId::new("u1"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }

    #[tokio::test]
    async fn writes_are_published_with_rows() {
        let feed = InMemoryChangeFeed::new();
        let backend = InMemoryBackend::new().with_feed(feed.clone());
        let mut sub = feed
            .subscribe(ChangeFilter::for_payload::<Idea>(UserId::new("u1")))
            .unwrap();

        let saved = backend.insert(new_idea("u1", None, "Tip #1")).await.unwrap();
        backend.delete::<Idea>(&saved.id).await.unwrap();

        let insert = sub.recv().await.unwrap();
        assert_eq!(insert.kind, ChangeKind::Insert);
        let decoded = insert.record::<Idea>().unwrap().unwrap();
        assert_eq!(decoded, saved);

        let delete = sub.recv().await.unwrap();
        assert_eq!(delete.kind, ChangeKind::Delete);
        assert!(delete.row.is_none());
    }
}

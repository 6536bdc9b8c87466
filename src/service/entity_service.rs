use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use super::SharedSession;
use crate::backend::{Backend, Scope};
use crate::{NewRecord, Payload, Record, RecordId, SyncError};

/// Translates create/update/remove/fetch for one entity kind into backend
/// calls scoped to the session's owner and active group.
///
/// Every call fails with [`SyncError::Unauthenticated`] while no owner is
/// set. Ownership of the targeted row is not checked client-side; the
/// backend is trusted to authorize updates and deletes.
///
/// ## Example
///
/// ```ignore
/// let session = SharedSession::new(Session::signed_in("user-1"));
/// let ideas: EntityService<Idea, _> = EntityService::new(backend, session);
///
/// let saved = ideas.create(Idea::new("Tip #1", Platform::Instagram)).await?;
/// let all = ideas.fetch_all().await?;
/// ```
pub struct EntityService<P, B> {
    backend: Arc<B>,
    session: SharedSession,
    _payload: PhantomData<fn() -> P>,
}

impl<P, B> Clone for EntityService<P, B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            session: self.session.clone(),
            _payload: PhantomData,
        }
    }
}

impl<P: Payload, B: Backend> EntityService<P, B> {
    pub fn new(backend: Arc<B>, session: SharedSession) -> Self {
        Self {
            backend,
            session,
            _payload: PhantomData,
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn scope(&self) -> Result<Scope, SyncError> {
        self.session.scope()
    }

    /// A client-side record with a temporary id, attributed to the current
    /// owner and group, for an optimistic insert.
    pub fn draft(&self, payload: P) -> Result<Record<P>, SyncError> {
        let scope = self.scope()?;
        Ok(Record::draft(scope.owner, scope.group, payload))
    }

    /// Every record visible to the owner, narrowed to the active group when
    /// one is set, newest first.
    pub async fn fetch_all(&self) -> Result<Vec<Record<P>>, SyncError> {
        let scope = self.scope()?;
        debug!(table = P::TABLE, owner = %scope.owner, "fetching records");
        self.backend.select::<P>(&scope).await.map_err(|err| {
            warn!(table = P::TABLE, error = %err, "fetch failed");
            SyncError::Fetch(err.to_string())
        })
    }

    pub async fn create(&self, payload: P) -> Result<Record<P>, SyncError> {
        let scope = self.scope()?;
        let new = NewRecord::new(scope.owner, scope.group, payload);
        self.backend
            .insert(new)
            .await
            .map_err(|err| Self::persistence("insert", err))
    }

    pub async fn update(&self, id: &RecordId, patch: &P::Patch) -> Result<Record<P>, SyncError> {
        self.scope()?;
        self.backend
            .update::<P>(id, patch)
            .await
            .map_err(|err| Self::persistence("update", err))
    }

    pub async fn remove(&self, id: &RecordId) -> Result<(), SyncError> {
        self.scope()?;
        self.backend
            .delete::<P>(id)
            .await
            .map_err(|err| Self::persistence("delete", err))
    }

    fn persistence(action: &str, err: crate::BackendError) -> SyncError {
        warn!(table = P::TABLE, action, error = %err, "write failed");
        SyncError::Persistence(err.to_string())
    }
}

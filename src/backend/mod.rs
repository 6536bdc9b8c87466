//! Row storage consumed by [`EntityService`](crate::service::EntityService).

mod in_memory;

pub use in_memory::InMemoryBackend;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{BackendError, BrandId, NewRecord, Payload, Record, RecordId, UserId};

/// Visibility scope of a query: one owner, optionally narrowed to a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub owner: UserId,
    pub group: Option<BrandId>,
}

impl Scope {
    pub fn new(owner: UserId, group: Option<BrandId>) -> Self {
        Self { owner, group }
    }

    pub fn contains<P>(&self, record: &Record<P>) -> bool
    where
        P: Payload,
    {
        record.owner == self.owner && record.in_group(self.group.as_ref())
    }
}

/// Hosted relational backend holding canonical rows.
///
/// Authorization is the backend's job: `update` and `delete` take only an id.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Rows visible in `scope`, newest first.
    async fn select<P: Payload>(&self, scope: &Scope) -> Result<Vec<Record<P>>, BackendError>;

    /// Insert a row; the backend assigns id and timestamps.
    async fn insert<P: Payload>(&self, record: NewRecord<P>) -> Result<Record<P>, BackendError>;

    /// Merge `patch` into the row with `id` and return the canonical row.
    async fn update<P: Payload>(
        &self,
        id: &RecordId,
        patch: &P::Patch,
    ) -> Result<Record<P>, BackendError>;

    async fn delete<P: Payload>(&self, id: &RecordId) -> Result<(), BackendError>;
}

#[async_trait]
impl<B: Backend> Backend for Arc<B> {
    async fn select<P: Payload>(&self, scope: &Scope) -> Result<Vec<Record<P>>, BackendError> {
        (**self).select(scope).await
    }

    async fn insert<P: Payload>(&self, record: NewRecord<P>) -> Result<Record<P>, BackendError> {
        (**self).insert(record).await
    }

    async fn update<P: Payload>(
        &self,
        id: &RecordId,
        patch: &P::Patch,
    ) -> Result<Record<P>, BackendError> {
        (**self).update::<P>(id, patch).await
    }

    async fn delete<P: Payload>(&self, id: &RecordId) -> Result<(), BackendError> {
        (**self).delete::<P>(id).await
    }
}

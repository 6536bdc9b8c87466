//! Push-based change notifications scoped to one table and one owner.

mod in_memory;

pub use in_memory::InMemoryChangeFeed;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{BackendError, Payload, Record, RecordId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change observed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record_id: RecordId,
    pub owner: UserId,
    /// The new row for inserts and updates, when the feed carries it.
    #[serde(default)]
    pub row: Option<serde_json::Value>,
}

impl ChangeEvent {
    pub fn new(table: impl Into<String>, kind: ChangeKind, record_id: RecordId, owner: UserId) -> Self {
        Self {
            table: table.into(),
            kind,
            record_id,
            owner,
            row: None,
        }
    }

    pub fn with_row(mut self, row: serde_json::Value) -> Self {
        self.row = Some(row);
        self
    }

    /// Decode the carried row as a typed record.
    pub fn record<P: Payload>(&self) -> Option<Result<Record<P>, BackendError>> {
        self.row
            .clone()
            .map(|row| serde_json::from_value(row).map_err(BackendError::from))
    }
}

/// Which events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: String,
    pub owner: UserId,
}

impl ChangeFilter {
    pub fn new(table: impl Into<String>, owner: UserId) -> Self {
        Self {
            table: table.into(),
            owner,
        }
    }

    pub fn for_payload<P: Payload>(owner: UserId) -> Self {
        Self::new(P::TABLE, owner)
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.table == self.table && event.owner == self.owner
    }
}

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Receiving end of a change feed subscription.
///
/// Yields `None` once the feed closes the channel. Dropping the subscription
/// unsubscribes.
pub struct ChangeSubscription {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    unsubscribe: Option<Unsubscribe>,
}

impl ChangeSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<ChangeEvent>) -> Self {
        Self {
            rx,
            unsubscribe: None,
        }
    }

    /// Run `f` when the subscription is dropped.
    pub fn on_drop<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.unsubscribe = Some(Box::new(f));
        self
    }

    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Stream for ChangeSubscription {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

/// Source of change events.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeSubscription, BackendError>;
}

impl<F: ChangeFeed + ?Sized> ChangeFeed for Arc<F> {
    fn subscribe(&self, filter: ChangeFilter) -> Result<ChangeSubscription, BackendError> {
        (**self).subscribe(filter)
    }
}

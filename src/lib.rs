//! Optimistic local-state synchronization for user-owned records.
//!
//! A UI works against an in-memory list ([`store::OptimisticStore`]) that
//! applies create/update/remove immediately, persists in the background
//! through an owner-scoped [`service::EntityService`], and rolls back when
//! the backend refuses. A [`realtime::RealtimeBridge`] keeps the list in step
//! with changes made elsewhere. [`collection::SyncedCollection`] wires the
//! pieces together per entity kind.

extern crate self as synced_rust;

pub mod backend;
pub mod collection;
pub mod config;
pub mod content;
mod entity;
mod error;
pub mod feed;
pub mod logging;
pub mod notify;
pub mod realtime;
pub mod runner;
pub mod service;
pub mod store;

pub use entity::{BrandId, NewRecord, Patch, Payload, Record, RecordId, UserId, TEMP_PREFIX};
pub use error::{BackendError, OperationError, SyncError};

// Derive macro shares the trait's name, like serde's.
pub use synced_rust_macros::Payload;

pub use backend::{Backend, InMemoryBackend, Scope};
pub use collection::{Ideas, Scripts, SyncedCollection};
pub use config::{ResyncStrategy, RollbackPolicy, SyncConfig};
pub use feed::{ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind, InMemoryChangeFeed};
pub use logging::init_logging;
pub use notify::{LogNotifier, Notification, Notifier, RecordingNotifier};
pub use realtime::{BridgeState, BridgeStats, RealtimeBridge};
pub use runner::{ExecuteOptions, OperationRunner};
pub use service::{EntityService, Session, SharedSession};
pub use store::{Change, MutationHooks, OptimisticStore, StoreOptions};

#[cfg(feature = "emitter")]
pub use notify::EmitterNotifier;

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;

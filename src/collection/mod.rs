//! One entity kind wired end to end: service, optimistic store, realtime
//! bridge and operation runner behind a single handle.

mod synced;

pub use synced::SyncedCollection;

use crate::content::{Idea, Script};

/// The ideas workspace.
pub type Ideas<B, F> = SyncedCollection<Idea, B, F>;

/// The scripts workspace.
pub type Scripts<B, F> = SyncedCollection<Script, B, F>;

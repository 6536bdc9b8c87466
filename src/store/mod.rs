//! Optimistic local list of records.
//!
//! ```text
//!   add/update/remove ──► apply locally ──► persist() ──┬─ Ok  ──► reconcile with canonical record
//!                         mark pending                  └─ Err ──► roll back, on_revert, on_error
//! ```
//!
//! Mutations against the same record id are queued behind each other when
//! `serialize_mutations` is on (the default).

mod hooks;
mod optimistic;
mod queue;

pub use hooks::MutationHooks;
pub use optimistic::{Change, OptimisticStore, StoreOptions};
pub use queue::{MutationQueue, QueueTicket};

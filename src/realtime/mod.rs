//! Keeps an [`OptimisticStore`](crate::store::OptimisticStore) in step with
//! changes made outside the client.
//!
//! ```text
//!   ChangeFeed ──(table, owner)──► bridge task ──┬─ Full:  fetch_all ──► replace_all
//!        ▲                                       └─ Delta: apply row (refetch on miss)
//!        └──── resubscribe with backoff when the feed closes
//! ```

mod bridge;

pub use bridge::{BridgeState, BridgeStats, RealtimeBridge};

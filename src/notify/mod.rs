//! Notifications - fire-and-forget, toast-style user feedback.
//!
//! Every failure (and every success with a configured message) is turned
//! into a [`Notification`] and handed to a [`Notifier`]. Nothing waits for an
//! acknowledgment.
//!
//! ```text
//!   OperationRunner ─┐
//!   SyncedCollection ├──► Notifier::notify(Notification)
//!   RealtimeBridge ──┘        │
//!                             ├── LogNotifier        (tracing)
//!                             ├── RecordingNotifier  (in-memory queue)
//!                             └── EmitterNotifier    (event-emitter-rs, "emitter" feature)
//! ```

#[cfg(feature = "emitter")]
mod emitter;
mod log;
mod notification;
mod recording;

#[cfg(feature = "emitter")]
pub use emitter::{EmitterNotifier, NOTIFICATION_EVENT};
pub use log::LogNotifier;
pub use notification::{Notification, Variant};
pub use recording::RecordingNotifier;

use std::sync::Arc;

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification)
    }
}

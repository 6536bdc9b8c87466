use std::sync::{Arc, Mutex, PoisonError};

use super::{Notification, Notifier};

/// Keeps every notification in memory, in emission order.
///
/// Clone-friendly via `Arc`: clones share the same buffer, so a UI can drain
/// the queue that a collection writes to.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    buffer: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications recorded so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Only the destructive ones.
    pub fn errors(&self) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(Notification::is_error)
            .collect()
    }

    /// Take and clear the buffer.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order_and_filters_errors() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notification::success("Idea created", "Tip #1"));
        notifier.notify(Notification::error("Error", "offline"));

        let all = notifier.notifications();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "Idea created");

        let errors = notifier.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].description.as_deref(), Some("offline"));
    }

    #[test]
    fn clones_share_buffer_and_drain_clears() {
        let notifier = RecordingNotifier::new();
        let ui = notifier.clone();
        notifier.notify(Notification::new("Saved"));

        assert_eq!(ui.drain().len(), 1);
        assert!(notifier.is_empty());
    }
}

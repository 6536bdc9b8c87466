use tracing::{info, warn};

use super::{Notification, Notifier};

/// Writes notifications to the `tracing` log instead of a UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        LogNotifier
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        let description = notification.description.as_deref().unwrap_or("");
        if notification.is_error() {
            warn!(title = %notification.title, %description, "notification");
        } else {
            info!(title = %notification.title, %description, "notification");
        }
    }
}

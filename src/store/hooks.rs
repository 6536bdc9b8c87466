use crate::{Record, SyncError};

type RevertHook<P> = Box<dyn FnOnce(&[Record<P>]) + Send>;
type ErrorHook = Box<dyn FnOnce(&SyncError) + Send>;

/// Optional callbacks fired when an optimistic mutation fails.
pub struct MutationHooks<P> {
    on_revert: Option<RevertHook<P>>,
    on_error: Option<ErrorHook>,
}

impl<P> Default for MutationHooks<P> {
    fn default() -> Self {
        Self {
            on_revert: None,
            on_error: None,
        }
    }
}

impl<P> MutationHooks<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the restored list after a rollback.
    pub fn on_revert<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&[Record<P>]) + Send + 'static,
    {
        self.on_revert = Some(Box::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&SyncError) + Send + 'static,
    {
        self.on_error = Some(Box::new(hook));
        self
    }

    pub(crate) fn reverted(&mut self, restored: &[Record<P>]) {
        if let Some(hook) = self.on_revert.take() {
            hook(restored);
        }
    }

    pub(crate) fn failed(&mut self, err: &SyncError) {
        if let Some(hook) = self.on_error.take() {
            hook(err);
        }
    }
}

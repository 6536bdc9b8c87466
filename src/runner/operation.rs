use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::deadline::bounded;
use crate::notify::{Notification, Notifier};
use crate::{OperationError, SyncError};

const FALLBACK_ERROR: &str = "Something went wrong";

type SuccessHook<T> = Box<dyn FnOnce(&T) + Send>;
type ErrorHook = Box<dyn FnOnce(&OperationError) + Send>;

/// Per-call options for [`OperationRunner::execute`].
pub struct ExecuteOptions<T> {
    on_success: Option<SuccessHook<T>>,
    on_error: Option<ErrorHook>,
    success_message: Option<String>,
    error_message: Option<String>,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl<T> Default for ExecuteOptions<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            success_message: None,
            error_message: None,
            timeout: None,
            cancel: None,
        }
    }
}

impl<T> ExecuteOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.on_success = Some(Box::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&OperationError) + Send + 'static,
    {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Emit a success notification with this description.
    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    /// Used when the error itself carries no message.
    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Overrides the runner's default timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Debug, Default)]
struct RunnerState {
    loading: bool,
    error: Option<OperationError>,
}

/// Runs one async unit of work at a time from the caller's point of view,
/// tracking `is_loading` and the last error.
///
/// There is no internal concurrency control: a second `execute` before the
/// first settles runs independently and both write the loading/error state
/// (last writer wins). Callers serialize, e.g. by disabling the trigger
/// while `is_loading()` is true.
///
/// ## Example
///
/// ```ignore
/// let runner = OperationRunner::new(Arc::new(LogNotifier));
/// let ideas = runner
///     .execute(
///         || service.fetch_all(),
///         ExecuteOptions::new().error_message("Failed to load ideas"),
///     )
///     .await;
/// ```
#[derive(Clone)]
pub struct OperationRunner {
    state: Arc<Mutex<RunnerState>>,
    notifier: Arc<dyn Notifier>,
    default_timeout: Option<Duration>,
}

impl OperationRunner {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RunnerState::default())),
            notifier,
            default_timeout: None,
        }
    }

    /// Bound every call without an explicit timeout by `timeout`.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    /// The error captured by the most recent failed call, cleared when the
    /// next call starts.
    pub fn error(&self) -> Option<OperationError> {
        self.state().error.clone()
    }

    /// Run `operation`. Returns `None` when it failed, timed out or was
    /// cancelled; the failure is recorded, notified and passed to `on_error`.
    pub async fn execute<T, E, F, Fut>(&self, operation: F, options: ExecuteOptions<T>) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let ExecuteOptions {
            on_success,
            on_error,
            success_message,
            error_message,
            timeout,
            cancel,
        } = options;

        {
            let mut state = self.state();
            state.loading = true;
            state.error = None;
        }

        let timeout = timeout.or(self.default_timeout);
        let outcome = match bounded(operation(), timeout, cancel.as_ref()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err.to_string()),
            Err(reason) => Err(SyncError::from(reason).user_message()),
        };

        match outcome {
            Ok(value) => {
                self.state().loading = false;
                debug!("operation succeeded");
                if let Some(hook) = on_success {
                    hook(&value);
                }
                if let Some(message) = success_message {
                    self.notifier.notify(Notification::success("Success", message));
                }
                Some(value)
            }
            Err(message) => {
                let message = if message.trim().is_empty() {
                    error_message.unwrap_or_else(|| FALLBACK_ERROR.to_string())
                } else {
                    message
                };
                let error = OperationError::new(message);
                warn!(error = %error, "operation failed");
                {
                    let mut state = self.state();
                    state.loading = false;
                    state.error = Some(error.clone());
                }
                self.notifier
                    .notify(Notification::error("Error", error.message.clone()));
                if let Some(hook) = on_error {
                    hook(&error);
                }
                None
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

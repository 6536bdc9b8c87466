//! Single async operation runner with loading/error state and notifications.

mod deadline;
mod operation;

pub use deadline::{bounded, settle, Interrupted};
pub use operation::{ExecuteOptions, OperationRunner};

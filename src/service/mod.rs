//! Per-entity-kind adapter from domain calls to owner-scoped backend calls.

mod entity_service;
mod review;
mod session;

pub use entity_service::EntityService;
pub use session::{Session, SharedSession};

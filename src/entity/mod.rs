//! Records, identifiers and the payload traits shared by every entity kind.

mod id;
mod payload;
mod record;

pub use id::{BrandId, RecordId, UserId, TEMP_PREFIX};
pub use payload::{Patch, Payload};
pub use record::{NewRecord, Record};

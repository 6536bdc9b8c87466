use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BrandId, Patch, Payload, RecordId, UserId};

/// A user-owned row as seen by the client.
///
/// Serializes to the flat row shape used by the backend
/// (`{"id", "user_id", "brand_id", ...payload fields, "created_at", "updated_at"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<P> {
    pub id: RecordId,
    #[serde(rename = "user_id")]
    pub owner: UserId,
    #[serde(rename = "brand_id", default)]
    pub group_key: Option<BrandId>,
    #[serde(flatten)]
    pub payload: P,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<P: Payload> Record<P> {
    /// Build a client-side record carrying a temporary id, ready for an
    /// optimistic insert.
    pub fn draft(owner: UserId, group_key: Option<BrandId>, payload: P) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::temporary(),
            owner,
            group_key,
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.id.is_temporary()
    }

    /// Shallow-merge `patch` into the payload.
    pub fn apply_patch(&mut self, patch: &P::Patch) {
        patch.apply_to(&mut self.payload);
    }

    /// True when the record belongs to `group`, or when no group is active.
    pub fn in_group(&self, group: Option<&BrandId>) -> bool {
        match group {
            Some(group) => self.group_key.as_ref() == Some(group),
            None => true,
        }
    }
}

/// Fields the client supplies when inserting a record; the backend fills in
/// the id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord<P> {
    #[serde(rename = "user_id")]
    pub owner: UserId,
    #[serde(rename = "brand_id", default)]
    pub group_key: Option<BrandId>,
    #[serde(flatten)]
    pub payload: P,
}

impl<P> NewRecord<P> {
    pub fn new(owner: UserId, group_key: Option<BrandId>, payload: P) -> Self {
        Self {
            owner,
            group_key,
            payload,
        }
    }
}

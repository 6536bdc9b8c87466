//! The review loop for generated ideas, plus idea-scoped script lookups.

use super::EntityService;
use crate::backend::Backend;
use crate::content::{Idea, IdeaPatch, IdeaStatus, Review, Script};
use crate::{Record, RecordId, SyncError};

impl<B: Backend> EntityService<Idea, B> {
    pub async fn submit_for_review(&self, id: &RecordId) -> Result<Record<Idea>, SyncError> {
        self.update(id, &IdeaPatch::default().status(IdeaStatus::PendingReview))
            .await
    }

    /// Approve or reject an idea, recording feedback and rating.
    pub async fn review(&self, id: &RecordId, review: Review) -> Result<Record<Idea>, SyncError> {
        self.update(id, &review.into_patch()).await
    }

    /// Mark an idea as turned into a script.
    pub async fn mark_scripted(&self, id: &RecordId) -> Result<Record<Idea>, SyncError> {
        self.update(id, &IdeaPatch::default().status(IdeaStatus::Scripted))
            .await
    }
}

impl<B: Backend> EntityService<Script, B> {
    /// Scripts written from the idea with `idea_id`, newest first.
    pub async fn fetch_for_idea(&self, idea_id: &RecordId) -> Result<Vec<Record<Script>>, SyncError> {
        let mut scripts = self.fetch_all().await?;
        scripts.retain(|s| s.payload.idea_id.as_ref() == Some(idea_id));
        Ok(scripts)
    }
}

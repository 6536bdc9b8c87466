use serde::{Deserialize, Serialize};

use crate::Payload;

use super::Platform;

/// Where an idea sits in the review loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    #[default]
    Draft,
    PendingReview,
    Approved,
    Rejected,
    Scripted,
}

/// A content idea, generated by the workflow engine or written by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Payload)]
#[payload(table = "ideas", label = "Idea")]
pub struct Idea {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: IdeaStatus,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub rating: Option<u8>,
}

impl Idea {
    pub fn new(title: impl Into<String>, platform: Platform) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            platform,
            tags: Vec::new(),
            status: IdeaStatus::Draft,
            feedback: None,
            rating: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
}

/// Reviewer feedback on a generated idea.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub verdict: Verdict,
    pub feedback: Option<String>,
    pub rating: Option<u8>,
}

impl Review {
    pub fn approve() -> Self {
        Self {
            verdict: Verdict::Approved,
            feedback: None,
            rating: None,
        }
    }

    pub fn reject(feedback: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Rejected,
            feedback: Some(feedback.into()),
            rating: None,
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    /// Ratings are on a 1-5 scale; out-of-range values are clamped.
    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating.clamp(1, 5));
        self
    }

    pub fn into_patch(self) -> IdeaPatch {
        let status = match self.verdict {
            Verdict::Approved => IdeaStatus::Approved,
            Verdict::Rejected => IdeaStatus::Rejected,
        };
        let mut patch = IdeaPatch::default().status(status);
        if let Some(feedback) = self.feedback {
            patch = patch.feedback(feedback);
        }
        if let Some(rating) = self.rating {
            patch = patch.rating(rating);
        }
        patch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Patch, Record, UserId};

    #[test]
    fn patch_merges_only_set_fields() {
        let idea = Idea::new("Tip #1", Platform::Instagram).with_tags(["tips"]);
        let patched = idea.patched(&IdeaPatch::default().title("Tip #1 revised"));

        assert_eq!(patched.title, "Tip #1 revised");
        assert_eq!(patched.tags, vec!["tips".to_string()]);
        assert_eq!(patched.platform, Platform::Instagram);
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(IdeaPatch::default().is_empty());
        assert!(!IdeaPatch::default().rating(4u8).is_empty());
    }

    #[test]
    fn patch_skips_unset_fields_when_serialized() {
        let json = serde_json::to_value(IdeaPatch::default().title("X")).unwrap();
        assert_eq!(json, serde_json::json!({ "title": "X" }));
    }

    #[test]
    fn review_builds_status_patch() {
        let patch = Review::reject("too generic").with_rating(9).into_patch();
        assert_eq!(patch.status, Some(IdeaStatus::Rejected));
        assert_eq!(patch.feedback, Some(Some("too generic".to_string())));
        assert_eq!(patch.rating, Some(Some(5)));

        let approve = Review::approve().into_patch();
        assert_eq!(approve.status, Some(IdeaStatus::Approved));
        assert!(approve.feedback.is_none());
    }

    #[test]
    fn record_row_shape_is_flat() {
        let record = Record::draft(
            UserId::new("user-1"),
            None,
            Idea::new("Tip #1", Platform::Instagram),
        );
        let row = serde_json::to_value(&record).unwrap();
        assert_eq!(row["title"], "Tip #1");
        assert_eq!(row["user_id"], "user-1");
        assert_eq!(row["platform"], "instagram");

        let back: Record<Idea> = serde_json::from_value(row).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn table_and_label() {
        assert_eq!(Idea::TABLE, "ideas");
        assert_eq!(Idea::LABEL, "Idea");
    }
}

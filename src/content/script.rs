use serde::{Deserialize, Serialize};

use crate::{Payload, RecordId};

use super::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStatus {
    #[default]
    Draft,
    Ready,
    Published,
}

/// A script written for an idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Payload)]
#[payload(table = "scripts", label = "Script")]
pub struct Script {
    #[serde(default)]
    pub idea_id: Option<RecordId>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub status: ScriptStatus,
}

impl Script {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            idea_id: None,
            title: title.into(),
            content: content.into(),
            platform: Platform::default(),
            status: ScriptStatus::Draft,
        }
    }

    pub fn for_idea(mut self, idea_id: RecordId) -> Self {
        self.idea_id = Some(idea_id);
        self
    }

    pub fn on(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_script_for_idea() {
        let script = Script::new("Hook", "Open with a question")
            .for_idea(RecordId::new("abc123"))
            .on(Platform::Tiktok);
        assert_eq!(script.idea_id, Some(RecordId::new("abc123")));
        assert_eq!(script.platform, Platform::Tiktok);
        assert_eq!(Script::TABLE, "scripts");
    }

    #[test]
    fn patch_publishes() {
        let script = Script::new("Hook", "Body");
        let published = script.patched(&ScriptPatch::default().status(ScriptStatus::Published));
        assert_eq!(published.status, ScriptStatus::Published);
        assert_eq!(published.content, "Body");
    }
}

//! Entity kinds managed by the content workspace: generated ideas and the
//! scripts written from them.

mod idea;
mod platform;
mod script;

pub use idea::{Idea, IdeaPatch, IdeaStatus, Review, Verdict};
pub use platform::Platform;
pub use script::{Script, ScriptPatch, ScriptStatus};

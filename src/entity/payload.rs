use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

/// Strongly-typed body of a record, one implementation per entity kind.
///
/// Usually derived with `#[derive(Payload)]`, which also generates the
/// matching `<Name>Patch` type:
///
/// ```ignore
/// use serde::{Deserialize, Serialize};
/// use synced_rust::Payload;
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Payload)]
/// #[payload(table = "notes", label = "Note")]
/// pub struct Note {
///     pub title: String,
///     pub pinned: bool,
/// }
///
/// let patch = NotePatch::default().title("Renamed");
/// ```
pub trait Payload:
    Debug + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Backend table holding rows of this kind. Also the change-feed channel.
    const TABLE: &'static str;

    /// Human-readable singular name used in notifications ("Idea").
    const LABEL: &'static str;

    /// Partial update applied with a shallow merge.
    type Patch: Patch<Self>;

    /// Return a copy with `patch` merged in.
    fn patched(&self, patch: &Self::Patch) -> Self {
        let mut next = self.clone();
        patch.apply_to(&mut next);
        next
    }
}

/// A set of optional field changes for a payload type.
pub trait Patch<P>:
    Debug + Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Overwrite every field set in the patch; leave the rest untouched.
    fn apply_to(&self, target: &mut P);

    /// True when no field is set.
    fn is_empty(&self) -> bool;
}

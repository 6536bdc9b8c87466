mod payload;

use proc_macro::TokenStream;

/// Derive macro implementing `synced_rust::Payload` and generating a patch type.
///
/// # Usage
///
/// ```ignore
/// use serde::{Deserialize, Serialize};
/// use synced_rust::Payload;
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Payload)]
/// #[payload(table = "ideas", label = "Idea")]
/// pub struct Idea {
///     pub title: String,
///     pub tags: Vec<String>,
/// }
///
/// // Generated:
/// // pub struct IdeaPatch { pub title: Option<String>, pub tags: Option<Vec<String>> }
/// let patch = IdeaPatch::default().title("Tip #1 revised");
/// ```
///
/// - `#[payload(table = "...")]` sets the backend table / change-feed channel.
///   If omitted, defaults to snake_case struct name + "s".
/// - `#[payload(label = "...")]` sets the name used in notifications.
///   If omitted, defaults to the struct name.
///
/// Every field type must be `Clone + Debug + PartialEq` and serde-serializable.
/// The generated patch has one builder setter per field.
#[proc_macro_derive(Payload, attributes(payload))]
pub fn derive_payload(input: TokenStream) -> TokenStream {
    payload::derive_payload(input)
}

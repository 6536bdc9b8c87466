use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix carried by client-generated identifiers.
pub const TEMP_PREFIX: &str = "temp_";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

string_id!(
    /// Identifier of a stored record. Either canonical (assigned by the
    /// backend) or temporary (assigned client-side before persistence).
    RecordId
);

string_id!(
    /// Identifier of the authenticated user owning a record.
    UserId
);

string_id!(
    /// Grouping key partitioning a user's records by brand.
    BrandId
);

impl RecordId {
    /// Generate a fresh temporary identifier (`temp_<uuid>`).
    pub fn temporary() -> Self {
        Self(format!("{}{}", TEMP_PREFIX, Uuid::new_v4().simple()))
    }

    /// Generate a fresh canonical identifier, as a backend would.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// True for identifiers created by [`RecordId::temporary`].
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn temporary_ids_are_unique_and_prefixed() {
        let a = RecordId::temporary();
        let b = RecordId::temporary();
        assert_ne!(a, b);
        assert!(a.is_temporary());
        assert!(a.as_str().starts_with("temp_"));
        assert!(!RecordId::generate().is_temporary());
    }

    #[test]
    fn lookup_by_str() {
        let mut set = HashSet::new();
        set.insert(RecordId::new("abc123"));
        assert!(set.contains("abc123"));
        assert_eq!(RecordId::new("abc123"), "abc123");
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&UserId::new("user-1")).unwrap();
        assert_eq!(json, r#""user-1""#);
        let brand: BrandId = serde_json::from_str(r#""brand-9""#).unwrap();
        assert_eq!(brand.as_str(), "brand-9");
    }
}

//! Entity identifiers.

use crate::error::{ModelError, ModelResult};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Parses either the hex (legacy) or the hyphenated form.
            pub fn parse(value: &str) -> ModelResult<Self> {
                Uuid::parse_str(value.trim())
                    .map(Self)
                    .map_err(|_| ModelError::InvalidId {
                        value: value.to_string(),
                    })
            }

            /// Returns the legacy document id (hex, no hyphens).
            #[must_use]
            pub fn to_legacy(&self) -> String {
                self.0.simple().to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0.simple())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.simple())
            }
        }

        impl FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_legacy()
            }
        }

        impl TryFrom<String> for $name {
            type Error = ModelError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }
    };
}

uuid_id! {
    /// Identifier of a lookup table.
    TableId
}

uuid_id! {
    /// Identifier of a lookup table row.
    ///
    /// Row ids are the stable identity mobile clients hold; they survive
    /// in-place updates and are only replaced by delete-and-recreate.
    RowId
}

uuid_id! {
    /// Identifier of a row ownership grant.
    OwnerId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_unique() {
        assert_ne!(RowId::new(), RowId::new());
    }

    #[test]
    fn parses_hex_and_hyphenated_forms() {
        let hex = "0fb6c422115145c0a651bb9a34ca09c4";
        let hyphenated = "0fb6c422-1151-45c0-a651-bb9a34ca09c4";
        assert_eq!(TableId::parse(hex).unwrap(), TableId::parse(hyphenated).unwrap());
    }

    #[test]
    fn display_is_legacy_hex() {
        let id = TableId::parse("0fb6c422-1151-45c0-a651-bb9a34ca09c4").unwrap();
        assert_eq!(id.to_string(), "0fb6c422115145c0a651bb9a34ca09c4");
        assert_eq!(id.to_legacy(), id.to_string());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            RowId::parse("not-an-id"),
            Err(ModelError::InvalidId { .. })
        ));
    }

    #[test]
    fn serde_uses_hex_string() {
        let id = OwnerId::parse("cddc3a035aab444a8ead069c942d7472").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cddc3a035aab444a8ead069c942d7472\"");
        let back: OwnerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn ordering_follows_uuid_bytes() {
        let low = RowId::parse("00000000000000000000000000000001").unwrap();
        let high = RowId::parse("00000000000000000000000000000002").unwrap();
        assert!(low < high);
    }
}

//! Row ownership grants.

use crate::error::ModelError;
use crate::id::{OwnerId, RowId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of principal a row can be granted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    /// A mobile user.
    User,
    /// A user group.
    Group,
    /// A location in the organization hierarchy.
    Location,
}

impl OwnerType {
    /// All owner types in column order.
    pub const ALL: [OwnerType; 3] = [OwnerType::User, OwnerType::Group, OwnerType::Location];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Location => "location",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            "location" => Ok(Self::Location),
            other => Err(ModelError::UnknownOwnerType(other.to_string())),
        }
    }
}

/// Grants visibility of a row to one principal.
///
/// Unique per `(row_id, owner_type, owner_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowOwner {
    /// Grant id.
    pub id: OwnerId,
    /// Owning domain.
    pub domain: String,
    /// The row made visible.
    pub row_id: RowId,
    /// Principal kind.
    pub owner_type: OwnerType,
    /// Principal id.
    pub owner_id: String,
}

impl RowOwner {
    /// Creates a grant with a fresh id.
    pub fn new(
        domain: impl Into<String>,
        row_id: RowId,
        owner_type: OwnerType,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            id: OwnerId::new(),
            domain: domain.into(),
            row_id,
            owner_type,
            owner_id: owner_id.into(),
        }
    }

    /// Returns the uniqueness key of this grant.
    #[must_use]
    pub fn natural_key(&self) -> (RowId, OwnerType, &str) {
        (self.row_id, self.owner_type, self.owner_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_type_round_trips_through_str() {
        for kind in OwnerType::ALL {
            assert_eq!(kind.as_str().parse::<OwnerType>().unwrap(), kind);
        }
        assert!(matches!(
            "team".parse::<OwnerType>(),
            Err(ModelError::UnknownOwnerType(_))
        ));
    }

    #[test]
    fn owner_type_wire_name_is_lowercase() {
        assert_eq!(serde_json::to_string(&OwnerType::Location).unwrap(), "\"location\"");
    }

    #[test]
    fn natural_key_ignores_grant_id() {
        let row = RowId::new();
        let a = RowOwner::new("d", row, OwnerType::User, "u1");
        let b = RowOwner::new("d", row, OwnerType::User, "u1");
        assert_ne!(a.id, b.id);
        assert_eq!(a.natural_key(), b.natural_key());
    }
}

//! Resolution of human-entered principal names to stable ids.
//!
//! Names are matched case-insensitively for users and locations and
//! case-sensitively for groups, since two groups in a domain may differ
//! only by case. Locations also match by site code.

use crate::error::{CoreError, CoreResult};
use lookup_model::{OwnerType, RowId, RowOwner};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// A user, group or location as listed by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Alternative names (site codes for locations).
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Principal {
    /// Creates a principal without aliases.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            aliases: Vec::new(),
        }
    }

    /// Adds an alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// Source of principals; owned by the surrounding application.
pub trait PrincipalDirectory: Send + Sync {
    /// Lists the principals of one kind in a domain.
    fn principals(&self, domain: &str, kind: OwnerType) -> Vec<Principal>;

    /// Returns the display name of a principal.
    fn display_name(&self, domain: &str, kind: OwnerType, id: &str) -> Option<String> {
        self.principals(domain, kind)
            .into_iter()
            .find(|p| p.id == id)
            .map(|p| p.name)
    }
}

/// A directory held in memory.
///
/// The JSON form is `{"<domain>": {"user": [..], "group": [..], "location": [..]}}`.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    principals: RwLock<HashMap<(String, OwnerType), Vec<Principal>>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the text is not in the
    /// expected shape.
    pub fn from_json(text: &str) -> CoreResult<Self> {
        let parsed: BTreeMap<String, BTreeMap<OwnerType, Vec<Principal>>> = serde_json::from_str(text)
            .map_err(|e| CoreError::invalid_operation(format!("invalid principal directory: {e}")))?;
        let directory = Self::new();
        for (domain, kinds) in parsed {
            for (kind, principals) in kinds {
                for principal in principals {
                    directory.add(&domain, kind, principal);
                }
            }
        }
        Ok(directory)
    }

    /// Adds a principal.
    pub fn add(&self, domain: &str, kind: OwnerType, principal: Principal) {
        self.principals
            .write()
            .entry((domain.to_string(), kind))
            .or_default()
            .push(principal);
    }
}

impl PrincipalDirectory for InMemoryDirectory {
    fn principals(&self, domain: &str, kind: OwnerType) -> Vec<Principal> {
        self.principals
            .read()
            .get(&(domain.to_string(), kind))
            .cloned()
            .unwrap_or_default()
    }
}

/// Outcome of resolving one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one principal matched.
    Resolved(String),
    /// No principal matched.
    NotFound,
    /// Several principals matched.
    Ambiguous(usize),
}

/// A non-fatal problem resolving an owner name. The row is still persisted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OwnershipWarning {
    /// No principal has this name.
    #[error("Unknown {kind}: '{name}'. But the row is successfully added")]
    NotFound {
        /// Principal kind.
        kind: OwnerType,
        /// Name as entered.
        name: String,
    },
    /// Several principals have this name.
    #[error("Multiple {kind}s found with the name: '{name}'.{} But the row is successfully added", site_code_hint(.kind))]
    Ambiguous {
        /// Principal kind.
        kind: OwnerType,
        /// Name as entered.
        name: String,
    },
}

fn site_code_hint(kind: &OwnerType) -> &'static str {
    match kind {
        OwnerType::Location => " Try using site code.",
        OwnerType::User | OwnerType::Group => "",
    }
}

/// Owner names for one row, per kind.
///
/// `None` means the snapshot has no column for that kind; existing owners of
/// that kind are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerSpec {
    /// User names.
    pub users: Option<Vec<String>>,
    /// Group names.
    pub groups: Option<Vec<String>>,
    /// Location names or site codes.
    pub locations: Option<Vec<String>>,
}

impl OwnerSpec {
    /// Returns the names for one kind.
    #[must_use]
    pub fn names(&self, kind: OwnerType) -> Option<&[String]> {
        match kind {
            OwnerType::User => self.users.as_deref(),
            OwnerType::Group => self.groups.as_deref(),
            OwnerType::Location => self.locations.as_deref(),
        }
    }

    /// Sets the names for one kind.
    pub fn set(&mut self, kind: OwnerType, names: Vec<String>) {
        match kind {
            OwnerType::User => self.users = Some(names),
            OwnerType::Group => self.groups = Some(names),
            OwnerType::Location => self.locations = Some(names),
        }
    }
}

/// Resolved owner ids for one row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedOwners {
    /// Principal ids per kind named in the owner entry, in entry order.
    pub ids: BTreeMap<OwnerType, Vec<String>>,
    /// Names that could not be resolved.
    pub warnings: Vec<OwnershipWarning>,
}

/// Owner writes needed to bring one row to its resolved owners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerChanges {
    /// Grants to delete.
    pub remove: Vec<RowOwner>,
    /// Grants to create.
    pub add: Vec<RowOwner>,
}

impl OwnerChanges {
    /// Returns true if nothing changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }

    /// Appends the changes of another row.
    pub fn extend(&mut self, other: OwnerChanges) {
        self.remove.extend(other.remove);
        self.add.extend(other.add);
    }
}

fn normalize(kind: OwnerType, name: &str) -> String {
    match kind {
        OwnerType::Group => name.to_string(),
        OwnerType::User | OwnerType::Location => name.to_lowercase(),
    }
}

/// Memoized name resolution for one bulk operation in one domain.
pub struct OwnershipIndex<'a> {
    directory: &'a dyn PrincipalDirectory,
    domain: String,
    names: HashMap<OwnerType, HashMap<String, Vec<String>>>,
    memo: HashMap<(OwnerType, String), Resolution>,
}

impl std::fmt::Debug for OwnershipIndex<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnershipIndex")
            .field("domain", &self.domain)
            .field("memoized", &self.memo.len())
            .finish_non_exhaustive()
    }
}

impl<'a> OwnershipIndex<'a> {
    /// Creates an index over a directory for one domain.
    pub fn new(directory: &'a dyn PrincipalDirectory, domain: impl Into<String>) -> Self {
        Self {
            directory,
            domain: domain.into(),
            names: HashMap::new(),
            memo: HashMap::new(),
        }
    }

    fn names_for(&mut self, kind: OwnerType) -> &HashMap<String, Vec<String>> {
        let directory = self.directory;
        let domain = &self.domain;
        self.names.entry(kind).or_insert_with(|| {
            let mut index: HashMap<String, Vec<String>> = HashMap::new();
            for principal in directory.principals(domain, kind) {
                let keys = std::iter::once(&principal.name).chain(principal.aliases.iter());
                for key in keys {
                    let ids = index.entry(normalize(kind, key)).or_default();
                    if !ids.contains(&principal.id) {
                        ids.push(principal.id.clone());
                    }
                }
            }
            index
        })
    }

    /// Resolves a display name.
    pub fn resolve(&mut self, kind: OwnerType, name: &str) -> Resolution {
        let key = normalize(kind, name.trim());
        if let Some(hit) = self.memo.get(&(kind, key.clone())) {
            return hit.clone();
        }
        let resolution = match self.names_for(kind).get(&key).map(Vec::as_slice) {
            None | Some([]) => Resolution::NotFound,
            Some([id]) => Resolution::Resolved(id.clone()),
            Some(ids) => Resolution::Ambiguous(ids.len()),
        };
        self.memo.insert((kind, key), resolution.clone());
        resolution
    }

    /// Resolves every name of a row's owner spec.
    ///
    /// Blank names are skipped; duplicate ids are kept once.
    pub fn resolve_spec(&mut self, spec: &OwnerSpec) -> ResolvedOwners {
        let mut resolved = ResolvedOwners::default();
        for kind in OwnerType::ALL {
            let Some(names) = spec.names(kind) else {
                continue;
            };
            let mut ids: Vec<String> = Vec::new();
            for name in names.iter().filter(|n| !n.trim().is_empty()) {
                match self.resolve(kind, name) {
                    Resolution::Resolved(id) => {
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                    Resolution::NotFound => resolved.warnings.push(OwnershipWarning::NotFound {
                        kind,
                        name: name.clone(),
                    }),
                    Resolution::Ambiguous(_) => resolved.warnings.push(OwnershipWarning::Ambiguous {
                        kind,
                        name: name.clone(),
                    }),
                }
            }
            resolved.ids.insert(kind, ids);
        }
        resolved
    }

    /// Returns the display name of a principal, falling back to its id.
    #[must_use]
    pub fn display_name(&self, kind: OwnerType, id: &str) -> String {
        self.directory
            .display_name(&self.domain, kind, id)
            .unwrap_or_else(|| id.to_string())
    }
}

/// Computes the owner writes for one row.
///
/// For every kind present in `resolved`, the row ends up with exactly the
/// resolved ids in order: current owners of that kind are removed and the
/// resolved ones added, unless they already match. Kinds absent from
/// `resolved` are left untouched.
#[must_use]
pub fn owner_changes(
    domain: &str,
    row_id: RowId,
    current: &[RowOwner],
    resolved: &ResolvedOwners,
) -> OwnerChanges {
    let mut changes = OwnerChanges::default();
    for (kind, ids) in &resolved.ids {
        let existing: Vec<&RowOwner> = current.iter().filter(|o| o.owner_type == *kind).collect();
        let unchanged = existing.len() == ids.len()
            && existing.iter().zip(ids).all(|(o, id)| &o.owner_id == id);
        if unchanged {
            continue;
        }
        changes.remove.extend(existing.into_iter().cloned());
        changes
            .add
            .extend(ids.iter().map(|id| RowOwner::new(domain, row_id, *kind, id.clone())));
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> InMemoryDirectory {
        let dir = InMemoryDirectory::new();
        dir.add("d", OwnerType::User, Principal::new("u1", "Alice"));
        dir.add("d", OwnerType::Group, Principal::new("g1", "Nurses"));
        dir.add("d", OwnerType::Group, Principal::new("g2", "nurses"));
        dir.add("d", OwnerType::Location, Principal::new("l1", "Boston").with_alias("bos"));
        dir.add("d", OwnerType::Location, Principal::new("l2", "Springfield").with_alias("spr-ma"));
        dir.add("d", OwnerType::Location, Principal::new("l3", "Springfield").with_alias("spr-il"));
        dir
    }

    #[test]
    fn users_and_locations_are_case_insensitive() {
        let dir = directory();
        let mut index = OwnershipIndex::new(&dir, "d");
        assert_eq!(index.resolve(OwnerType::User, "ALICE"), Resolution::Resolved("u1".into()));
        assert_eq!(index.resolve(OwnerType::Location, "boston"), Resolution::Resolved("l1".into()));
        assert_eq!(index.resolve(OwnerType::Location, "BOS"), Resolution::Resolved("l1".into()));
    }

    #[test]
    fn groups_are_case_sensitive() {
        let dir = directory();
        let mut index = OwnershipIndex::new(&dir, "d");
        assert_eq!(index.resolve(OwnerType::Group, "Nurses"), Resolution::Resolved("g1".into()));
        assert_eq!(index.resolve(OwnerType::Group, "nurses"), Resolution::Resolved("g2".into()));
        assert_eq!(index.resolve(OwnerType::Group, "NURSES"), Resolution::NotFound);
    }

    #[test]
    fn duplicate_location_names_are_ambiguous() {
        let dir = directory();
        let mut index = OwnershipIndex::new(&dir, "d");
        assert_eq!(index.resolve(OwnerType::Location, "springfield"), Resolution::Ambiguous(2));
        assert_eq!(index.resolve(OwnerType::Location, "spr-il"), Resolution::Resolved("l3".into()));
    }

    #[test]
    fn other_domains_are_invisible() {
        let dir = directory();
        let mut index = OwnershipIndex::new(&dir, "other");
        assert_eq!(index.resolve(OwnerType::User, "Alice"), Resolution::NotFound);
    }

    #[test]
    fn unresolved_names_yield_one_warning_each() {
        let dir = directory();
        let mut index = OwnershipIndex::new(&dir, "d");
        let spec = OwnerSpec {
            users: Some(vec!["alice".into(), "bob".into(), "".into()]),
            groups: None,
            locations: Some(vec!["Springfield".into()]),
        };
        let resolved = index.resolve_spec(&spec);
        assert_eq!(resolved.ids[&OwnerType::User], vec!["u1"]);
        assert_eq!(resolved.ids[&OwnerType::Location], Vec::<String>::new());
        assert!(!resolved.ids.contains_key(&OwnerType::Group));
        assert_eq!(
            resolved.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec![
                "Unknown user: 'bob'. But the row is successfully added".to_string(),
                "Multiple locations found with the name: 'Springfield'. Try using site code. But the row is successfully added".to_string(),
            ]
        );
    }

    #[test]
    fn replacing_owners_touches_only_present_kinds() {
        let row = RowId::new();
        let current = vec![
            RowOwner::new("d", row, OwnerType::User, "u1"),
            RowOwner::new("d", row, OwnerType::Group, "g1"),
        ];
        let mut resolved = ResolvedOwners::default();
        resolved.ids.insert(OwnerType::User, vec!["u2".into()]);
        let changes = owner_changes("d", row, &current, &resolved);
        assert_eq!(changes.remove, vec![current[0].clone()]);
        assert_eq!(changes.add.len(), 1);
        assert_eq!(changes.add[0].owner_id, "u2");
        assert_eq!(changes.add[0].owner_type, OwnerType::User);
    }

    #[test]
    fn matching_owners_produce_no_changes() {
        let row = RowId::new();
        let current = vec![RowOwner::new("d", row, OwnerType::User, "u1")];
        let mut resolved = ResolvedOwners::default();
        resolved.ids.insert(OwnerType::User, vec!["u1".into()]);
        assert!(owner_changes("d", row, &current, &resolved).is_empty());
    }

    #[test]
    fn directory_from_json() {
        let dir = InMemoryDirectory::from_json(
            r#"{"d": {"user": [{"id": "u1", "name": "Alice"}], "location": [{"id": "l1", "name": "Boston", "aliases": ["bos"]}]}}"#,
        )
        .unwrap();
        assert_eq!(dir.principals("d", OwnerType::User).len(), 1);
        assert_eq!(dir.display_name("d", OwnerType::Location, "l1"), Some("Boston".into()));
        assert!(InMemoryDirectory::from_json("[]").is_err());
    }
}

//! Old-vs-new mutation engine.
//!
//! Given the persisted entities of a scope and a desired-state snapshot,
//! [`Reconciler`] computes the creates and deletes that turn one into the
//! other while keeping unchanged entities (and their ids) in place.
//!
//! ## Algorithm
//!
//! 1. Index `old` by content key (a queue per key, input order) and by id.
//! 2. For each desired item, in order:
//!    - a delete marker deletes the entity its id names, if still unclaimed;
//!    - an upsert whose content key matches an unclaimed entity claims the
//!      earliest one and hands both to the merge callback. Nothing is
//!      emitted; the entity is updated in place;
//!    - otherwise, an identity hint naming an unclaimed entity schedules
//!      that entity for deletion, and the item is created (delete and
//!      recreate, never an in-place rename);
//!    - otherwise the item is created.
//! 3. With `delete_missing`, unclaimed entities are deleted in input order.
//!
//! Duplicate content keys are first-match-wins: the first desired item
//! claims the earliest persisted entity with that key, a later duplicate the
//! next one, and a duplicate with nothing left to claim is created.

use lookup_model::{Row, RowContent, RowId};
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::hash::Hash;

/// Entities compared by content.
pub trait Keyed {
    /// Content key; must exclude the generated id.
    type Key: Eq + Hash;

    /// Returns the content key.
    fn content_key(&self) -> Self::Key;
}

/// Persisted entities with a stable identity.
pub trait Identified {
    /// Identity type.
    type Id: Eq + Hash + Clone;

    /// Returns the identity.
    fn identity(&self) -> Self::Id;
}

/// Desired entities that may name a persisted entity out of band.
pub trait IdentityHint {
    /// Identity type of the persisted side.
    type Id;

    /// Returns the identity this item replaces, if the caller supplied one.
    fn identity_hint(&self) -> Option<Self::Id>;
}

/// One item of a desired-state snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desired<N, I> {
    /// Create or keep this entity.
    Upsert(N),
    /// Delete the persisted entity with this identity.
    Delete(I),
}

/// Result of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation<O, N> {
    /// Desired items with no persisted counterpart.
    pub to_create: Vec<N>,
    /// Persisted entities to remove. Never contains an entity twice.
    pub to_delete: Vec<O>,
    /// Number of items matched and handed to the merge callback.
    pub merged: usize,
}

impl<O, N> Default for Mutation<O, N> {
    fn default() -> Self {
        Self {
            to_create: Vec::new(),
            to_delete: Vec::new(),
            merged: 0,
        }
    }
}

impl<O, N> Mutation<O, N> {
    /// Returns true if nothing needs to be created or deleted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

/// Computes mutations between persisted and desired state.
///
/// # Example
///
/// ```rust
/// use lookup_core::{Desired, Identified, IdentityHint, Keyed, Reconciler};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Item { id: u32, name: &'static str }
/// impl Keyed for Item {
///     type Key = &'static str;
///     fn content_key(&self) -> &'static str { self.name }
/// }
/// impl Identified for Item {
///     type Id = u32;
///     fn identity(&self) -> u32 { self.id }
/// }
/// impl IdentityHint for Item {
///     type Id = u32;
///     fn identity_hint(&self) -> Option<u32> { None }
/// }
///
/// let old = vec![Item { id: 1, name: "Ohio" }];
/// let new = vec![
///     Desired::Upsert(Item { id: 0, name: "Ohio" }),
///     Desired::Upsert(Item { id: 0, name: "Texas" }),
/// ];
/// let mutation = Reconciler::new(old).run(new, |_, _| {});
/// assert_eq!(mutation.to_create.len(), 1);
/// assert!(mutation.to_delete.is_empty());
/// assert_eq!(mutation.merged, 1);
/// ```
#[derive(Debug)]
pub struct Reconciler<O> {
    old: Vec<O>,
    delete_missing: bool,
}

impl<O> Reconciler<O>
where
    O: Keyed + Identified,
{
    /// Creates a reconciler over the persisted entities of one scope.
    #[must_use]
    pub fn new(old: Vec<O>) -> Self {
        Self {
            old,
            delete_missing: false,
        }
    }

    /// Deletes persisted entities the snapshot does not mention.
    #[must_use]
    pub fn delete_missing(mut self, value: bool) -> Self {
        self.delete_missing = value;
        self
    }

    /// Runs the reconciliation with an infallible merge callback.
    pub fn run<N, I, F>(self, new: I, mut merge: F) -> Mutation<O, N>
    where
        N: Keyed<Key = O::Key> + IdentityHint<Id = O::Id>,
        I: IntoIterator<Item = Desired<N, O::Id>>,
        F: FnMut(O, N),
    {
        match self.try_run(new, |old, new| {
            merge(old, new);
            Ok::<(), Infallible>(())
        }) {
            Ok(mutation) => mutation,
            Err(never) => match never {},
        }
    }

    /// Runs the reconciliation, stopping at the first merge error.
    ///
    /// `new` is consumed in a single pass.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `merge`.
    pub fn try_run<N, I, F, E>(self, new: I, mut merge: F) -> Result<Mutation<O, N>, E>
    where
        N: Keyed<Key = O::Key> + IdentityHint<Id = O::Id>,
        I: IntoIterator<Item = Desired<N, O::Id>>,
        F: FnMut(O, N) -> Result<(), E>,
    {
        let mut by_key: HashMap<O::Key, VecDeque<usize>> = HashMap::new();
        let mut by_id: HashMap<O::Id, usize> = HashMap::new();
        for (idx, entity) in self.old.iter().enumerate() {
            by_key.entry(entity.content_key()).or_default().push_back(idx);
            by_id.entry(entity.identity()).or_insert(idx);
        }
        let mut slots: Vec<Option<O>> = self.old.into_iter().map(Some).collect();
        let mut mutation = Mutation::default();

        for item in new {
            match item {
                Desired::Delete(id) => {
                    if let Some(entity) = by_id.get(&id).and_then(|&idx| slots[idx].take()) {
                        mutation.to_delete.push(entity);
                    }
                }
                Desired::Upsert(desired) => {
                    let claimed = by_key.get_mut(&desired.content_key()).and_then(|queue| {
                        while let Some(idx) = queue.pop_front() {
                            if let Some(entity) = slots[idx].take() {
                                return Some(entity);
                            }
                        }
                        None
                    });
                    if let Some(entity) = claimed {
                        merge(entity, desired)?;
                        mutation.merged += 1;
                        continue;
                    }
                    let replaced = desired
                        .identity_hint()
                        .and_then(|hint| by_id.get(&hint).copied())
                        .and_then(|idx| slots[idx].take());
                    if let Some(entity) = replaced {
                        mutation.to_delete.push(entity);
                    }
                    mutation.to_create.push(desired);
                }
            }
        }

        if self.delete_missing {
            mutation.to_delete.extend(slots.into_iter().flatten());
        }
        Ok(mutation)
    }
}

impl Keyed for Row {
    type Key = RowContent;

    fn content_key(&self) -> RowContent {
        Row::content_key(self)
    }
}

impl Identified for Row {
    type Id = RowId;

    fn identity(&self) -> RowId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Old {
        id: u32,
        name: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct New {
        name: String,
        hint: Option<u32>,
    }

    impl Keyed for Old {
        type Key = String;
        fn content_key(&self) -> String {
            self.name.clone()
        }
    }

    impl Identified for Old {
        type Id = u32;
        fn identity(&self) -> u32 {
            self.id
        }
    }

    impl Keyed for New {
        type Key = String;
        fn content_key(&self) -> String {
            self.name.clone()
        }
    }

    impl IdentityHint for New {
        type Id = u32;
        fn identity_hint(&self) -> Option<u32> {
            self.hint
        }
    }

    fn old(id: u32, name: &str) -> Old {
        Old {
            id,
            name: name.into(),
        }
    }

    fn new(name: &str) -> Desired<New, u32> {
        Desired::Upsert(New {
            name: name.into(),
            hint: None,
        })
    }

    fn hinted(name: &str, hint: u32) -> Desired<New, u32> {
        Desired::Upsert(New {
            name: name.into(),
            hint: Some(hint),
        })
    }

    fn names(items: &[New]) -> Vec<&str> {
        items.iter().map(|n| n.name.as_str()).collect()
    }

    fn ids(items: &[Old]) -> Vec<u32> {
        items.iter().map(|o| o.id).collect()
    }

    #[test]
    fn unchanged_row_merges_and_new_row_is_created() {
        let mut merged = Vec::new();
        let mutation = Reconciler::new(vec![old(1, "Ohio")])
            .run(vec![new("Ohio"), new("Texas")], |o, n| merged.push((o.id, n.name)));
        assert_eq!(names(&mutation.to_create), vec!["Texas"]);
        assert!(mutation.to_delete.is_empty());
        assert_eq!(merged, vec![(1, "Ohio".to_string())]);
    }

    #[test]
    fn empty_old_creates_everything() {
        let mutation = Reconciler::<Old>::new(vec![]).run(vec![new("A"), new("B"), new("C")], |_, _| {});
        assert_eq!(names(&mutation.to_create), vec!["A", "B", "C"]);
        assert!(mutation.to_delete.is_empty());
    }

    #[test]
    fn destructive_replace_deletes_missing() {
        let mutation = Reconciler::new(vec![old(1, "A"), old(2, "B")])
            .delete_missing(true)
            .run(vec![new("A")], |_, _| {});
        assert!(mutation.to_create.is_empty());
        assert_eq!(ids(&mutation.to_delete), vec![2]);
    }

    #[test]
    fn without_delete_missing_unmatched_are_kept() {
        let mutation = Reconciler::new(vec![old(1, "A"), old(2, "B")]).run(vec![new("A")], |_, _| {});
        assert!(mutation.is_empty());
    }

    #[test]
    fn delete_marker_removes_named_entity() {
        let mutation = Reconciler::new(vec![old(1, "A"), old(2, "B")])
            .run(vec![Desired::Delete(2), Desired::Delete(99)], |_, _: New| {});
        assert_eq!(ids(&mutation.to_delete), vec![2]);
        assert!(mutation.to_create.is_empty());
    }

    #[test]
    fn identity_hint_deletes_and_recreates() {
        let mutation = Reconciler::new(vec![old(1, "Ohio")]).run(vec![hinted("Ohio!", 1)], |_, _| {});
        assert_eq!(ids(&mutation.to_delete), vec![1]);
        assert_eq!(names(&mutation.to_create), vec!["Ohio!"]);
    }

    #[test]
    fn content_match_wins_over_hint() {
        let mutation = Reconciler::new(vec![old(1, "A"), old(2, "B")])
            .run(vec![hinted("A", 2)], |_, _| {});
        assert!(mutation.is_empty());
        assert_eq!(mutation.merged, 1);
    }

    #[test]
    fn hint_to_claimed_entity_resolves_to_nothing() {
        let mutation = Reconciler::new(vec![old(1, "A")])
            .run(vec![new("A"), hinted("Z", 1), Desired::Delete(1)], |_, _| {});
        assert!(mutation.to_delete.is_empty());
        assert_eq!(names(&mutation.to_create), vec!["Z"]);
    }

    #[test]
    fn duplicate_new_keys_are_first_match_wins() {
        let mut merged = Vec::new();
        let mutation = Reconciler::new(vec![old(1, "A")])
            .run(vec![new("A"), new("A")], |o, _| merged.push(o.id));
        assert_eq!(merged, vec![1]);
        assert_eq!(names(&mutation.to_create), vec!["A"]);
    }

    #[test]
    fn duplicate_old_keys_are_claimed_in_order() {
        let mut merged = Vec::new();
        let mutation = Reconciler::new(vec![old(1, "A"), old(2, "A"), old(3, "A")])
            .delete_missing(true)
            .run(vec![new("A"), new("A")], |o, _| merged.push(o.id));
        assert_eq!(merged, vec![1, 2]);
        assert_eq!(ids(&mutation.to_delete), vec![3]);
    }

    #[test]
    fn deleted_entity_is_not_matched_by_content() {
        let mutation = Reconciler::new(vec![old(1, "A")])
            .delete_missing(true)
            .run(vec![Desired::Delete(1), new("A")], |_, _| {});
        assert_eq!(ids(&mutation.to_delete), vec![1]);
        assert_eq!(names(&mutation.to_create), vec!["A"]);
    }

    #[test]
    fn merge_error_stops_the_run() {
        let result = Reconciler::new(vec![old(1, "A")])
            .try_run(vec![new("A")], |_, _: New| Err("boom"));
        assert_eq!(result, Err("boom"));
    }

    #[test]
    fn new_is_consumed_lazily_once() {
        let mut produced = 0;
        let lazy = (0..3).map(|i| {
            produced += 1;
            new(&format!("n{i}"))
        });
        let mutation = Reconciler::<Old>::new(vec![]).run(lazy, |_, _| {});
        assert_eq!(mutation.to_create.len(), 3);
        assert_eq!(produced, 3);
    }

    proptest! {
        #[test]
        fn identical_snapshot_is_empty_mutation(
            names in proptest::collection::vec("[a-d]{1,2}", 0..30),
            delete_missing in any::<bool>(),
        ) {
            let olds: Vec<Old> = names.iter().enumerate().map(|(i, n)| old(i as u32, n)).collect();
            let news: Vec<_> = names.iter().map(|n| new(n)).collect();
            let mut merged = 0;
            let mutation = Reconciler::new(olds)
                .delete_missing(delete_missing)
                .run(news, |_, _| merged += 1);
            prop_assert!(mutation.is_empty());
            prop_assert_eq!(merged, names.len());
        }

        #[test]
        fn counts_are_conserved(
            old_names in proptest::collection::vec("[a-c]", 0..20),
            new_names in proptest::collection::vec("[a-c]", 0..20),
        ) {
            let olds: Vec<Old> = old_names.iter().enumerate().map(|(i, n)| old(i as u32, n)).collect();
            let news: Vec<_> = new_names.iter().map(|n| new(n)).collect();
            let mutation = Reconciler::new(olds).delete_missing(true).run(news, |_, _| {});
            prop_assert_eq!(mutation.merged + mutation.to_create.len(), new_names.len());
            prop_assert_eq!(mutation.merged + mutation.to_delete.len(), old_names.len());

            let mut deleted = ids(&mutation.to_delete);
            deleted.sort_unstable();
            deleted.dedup();
            prop_assert_eq!(deleted.len(), mutation.to_delete.len());
        }
    }
}

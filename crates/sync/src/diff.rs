//! Three-way diff between a remote list and a local cache.

use crate::{Reconcilable, ScopeKey};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::hash::Hash;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Insert(usize),
    Update(usize),
}

/// Insert/update/delete sets computed by [`reconcile`].
///
/// The three sets are meant to be committed together as one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Diff<E> {
    /// Remote entities absent from the cache.
    pub to_insert: Vec<E>,
    /// Merged records for entities present on both sides.
    pub to_update: Vec<E>,
    /// Cached entities the remote no longer reports.
    pub to_delete: Vec<E>,
    /// Remote order of inserted and updated records.
    order: Vec<Slot>,
    /// How many updates differ from the cached record.
    changed_updates: usize,
}

impl<E> Default for Diff<E> {
    fn default() -> Self {
        Self {
            to_insert: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
            order: Vec::new(),
            changed_updates: 0,
        }
    }
}

impl<E> Diff<E> {
    /// Whether all three sets are empty.
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Whether committing would leave the cache unchanged.
    ///
    /// True when nothing is inserted or deleted and every update equals the
    /// cached record. Reconciling a list against itself is always a no-op.
    pub fn is_noop(&self) -> bool {
        self.to_insert.is_empty() && self.to_delete.is_empty() && self.changed_updates == 0
    }

    /// Number of updates that actually change a cached record.
    pub fn changed_updates(&self) -> usize {
        self.changed_updates
    }
}

impl<E: Clone> Diff<E> {
    /// The post-commit view: inserted and updated records in remote order.
    pub fn view(&self) -> Vec<E> {
        self.order
            .iter()
            .filter_map(|slot| match slot {
                Slot::Insert(i) => self.to_insert.get(*i),
                Slot::Update(i) => self.to_update.get(*i),
            })
            .cloned()
            .collect()
    }
}

/// Compute the diff between `remote` and `local`.
///
/// - remote entities whose key is cached are merged with `merge(local, remote)`
///   and land in `to_update`
/// - remote entities whose key is not cached land in `to_insert`
/// - cached entities left unmatched land in `to_delete`
///
/// `local` must already be restricted to the scope of the remote query so
/// that entities outside the scope are never deleted. A key repeated in
/// `remote` is matched once and later duplicates are dropped.
pub fn reconcile<E, K, F, M>(remote: Vec<E>, local: Vec<E>, key_of: F, merge: M) -> Diff<E>
where
    E: PartialEq,
    K: Eq + Hash,
    F: Fn(&E) -> K,
    M: Fn(&E, E) -> E,
{
    let mut local_by_id: IndexMap<K, E> = local.into_iter().map(|e| (key_of(&e), e)).collect();
    let mut seen: HashSet<K> = HashSet::with_capacity(remote.len());
    let mut diff = Diff::default();

    for entity in remote {
        let key = key_of(&entity);
        if !seen.insert(key_of(&entity)) {
            continue;
        }
        match local_by_id.shift_remove(&key) {
            Some(cached) => {
                let merged = merge(&cached, entity);
                if merged != cached {
                    diff.changed_updates += 1;
                }
                diff.order.push(Slot::Update(diff.to_update.len()));
                diff.to_update.push(merged);
            }
            None => {
                diff.order.push(Slot::Insert(diff.to_insert.len()));
                diff.to_insert.push(entity);
            }
        }
    }

    diff.to_delete = local_by_id.into_values().collect();
    diff
}

/// Reconcile entities of one kind within `scope`.
///
/// Applies the kind's merge policy, stamps insertions with the scope, and
/// treats remote tombstones as absent.
pub fn reconcile_entities<E: Reconcilable>(
    remote: Vec<E>,
    local: Vec<E>,
    scope: &ScopeKey,
) -> Diff<E> {
    let live: Vec<E> = remote.into_iter().filter(|e| !e.is_tombstone()).collect();
    let mut diff = reconcile(live, local, E::key, E::merge);
    diff.to_insert = diff
        .to_insert
        .into_iter()
        .map(|e| e.stamp(scope))
        .collect();

    debug!(
        scope = %scope,
        insert = diff.to_insert.len(),
        update = diff.to_update.len(),
        delete = diff.to_delete.len(),
        changed = diff.changed_updates,
        "Computed diff"
    );
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosign_test_helpers::fixtures;
    use cosign_types::{Alert, AlertId, AlertStatus, Group, GroupId, GroupStatus};

    fn ids(alerts: &[Alert]) -> Vec<&str> {
        alerts.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn test_alert_scenario() {
        let remote = vec![
            fixtures::alert("1", AlertStatus::New),
            fixtures::alert("2", AlertStatus::New),
        ];
        let local = vec![
            fixtures::alert("2", AlertStatus::New),
            fixtures::alert("3", AlertStatus::New),
        ];

        let diff = reconcile(remote, local, |a: &Alert| a.id.clone(), Alert::merge);
        assert_eq!(ids(&diff.to_insert), vec!["1"]);
        assert_eq!(ids(&diff.to_update), vec!["2"]);
        assert_eq!(ids(&diff.to_delete), vec!["3"]);
        assert_eq!(ids(&diff.view()), vec!["1", "2"]);
    }

    #[test]
    fn test_set_algebra() {
        let remote_ids = ["a", "b", "c", "d"];
        let local_ids = ["c", "d", "e"];
        let remote: Vec<Alert> = remote_ids.iter().map(|id| fixtures::alert(id, AlertStatus::New)).collect();
        let local: Vec<Alert> = local_ids.iter().map(|id| fixtures::alert(id, AlertStatus::Read)).collect();

        let diff = reconcile(remote, local, |a: &Alert| a.id.clone(), Alert::merge);
        assert_eq!(ids(&diff.to_insert), vec!["a", "b"]);
        assert_eq!(ids(&diff.to_update), vec!["c", "d"]);
        assert_eq!(ids(&diff.to_delete), vec!["e"]);
        assert_eq!(diff.changed_updates(), 2);
        assert!(diff.to_update.iter().all(|a| a.status == AlertStatus::New));
    }

    #[test]
    fn test_fixed_point() {
        let scope = ScopeKey::alerts(fixtures::account(), GroupId::new("g1"));
        let remote = vec![
            fixtures::alert("1", AlertStatus::New),
            fixtures::alert("2", AlertStatus::Read),
        ];

        let first = reconcile_entities(remote.clone(), vec![], &scope);
        assert!(!first.is_noop());
        let cache = first.view();

        let second = reconcile_entities(remote, cache, &scope);
        assert!(second.to_insert.is_empty());
        assert!(second.to_delete.is_empty());
        assert!(second.is_noop());
    }

    #[test]
    fn test_empty_local_inserts_everything() {
        let scope = ScopeKey::alerts(fixtures::account(), GroupId::new("g1"));
        let diff = reconcile_entities(vec![fixtures::alert("1", AlertStatus::New)], vec![], &scope);
        assert_eq!(diff.to_insert.len(), 1);
        assert_eq!(diff.to_insert[0].group_id, Some(GroupId::new("g1")));
    }

    #[test]
    fn test_empty_remote_deletes_everything() {
        let scope = ScopeKey::alerts(fixtures::account(), GroupId::new("g1"));
        let local = vec![fixtures::alert("1", AlertStatus::New)];
        let diff = reconcile_entities(vec![], local, &scope);
        assert_eq!(diff.to_delete.len(), 1);
        assert!(diff.view().is_empty());
    }

    #[test]
    fn test_duplicate_remote_keys_matched_once() {
        let remote = vec![
            fixtures::alert("1", AlertStatus::New),
            fixtures::alert("1", AlertStatus::Read),
        ];
        let diff = reconcile(remote, vec![], |a: &Alert| a.id.clone(), Alert::merge);
        assert_eq!(diff.to_insert.len(), 1);
        assert_eq!(diff.to_insert[0].status, AlertStatus::New);
    }

    #[test]
    fn test_group_tombstone_deletes_and_never_inserts() {
        let scope = ScopeKey::groups(fixtures::account());
        let remote = vec![
            Group::new(GroupId::new("kept"), GroupStatus::Active, "Kept"),
            Group::new(GroupId::new("gone"), GroupStatus::Deleted, "Gone"),
            Group::new(GroupId::new("never"), GroupStatus::Deleted, "Never"),
        ];
        let local = vec![
            Group::new(GroupId::new("kept"), GroupStatus::Pending, "Kept"),
            Group::new(GroupId::new("gone"), GroupStatus::Active, "Gone"),
        ];

        let diff = reconcile_entities(remote, local, &scope);
        assert!(diff.to_insert.is_empty());
        assert_eq!(diff.to_update.len(), 1);
        assert_eq!(diff.to_update[0].status, GroupStatus::Active);
        assert_eq!(diff.to_delete.len(), 1);
        assert_eq!(diff.to_delete[0].id, GroupId::new("gone"));
    }

    #[test]
    fn test_update_keeps_local_scope_fields() {
        let scope = ScopeKey::alerts(fixtures::account(), GroupId::new("g1"));
        let local = vec![fixtures::alert("1", AlertStatus::New).stamp(&scope)];
        let remote = vec![fixtures::alert("1", AlertStatus::Read)];

        let diff = reconcile_entities(remote, local, &scope);
        assert_eq!(diff.to_update[0].group_id, Some(GroupId::new("g1")));
        assert_eq!(diff.to_update[0].id, AlertId::new("1"));
    }
}

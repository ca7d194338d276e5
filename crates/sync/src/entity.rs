//! Reconcilable entity kinds and their scope keys.

use cosign_types::{
    AccountContext, Alert, AlertId, Fingerprint, Group, GroupId, KeyHealthStatus, WalletId,
};
use std::fmt;
use std::hash::Hash;

/// Kinds of entity kept in the reconciliation cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// Pending alerts of a group.
    Alert,
    /// Group metadata and membership.
    Group,
    /// Per-key health-check status of a group wallet.
    KeyHealth,
}

impl EntityKind {
    /// Get a metric-friendly name for this kind.
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Alert => "alert",
            EntityKind::Group => "group",
            EntityKind::KeyHealth => "key_health",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The query scope of one reconciliation run.
///
/// A run only inserts, updates and deletes entities inside its scope, and
/// runs for the same scope are serialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey {
    /// Entity kind.
    pub kind: EntityKind,
    /// Account owning the cache.
    pub account: AccountContext,
    /// Group filter, if the kind is group-scoped.
    pub group_id: Option<GroupId>,
    /// Wallet filter, if the kind is wallet-scoped.
    pub wallet_id: Option<WalletId>,
}

impl ScopeKey {
    /// Scope of a group's alert list.
    pub fn alerts(account: AccountContext, group_id: GroupId) -> Self {
        Self {
            kind: EntityKind::Alert,
            account,
            group_id: Some(group_id),
            wallet_id: None,
        }
    }

    /// Scope of the account's whole group list.
    pub fn groups(account: AccountContext) -> Self {
        Self {
            kind: EntityKind::Group,
            account,
            group_id: None,
            wallet_id: None,
        }
    }

    /// Scope of a group wallet's key health list.
    pub fn key_health(account: AccountContext, group_id: GroupId, wallet_id: WalletId) -> Self {
        Self {
            kind: EntityKind::KeyHealth,
            account,
            group_id: Some(group_id),
            wallet_id: Some(wallet_id),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.account)?;
        if let Some(group_id) = &self.group_id {
            write!(f, "/{group_id}")?;
        }
        if let Some(wallet_id) = &self.wallet_id {
            write!(f, "/{wallet_id}")?;
        }
        Ok(())
    }
}

/// An entity that can be reconciled against a remote list.
///
/// Each kind defines its stable key, how a remote record is merged into the
/// cached one, and how a fresh record is stamped with its fetch scope.
pub trait Reconcilable: Clone + PartialEq + Send + Sync + 'static {
    /// Stable identifier type.
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync;

    /// Which cache this entity lives in.
    const KIND: EntityKind;

    /// Stable identifier.
    fn key(&self) -> Self::Key;

    /// Merge a remote record into the cached one.
    ///
    /// Remote field values win. Locally assigned scope fields are kept.
    fn merge(local: &Self, remote: Self) -> Self;

    /// Assign the fetch scope to a record about to be inserted.
    fn stamp(self, scope: &ScopeKey) -> Self;

    /// Whether the remote reports the entity as deleted.
    ///
    /// Tombstones are never inserted and delete any cached copy.
    fn is_tombstone(&self) -> bool {
        false
    }
}

impl Reconcilable for Alert {
    type Key = AlertId;
    const KIND: EntityKind = EntityKind::Alert;

    fn key(&self) -> AlertId {
        self.id.clone()
    }

    fn merge(local: &Self, remote: Self) -> Self {
        Alert {
            group_id: local.group_id.clone(),
            ..remote
        }
    }

    fn stamp(mut self, scope: &ScopeKey) -> Self {
        self.group_id = scope.group_id.clone();
        self
    }
}

impl Reconcilable for Group {
    type Key = GroupId;
    const KIND: EntityKind = EntityKind::Group;

    fn key(&self) -> GroupId {
        self.id.clone()
    }

    fn merge(_local: &Self, remote: Self) -> Self {
        remote
    }

    fn stamp(self, _scope: &ScopeKey) -> Self {
        self
    }

    fn is_tombstone(&self) -> bool {
        self.is_deleted()
    }
}

impl Reconcilable for KeyHealthStatus {
    type Key = Fingerprint;
    const KIND: EntityKind = EntityKind::KeyHealth;

    fn key(&self) -> Fingerprint {
        self.xfp.clone()
    }

    fn merge(local: &Self, remote: Self) -> Self {
        KeyHealthStatus {
            group_id: local.group_id.clone(),
            wallet_id: local.wallet_id.clone(),
            ..remote
        }
    }

    fn stamp(mut self, scope: &ScopeKey) -> Self {
        self.group_id = scope.group_id.clone();
        self.wallet_id = scope.wallet_id.clone();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosign_test_helpers::fixtures;
    use cosign_types::AlertStatus;

    #[test]
    fn test_alert_merge_keeps_scope() {
        let scope = ScopeKey::alerts(fixtures::account(), GroupId::new("g1"));
        let local = fixtures::alert("1", AlertStatus::New).stamp(&scope);

        let mut remote = fixtures::alert("1", AlertStatus::Read);
        remote.title = "Updated".into();
        let merged = Alert::merge(&local, remote);

        assert_eq!(merged.group_id, Some(GroupId::new("g1")));
        assert_eq!(merged.status, AlertStatus::Read);
        assert_eq!(merged.title, "Updated");
    }

    #[test]
    fn test_key_health_stamp() {
        let scope = ScopeKey::key_health(fixtures::account(), GroupId::new("g1"), WalletId::new("w1"));
        let stamped = fixtures::key_health(0xa1, true).stamp(&scope);
        assert_eq!(stamped.group_id, Some(GroupId::new("g1")));
        assert_eq!(stamped.wallet_id, Some(WalletId::new("w1")));
    }

    #[test]
    fn test_scope_display() {
        let scope = ScopeKey::key_health(fixtures::account(), GroupId::new("g1"), WalletId::new("w1"));
        assert_eq!(scope.to_string(), format!("key_health/{}/g1/w1", fixtures::account()));
    }
}

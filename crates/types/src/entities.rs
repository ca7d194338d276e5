//! Collaborative-wallet metadata mirrored from the remote service.
//!
//! The remote is the source of truth for every entity here. Local copies are
//! cached per account and refreshed by diff-based reconciliation. Fields
//! marked as scope fields are assigned locally from the fetch scope and are
//! never overwritten by a remote update.

use crate::{AlertId, Fingerprint, GroupId, WalletId};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// Alerts
// ═══════════════════════════════════════════════════════════════════════════

/// Read state of an alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    /// Not yet seen.
    #[default]
    New,
    /// Seen by the user.
    Read,
}

/// A pending alert for a collaborative group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Stable identifier.
    pub id: AlertId,
    /// Scope field: group the alert was fetched for.
    #[serde(default)]
    pub group_id: Option<GroupId>,
    /// Title text.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Read state.
    pub status: AlertStatus,
    /// Application-defined alert type name.
    pub kind: String,
    /// Whether the alert should be displayed.
    pub viewable: bool,
    /// Creation time, unix milliseconds.
    pub created_time_millis: u64,
    /// Type-specific payload, kept opaque.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Alert {
    /// Create a new alert with an empty payload.
    pub fn new(id: AlertId, title: impl Into<String>, status: AlertStatus) -> Self {
        Self {
            id,
            group_id: None,
            title: title.into(),
            body: String::new(),
            status,
            kind: String::new(),
            viewable: true,
            created_time_millis: 0,
            payload: serde_json::Value::Null,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Groups
// ═══════════════════════════════════════════════════════════════════════════

/// Lifecycle state of a collaborative group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupStatus {
    /// Group is set up and in use.
    #[default]
    Active,
    /// Group is still being set up.
    Pending,
    /// Group is temporarily locked.
    Locked,
    /// Group was deleted remotely.
    Deleted,
}

/// One member of a collaborative group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    /// Contact email or user handle.
    pub email: String,
    /// Role name (e.g. "MASTER", "ADMIN", "KEYHOLDER").
    pub role: String,
    /// Whether the member has joined.
    pub joined: bool,
}

/// Collaborative group metadata and membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Stable identifier.
    pub id: GroupId,
    /// Lifecycle state.
    pub status: GroupStatus,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Members in display order.
    #[serde(default)]
    pub members: Vec<GroupMember>,
    /// Wallet created for this group, once set up.
    #[serde(default)]
    pub wallet_id: Option<WalletId>,
}

impl Group {
    /// Create a new group with no members.
    pub fn new(id: GroupId, status: GroupStatus, name: impl Into<String>) -> Self {
        Self {
            id,
            status,
            name: name.into(),
            members: Vec::new(),
            wallet_id: None,
        }
    }

    /// Whether the remote reports this group as deleted.
    pub fn is_deleted(&self) -> bool {
        self.status == GroupStatus::Deleted
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Key health
// ═══════════════════════════════════════════════════════════════════════════

/// Health-check status of one key in a group wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHealthStatus {
    /// Fingerprint of the key; stable identifier.
    pub xfp: Fingerprint,
    /// Scope field: group the status belongs to.
    #[serde(default)]
    pub group_id: Option<GroupId>,
    /// Scope field: wallet the status belongs to.
    #[serde(default)]
    pub wallet_id: Option<WalletId>,
    /// Whether a health check may be requested for this key now.
    pub can_request_health_check: bool,
    /// Last completed health check, unix milliseconds (0 = never).
    #[serde(default)]
    pub last_health_check_time_millis: u64,
}

impl KeyHealthStatus {
    /// Create a new status that was never checked.
    pub fn new(xfp: Fingerprint, can_request_health_check: bool) -> Self {
        Self {
            xfp,
            group_id: None,
            wallet_id: None,
            can_request_health_check,
            last_health_check_time_millis: 0,
        }
    }
}

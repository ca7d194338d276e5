//! Inbound asynchronous notifications.

use cosign_types::{EventId, GroupId, TxId, WalletId};
use serde::{Deserialize, Serialize};

/// A push notification delivered by the messaging transport.
///
/// Only the id and the kind are interpreted. The payload is used to decide
/// what to re-fetch, never as a source of state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Transport-assigned identifier, unique per logical event.
    pub event_id: EventId,
    /// What happened.
    pub kind: NotificationKind,
}

impl Notification {
    /// Create a new notification.
    pub fn new(event_id: EventId, kind: NotificationKind) -> Self {
        Self { event_id, kind }
    }
}

/// Kinds of push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    // ═══════════════════════════════════════════════════════════════════════
    // Transaction events
    // ═══════════════════════════════════════════════════════════════════════
    /// The server changed a server-assisted transaction (co-signed, scheduled...).
    ServerTransaction {
        /// Affected transaction.
        tx_id: TxId,
    },

    /// The server failed to handle a transaction request.
    TransactionHandleError {
        /// Affected transaction.
        tx_id: TxId,
    },

    /// A participant cancelled the transaction.
    TransactionCancelled {
        /// Affected transaction.
        tx_id: TxId,
    },

    /// A previously collected signature was revoked.
    SignatureRevoked {
        /// Affected transaction.
        tx_id: TxId,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Group metadata events
    // ═══════════════════════════════════════════════════════════════════════
    /// Group name, status or membership changed.
    GroupChanged {
        /// Affected group.
        group_id: GroupId,
    },

    /// A key in the group was renamed.
    KeyNameChanged {
        /// Affected group.
        group_id: GroupId,
    },

    /// The group's alert list changed.
    AlertsChanged {
        /// Affected group.
        group_id: GroupId,
    },

    /// Someone asked to join a group.
    GroupMembershipRequestCreated {
        /// Affected group.
        group_id: GroupId,
    },

    /// A key health check was requested or completed.
    KeyHealthChanged {
        /// Affected group.
        group_id: GroupId,
        /// Affected wallet.
        wallet_id: WalletId,
    },

    /// The group's wallet was created or replaced.
    WalletChanged {
        /// Affected group.
        group_id: GroupId,
    },

    /// Any event this core does not act on.
    #[serde(other)]
    Other,
}

impl NotificationKind {
    /// Get a human-readable name for this notification type.
    pub fn type_name(&self) -> &'static str {
        match self {
            NotificationKind::ServerTransaction { .. } => "ServerTransaction",
            NotificationKind::TransactionHandleError { .. } => "TransactionHandleError",
            NotificationKind::TransactionCancelled { .. } => "TransactionCancelled",
            NotificationKind::SignatureRevoked { .. } => "SignatureRevoked",
            NotificationKind::GroupChanged { .. } => "GroupChanged",
            NotificationKind::KeyNameChanged { .. } => "KeyNameChanged",
            NotificationKind::AlertsChanged { .. } => "AlertsChanged",
            NotificationKind::GroupMembershipRequestCreated { .. } => {
                "GroupMembershipRequestCreated"
            }
            NotificationKind::KeyHealthChanged { .. } => "KeyHealthChanged",
            NotificationKind::WalletChanged { .. } => "WalletChanged",
            NotificationKind::Other => "Other",
        }
    }

    /// Check if this is a transaction event.
    pub fn is_transaction(&self) -> bool {
        self.tx_id().is_some()
    }

    /// Check if this is a group metadata event.
    pub fn is_group(&self) -> bool {
        self.group_id().is_some()
    }

    /// Transaction the event refers to, if any.
    pub fn tx_id(&self) -> Option<&TxId> {
        match self {
            NotificationKind::ServerTransaction { tx_id }
            | NotificationKind::TransactionHandleError { tx_id }
            | NotificationKind::TransactionCancelled { tx_id }
            | NotificationKind::SignatureRevoked { tx_id } => Some(tx_id),
            _ => None,
        }
    }

    /// Group the event refers to, if any.
    pub fn group_id(&self) -> Option<&GroupId> {
        match self {
            NotificationKind::GroupChanged { group_id }
            | NotificationKind::KeyNameChanged { group_id }
            | NotificationKind::AlertsChanged { group_id }
            | NotificationKind::GroupMembershipRequestCreated { group_id }
            | NotificationKind::KeyHealthChanged { group_id, .. }
            | NotificationKind::WalletChanged { group_id } => Some(group_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_decodes_as_other() {
        let n: NotificationKind = serde_json::from_str(r#"{"type":"coin_control_updated"}"#).unwrap();
        assert_eq!(n, NotificationKind::Other);
        assert!(!n.is_transaction());
        assert!(!n.is_group());
    }

    #[test]
    fn test_tagged_decoding() {
        let n: NotificationKind =
            serde_json::from_str(r#"{"type":"transaction_cancelled","tx_id":"abc"}"#).unwrap();
        assert_eq!(n.tx_id(), Some(&TxId::new("abc")));
        assert_eq!(n.type_name(), "TransactionCancelled");
    }
}

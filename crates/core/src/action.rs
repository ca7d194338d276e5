//! Outbound effects emitted by the pure state machines.

use cosign_types::{Psbt, TxId};
use std::fmt;
use std::time::Duration;

/// Identifies a one-shot timer owned by a state machine.
///
/// Every arm of a timer carries a fresh `generation`. A fired timer whose
/// generation no longer matches the armed one is stale and must be ignored,
/// which is how a cancel that races a fire deterministically wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Delayed broadcast of a fully-signed transaction.
    Broadcast {
        /// Transaction to broadcast.
        tx_id: TxId,
        /// Arm generation.
        generation: u64,
    },

    /// Reload of a transaction once the server key has signed it.
    SigningTimeRefresh {
        /// Transaction to reload.
        tx_id: TxId,
        /// Arm generation.
        generation: u64,
    },
}

impl TimerId {
    /// Transaction this timer belongs to.
    pub fn tx_id(&self) -> &TxId {
        match self {
            TimerId::Broadcast { tx_id, .. } | TimerId::SigningTimeRefresh { tx_id, .. } => tx_id,
        }
    }

    /// Arm generation of this timer.
    pub fn generation(&self) -> u64 {
        match self {
            TimerId::Broadcast { generation, .. }
            | TimerId::SigningTimeRefresh { generation, .. } => *generation,
        }
    }

    /// Whether two ids name the same timer slot, ignoring generation.
    pub fn same_slot(&self, other: &TimerId) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other) && self.tx_id() == other.tx_id()
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerId::Broadcast { tx_id, generation } => write!(f, "broadcast:{tx_id}#{generation}"),
            TimerId::SigningTimeRefresh { tx_id, generation } => {
                write!(f, "signing-refresh:{tx_id}#{generation}")
            }
        }
    }
}

/// Actions a state machine asks the runner to perform.
///
/// State machines never perform I/O. They return actions; the runner
/// executes them and feeds results back as method calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Signing
    // ═══════════════════════════════════════════════════════════════════════
    /// The signed count met the wallet threshold.
    ///
    /// Consumed by the broadcast scheduler.
    ThresholdReached {
        /// Transaction that became fully signed.
        tx_id: TxId,
    },

    /// Ask the remote service to co-sign with its server key.
    RequestCoSign {
        /// Transaction to co-sign.
        tx_id: TxId,
        /// PSBT at the time of the request.
        psbt: Psbt,
    },

    /// Re-fetch the authoritative snapshot of a transaction.
    RefetchTransaction {
        /// Transaction to re-fetch.
        tx_id: TxId,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Broadcast
    // ═══════════════════════════════════════════════════════════════════════
    /// Submit the transaction to the network now.
    Broadcast {
        /// Transaction to broadcast.
        tx_id: TxId,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Arm a one-shot timer.
    SetTimer {
        /// Timer to arm.
        id: TimerId,
        /// Delay from now.
        delay: Duration,
    },

    /// Disarm a timer. No-op if it already fired or was never armed.
    CancelTimer {
        /// Timer to disarm.
        id: TimerId,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Tracking
    // ═══════════════════════════════════════════════════════════════════════
    /// The transaction reached a terminal state; drop it from active tracking.
    StopTracking {
        /// Transaction to drop.
        tx_id: TxId,
    },
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::ThresholdReached { .. } => "ThresholdReached",
            Action::RequestCoSign { .. } => "RequestCoSign",
            Action::RefetchTransaction { .. } => "RefetchTransaction",
            Action::Broadcast { .. } => "Broadcast",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::StopTracking { .. } => "StopTracking",
        }
    }

    /// Check if this action drives a timer.
    pub fn is_timer(&self) -> bool {
        matches!(self, Action::SetTimer { .. } | Action::CancelTimer { .. })
    }

    /// Check if this action requires remote or network I/O.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Action::RequestCoSign { .. } | Action::RefetchTransaction { .. } | Action::Broadcast { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_slot_ignores_generation() {
        let a = TimerId::Broadcast {
            tx_id: TxId::new("tx"),
            generation: 1,
        };
        let b = TimerId::Broadcast {
            tx_id: TxId::new("tx"),
            generation: 7,
        };
        let c = TimerId::SigningTimeRefresh {
            tx_id: TxId::new("tx"),
            generation: 1,
        };
        assert!(a.same_slot(&b));
        assert!(!a.same_slot(&c));
        assert_eq!(a.to_string(), "broadcast:tx#1");
    }

    #[test]
    fn test_action_classification() {
        let broadcast = Action::Broadcast {
            tx_id: TxId::new("tx"),
        };
        assert!(broadcast.is_io());
        assert!(!broadcast.is_timer());
        assert_eq!(broadcast.type_name(), "Broadcast");
    }
}

//! Broadcast scheduler state machine.

use crate::BroadcastConfig;
use cosign_core::{Action, StateMachine, TimerId};
use cosign_types::{ServerTransaction, Transaction, TransactionStatus, TxId};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors when scheduling a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// Only fully-signed transactions can be broadcast.
    #[error("Transaction {tx_id} is {status}, not ready to broadcast")]
    NotReady {
        tx_id: TxId,
        status: TransactionStatus,
    },
}

/// What the scheduler decided for a fully-signed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastDecision {
    /// Broadcast now.
    BroadcastImmediately,
    /// A timer was armed to broadcast at this time (since the unix epoch).
    ScheduleAt(Duration),
    /// An identical timer is already armed.
    AlreadyScheduled,
}

/// An armed one-shot timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Armed {
    fire_at: Duration,
    generation: u64,
}

/// Decides when fully-signed transactions are broadcast.
///
/// Holds at most one armed broadcast timer and one armed signing-time
/// refresh timer per transaction. Arming always cancels the previous timer
/// for the slot first. Each arm gets a fresh generation; a fire whose
/// generation is no longer armed is ignored, so a cancel processed before
/// the fire always wins.
///
/// The scheduler's job ends once it emits [`Action::Broadcast`]. Retrying a
/// failed broadcast is up to the caller.
pub struct BroadcastScheduler {
    config: BroadcastConfig,

    /// Armed broadcast timers by transaction.
    broadcasts: HashMap<TxId, Armed>,

    /// Armed signing-time refresh timers by transaction.
    refreshes: HashMap<TxId, Armed>,

    next_generation: u64,

    /// Current wall-clock time.
    now: Duration,
}

impl BroadcastScheduler {
    /// Create a scheduler with no armed timers.
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            config,
            broadcasts: HashMap::new(),
            refreshes: HashMap::new(),
            next_generation: 0,
            now: Duration::ZERO,
        }
    }

    /// Grace period added to server times.
    pub fn grace(&self) -> Duration {
        self.config.grace
    }

    /// Fire time of the armed broadcast timer for `tx_id`, if any.
    pub fn scheduled_at(&self, tx_id: &TxId) -> Option<Duration> {
        self.broadcasts.get(tx_id).map(|armed| armed.fire_at)
    }

    /// Fire time of the armed signing-time refresh for `tx_id`, if any.
    pub fn refresh_at(&self, tx_id: &TxId) -> Option<Duration> {
        self.refreshes.get(tx_id).map(|armed| armed.fire_at)
    }

    /// Number of armed timers of both kinds.
    pub fn armed_count(&self) -> usize {
        self.broadcasts.len() + self.refreshes.len()
    }

    fn arm(&mut self, fire_at: Duration) -> Armed {
        self.next_generation += 1;
        Armed {
            fire_at,
            generation: self.next_generation,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Broadcast
    // ═══════════════════════════════════════════════════════════════════════════

    /// Broadcast now, or arm a timer for the server-imposed broadcast time.
    ///
    /// With no broadcast time, or one already elapsed, any armed timer is
    /// cancelled and [`Action::Broadcast`] is emitted. Otherwise a timer is
    /// armed at `broadcast_time + grace`, replacing any different timer for
    /// the same transaction.
    pub fn schedule_or_broadcast_now(
        &mut self,
        tx: &Transaction,
        server_tx: Option<&ServerTransaction>,
    ) -> Result<(BroadcastDecision, Vec<Action>), ScheduleError> {
        if tx.status != TransactionStatus::ReadyToBroadcast {
            return Err(ScheduleError::NotReady {
                tx_id: tx.id.clone(),
                status: tx.status,
            });
        }

        let mut actions = Vec::new();
        let broadcast_time = server_tx.and_then(ServerTransaction::broadcast_time);

        let Some(broadcast_time) = broadcast_time.filter(|at| *at > self.now) else {
            actions.extend(self.cancel_schedule(&tx.id));
            actions.push(Action::Broadcast {
                tx_id: tx.id.clone(),
            });
            info!(tx_id = %tx.id, "Broadcasting immediately");
            return Ok((BroadcastDecision::BroadcastImmediately, actions));
        };

        let fire_at = broadcast_time + self.config.grace;
        if self.scheduled_at(&tx.id) == Some(fire_at) {
            debug!(tx_id = %tx.id, fire_at_ms = fire_at.as_millis(), "Broadcast already scheduled");
            return Ok((BroadcastDecision::AlreadyScheduled, actions));
        }

        actions.extend(self.cancel_schedule(&tx.id));
        let armed = self.arm(fire_at);
        self.broadcasts.insert(tx.id.clone(), armed);
        actions.push(Action::SetTimer {
            id: TimerId::Broadcast {
                tx_id: tx.id.clone(),
                generation: armed.generation,
            },
            delay: fire_at.saturating_sub(self.now),
        });

        info!(
            tx_id = %tx.id,
            fire_at_ms = fire_at.as_millis(),
            delay_ms = fire_at.saturating_sub(self.now).as_millis(),
            "Broadcast scheduled"
        );
        Ok((BroadcastDecision::ScheduleAt(fire_at), actions))
    }

    /// Cancel the armed broadcast timer for `tx_id`.
    ///
    /// Idempotent: returns no actions when nothing is armed.
    pub fn cancel_schedule(&mut self, tx_id: &TxId) -> Vec<Action> {
        match self.broadcasts.remove(tx_id) {
            Some(armed) => {
                debug!(tx_id = %tx_id, generation = armed.generation, "Broadcast timer cancelled");
                vec![Action::CancelTimer {
                    id: TimerId::Broadcast {
                        tx_id: tx_id.clone(),
                        generation: armed.generation,
                    },
                }]
            }
            None => vec![],
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Signing-time refresh
    // ═══════════════════════════════════════════════════════════════════════════

    /// Arm a reload for when the server key is due to sign.
    ///
    /// Does nothing (beyond cancelling an older timer) unless the server
    /// signing time is still in the future.
    pub fn schedule_signing_refresh(
        &mut self,
        tx_id: &TxId,
        server_tx: Option<&ServerTransaction>,
    ) -> Vec<Action> {
        let signed_time = server_tx
            .and_then(ServerTransaction::signed_time)
            .filter(|at| *at > self.now);

        let Some(signed_time) = signed_time else {
            return self.cancel_signing_refresh(tx_id);
        };

        let fire_at = signed_time + self.config.grace;
        if self.refresh_at(tx_id) == Some(fire_at) {
            return vec![];
        }

        let mut actions = self.cancel_signing_refresh(tx_id);
        let armed = self.arm(fire_at);
        self.refreshes.insert(tx_id.clone(), armed);
        actions.push(Action::SetTimer {
            id: TimerId::SigningTimeRefresh {
                tx_id: tx_id.clone(),
                generation: armed.generation,
            },
            delay: fire_at.saturating_sub(self.now),
        });
        debug!(tx_id = %tx_id, fire_at_ms = fire_at.as_millis(), "Signing-time refresh scheduled");
        actions
    }

    /// Cancel the armed signing-time refresh for `tx_id`. Idempotent.
    pub fn cancel_signing_refresh(&mut self, tx_id: &TxId) -> Vec<Action> {
        match self.refreshes.remove(tx_id) {
            Some(armed) => vec![Action::CancelTimer {
                id: TimerId::SigningTimeRefresh {
                    tx_id: tx_id.clone(),
                    generation: armed.generation,
                },
            }],
            None => vec![],
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Timer events
    // ═══════════════════════════════════════════════════════════════════════════

    /// Handle a fired timer.
    ///
    /// Returns [`Action::Broadcast`] or [`Action::RefetchTransaction`] only if
    /// the fired generation is still the armed one.
    pub fn on_timer_fired(&mut self, id: &TimerId) -> Vec<Action> {
        let (slots, action) = match id {
            TimerId::Broadcast { tx_id, .. } => (
                &mut self.broadcasts,
                Action::Broadcast {
                    tx_id: tx_id.clone(),
                },
            ),
            TimerId::SigningTimeRefresh { tx_id, .. } => (
                &mut self.refreshes,
                Action::RefetchTransaction {
                    tx_id: tx_id.clone(),
                },
            ),
        };

        let armed_generation = slots.get(id.tx_id()).map(|armed| armed.generation);
        if armed_generation != Some(id.generation()) {
            debug!(timer = %id, armed = ?armed_generation, "Ignoring stale timer");
            return vec![];
        }
        slots.remove(id.tx_id());
        info!(timer = %id, "Timer fired");
        vec![action]
    }

    /// Cancel every timer for `tx_id`.
    pub fn forget(&mut self, tx_id: &TxId) -> Vec<Action> {
        let mut actions = self.cancel_schedule(tx_id);
        actions.extend(self.cancel_signing_refresh(tx_id));
        actions
    }

    /// Cancel every armed timer.
    pub fn cancel_all(&mut self) -> Vec<Action> {
        let tx_ids: Vec<TxId> = self
            .broadcasts
            .keys()
            .chain(self.refreshes.keys())
            .cloned()
            .collect();
        let mut actions = Vec::new();
        for tx_id in tx_ids {
            actions.extend(self.forget(&tx_id));
        }
        actions
    }
}

impl StateMachine for BroadcastScheduler {
    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosign_test_helpers::fixtures;
    use cosign_types::WalletKind;
    use tracing_test::traced_test;

    const NOW: Duration = Duration::from_secs(1_700_000_000);

    fn scheduler() -> BroadcastScheduler {
        let mut scheduler = BroadcastScheduler::new(BroadcastConfig::default());
        scheduler.set_time(NOW);
        scheduler
    }

    fn ready_tx() -> Transaction {
        fixtures::ready_transaction("tx-1", &fixtures::wallet_policy(WalletKind::Assisted))
    }

    fn server_tx(broadcast_at: Duration) -> ServerTransaction {
        ServerTransaction::new(TxId::new("tx-1")).with_broadcast_time(broadcast_at)
    }

    #[test]
    fn test_unset_broadcast_time_broadcasts_now() {
        let mut s = scheduler();
        let (decision, actions) = s.schedule_or_broadcast_now(&ready_tx(), None).unwrap();
        assert_eq!(decision, BroadcastDecision::BroadcastImmediately);
        assert_eq!(
            actions,
            vec![Action::Broadcast {
                tx_id: TxId::new("tx-1")
            }]
        );

        let zero = ServerTransaction::new(TxId::new("tx-1"));
        let (decision, _) = s.schedule_or_broadcast_now(&ready_tx(), Some(&zero)).unwrap();
        assert_eq!(decision, BroadcastDecision::BroadcastImmediately);
    }

    #[test]
    fn test_elapsed_broadcast_time_broadcasts_now() {
        let mut s = scheduler();
        let past = server_tx(NOW - Duration::from_secs(1));
        let (decision, _) = s.schedule_or_broadcast_now(&ready_tx(), Some(&past)).unwrap();
        assert_eq!(decision, BroadcastDecision::BroadcastImmediately);
    }

    #[traced_test]
    #[test]
    fn test_future_broadcast_time_schedules_with_grace() {
        let mut s = scheduler();
        let later = server_tx(NOW + Duration::from_secs(600));
        let (decision, actions) = s.schedule_or_broadcast_now(&ready_tx(), Some(&later)).unwrap();

        let expected = NOW + Duration::from_secs(600) + Duration::from_secs(3);
        assert_eq!(decision, BroadcastDecision::ScheduleAt(expected));
        assert!(matches!(
            actions.as_slice(),
            [Action::SetTimer { delay, .. }] if *delay == Duration::from_secs(603)
        ));
        assert!(logs_contain("Broadcast scheduled"));
    }

    #[test]
    fn test_same_schedule_is_already_scheduled() {
        let mut s = scheduler();
        let later = server_tx(NOW + Duration::from_secs(600));
        s.schedule_or_broadcast_now(&ready_tx(), Some(&later)).unwrap();
        let (decision, actions) = s.schedule_or_broadcast_now(&ready_tx(), Some(&later)).unwrap();
        assert_eq!(decision, BroadcastDecision::AlreadyScheduled);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_reschedule_cancels_previous_timer() {
        let mut s = scheduler();
        let (_, first) = s
            .schedule_or_broadcast_now(&ready_tx(), Some(&server_tx(NOW + Duration::from_secs(60))))
            .unwrap();
        let Action::SetTimer { id: first_id, .. } = first[0].clone() else {
            panic!("expected SetTimer");
        };

        let (_, second) = s
            .schedule_or_broadcast_now(&ready_tx(), Some(&server_tx(NOW + Duration::from_secs(120))))
            .unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0], Action::CancelTimer { id: first_id.clone() });
        assert!(matches!(second[1], Action::SetTimer { .. }));
        assert_eq!(s.armed_count(), 1);

        // The replaced timer is stale if it still fires.
        assert!(s.on_timer_fired(&first_id).is_empty());
    }

    #[test]
    fn test_cancel_before_fire_prevents_broadcast() {
        let mut s = scheduler();
        let (_, actions) = s
            .schedule_or_broadcast_now(&ready_tx(), Some(&server_tx(NOW + Duration::from_secs(600))))
            .unwrap();
        let Action::SetTimer { id, .. } = actions[0].clone() else {
            panic!("expected SetTimer");
        };

        let cancelled = s.cancel_schedule(&TxId::new("tx-1"));
        assert!(matches!(cancelled.as_slice(), [Action::CancelTimer { .. }]));
        assert!(s.cancel_schedule(&TxId::new("tx-1")).is_empty());

        s.set_time(NOW + Duration::from_secs(603));
        assert!(s.on_timer_fired(&id).is_empty());
    }

    #[test]
    fn test_fire_emits_broadcast_once() {
        let mut s = scheduler();
        let (_, actions) = s
            .schedule_or_broadcast_now(&ready_tx(), Some(&server_tx(NOW + Duration::from_secs(5))))
            .unwrap();
        let Action::SetTimer { id, .. } = actions[0].clone() else {
            panic!("expected SetTimer");
        };
        assert_eq!(
            s.on_timer_fired(&id),
            vec![Action::Broadcast {
                tx_id: TxId::new("tx-1")
            }]
        );
        assert!(s.on_timer_fired(&id).is_empty());
        assert_eq!(s.scheduled_at(&TxId::new("tx-1")), None);
    }

    #[test]
    fn test_not_ready_is_rejected() {
        let mut s = scheduler();
        let policy = fixtures::wallet_policy(WalletKind::Shared);
        let pending = fixtures::pending_transaction("tx-1", &policy);
        assert!(matches!(
            s.schedule_or_broadcast_now(&pending, None),
            Err(ScheduleError::NotReady { .. })
        ));
    }

    #[test]
    fn test_broadcast_now_cancels_armed_timer() {
        let mut s = scheduler();
        s.schedule_or_broadcast_now(&ready_tx(), Some(&server_tx(NOW + Duration::from_secs(60))))
            .unwrap();
        let (decision, actions) = s.schedule_or_broadcast_now(&ready_tx(), None).unwrap();
        assert_eq!(decision, BroadcastDecision::BroadcastImmediately);
        assert!(matches!(
            actions.as_slice(),
            [Action::CancelTimer { .. }, Action::Broadcast { .. }]
        ));
    }

    #[test]
    fn test_signing_refresh_timer() {
        let mut s = scheduler();
        let tx_id = TxId::new("tx-1");
        let server = ServerTransaction::new(tx_id.clone()).with_signed_time(NOW + Duration::from_secs(30));

        let actions = s.schedule_signing_refresh(&tx_id, Some(&server));
        let [Action::SetTimer { id, delay }] = actions.as_slice() else {
            panic!("expected SetTimer");
        };
        assert_eq!(*delay, Duration::from_secs(33));
        assert!(s.schedule_signing_refresh(&tx_id, Some(&server)).is_empty());

        assert_eq!(
            s.on_timer_fired(id),
            vec![Action::RefetchTransaction { tx_id: tx_id.clone() }]
        );

        let past = ServerTransaction::new(tx_id.clone()).with_signed_time(NOW - Duration::from_secs(1));
        assert!(s.schedule_signing_refresh(&tx_id, Some(&past)).is_empty());
    }

    #[test]
    fn test_cancel_all() {
        let mut s = scheduler();
        s.schedule_or_broadcast_now(&ready_tx(), Some(&server_tx(NOW + Duration::from_secs(60))))
            .unwrap();
        let server = ServerTransaction::new(TxId::new("tx-1")).with_signed_time(NOW + Duration::from_secs(30));
        s.schedule_signing_refresh(&TxId::new("tx-1"), Some(&server));

        let actions = s.cancel_all();
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|a| matches!(a, Action::CancelTimer { .. })));
        assert_eq!(s.armed_count(), 0);
    }
}

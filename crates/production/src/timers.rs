//! Cancellable one-shot timers.
//!
//! Executes the `SetTimer` / `CancelTimer` actions emitted by the
//! [`BroadcastScheduler`](cosign_broadcast::BroadcastScheduler). Each timer is
//! a spawned task sleeping under its own child [`CancellationToken`]; when it
//! elapses the [`TimerId`] is sent on the timer channel.
//!
//! Firing and cancelling both take the slot table lock. A cancel that gets
//! the lock first always wins; a timer that got it first has already been
//! sent, and the scheduler discards it by generation.

use cosign_core::TimerId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

type Slots = Arc<Mutex<HashMap<TimerId, CancellationToken>>>;

/// Timer table for one session.
pub struct BroadcastTimers {
    root: CancellationToken,
    slots: Slots,
    fired_tx: mpsc::UnboundedSender<TimerId>,
}

impl BroadcastTimers {
    /// Create the timer table and the receiving end of the timer channel.
    pub fn new(root: CancellationToken) -> (Self, mpsc::UnboundedReceiver<TimerId>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let timers = Self {
            root,
            slots: Arc::new(Mutex::new(HashMap::new())),
            fired_tx,
        };
        (timers, fired_rx)
    }

    /// Arm `id` to fire after `delay`, replacing an identical armed id.
    pub fn set_timer(&self, id: TimerId, delay: Duration) {
        if self.root.is_cancelled() {
            debug!(timer = %id, "Session closed, timer not armed");
            return;
        }

        let token = self.root.child_token();
        if let Some(previous) = self.slots.lock().insert(id.clone(), token.clone()) {
            previous.cancel();
        }

        let slots = self.slots.clone();
        let fired_tx = self.fired_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    trace!(timer = %id, "Timer task cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    let mut slots = slots.lock();
                    if token.is_cancelled() {
                        return;
                    }
                    slots.remove(&id);
                    // Receiver gone means the session is shutting down.
                    let _ = fired_tx.send(id);
                }
            }
        });
        trace!(delay_ms = delay.as_millis(), "Timer armed");
    }

    /// Disarm `id`. Idempotent.
    pub fn cancel_timer(&self, id: &TimerId) {
        if let Some(token) = self.slots.lock().remove(id) {
            token.cancel();
            debug!(timer = %id, "Timer cancelled");
        }
    }

    /// Whether `id` is armed and has not fired yet.
    pub fn is_armed(&self, id: &TimerId) -> bool {
        self.slots.lock().contains_key(id)
    }

    pub fn armed_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Disarm every timer and refuse new ones.
    pub fn shutdown(&self) {
        let mut slots = self.slots.lock();
        self.root.cancel();
        slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosign_types::TxId;

    fn broadcast(tx: &str, generation: u64) -> TimerId {
        TimerId::Broadcast {
            tx_id: TxId::new(tx),
            generation,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (timers, mut fired) = BroadcastTimers::new(CancellationToken::new());
        timers.set_timer(broadcast("tx-1", 1), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(fired.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.recv().await, Some(broadcast("tx-1", 1)));
        assert_eq!(timers.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (timers, mut fired) = BroadcastTimers::new(CancellationToken::new());
        let id = broadcast("tx-1", 1);
        timers.set_timer(id.clone(), Duration::from_secs(5));
        timers.cancel_timer(&id);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(fired.try_recv().is_err());
        assert!(!timers.is_armed(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_disarms_everything() {
        let (timers, mut fired) = BroadcastTimers::new(CancellationToken::new());
        timers.set_timer(broadcast("tx-1", 1), Duration::from_secs(1));
        timers.set_timer(broadcast("tx-2", 2), Duration::from_secs(2));
        timers.shutdown();
        timers.set_timer(broadcast("tx-3", 3), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(fired.try_recv().is_err());
        assert_eq!(timers.armed_count(), 0);
    }
}

//! Signed-count watcher.
//!
//! Observes the signed count of one transaction and decides when the
//! server cosigning key must be asked to sign. The watcher keeps a
//! high-water mark that only moves forward, so a stale snapshot carrying
//! fewer signatures never re-arms it.

use cosign_types::TransactionStatus;

/// Progress of the single co-sign request a session may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoSign {
    /// Not triggered yet.
    Idle,
    /// Triggered, but the server has not acknowledged the request.
    Outstanding,
    /// The server acknowledged the request.
    Sent,
}

/// Forward-only observer of a transaction's signed count.
#[derive(Debug, Clone)]
pub struct SignedCountWatcher {
    /// Whether the wallet has a server cosigning key.
    server_assisted: bool,

    /// Highest signed count observed. `None` until the first observation.
    high_water: Option<usize>,

    co_sign: CoSign,
}

impl SignedCountWatcher {
    /// Create a watcher that has observed nothing yet.
    pub fn new(server_assisted: bool) -> Self {
        Self {
            server_assisted,
            high_water: None,
            co_sign: CoSign::Idle,
        }
    }

    /// Highest signed count observed, if any.
    pub fn high_water(&self) -> Option<usize> {
        self.high_water
    }

    /// Whether the co-sign request fired in this session.
    pub fn co_sign_requested(&self) -> bool {
        self.co_sign != CoSign::Idle
    }

    /// Whether the server acknowledged the co-sign request.
    pub fn co_sign_sent(&self) -> bool {
        self.co_sign == CoSign::Sent
    }

    /// Whether a fired co-sign request still awaits acknowledgement while
    /// the transaction is collecting signatures.
    pub fn co_sign_outstanding(&self, status: TransactionStatus) -> bool {
        self.co_sign == CoSign::Outstanding && status == TransactionStatus::PendingSignatures
    }

    /// Observe the current signed count and status.
    ///
    /// The first observation only sets the baseline. Returns `true` exactly
    /// once per session: when the count rises from zero while the
    /// transaction is still collecting signatures on a server-assisted wallet.
    pub fn observe(&mut self, signed_count: usize, status: TransactionStatus) -> bool {
        let Some(previous) = self.high_water else {
            self.high_water = Some(signed_count);
            return false;
        };

        if signed_count <= previous {
            return false;
        }
        self.high_water = Some(signed_count);

        let crossed_from_zero = previous == 0 && signed_count > 0;
        if self.server_assisted
            && self.co_sign == CoSign::Idle
            && crossed_from_zero
            && status == TransactionStatus::PendingSignatures
        {
            self.co_sign = CoSign::Outstanding;
            return true;
        }
        false
    }

    /// The server acknowledged the co-sign request.
    pub fn confirm_co_sign(&mut self) {
        if self.co_sign == CoSign::Outstanding {
            self.co_sign = CoSign::Sent;
        }
    }

    /// Re-baseline after an authoritative snapshot with a newer version.
    ///
    /// The mark may move down here. The co-sign state is kept.
    pub fn rebaseline(&mut self, signed_count: usize) {
        self.high_water = Some(signed_count);
    }

    /// Re-baseline after a signature revocation.
    ///
    /// The co-sign state survives, so a revoked and re-signed transaction
    /// never asks the server twice in one session.
    pub fn reset(&mut self, signed_count: usize) {
        self.high_water = Some(signed_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PENDING: TransactionStatus = TransactionStatus::PendingSignatures;

    #[test]
    fn test_first_observation_sets_baseline() {
        let mut watcher = SignedCountWatcher::new(true);
        assert!(!watcher.observe(1, PENDING));
        assert_eq!(watcher.high_water(), Some(1));
        // Already above zero at load, so no crossing is observed.
        assert!(!watcher.observe(2, PENDING));
    }

    #[test]
    fn test_fires_once_on_zero_crossing() {
        let mut watcher = SignedCountWatcher::new(true);
        watcher.observe(0, PENDING);
        assert!(watcher.observe(1, PENDING));
        assert!(watcher.co_sign_requested());

        watcher.rebaseline(0);
        assert!(!watcher.observe(1, PENDING));
    }

    #[test]
    fn test_never_decreases() {
        let mut watcher = SignedCountWatcher::new(true);
        watcher.observe(0, PENDING);
        watcher.observe(2, PENDING);
        assert!(!watcher.observe(1, PENDING));
        assert_eq!(watcher.high_water(), Some(2));
    }

    #[test]
    fn test_not_assisted_never_fires() {
        let mut watcher = SignedCountWatcher::new(false);
        watcher.observe(0, PENDING);
        assert!(!watcher.observe(1, PENDING));
    }

    #[test]
    fn test_does_not_fire_once_ready() {
        let mut watcher = SignedCountWatcher::new(true);
        watcher.observe(0, PENDING);
        assert!(!watcher.observe(1, TransactionStatus::ReadyToBroadcast));
    }

    #[test]
    fn test_reset_keeps_co_sign_state() {
        let mut watcher = SignedCountWatcher::new(true);
        watcher.observe(0, PENDING);
        assert!(watcher.observe(1, PENDING));
        watcher.confirm_co_sign();

        watcher.reset(0);
        assert_eq!(watcher.high_water(), Some(0));
        assert!(!watcher.observe(1, PENDING));
        assert!(watcher.co_sign_sent());
    }

    #[test]
    fn test_unconfirmed_request_stays_outstanding() {
        let mut watcher = SignedCountWatcher::new(true);
        watcher.observe(0, PENDING);
        assert!(watcher.observe(1, PENDING));
        assert!(watcher.co_sign_requested());
        assert!(!watcher.co_sign_sent());
        assert!(watcher.co_sign_outstanding(PENDING));
        assert!(!watcher.co_sign_outstanding(TransactionStatus::ReadyToBroadcast));

        watcher.confirm_co_sign();
        assert!(watcher.co_sign_sent());
        assert!(!watcher.co_sign_outstanding(PENDING));
    }

    #[test]
    fn test_confirm_without_request_is_noop() {
        let mut watcher = SignedCountWatcher::new(true);
        watcher.observe(0, PENDING);
        watcher.confirm_co_sign();
        assert!(!watcher.co_sign_requested());
        assert!(watcher.observe(1, PENDING));
    }
}

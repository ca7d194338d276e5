//! Core traits for state machines and time sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A sub-state machine driven by an injected clock.
///
/// All signing and scheduling logic is implemented as state machines that are:
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + input + time = same actions
/// - **Pure-ish**: Mutates self, but performs no I/O
///
/// # Example
///
/// ```ignore
/// scheduler.set_time(clock.now());
/// let (decision, actions) = scheduler.schedule_or_broadcast_now(&tx, server_tx.as_ref())?;
/// runner.execute(actions).await;
/// ```
pub trait StateMachine {
    /// Set the current time.
    ///
    /// Called by the runner before each input to provide the current
    /// wall-clock time as a duration since the unix epoch.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    ///
    /// Returns the time that was last set via `set_time()`.
    fn now(&self) -> Duration;
}

/// Source of wall-clock time, as a duration since the unix epoch.
///
/// Server timestamps (broadcast time, signing time) are unix milliseconds, so
/// the runner needs wall-clock time rather than a monotonic instant.
pub trait Clock: Send + Sync {
    /// Current time since the unix epoch.
    fn now(&self) -> Duration;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        // A system clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `now`.
    pub fn new(now: Duration) -> Self {
        Self {
            millis: AtomicU64::new(now.as_millis() as u64),
        }
    }

    /// Set the clock to `now`.
    pub fn set(&self, now: Duration) {
        self.millis.store(now.as_millis() as u64, Ordering::SeqCst);
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

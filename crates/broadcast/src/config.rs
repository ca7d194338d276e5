//! Broadcast scheduling configuration.

use std::time::Duration;

/// Configuration for the broadcast scheduler.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Added to every server-provided time before arming a timer.
    ///
    /// Absorbs clock skew between client and server.
    pub grace: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(3),
        }
    }
}

impl BroadcastConfig {
    /// Create a config with a custom grace period.
    pub fn with_grace(grace: Duration) -> Self {
        Self { grace }
    }
}

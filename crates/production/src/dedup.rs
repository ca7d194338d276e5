//! Exactly-once admission of inbound notifications.

use cosign_core::Clock;
use cosign_types::EventId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration for the dedup guard.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// How long a handled event id is remembered.
    ///
    /// A redelivery older than this is admitted again.
    pub retention: Duration,

    /// How often the session sweeps expired ids.
    pub gc_interval: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            gc_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Marks notification ids as handled, exactly once.
///
/// [`admit`](Self::admit) checks and marks in one step under the map shard
/// lock, so two concurrent deliveries of the same id can never both be
/// admitted. Admission is final: an event whose processing fails afterwards
/// stays handled and is not retried.
pub struct EventDedupGuard {
    /// Event id to the time it was admitted.
    handled: DashMap<EventId, Duration>,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl EventDedupGuard {
    /// Create an empty guard.
    pub fn new(config: &DedupConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            handled: DashMap::new(),
            retention: config.retention,
            clock,
        }
    }

    /// Create a guard preloaded with ids restored from persistence.
    pub fn with_handled(
        config: &DedupConfig,
        clock: Arc<dyn Clock>,
        handled: impl IntoIterator<Item = (EventId, Duration)>,
    ) -> Self {
        let guard = Self::new(config, clock);
        for (event_id, handled_at) in handled {
            guard.handled.insert(event_id, handled_at);
        }
        guard
    }

    /// Admit `event_id` if it was never seen. Returns `true` exactly once.
    pub fn admit(&self, event_id: &EventId) -> bool {
        match self.handled.entry(event_id.clone()) {
            Entry::Occupied(_) => {
                debug!(event_id = %event_id, "Duplicate event");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(self.clock.now());
                true
            }
        }
    }

    /// Whether `event_id` was already admitted.
    pub fn is_handled(&self, event_id: &EventId) -> bool {
        self.handled.contains_key(event_id)
    }

    /// Number of remembered ids.
    pub fn len(&self) -> usize {
        self.handled.len()
    }

    /// Whether no id is remembered.
    pub fn is_empty(&self) -> bool {
        self.handled.is_empty()
    }

    /// Every remembered id with its admission time, for persistence.
    pub fn handled(&self) -> Vec<(EventId, Duration)> {
        self.handled
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Forget ids admitted longer than the retention window before `now`.
    ///
    /// Returns the number of ids dropped.
    pub fn collect_garbage(&self, now: Duration) -> usize {
        let before = self.handled.len();
        let retention = self.retention;
        self.handled
            .retain(|_, handled_at| now.saturating_sub(*handled_at) <= retention);
        let dropped = before.saturating_sub(self.handled.len());
        if dropped > 0 {
            debug!(dropped, remaining = self.handled.len(), "Collected handled events");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosign_core::ManualClock;
    use tracing_test::traced_test;

    fn guard(clock: Arc<ManualClock>) -> EventDedupGuard {
        EventDedupGuard::new(&DedupConfig::default(), clock)
    }

    #[traced_test]
    #[test]
    fn test_admit_twice() {
        let g = guard(Arc::new(ManualClock::new(Duration::from_secs(1))));
        let id = EventId::new("$evt");
        assert_eq!((g.admit(&id), g.admit(&id)), (true, false));
        assert!(g.is_handled(&id));
        assert!(logs_contain("Duplicate event"));
    }

    #[test]
    fn test_preloaded_ids_are_not_admitted() {
        let clock = Arc::new(ManualClock::new(Duration::from_secs(10)));
        let g = EventDedupGuard::with_handled(
            &DedupConfig::default(),
            clock,
            [(EventId::new("$old"), Duration::from_secs(5))],
        );
        assert!(!g.admit(&EventId::new("$old")));
        assert!(g.admit(&EventId::new("$new")));
    }

    #[test]
    fn test_collect_garbage_respects_retention() {
        let clock = Arc::new(ManualClock::new(Duration::from_secs(0)));
        let config = DedupConfig {
            retention: Duration::from_secs(100),
            ..Default::default()
        };
        let g = EventDedupGuard::new(&config, clock.clone());
        g.admit(&EventId::new("$a"));
        clock.set(Duration::from_secs(50));
        g.admit(&EventId::new("$b"));

        assert_eq!(g.collect_garbage(Duration::from_secs(120)), 1);
        assert!(!g.is_handled(&EventId::new("$a")));
        assert!(g.is_handled(&EventId::new("$b")));
    }

    #[test]
    fn test_concurrent_admission_admits_once() {
        let g = Arc::new(guard(Arc::new(ManualClock::new(Duration::from_secs(1)))));
        let id = EventId::new("$race");
        let admitted: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let g = g.clone();
                    let id = id.clone();
                    s.spawn(move || g.admit(&id) as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(admitted, 1);
    }
}

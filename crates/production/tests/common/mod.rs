#![allow(dead_code)]

use cosign_core::ManualClock;
use cosign_production::{
    Collaborators, CoordinatorConfig, EntityStores, MemoryEntityStore, SessionContext,
};
use cosign_sync::{ScopeKey, SyncConfig};
use cosign_test_helpers::{fixtures, FakeBackend, FakeRemote};
use cosign_types::{Alert, Group, GroupId, KeyHealthStatus};
use std::sync::Arc;
use std::time::Duration;

pub const NOW: Duration = Duration::from_secs(1_700_000_000);

/// Typed handles on the in-memory caches.
pub struct Stores {
    pub alerts: Arc<MemoryEntityStore<Alert>>,
    pub groups: Arc<MemoryEntityStore<Group>>,
    pub key_health: Arc<MemoryEntityStore<KeyHealthStatus>>,
}

impl Stores {
    pub fn new() -> Self {
        Self {
            alerts: Arc::new(MemoryEntityStore::new()),
            groups: Arc::new(MemoryEntityStore::new()),
            key_health: Arc::new(MemoryEntityStore::new()),
        }
    }

    pub fn erased(&self) -> EntityStores {
        EntityStores {
            alerts: self.alerts.clone(),
            groups: self.groups.clone(),
            key_health: self.key_health.clone(),
        }
    }
}

pub fn alert_scope(group: &str) -> ScopeKey {
    ScopeKey::alerts(fixtures::account(), GroupId::new(group))
}

pub fn group_scope() -> ScopeKey {
    ScopeKey::groups(fixtures::account())
}

pub fn config(page_size: usize) -> CoordinatorConfig {
    CoordinatorConfig::default()
        .with_sync(SyncConfig::with_page_size(page_size))
        .with_timeouts(Duration::from_secs(30), Duration::from_secs(30))
}

/// A started session over fakes.
pub struct Harness {
    pub session: SessionContext,
    pub remote: Arc<FakeRemote>,
    pub backend: Arc<FakeBackend>,
    pub clock: Arc<ManualClock>,
    pub stores: Stores,
}

impl Harness {
    pub fn start(config: CoordinatorConfig) -> Self {
        let remote = Arc::new(FakeRemote::new(config.sync.page_size));
        let backend = Arc::new(FakeBackend::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let stores = Stores::new();

        let session = SessionContext::start(
            config,
            fixtures::account(),
            Collaborators {
                remote: remote.clone(),
                backend: backend.clone(),
                stores: stores.erased(),
                clock: clock.clone(),
            },
        )
        .expect("session starts");

        Self {
            session,
            remote,
            backend,
            clock,
            stores,
        }
    }
}

/// Let every spawned task run until it blocks on a timer.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

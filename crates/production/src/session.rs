//! Session context.
//!
//! Everything a signed-in account needs is created here and reached through
//! the [`SessionContext`]; nothing lives in globals. Closing the session
//! disarms every timer and stops the background tasks.
//!
//! ```text
//! SessionContext
//!   ├─ TransactionCoordinator ◀── timer driver ◀── BroadcastTimers
//!   ├─ Reconciler
//!   ├─ NotificationRouter ──▶ EventDedupGuard ──▶ coordinator / reconciler
//!   ├─ CollaboratorInbox
//!   └─ CoordinatorMetrics
//! ```

use crate::config::{ConfigError, CoordinatorConfig};
use crate::coordinator::TransactionCoordinator;
use crate::dedup::EventDedupGuard;
use crate::metrics::CoordinatorMetrics;
use crate::reconciler::{EntityStores, Reconciler};
use crate::router::{NotificationRouter, RouteOutcome};
use crate::signer::{CollaboratorInbox, SignerAdapter};
use crate::timers::BroadcastTimers;
use crate::traits::{RemoteWalletService, SigningBackend};
use cosign_core::{Clock, Notification, TimerId};
use cosign_types::{AccountContext, EventId, SignatureProof, SignerDescriptor, TxId};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors starting a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// External collaborators of a session.
pub struct Collaborators {
    pub remote: Arc<dyn RemoteWalletService>,
    pub backend: Arc<dyn SigningBackend>,
    pub stores: EntityStores,
    pub clock: Arc<dyn Clock>,
}

/// One authenticated session.
pub struct SessionContext {
    account: AccountContext,
    coordinator: Arc<TransactionCoordinator>,
    reconciler: Arc<Reconciler>,
    router: Arc<NotificationRouter>,
    dedup: Arc<EventDedupGuard>,
    inbox: Arc<CollaboratorInbox>,
    metrics: Arc<CoordinatorMetrics>,
    remote: Arc<dyn RemoteWalletService>,
    backend: Arc<dyn SigningBackend>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionContext {
    /// Build the session and spawn its background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: CoordinatorConfig,
        account: AccountContext,
        collaborators: Collaborators,
    ) -> Result<Self, SessionError> {
        Self::start_with_handled(config, account, collaborators, Vec::new())
    }

    /// Like [`start`](Self::start), restoring handled event ids persisted by
    /// an earlier session.
    pub fn start_with_handled(
        config: CoordinatorConfig,
        account: AccountContext,
        collaborators: Collaborators,
        handled: Vec<(EventId, Duration)>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let Collaborators {
            remote,
            backend,
            stores,
            clock,
        } = collaborators;

        let metrics = Arc::new(CoordinatorMetrics::new()?);
        let shutdown = CancellationToken::new();
        let (timers, fired_rx) = BroadcastTimers::new(shutdown.child_token());

        let coordinator = Arc::new(TransactionCoordinator::new(
            &config,
            remote.clone(),
            backend.clone(),
            clock.clone(),
            metrics.clone(),
            timers,
        ));
        let reconciler = Arc::new(Reconciler::new(
            &config,
            account.clone(),
            remote.clone(),
            stores,
            metrics.clone(),
        ));
        let dedup = Arc::new(EventDedupGuard::with_handled(
            &config.dedup,
            clock.clone(),
            handled,
        ));
        let router = Arc::new(NotificationRouter::new(
            dedup.clone(),
            coordinator.clone(),
            reconciler.clone(),
            metrics.clone(),
            config.server_event_refresh_delay,
        ));

        let inbox = coordinator.inbox().clone();
        let tasks = vec![
            spawn_timer_driver(coordinator.clone(), fired_rx, shutdown.clone()),
            spawn_dedup_gc(dedup.clone(), clock, config.dedup.gc_interval, shutdown.clone()),
        ];

        info!(account = %account, "Session started");
        Ok(Self {
            account,
            coordinator,
            reconciler,
            router,
            dedup,
            inbox,
            metrics,
            remote,
            backend,
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn account(&self) -> &AccountContext {
        &self.account
    }

    pub fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.coordinator
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn dedup(&self) -> &Arc<EventDedupGuard> {
        &self.dedup
    }

    pub fn inbox(&self) -> &Arc<CollaboratorInbox> {
        &self.inbox
    }

    pub fn metrics(&self) -> &Arc<CoordinatorMetrics> {
        &self.metrics
    }

    /// Signer adapter for one key of a wallet.
    pub fn signer(&self, descriptor: SignerDescriptor) -> SignerAdapter {
        SignerAdapter::for_descriptor(
            descriptor,
            self.backend.clone(),
            self.remote.clone(),
            self.inbox.clone(),
        )
    }

    /// Deliver a signed PSBT a collaborator sent through the messaging
    /// transport. Returns `false` when the transaction is no longer tracked.
    pub fn deliver_collaborator_signature(&self, tx_id: &TxId, proof: SignatureProof) -> bool {
        if self.is_closed() {
            return false;
        }
        self.coordinator.deliver_collaborator_proof(tx_id, proof)
    }

    /// Deliver a push notification.
    pub async fn deliver(&self, notification: Notification) -> RouteOutcome {
        if self.is_closed() {
            debug!(event_id = %notification.event_id, "Session closed, notification dropped");
            return RouteOutcome::Ignored;
        }
        self.router.route(notification).await
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Disarm every timer and stop the background tasks.
    pub async fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.coordinator.close();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "Background task ended abnormally");
            }
        }
        info!(account = %self.account, "Session closed");
    }
}

fn spawn_timer_driver(
    coordinator: Arc<TransactionCoordinator>,
    mut fired_rx: mpsc::UnboundedReceiver<TimerId>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                fired = fired_rx.recv() => {
                    let Some(id) = fired else { break };
                    let coordinator = coordinator.clone();
                    // Each fire runs on its own task; the coordinator
                    // serializes per transaction.
                    tokio::spawn(async move {
                        if let Err(err) = coordinator.on_timer_fired(&id).await {
                            warn!(timer = %id, error = %err, "Timer handling failed");
                        }
                    });
                }
            }
        }
        debug!("Timer driver stopped");
    })
}

fn spawn_dedup_gc(
    dedup: Arc<EventDedupGuard>,
    clock: Arc<dyn Clock>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    dedup.collect_garbage(clock.now());
                }
            }
        }
        debug!("Dedup GC stopped");
    })
}

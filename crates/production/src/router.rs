//! Inbound notification routing.
//!
//! Every notification passes the [`EventDedupGuard`] first; only admitted
//! events are dispatched. Notifications carry ids only, so each handler
//! re-fetches from the remote service.

use crate::coordinator::TransactionCoordinator;
use crate::dedup::EventDedupGuard;
use crate::error::CoordinatorError;
use crate::metrics::CoordinatorMetrics;
use crate::reconciler::Reconciler;
use cosign_core::{Notification, NotificationKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What happened to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Processed successfully.
    Handled,

    /// Already handled earlier; dropped.
    Duplicate,

    /// Kind not handled by this core.
    Ignored,

    /// Processing failed. The event still counts as handled and is not
    /// retried.
    Failed(CoordinatorError),
}

impl RouteOutcome {
    fn label(&self) -> &'static str {
        match self {
            RouteOutcome::Handled => "handled",
            RouteOutcome::Duplicate => "duplicate",
            RouteOutcome::Ignored => "ignored",
            RouteOutcome::Failed(_) => "failed",
        }
    }
}

/// Dispatches admitted notifications to the coordinator and reconciler.
pub struct NotificationRouter {
    dedup: Arc<EventDedupGuard>,
    coordinator: Arc<TransactionCoordinator>,
    reconciler: Arc<Reconciler>,
    metrics: Arc<CoordinatorMetrics>,
    server_event_refresh_delay: Duration,
}

impl NotificationRouter {
    pub fn new(
        dedup: Arc<EventDedupGuard>,
        coordinator: Arc<TransactionCoordinator>,
        reconciler: Arc<Reconciler>,
        metrics: Arc<CoordinatorMetrics>,
        server_event_refresh_delay: Duration,
    ) -> Self {
        Self {
            dedup,
            coordinator,
            reconciler,
            metrics,
            server_event_refresh_delay,
        }
    }

    /// Admit and dispatch one notification.
    pub async fn route(&self, notification: Notification) -> RouteOutcome {
        let Notification { event_id, kind } = notification;

        let outcome = if !self.dedup.admit(&event_id) {
            RouteOutcome::Duplicate
        } else {
            match self.dispatch(&kind).await {
                Ok(true) => RouteOutcome::Handled,
                Ok(false) => RouteOutcome::Ignored,
                Err(err) => {
                    warn!(event_id = %event_id, kind = kind.type_name(), error = %err, "Notification handling failed");
                    RouteOutcome::Failed(err)
                }
            }
        };

        self.metrics.inc_notification(outcome.label());
        match &outcome {
            RouteOutcome::Handled => {
                info!(event_id = %event_id, kind = kind.type_name(), "Notification handled")
            }
            RouteOutcome::Duplicate | RouteOutcome::Ignored => {
                debug!(event_id = %event_id, kind = kind.type_name(), outcome = outcome.label(), "Notification dropped")
            }
            RouteOutcome::Failed(_) => {}
        }
        outcome
    }

    /// Returns `false` for kinds that are not handled.
    async fn dispatch(&self, kind: &NotificationKind) -> Result<bool, CoordinatorError> {
        match kind {
            NotificationKind::ServerTransaction { tx_id } => {
                // Give the remote time to settle before reading it back.
                tokio::time::sleep(self.server_event_refresh_delay).await;
                self.coordinator.refresh(tx_id).await?;
            }
            NotificationKind::TransactionHandleError { tx_id } => {
                self.coordinator.refresh(tx_id).await?;
            }
            NotificationKind::TransactionCancelled { tx_id } => {
                self.coordinator.on_remote_cancelled(tx_id).await?;
            }
            NotificationKind::SignatureRevoked { tx_id } => {
                self.coordinator.revoke(tx_id).await?;
            }
            NotificationKind::GroupChanged { group_id }
            | NotificationKind::KeyNameChanged { group_id }
            | NotificationKind::WalletChanged { group_id } => {
                self.reconciler.sync_group(group_id).await?;
            }
            NotificationKind::AlertsChanged { group_id } => {
                self.reconciler.sync_alerts(group_id).await?;
            }
            NotificationKind::GroupMembershipRequestCreated { group_id } => {
                self.reconciler.sync_group(group_id).await?;
                self.reconciler.sync_alerts(group_id).await?;
            }
            NotificationKind::KeyHealthChanged {
                group_id,
                wallet_id,
            } => {
                self.reconciler.sync_key_health(group_id, wallet_id).await?;
            }
            NotificationKind::Other => return Ok(false),
        }
        Ok(true)
    }
}

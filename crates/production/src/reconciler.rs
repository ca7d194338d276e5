//! Reconciliation runs against the remote wallet service.
//!
//! One run fetches the complete remote list for a scope, diffs it against
//! the cached entities of that scope, and commits the diff as one batch. The
//! scope lock is held for the whole run. Any fetch failure aborts the run
//! before the commit, leaving the cache untouched.

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, RemoteError, SyncFailure};
use crate::locks::KeyedLocks;
use crate::metrics::CoordinatorMetrics;
use crate::traits::{EntityStore, RemoteWalletService};
use cosign_sync::{reconcile_entities, Diff, PageAccumulator, Reconcilable, ScopeKey, SyncConfig};
use cosign_types::{AccountContext, Alert, Group, GroupId, KeyHealthStatus, WalletId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a reconciliation run changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport<E> {
    /// Post-commit view of the scope, in remote order.
    pub entities: Vec<E>,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,

    /// Whether a store commit was issued.
    pub committed: bool,
}

impl<E: Clone> ReconcileReport<E> {
    fn from_diff(diff: &Diff<E>, committed: bool) -> Self {
        Self {
            entities: diff.view(),
            inserted: diff.to_insert.len(),
            updated: diff.to_update.len(),
            deleted: diff.to_delete.len(),
            committed,
        }
    }
}

/// Entity caches of one account.
pub struct EntityStores {
    pub alerts: Arc<dyn EntityStore<Alert>>,
    pub groups: Arc<dyn EntityStore<Group>>,
    pub key_health: Arc<dyn EntityStore<KeyHealthStatus>>,
}

/// Reconciles alerts, groups and key health for one account.
pub struct Reconciler {
    remote: Arc<dyn RemoteWalletService>,
    stores: EntityStores,
    account: AccountContext,
    config: SyncConfig,
    remote_timeout: Duration,
    locks: KeyedLocks<ScopeKey>,
    metrics: Arc<CoordinatorMetrics>,
}

impl Reconciler {
    pub fn new(
        config: &CoordinatorConfig,
        account: AccountContext,
        remote: Arc<dyn RemoteWalletService>,
        stores: EntityStores,
        metrics: Arc<CoordinatorMetrics>,
    ) -> Self {
        Self {
            remote,
            stores,
            account,
            config: config.sync.clone(),
            remote_timeout: config.remote_timeout,
            locks: KeyedLocks::new(),
            metrics,
        }
    }

    pub fn account(&self) -> &AccountContext {
        &self.account
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Alerts
    // ═══════════════════════════════════════════════════════════════════════════

    /// Reconcile every alert of `group_id`, page by page.
    pub async fn sync_alerts(
        &self,
        group_id: &GroupId,
    ) -> Result<ReconcileReport<Alert>, CoordinatorError> {
        let scope = ScopeKey::alerts(self.account.clone(), group_id.clone());
        let _guard = self.locks.lock(&scope).await;

        let mut pages = PageAccumulator::new(self.config.page_size, self.config.max_pages);
        while let Some(offset) = pages.next_offset() {
            let fetched = tokio::time::timeout(
                self.config.fetch_timeout,
                self.remote.fetch_alerts(group_id, offset),
            )
            .await;

            let page = match fetched {
                Ok(Ok(page)) => page,
                Ok(Err(err)) => return Err(self.incomplete(&scope, pages.pages(), err.into())),
                Err(_) => {
                    self.metrics.inc_reconciliation(scope.kind.name(), "timeout");
                    warn!(scope = %scope, offset, "Page fetch timed out");
                    return Err(CoordinatorError::Timeout {
                        operation: "fetch_alerts",
                        after: self.config.fetch_timeout,
                    });
                }
            };

            debug!(scope = %scope, offset, items = page.items.len(), "Fetched page");
            if let Err(err) = pages.push_page(page.items) {
                return Err(self.incomplete(&scope, pages.pages(), err.into()));
            }
        }

        let pages_fetched = pages.pages();
        let remote = pages
            .finish()
            .map_err(|err| self.incomplete(&scope, pages_fetched, err.into()))?;

        self.commit(self.stores.alerts.as_ref(), &scope, remote).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Groups
    // ═══════════════════════════════════════════════════════════════════════════

    /// Reconcile the whole group list of the account.
    pub async fn sync_groups(&self) -> Result<ReconcileReport<Group>, CoordinatorError> {
        let scope = ScopeKey::groups(self.account.clone());
        let _guard = self.locks.lock(&scope).await;

        let remote = self.fetch(&scope, "fetch_groups", self.remote.fetch_groups()).await?;
        self.commit(self.stores.groups.as_ref(), &scope, remote).await
    }

    /// Reconcile one group. Returns `None` if the group is deleted remotely,
    /// after dropping the local copy.
    pub async fn sync_group(&self, group_id: &GroupId) -> Result<Option<Group>, CoordinatorError> {
        let scope = ScopeKey::groups(self.account.clone());
        let _guard = self.locks.lock(&scope).await;

        let remote = self
            .fetch(&scope, "fetch_group", self.remote.fetch_group(group_id))
            .await?;

        let local: Vec<Group> = self
            .stores
            .groups
            .load(&scope)
            .await?
            .into_iter()
            .filter(|group| &group.id == group_id)
            .collect();

        let diff = reconcile_entities(vec![remote], local, &scope);
        let report = self.apply(self.stores.groups.as_ref(), &scope, diff).await?;
        if report.deleted > 0 && report.entities.is_empty() {
            info!(group_id = %group_id, "Group deleted remotely");
        }
        Ok(report.entities.into_iter().next())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Key health
    // ═══════════════════════════════════════════════════════════════════════════

    /// Reconcile the health-check status of every key of a group wallet.
    pub async fn sync_key_health(
        &self,
        group_id: &GroupId,
        wallet_id: &WalletId,
    ) -> Result<ReconcileReport<KeyHealthStatus>, CoordinatorError> {
        let scope = ScopeKey::key_health(self.account.clone(), group_id.clone(), wallet_id.clone());
        let _guard = self.locks.lock(&scope).await;

        let remote = self
            .fetch(
                &scope,
                "fetch_key_health",
                self.remote.fetch_key_health(group_id, wallet_id),
            )
            .await?;
        self.commit(self.stores.key_health.as_ref(), &scope, remote).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════════

    async fn fetch<T>(
        &self,
        scope: &ScopeKey,
        operation: &'static str,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, CoordinatorError> {
        match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(self.incomplete(scope, 0, err.into())),
            Err(_) => {
                self.metrics.inc_reconciliation(scope.kind.name(), "timeout");
                warn!(scope = %scope, operation, "Fetch timed out");
                Err(CoordinatorError::Timeout {
                    operation,
                    after: self.remote_timeout,
                })
            }
        }
    }

    async fn commit<E: Reconcilable>(
        &self,
        store: &dyn EntityStore<E>,
        scope: &ScopeKey,
        remote: Vec<E>,
    ) -> Result<ReconcileReport<E>, CoordinatorError> {
        let local = store.load(scope).await?;
        let diff = reconcile_entities(remote, local, scope);
        self.apply(store, scope, diff).await
    }

    async fn apply<E: Reconcilable>(
        &self,
        store: &dyn EntityStore<E>,
        scope: &ScopeKey,
        diff: Diff<E>,
    ) -> Result<ReconcileReport<E>, CoordinatorError> {
        if diff.is_noop() {
            self.metrics.inc_reconciliation(scope.kind.name(), "unchanged");
            debug!(scope = %scope, "Cache already up to date");
            return Ok(ReconcileReport::from_diff(&diff, false));
        }

        if let Err(err) = store.commit(scope, &diff).await {
            self.metrics.inc_reconciliation(scope.kind.name(), "store_error");
            warn!(scope = %scope, error = %err, "Commit failed");
            return Err(err.into());
        }

        self.metrics.inc_reconciliation(scope.kind.name(), "committed");
        info!(
            scope = %scope,
            inserted = diff.to_insert.len(),
            updated = diff.changed_updates(),
            deleted = diff.to_delete.len(),
            "Reconciled"
        );
        Ok(ReconcileReport::from_diff(&diff, true))
    }

    fn incomplete(&self, scope: &ScopeKey, pages: usize, cause: SyncFailure) -> CoordinatorError {
        self.metrics.inc_reconciliation(scope.kind.name(), "incomplete");
        warn!(scope = %scope, pages, error = %cause, "Sync aborted, cache unchanged");
        CoordinatorError::SyncIncomplete {
            scope: scope.to_string(),
            pages,
            cause,
        }
    }
}

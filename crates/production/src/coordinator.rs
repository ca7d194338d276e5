//! Transaction coordinator.
//!
//! Owns every tracked [`TransactionStateMachine`] plus the session's
//! [`BroadcastScheduler`], and executes the [`Action`]s they emit.
//!
//! # Serialization
//!
//! Each transaction sits behind its own async mutex. Every input for a
//! transaction (local signature, remote refresh, revocation, timer fire,
//! cancellation) takes that mutex and holds it until all resulting actions
//! have been executed, including awaited remote calls. Inputs for different
//! transactions run concurrently.
//!
//! ```text
//! input ──▶ lock(tx_id) ──▶ machine.apply_*() ──▶ actions ──▶ execute loop
//!                                                               │
//!            ThresholdReached ──▶ scheduler.schedule_or_broadcast_now
//!            RequestCoSign    ──▶ remote.request_co_sign ──▶ refresh_from_remote
//!            RefetchTransaction ─▶ remote.fetch_transaction ─▶ refresh_from_remote
//!            Broadcast        ──▶ backend.broadcast ──▶ on_broadcast_accepted
//!            SetTimer / CancelTimer ──▶ BroadcastTimers
//!            StopTracking     ──▶ drop timers and entry
//! ```

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, RemoteError};
use crate::metrics::{BroadcastLabel, CoordinatorMetrics};
use crate::signer::{CollaboratorInbox, SignerAdapter};
use crate::timers::BroadcastTimers;
use crate::traits::{RemoteWalletService, SigningBackend};
use cosign_broadcast::{BroadcastDecision, BroadcastScheduler};
use cosign_core::{Action, Clock, StateMachine, TimerId};
use cosign_transaction::{TransactionStateMachine, Transition};
use cosign_types::{
    Fingerprint, SignatureProof, SignerKind, Transaction, TransactionSnapshot, TransactionStatus,
    TxId, WalletKind,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Result of a broadcast attempt, published on the outcome channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// The network accepted the transaction.
    Submitted { tx_id: TxId, network_tx_id: TxId },

    /// Submission failed. The transaction stays `ReadyToBroadcast` and may
    /// be retried with [`TransactionCoordinator::schedule_broadcast`].
    Failed { tx_id: TxId, error: CoordinatorError },
}

impl BroadcastOutcome {
    pub fn tx_id(&self) -> &TxId {
        match self {
            BroadcastOutcome::Submitted { tx_id, .. } | BroadcastOutcome::Failed { tx_id, .. } => {
                tx_id
            }
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, BroadcastOutcome::Submitted { .. })
    }
}

type TrackedEntry = Arc<AsyncMutex<TransactionStateMachine>>;

/// Coordinates signing and broadcasting of every tracked transaction.
pub struct TransactionCoordinator {
    tracked: DashMap<TxId, TrackedEntry>,
    scheduler: Mutex<BroadcastScheduler>,
    timers: BroadcastTimers,
    inbox: Arc<CollaboratorInbox>,
    remote: Arc<dyn RemoteWalletService>,
    backend: Arc<dyn SigningBackend>,
    clock: Arc<dyn Clock>,
    metrics: Arc<CoordinatorMetrics>,
    outcomes: broadcast::Sender<BroadcastOutcome>,
    remote_timeout: Duration,
    backend_timeout: Duration,
}

impl TransactionCoordinator {
    pub fn new(
        config: &CoordinatorConfig,
        remote: Arc<dyn RemoteWalletService>,
        backend: Arc<dyn SigningBackend>,
        clock: Arc<dyn Clock>,
        metrics: Arc<CoordinatorMetrics>,
        timers: BroadcastTimers,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(64);
        Self {
            tracked: DashMap::new(),
            scheduler: Mutex::new(BroadcastScheduler::new(config.broadcast.clone())),
            timers,
            inbox: Arc::new(CollaboratorInbox::new()),
            remote,
            backend,
            clock,
            metrics,
            outcomes,
            remote_timeout: config.remote_timeout,
            backend_timeout: config.backend_timeout,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Tracking
    // ═══════════════════════════════════════════════════════════════════════════

    /// Start tracking a locally created transaction.
    pub fn track(&self, tx: Transaction, wallet_kind: WalletKind) -> Result<(), CoordinatorError> {
        self.insert(TransactionStateMachine::new(tx, wallet_kind))
    }

    /// Start tracking a transaction loaded from the remote service.
    pub fn track_snapshot(
        &self,
        snapshot: TransactionSnapshot,
        wallet_kind: WalletKind,
    ) -> Result<(), CoordinatorError> {
        self.insert(TransactionStateMachine::from_snapshot(snapshot, wallet_kind))
    }

    fn insert(&self, machine: TransactionStateMachine) -> Result<(), CoordinatorError> {
        let tx_id = machine.tx_id().clone();
        if machine.status().is_terminal() {
            debug!(tx_id = %tx_id, status = %machine.status(), "Not tracking terminal transaction");
            return Ok(());
        }
        match self.tracked.entry(tx_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(CoordinatorError::AlreadyTracked(tx_id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                info!(tx_id = %tx_id, status = %machine.status(), "Tracking transaction");
                slot.insert(Arc::new(AsyncMutex::new(machine)));
                Ok(())
            }
        }
    }

    pub fn is_tracked(&self, tx_id: &TxId) -> bool {
        self.tracked.contains_key(tx_id)
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Current status, or `None` once the transaction is no longer tracked.
    pub async fn status(&self, tx_id: &TxId) -> Option<TransactionStatus> {
        let entry = self.lock(tx_id).await.ok()?;
        Some(entry.status())
    }

    /// Copy of the tracked transaction.
    pub async fn transaction(&self, tx_id: &TxId) -> Option<Transaction> {
        let entry = self.lock(tx_id).await.ok()?;
        Some(entry.transaction().clone())
    }

    /// Time the armed broadcast timer fires, if any.
    pub fn scheduled_at(&self, tx_id: &TxId) -> Option<Duration> {
        self.scheduler.lock().scheduled_at(tx_id)
    }

    /// Time the armed signing-time reload fires, if any.
    pub fn refresh_at(&self, tx_id: &TxId) -> Option<Duration> {
        self.scheduler.lock().refresh_at(tx_id)
    }

    /// Inbox shared by the collaborator signers of tracked transactions.
    pub fn inbox(&self) -> &Arc<CollaboratorInbox> {
        &self.inbox
    }

    /// Hand a collaborator's proof to its waiting signer.
    ///
    /// Proofs for untracked transactions are dropped and `false` is
    /// returned. The tracked-map guard is held across the delivery, so a
    /// proof cannot slip in after [`Action::StopTracking`] cleared the inbox.
    pub fn deliver_collaborator_proof(&self, tx_id: &TxId, proof: SignatureProof) -> bool {
        let Some(_tracked) = self.tracked.get(tx_id) else {
            debug!(tx_id = %tx_id, signer = %proof.fingerprint, "Proof for untracked transaction dropped");
            return false;
        };
        self.inbox.deliver(tx_id, proof);
        true
    }

    /// Receive every broadcast outcome from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastOutcome> {
        self.outcomes.subscribe()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Signing
    // ═══════════════════════════════════════════════════════════════════════════

    /// Apply a partial signature claimed by `fingerprint`.
    ///
    /// A duplicate signature is an idempotent success that also retries a
    /// co-sign request the first delivery could not get acknowledged. Once
    /// the signature is accepted, a failed broadcast at the threshold does
    /// not fail the call: it is published as [`BroadcastOutcome::Failed`]
    /// and retried with [`schedule_broadcast`](Self::schedule_broadcast).
    pub async fn apply_signature(
        &self,
        tx_id: &TxId,
        fingerprint: &Fingerprint,
        proof: SignatureProof,
    ) -> Result<TransactionStatus, CoordinatorError> {
        let mut machine = self.lock(tx_id).await?;
        let actions = match machine.apply_signature(fingerprint, proof) {
            Ok(transition) => {
                self.metrics.inc_signature_applied();
                transition.actions
            }
            Err(err) if err.is_benign() => {
                self.metrics.inc_duplicate_signature();
                debug!(tx_id = %tx_id, fingerprint = %fingerprint, "Duplicate signature ignored");
                machine.resume()
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(err) = self.run(&mut machine, actions).await? {
            debug!(tx_id = %tx_id, error = %err, "Signature kept, broadcast left for retry");
        }
        Ok(machine.status())
    }

    /// Sign with `signer` and apply the result.
    ///
    /// The transaction lock is released while the signer works, so a slow
    /// hardware card or collaborator does not block refreshes.
    pub async fn sign_with(
        &self,
        tx_id: &TxId,
        signer: &SignerAdapter,
    ) -> Result<TransactionStatus, CoordinatorError> {
        let psbt = {
            let machine = self.lock(tx_id).await?;
            machine.transaction().psbt.clone()
        };
        let timeout = match signer.descriptor().kind {
            SignerKind::ServerKey | SignerKind::RemoteCollaborator => self.remote_timeout,
            SignerKind::Software | SignerKind::HardwareCard => self.backend_timeout,
        };
        let proof = signer.sign(tx_id, &psbt, timeout).await?;
        self.apply_signature(tx_id, signer.fingerprint(), proof).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Remote updates
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fetch the authoritative snapshot and apply it.
    ///
    /// A remote answer of "cancelled" cancels the transaction locally.
    pub async fn refresh(&self, tx_id: &TxId) -> Result<TransactionStatus, CoordinatorError> {
        let mut machine = self.lock(tx_id).await?;
        let fetched = self
            .remote_call("fetch_transaction", self.remote.fetch_transaction(tx_id))
            .await;

        match fetched {
            Ok(snapshot) => {
                let actions = self.apply_remote(&mut machine, snapshot)?;
                self.execute(&mut machine, actions).await?;
            }
            Err(CoordinatorError::Remote(RemoteError::TransactionCancelled(_))) => {
                let transition = machine.cancel()?;
                self.execute(&mut machine, transition.actions).await?;
            }
            Err(err) => return Err(err),
        }
        Ok(machine.status())
    }

    /// Apply a remote snapshot that was delivered rather than fetched.
    pub async fn apply_snapshot(
        &self,
        snapshot: TransactionSnapshot,
    ) -> Result<TransactionStatus, CoordinatorError> {
        let mut machine = self.lock(&snapshot.transaction.id).await?;
        let actions = self.apply_remote(&mut machine, snapshot)?;
        self.execute(&mut machine, actions).await?;
        Ok(machine.status())
    }

    /// A signature was revoked remotely: hard-refresh from the remote.
    ///
    /// Dropping back to `PendingSignatures` disarms the broadcast timer.
    pub async fn revoke(&self, tx_id: &TxId) -> Result<TransactionStatus, CoordinatorError> {
        let mut machine = self.lock(tx_id).await?;
        let snapshot = self
            .remote_call("fetch_transaction", self.remote.fetch_transaction(tx_id))
            .await?;
        let transition = machine.apply_revocation(snapshot)?;
        let actions = self.after_revocation(&machine, transition);
        self.execute(&mut machine, actions).await?;
        Ok(machine.status())
    }

    /// Cancel the transaction locally.
    pub async fn cancel(&self, tx_id: &TxId) -> Result<(), CoordinatorError> {
        let mut machine = self.lock(tx_id).await?;
        let transition = machine.cancel()?;
        self.execute(&mut machine, transition.actions).await
    }

    /// The remote reported the transaction as cancelled.
    ///
    /// An untracked or already terminal transaction is left alone.
    pub async fn on_remote_cancelled(&self, tx_id: &TxId) -> Result<(), CoordinatorError> {
        let mut machine = match self.lock(tx_id).await {
            Ok(machine) => machine,
            Err(CoordinatorError::UnknownTransaction(_)) => {
                debug!(tx_id = %tx_id, "Cancellation for untracked transaction");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if machine.status().is_terminal() {
            return Ok(());
        }
        let transition = machine.cancel()?;
        self.execute(&mut machine, transition.actions).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Broadcast
    // ═══════════════════════════════════════════════════════════════════════════

    /// Broadcast a ready transaction now, or arm its timer.
    ///
    /// Also used to retry after a failed broadcast.
    pub async fn schedule_broadcast(
        &self,
        tx_id: &TxId,
    ) -> Result<BroadcastDecision, CoordinatorError> {
        let mut machine = self.lock(tx_id).await?;
        let (decision, actions) = self.schedule(&machine)?;
        self.execute(&mut machine, actions).await?;
        Ok(decision)
    }

    /// Disarm the local broadcast timer.
    ///
    /// Cancel wins over a timer that has fired but not yet been processed.
    pub async fn cancel_schedule(&self, tx_id: &TxId) -> Result<(), CoordinatorError> {
        let mut machine = self.lock(tx_id).await?;
        let actions = self.with_scheduler(|scheduler| scheduler.cancel_schedule(tx_id));
        if !actions.is_empty() {
            self.metrics.inc_broadcast(BroadcastLabel::Cancelled);
            info!(tx_id = %tx_id, "Scheduled broadcast cancelled");
        }
        self.execute(&mut machine, actions).await
    }

    /// Ask the server to cancel its scheduled broadcast, then apply its answer.
    ///
    /// The server withdraws its signature, so the answer is applied as a
    /// hard refresh.
    pub async fn cancel_remote_schedule(
        &self,
        tx_id: &TxId,
    ) -> Result<TransactionStatus, CoordinatorError> {
        let mut machine = self.lock(tx_id).await?;
        let snapshot = self
            .remote_call(
                "cancel_scheduled_broadcast",
                self.remote.cancel_scheduled_broadcast(tx_id),
            )
            .await?;
        let mut actions = self.with_scheduler(|scheduler| scheduler.cancel_schedule(tx_id));
        if !actions.is_empty() {
            self.metrics.inc_broadcast(BroadcastLabel::Cancelled);
        }
        let transition = machine.apply_revocation(snapshot)?;
        actions.extend(self.after_revocation(&machine, transition));
        self.execute(&mut machine, actions).await?;
        Ok(machine.status())
    }

    /// Handle a timer delivered by [`BroadcastTimers`].
    pub async fn on_timer_fired(&self, id: &TimerId) -> Result<(), CoordinatorError> {
        let mut machine = match self.lock(id.tx_id()).await {
            Ok(machine) => machine,
            Err(CoordinatorError::UnknownTransaction(_)) => {
                debug!(timer = %id, "Timer for untracked transaction");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let actions = self.with_scheduler(|scheduler| scheduler.on_timer_fired(id));
        self.execute(&mut machine, actions).await
    }

    /// The broadcast transaction was mined.
    pub async fn on_confirmed(&self, tx_id: &TxId) -> Result<(), CoordinatorError> {
        let mut machine = self.lock(tx_id).await?;
        let transition = machine.on_confirmed()?;
        self.execute(&mut machine, transition.actions).await
    }

    /// The network rejected the transaction.
    pub async fn on_rejected(&self, tx_id: &TxId) -> Result<(), CoordinatorError> {
        let mut machine = self.lock(tx_id).await?;
        let transition = machine.on_rejected()?;
        self.execute(&mut machine, transition.actions).await
    }

    /// Disarm every timer and stop accepting new ones.
    pub fn close(&self) {
        let actions = self.with_scheduler(BroadcastScheduler::cancel_all);
        for action in actions {
            if let Action::CancelTimer { id } = action {
                self.timers.cancel_timer(&id);
            }
        }
        self.timers.shutdown();
        self.inbox.clear();
        info!(tracked = self.tracked.len(), "Coordinator closed");
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Action execution
    // ═══════════════════════════════════════════════════════════════════════════

    async fn execute(
        &self,
        machine: &mut TransactionStateMachine,
        actions: Vec<Action>,
    ) -> Result<(), CoordinatorError> {
        match self.run(machine, actions).await? {
            Some(broadcast_failure) => Err(broadcast_failure),
            None => Ok(()),
        }
    }

    /// Execute `actions` and everything they lead to.
    ///
    /// A failed broadcast does not stop the loop. It has already been
    /// published on the outcome channel and is returned once the queue
    /// drains. Any other failure aborts at once.
    async fn run(
        &self,
        machine: &mut TransactionStateMachine,
        actions: Vec<Action>,
    ) -> Result<Option<CoordinatorError>, CoordinatorError> {
        let mut queue: VecDeque<Action> = actions.into();
        let mut broadcast_failure = None;

        while let Some(action) = queue.pop_front() {
            debug!(tx_id = %machine.tx_id(), action = action.type_name(), "Executing action");

            match action {
                Action::ThresholdReached { .. } => {
                    let (_, follow_up) = self.schedule(machine)?;
                    queue.extend(follow_up);
                }

                Action::RequestCoSign { tx_id, psbt } => {
                    self.metrics.inc_co_sign_request();
                    let snapshot = self
                        .remote_call("request_co_sign", self.remote.request_co_sign(&tx_id, &psbt))
                        .await?;
                    machine.on_co_sign_sent();
                    queue.extend(self.apply_remote(machine, snapshot)?);
                }

                Action::RefetchTransaction { tx_id } => {
                    let snapshot = self
                        .remote_call("fetch_transaction", self.remote.fetch_transaction(&tx_id))
                        .await?;
                    queue.extend(self.apply_remote(machine, snapshot)?);
                }

                Action::Broadcast { .. } => match self.broadcast(machine).await {
                    Ok(follow_up) => queue.extend(follow_up),
                    Err(err) => broadcast_failure = Some(err),
                },

                Action::SetTimer { id, delay } => self.timers.set_timer(id, delay),

                Action::CancelTimer { id } => self.timers.cancel_timer(&id),

                Action::StopTracking { tx_id } => {
                    queue.extend(self.with_scheduler(|scheduler| scheduler.forget(&tx_id)));
                    self.tracked.remove(&tx_id);
                    self.inbox.forget(&tx_id);
                    info!(tx_id = %tx_id, status = %machine.status(), "Stopped tracking");
                }
            }
        }
        Ok(broadcast_failure)
    }

    /// Apply a remote snapshot and derive the scheduling follow-ups.
    fn apply_remote(
        &self,
        machine: &mut TransactionStateMachine,
        snapshot: TransactionSnapshot,
    ) -> Result<Vec<Action>, CoordinatorError> {
        let was_ready = machine.status() == TransactionStatus::ReadyToBroadcast;
        let broadcast_time = machine
            .server_transaction()
            .and_then(|server_tx| server_tx.broadcast_time());

        let Transition { status, mut actions } = machine.refresh_from_remote(snapshot)?;

        let moved = machine
            .server_transaction()
            .and_then(|server_tx| server_tx.broadcast_time())
            != broadcast_time;
        if was_ready && status == TransactionStatus::ReadyToBroadcast && moved {
            actions.push(Action::ThresholdReached {
                tx_id: machine.tx_id().clone(),
            });
        }
        if status == TransactionStatus::PendingSignatures {
            let tx_id = machine.tx_id().clone();
            let server_tx = machine.server_transaction();
            actions.extend(
                self.with_scheduler(|scheduler| scheduler.schedule_signing_refresh(&tx_id, server_tx)),
            );
        }
        Ok(actions)
    }

    fn after_revocation(
        &self,
        machine: &TransactionStateMachine,
        transition: Transition,
    ) -> Vec<Action> {
        let mut actions = transition.actions;
        if transition.status == TransactionStatus::PendingSignatures {
            let cancelled = self.with_scheduler(|scheduler| scheduler.cancel_schedule(machine.tx_id()));
            actions.extend(cancelled);
        }
        actions
    }

    fn schedule(
        &self,
        machine: &TransactionStateMachine,
    ) -> Result<(BroadcastDecision, Vec<Action>), CoordinatorError> {
        let (decision, mut actions) = self.with_scheduler(|scheduler| {
            scheduler.schedule_or_broadcast_now(machine.transaction(), machine.server_transaction())
        })?;
        if let BroadcastDecision::ScheduleAt(_) = decision {
            self.metrics.inc_broadcast(BroadcastLabel::Scheduled);
        }
        // Once fully signed, the server signing time no longer matters.
        actions.extend(
            self.with_scheduler(|scheduler| scheduler.cancel_signing_refresh(machine.tx_id())),
        );
        Ok((decision, actions))
    }

    async fn broadcast(
        &self,
        machine: &mut TransactionStateMachine,
    ) -> Result<Vec<Action>, CoordinatorError> {
        let tx_id = machine.tx_id().clone();
        if machine.status() != TransactionStatus::ReadyToBroadcast {
            debug!(tx_id = %tx_id, status = %machine.status(), "Skipping broadcast");
            return Ok(vec![]);
        }

        let psbt = machine.transaction().psbt.clone();
        let submitted = self
            .timed("broadcast", self.backend_timeout, self.backend.broadcast(&psbt))
            .await;

        match submitted {
            Ok(network_tx_id) => {
                let transition = machine.on_broadcast_accepted()?;
                self.metrics.inc_broadcast(BroadcastLabel::Submitted);
                info!(tx_id = %tx_id, network_tx_id = %network_tx_id, "Broadcast submitted");
                self.publish(BroadcastOutcome::Submitted {
                    tx_id,
                    network_tx_id,
                });
                Ok(transition.actions)
            }
            Err(err) => {
                self.metrics.inc_broadcast(BroadcastLabel::Failed);
                warn!(tx_id = %tx_id, error = %err, "Broadcast failed");
                self.publish(BroadcastOutcome::Failed {
                    tx_id,
                    error: err.clone(),
                });
                Err(err)
            }
        }
    }

    fn publish(&self, outcome: BroadcastOutcome) {
        // No subscribers is fine.
        let _ = self.outcomes.send(outcome);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════════

    async fn lock(
        &self,
        tx_id: &TxId,
    ) -> Result<OwnedMutexGuard<TransactionStateMachine>, CoordinatorError> {
        let entry = self
            .tracked
            .get(tx_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CoordinatorError::UnknownTransaction(tx_id.clone()))?;
        Ok(entry.lock_owned().await)
    }

    fn with_scheduler<R>(&self, f: impl FnOnce(&mut BroadcastScheduler) -> R) -> R {
        let mut scheduler = self.scheduler.lock();
        scheduler.set_time(self.clock.now());
        f(&mut scheduler)
    }

    async fn remote_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, CoordinatorError> {
        self.timed(operation, self.remote_timeout, call).await
    }

    async fn timed<T, E>(
        &self,
        operation: &'static str,
        after: Duration,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<T, CoordinatorError>
    where
        CoordinatorError: From<E>,
    {
        match tokio::time::timeout(after, call).await {
            Ok(result) => result.map_err(CoordinatorError::from),
            Err(_) => {
                warn!(operation, after_ms = after.as_millis(), "Call timed out");
                Err(CoordinatorError::Timeout { operation, after })
            }
        }
    }
}

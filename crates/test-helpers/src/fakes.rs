//! In-memory collaborators with failure injection.

use crate::fixtures;
use async_trait::async_trait;
use cosign_production::{BackendError, Page, RemoteError, RemoteWalletService, SigningBackend};
use cosign_types::{
    Alert, Group, GroupId, KeyHealthStatus, Psbt, SignatureProof, SignerDescriptor,
    TransactionSnapshot, TxId, WalletId,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════
// Remote wallet service
// ═══════════════════════════════════════════════════════════════════════════

/// Remote wallet service backed by maps.
///
/// Alerts are served in pages of `page_size`. Every call first waits for the
/// configured latency, which lets paused-time tests observe overlap.
pub struct FakeRemote {
    page_size: usize,
    latency: Mutex<Duration>,
    alerts: Mutex<HashMap<GroupId, Vec<Alert>>>,
    groups: Mutex<Vec<Group>>,
    key_health: Mutex<HashMap<(GroupId, WalletId), Vec<KeyHealthStatus>>>,
    transactions: Mutex<HashMap<TxId, TransactionSnapshot>>,
    co_sign: Mutex<HashMap<TxId, TransactionSnapshot>>,
    cancelled: Mutex<HashSet<TxId>>,
    alert_failures: Mutex<HashMap<usize, RemoteError>>,
    transaction_failure: Mutex<Option<RemoteError>>,

    alert_calls: AtomicUsize,
    group_calls: AtomicUsize,
    transaction_calls: AtomicUsize,
    co_sign_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRemote {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            latency: Mutex::new(Duration::ZERO),
            alerts: Mutex::new(HashMap::new()),
            groups: Mutex::new(Vec::new()),
            key_health: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            co_sign: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(HashSet::new()),
            alert_failures: Mutex::new(HashMap::new()),
            transaction_failure: Mutex::new(None),
            alert_calls: AtomicUsize::new(0),
            group_calls: AtomicUsize::new(0),
            transaction_calls: AtomicUsize::new(0),
            co_sign_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn set_alerts(&self, group_id: GroupId, alerts: Vec<Alert>) {
        self.alerts.lock().insert(group_id, alerts);
    }

    pub fn set_groups(&self, groups: Vec<Group>) {
        *self.groups.lock() = groups;
    }

    /// Insert or replace one group.
    pub fn set_group(&self, group: Group) {
        let mut groups = self.groups.lock();
        groups.retain(|g| g.id != group.id);
        groups.push(group);
    }

    pub fn set_key_health(&self, group_id: GroupId, wallet_id: WalletId, keys: Vec<KeyHealthStatus>) {
        self.key_health.lock().insert((group_id, wallet_id), keys);
    }

    /// Snapshot returned by `fetch_transaction` and `cancel_scheduled_broadcast`.
    pub fn set_transaction(&self, snapshot: TransactionSnapshot) {
        self.transactions
            .lock()
            .insert(snapshot.transaction.id.clone(), snapshot);
    }

    /// Snapshot returned by `request_co_sign`. Also becomes the fetched one.
    pub fn set_co_sign_response(&self, snapshot: TransactionSnapshot) {
        self.co_sign
            .lock()
            .insert(snapshot.transaction.id.clone(), snapshot);
    }

    /// Make `fetch_transaction` answer "cancelled".
    pub fn cancel_transaction(&self, tx_id: TxId) {
        self.cancelled.lock().insert(tx_id);
    }

    /// Fail the `call`-th `fetch_alerts` call (1-based) with `error`.
    pub fn fail_alerts_on_call(&self, call: usize, error: RemoteError) {
        self.alert_failures.lock().insert(call, error);
    }

    /// Fail every `fetch_transaction` call with `error`.
    pub fn fail_transactions(&self, error: RemoteError) {
        *self.transaction_failure.lock() = Some(error);
    }

    pub fn alert_calls(&self) -> usize {
        self.alert_calls.load(Ordering::SeqCst)
    }

    pub fn group_calls(&self) -> usize {
        self.group_calls.load(Ordering::SeqCst)
    }

    pub fn transaction_calls(&self) -> usize {
        self.transaction_calls.load(Ordering::SeqCst)
    }

    pub fn co_sign_calls(&self) -> usize {
        self.co_sign_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn snapshot_of(&self, tx_id: &TxId) -> Result<TransactionSnapshot, RemoteError> {
        if self.cancelled.lock().contains(tx_id) {
            return Err(RemoteError::TransactionCancelled(tx_id.clone()));
        }
        if let Some(err) = self.transaction_failure.lock().clone() {
            return Err(err);
        }
        self.transactions
            .lock()
            .get(tx_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(tx_id.to_string()))
    }
}

#[async_trait]
impl RemoteWalletService for FakeRemote {
    async fn fetch_alerts(&self, group_id: &GroupId, offset: usize) -> Result<Page<Alert>, RemoteError> {
        let call = self.alert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.enter().await;
        let result = match self.alert_failures.lock().remove(&call) {
            Some(err) => Err(err),
            None => {
                let alerts = self.alerts.lock();
                let items = alerts
                    .get(group_id)
                    .map(|all| all.iter().skip(offset).take(self.page_size).cloned().collect())
                    .unwrap_or_default();
                Ok(Page::new(items))
            }
        };
        self.leave();
        result
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>, RemoteError> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let groups = self.groups.lock().clone();
        self.leave();
        Ok(groups)
    }

    async fn fetch_group(&self, group_id: &GroupId) -> Result<Group, RemoteError> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let found = self.groups.lock().iter().find(|g| &g.id == group_id).cloned();
        self.leave();
        found.ok_or_else(|| RemoteError::NotFound(group_id.to_string()))
    }

    async fn fetch_key_health(
        &self,
        group_id: &GroupId,
        wallet_id: &WalletId,
    ) -> Result<Vec<KeyHealthStatus>, RemoteError> {
        self.enter().await;
        let keys = self
            .key_health
            .lock()
            .get(&(group_id.clone(), wallet_id.clone()))
            .cloned()
            .unwrap_or_default();
        self.leave();
        Ok(keys)
    }

    async fn fetch_transaction(&self, tx_id: &TxId) -> Result<TransactionSnapshot, RemoteError> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let result = self.snapshot_of(tx_id);
        self.leave();
        result
    }

    async fn request_co_sign(&self, tx_id: &TxId, _psbt: &Psbt) -> Result<TransactionSnapshot, RemoteError> {
        self.co_sign_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let response = self.co_sign.lock().get(tx_id).cloned();
        self.leave();
        let snapshot = response.ok_or_else(|| RemoteError::NotFound(tx_id.to_string()))?;
        self.set_transaction(snapshot.clone());
        Ok(snapshot)
    }

    async fn cancel_scheduled_broadcast(&self, tx_id: &TxId) -> Result<TransactionSnapshot, RemoteError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let result = self.snapshot_of(tx_id);
        self.leave();
        result
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Signing backend
// ═══════════════════════════════════════════════════════════════════════════

/// Signing backend that signs with [`fixtures::proof`] and records broadcasts.
#[derive(Default)]
pub struct FakeBackend {
    latency: Mutex<Duration>,
    broadcasts: Mutex<Vec<Psbt>>,
    broadcast_failure: Mutex<Option<BackendError>>,
    sign_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Fail every broadcast with `error` until cleared.
    pub fn fail_broadcasts(&self, error: Option<BackendError>) {
        *self.broadcast_failure.lock() = error;
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().len()
    }

    pub fn broadcasts(&self) -> Vec<Psbt> {
        self.broadcasts.lock().clone()
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SigningBackend for FakeBackend {
    async fn sign(&self, signer: &SignerDescriptor, _psbt: &Psbt) -> Result<SignatureProof, BackendError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        Ok(fixtures::proof(&signer.fingerprint))
    }

    async fn broadcast(&self, psbt: &Psbt) -> Result<TxId, BackendError> {
        self.wait().await;
        if let Some(err) = self.broadcast_failure.lock().clone() {
            return Err(err);
        }
        let mut broadcasts = self.broadcasts.lock();
        broadcasts.push(psbt.clone());
        Ok(TxId::new(format!("net-{}", broadcasts.len())))
    }
}

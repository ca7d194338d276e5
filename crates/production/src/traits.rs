//! Interfaces of the external collaborators.
//!
//! The core never talks to the network, the signing device, or the database
//! directly. It goes through these traits, and every call is awaited with a
//! caller-supplied timeout.

use crate::error::{BackendError, RemoteError, StoreError};
use async_trait::async_trait;
use cosign_sync::{Diff, Reconcilable, ScopeKey};
use cosign_types::{
    Alert, Group, GroupId, KeyHealthStatus, Psbt, SignatureProof, SignerDescriptor,
    TransactionSnapshot, TxId, WalletId,
};

/// One page of an offset-paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// Create a page.
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

/// Native signing and PSBT backend. Treated as opaque and trusted.
#[async_trait]
pub trait SigningBackend: Send + Sync {
    /// Produce a partial signature with the key described by `signer`.
    async fn sign(
        &self,
        signer: &SignerDescriptor,
        psbt: &Psbt,
    ) -> Result<SignatureProof, BackendError>;

    /// Finalize and submit a fully-signed transaction.
    async fn broadcast(&self, psbt: &Psbt) -> Result<TxId, BackendError>;
}

/// The remote authoritative wallet service.
#[async_trait]
pub trait RemoteWalletService: Send + Sync {
    /// One page of a group's alerts, starting at `offset`.
    async fn fetch_alerts(&self, group_id: &GroupId, offset: usize)
        -> Result<Page<Alert>, RemoteError>;

    /// All groups of the account, including deleted ones.
    async fn fetch_groups(&self) -> Result<Vec<Group>, RemoteError>;

    /// One group.
    async fn fetch_group(&self, group_id: &GroupId) -> Result<Group, RemoteError>;

    /// Health-check status of every key of a group wallet.
    async fn fetch_key_health(
        &self,
        group_id: &GroupId,
        wallet_id: &WalletId,
    ) -> Result<Vec<KeyHealthStatus>, RemoteError>;

    /// Authoritative snapshot of a transaction.
    async fn fetch_transaction(&self, tx_id: &TxId) -> Result<TransactionSnapshot, RemoteError>;

    /// Ask the server key to co-sign.
    ///
    /// Returns the updated snapshot, including the server record.
    async fn request_co_sign(
        &self,
        tx_id: &TxId,
        psbt: &Psbt,
    ) -> Result<TransactionSnapshot, RemoteError>;

    /// Cancel a server-side scheduled broadcast.
    async fn cancel_scheduled_broadcast(
        &self,
        tx_id: &TxId,
    ) -> Result<TransactionSnapshot, RemoteError>;
}

/// Local cache of one entity kind.
#[async_trait]
pub trait EntityStore<E: Reconcilable>: Send + Sync {
    /// Cached entities within `scope`.
    async fn load(&self, scope: &ScopeKey) -> Result<Vec<E>, StoreError>;

    /// Apply inserts, updates and deletes as one atomic batch.
    ///
    /// On error nothing is applied.
    async fn commit(&self, scope: &ScopeKey, diff: &Diff<E>) -> Result<(), StoreError>;
}

//! Multisig transaction records.

use crate::{Fingerprint, Psbt, TxId, WalletId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Signing and broadcast status of a transaction.
///
/// ```text
/// PendingSignatures ─▶ ReadyToBroadcast ─▶ PendingConfirmation ─▶ Confirmed
///        ▲                  │      │                 │
///        └── revocation ────┘      └────▶ Rejected ◀─┘
///
/// any non-terminal ─▶ Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Waiting for more partial signatures.
    PendingSignatures,
    /// Threshold reached; waiting to be broadcast.
    ReadyToBroadcast,
    /// Broadcast accepted; waiting for a confirmation.
    PendingConfirmation,
    /// Mined.
    Confirmed,
    /// Rejected by the network.
    Rejected,
    /// Cancelled by a participant.
    Cancelled,
}

impl TransactionStatus {
    /// Terminal states accept no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Confirmed | TransactionStatus::Rejected | TransactionStatus::Cancelled
        )
    }

    /// Get a human-readable name for this status.
    pub fn name(self) -> &'static str {
        match self {
            TransactionStatus::PendingSignatures => "PendingSignatures",
            TransactionStatus::ReadyToBroadcast => "ReadyToBroadcast",
            TransactionStatus::PendingConfirmation => "PendingConfirmation",
            TransactionStatus::Confirmed => "Confirmed",
            TransactionStatus::Rejected => "Rejected",
            TransactionStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One logical spend being signed by an M-of-N wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable identifier.
    pub id: TxId,
    /// Wallet the spend belongs to.
    pub wallet_id: WalletId,
    /// Current PSBT. Replaced wholesale on every update.
    pub psbt: Psbt,
    /// Signer fingerprint to "has signed", in wallet key order.
    pub signers: IndexMap<Fingerprint, bool>,
    /// Current status.
    pub status: TransactionStatus,
    /// Signatures required (the M of M-of-N).
    pub required_signatures: usize,
}

impl Transaction {
    /// Create a new unsigned transaction awaiting signatures.
    pub fn new(
        id: TxId,
        wallet_id: WalletId,
        psbt: Psbt,
        signers: impl IntoIterator<Item = Fingerprint>,
        required_signatures: usize,
    ) -> Self {
        Self {
            id,
            wallet_id,
            psbt,
            signers: signers.into_iter().map(|fp| (fp, false)).collect(),
            status: TransactionStatus::PendingSignatures,
            required_signatures,
        }
    }

    /// Number of signers that have signed.
    pub fn signed_count(&self) -> usize {
        self.signers.values().filter(|signed| **signed).count()
    }

    /// Whether the signed count meets the threshold.
    pub fn threshold_met(&self) -> bool {
        self.signed_count() >= self.required_signatures
    }

    /// Whether `fingerprint` is part of the signer set.
    pub fn has_signer(&self, fingerprint: &Fingerprint) -> bool {
        self.signers.contains_key(fingerprint)
    }

    /// Whether `fingerprint` has already signed.
    pub fn is_signed_by(&self, fingerprint: &Fingerprint) -> bool {
        self.signers.get(fingerprint).copied().unwrap_or(false)
    }
}

/// Server-side companion record of a server-assisted transaction.
///
/// Times are unix milliseconds; zero means "not set".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTransaction {
    /// Transaction this record belongs to.
    pub tx_id: TxId,
    /// Earliest time the wallet policy allows broadcast.
    #[serde(rename = "broadcastTimeInMillis", default)]
    pub broadcast_time_millis: u64,
    /// Time the server key signs (or signed).
    #[serde(rename = "signedInMillis", default)]
    pub signed_in_millis: u64,
}

impl ServerTransaction {
    /// Create a record with no scheduled times.
    pub fn new(tx_id: TxId) -> Self {
        Self {
            tx_id,
            broadcast_time_millis: 0,
            signed_in_millis: 0,
        }
    }

    /// Set the broadcast time.
    pub fn with_broadcast_time(mut self, at: Duration) -> Self {
        self.broadcast_time_millis = at.as_millis() as u64;
        self
    }

    /// Set the signing time.
    pub fn with_signed_time(mut self, at: Duration) -> Self {
        self.signed_in_millis = at.as_millis() as u64;
        self
    }

    /// Scheduled broadcast time, if any.
    pub fn broadcast_time(&self) -> Option<Duration> {
        (self.broadcast_time_millis != 0).then(|| Duration::from_millis(self.broadcast_time_millis))
    }

    /// Server signing time, if any.
    pub fn signed_time(&self) -> Option<Duration> {
        (self.signed_in_millis != 0).then(|| Duration::from_millis(self.signed_in_millis))
    }
}

/// A transaction as fetched from the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    /// Remote view of the transaction.
    pub transaction: Transaction,
    /// Server-side record, present for server-assisted wallets.
    #[serde(default)]
    pub server_transaction: Option<ServerTransaction>,
    /// Monotonic version of the remote record, when the remote provides one.
    #[serde(default)]
    pub version: Option<u64>,
}

impl TransactionSnapshot {
    /// Snapshot without server record or version.
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            server_transaction: None,
            version: None,
        }
    }

    /// Attach a version.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Attach a server record.
    pub fn with_server_transaction(mut self, server_transaction: ServerTransaction) -> Self {
        self.server_transaction = Some(server_transaction);
        self
    }
}

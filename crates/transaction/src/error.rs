//! Error types for the transaction state machine.

use cosign_types::{Fingerprint, TransactionStatus, TxId};
use thiserror::Error;

/// Errors when applying a partial signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    /// The transaction is confirmed, rejected or cancelled.
    #[error("Transaction {tx_id} is already {status}")]
    AlreadyTerminal {
        tx_id: TxId,
        status: TransactionStatus,
    },

    /// The fingerprint is not part of the wallet's signer set.
    #[error("Signer {fingerprint} is not part of transaction {tx_id}")]
    UnknownSigner {
        tx_id: TxId,
        fingerprint: Fingerprint,
    },

    /// The signer already signed. Retried deliveries land here.
    #[error("Signer {fingerprint} already signed transaction {tx_id}")]
    DuplicateSignature {
        tx_id: TxId,
        fingerprint: Fingerprint,
    },

    /// The transaction has enough signatures and is past the signing phase.
    #[error("Transaction {tx_id} is {status} and no longer accepts signatures")]
    NotAcceptingSignatures {
        tx_id: TxId,
        status: TransactionStatus,
    },

    /// The proof was produced by a different key than the claimed signer.
    #[error("Proof from {actual} does not match signer {expected}")]
    ProofMismatch {
        expected: Fingerprint,
        actual: Fingerprint,
    },
}

impl SignError {
    /// Whether the error is an idempotent no-op rather than a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, SignError::DuplicateSignature { .. })
    }
}

/// Errors when cancelling a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelError {
    /// The transaction is confirmed, rejected or cancelled.
    #[error("Cannot cancel transaction {tx_id}: already {status}")]
    AlreadyTerminal {
        tx_id: TxId,
        status: TransactionStatus,
    },
}

/// Errors when applying a remote snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The local transaction is confirmed, rejected or cancelled.
    #[error("Transaction {tx_id} is already {status}")]
    AlreadyTerminal {
        tx_id: TxId,
        status: TransactionStatus,
    },

    /// The snapshot describes another transaction.
    #[error("Snapshot for {actual} applied to transaction {expected}")]
    WrongTransaction { expected: TxId, actual: TxId },

    /// The snapshot is older than local optimistic state.
    ///
    /// Resolved by re-fetching the authoritative snapshot.
    #[error(
        "Remote snapshot of {tx_id} (version {remote_version:?}, {remote_status}) conflicts with local state (version {local_version:?}, {local_status})"
    )]
    RemoteAuthorityConflict {
        tx_id: TxId,
        local_version: Option<u64>,
        remote_version: Option<u64>,
        local_status: TransactionStatus,
        remote_status: TransactionStatus,
    },
}

/// Errors for lifecycle transitions after signing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The transition is not allowed from the current status.
    #[error("Transaction {tx_id} cannot move from {from} to {to}")]
    InvalidTransition {
        tx_id: TxId,
        from: TransactionStatus,
        to: TransactionStatus,
    },
}

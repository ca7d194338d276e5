//! Error types for the production runner.

use cosign_broadcast::ScheduleError;
use cosign_sync::PaginationError;
use cosign_transaction::{CancelError, RefreshError, SignError, TransitionError};
use cosign_types::{SignerKind, TxId};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the remote wallet service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request did not reach the service or the connection dropped.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered with an error.
    #[error("Remote error {code}: {message}")]
    Api { code: i32, message: String },

    /// The service reports the transaction as cancelled.
    #[error("Transaction {0} was cancelled remotely")]
    TransactionCancelled(TxId),

    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    /// Whether the failure was caused by connectivity.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }
}

/// Errors reported by the signing backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Signing failed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The network refused the broadcast.
    #[error("Broadcast rejected: {0}")]
    Rejected(String),

    /// The broadcast could not be submitted.
    #[error("Broadcast failed: {0}")]
    Unavailable(String),
}

/// Errors from the local entity store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Loading cached entities failed.
    #[error("Store load failed: {0}")]
    Load(String),

    /// The batch could not be committed; nothing was applied.
    #[error("Store commit failed: {0}")]
    Commit(String),
}

/// Errors from signer adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    /// The backend failed to sign.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The remote service failed to co-sign.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// No signature arrived in time.
    #[error("{kind} signer timed out after {after:?}")]
    Timeout { kind: SignerKind, after: Duration },

    /// The co-sign response carries no signature from the server key.
    #[error("Server key did not sign transaction {0}")]
    NotCoSigned(TxId),
}

/// Why a reconciliation run stopped before committing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncFailure {
    /// A page fetch failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Pagination did not complete.
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

/// Errors returned by the coordinator, reconciler, and router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Sign(#[from] SignError),

    #[error(transparent)]
    Cancel(#[from] CancelError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    /// An awaited collaborator call exceeded its timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Reconciliation aborted; the cache is unchanged.
    #[error("Sync of {scope} incomplete after {pages} pages: {cause}")]
    SyncIncomplete {
        scope: String,
        pages: usize,
        #[source]
        cause: SyncFailure,
    },

    /// The transaction is not tracked in this session.
    #[error("Transaction {0} is not tracked")]
    UnknownTransaction(TxId),

    /// The transaction is already tracked.
    #[error("Transaction {0} is already tracked")]
    AlreadyTracked(TxId),

    /// The session was closed.
    #[error("Session closed")]
    SessionClosed,
}

impl CoordinatorError {
    /// Whether the caller may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoordinatorError::Timeout { .. } => true,
            CoordinatorError::Refresh(RefreshError::RemoteAuthorityConflict { .. }) => true,
            CoordinatorError::SyncIncomplete {
                cause: SyncFailure::Remote(remote),
                ..
            } => remote.is_transport(),
            CoordinatorError::Remote(remote) => remote.is_transport(),
            CoordinatorError::Backend(BackendError::Unavailable(_)) => true,
            CoordinatorError::Signer(SignerError::Timeout { .. }) => true,
            CoordinatorError::Signer(SignerError::Remote(remote)) => remote.is_transport(),
            _ => false,
        }
    }

    /// Whether the error is an idempotent no-op.
    pub fn is_benign(&self) -> bool {
        matches!(self, CoordinatorError::Sign(err) if err.is_benign())
    }
}

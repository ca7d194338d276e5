//! Core types for collaborative multisig signing.
//!
//! This crate provides the data model shared by every other crate:
//!
//! - Identifiers: [`TxId`], [`WalletId`], [`GroupId`], [`EventId`], [`Fingerprint`]
//! - Transactions: [`Transaction`], [`TransactionStatus`], [`ServerTransaction`]
//! - Signing: [`Psbt`], [`SignatureProof`], [`SignerDescriptor`], [`WalletPolicy`]
//! - Synced metadata: [`Alert`], [`Group`], [`KeyHealthStatus`]

mod entities;
mod identifiers;
mod psbt;
mod transaction;
mod wallet;

pub use entities::{Alert, AlertStatus, Group, GroupMember, GroupStatus, KeyHealthStatus};
pub use identifiers::{
    AccountContext, AlertId, Chain, EventId, Fingerprint, GroupId, IdentifierError, TxId,
    WalletId,
};
pub use psbt::{Psbt, SignatureProof};
pub use transaction::{ServerTransaction, Transaction, TransactionSnapshot, TransactionStatus};
pub use wallet::{SignerDescriptor, SignerKind, WalletKind, WalletPolicy};

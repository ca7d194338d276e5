//! Deterministic test data.
//!
//! Every wallet is 2-of-3 over the signers `x`, `y` and `z`. On an assisted
//! wallet `z` is the server key; otherwise it is a remote collaborator.

use cosign_types::{
    AccountContext, Alert, AlertId, AlertStatus, Chain, Fingerprint, Group, GroupId,
    GroupStatus, KeyHealthStatus, Psbt, ServerTransaction, SignatureProof, SignerDescriptor,
    SignerKind, Transaction, TransactionSnapshot, TransactionStatus, TxId, WalletId, WalletKind,
    WalletPolicy,
};
use std::time::Duration;

/// Account every fixture belongs to.
pub fn account() -> AccountContext {
    AccountContext::new("chat-1", Chain::Testnet)
}

pub fn fingerprint(byte: u8) -> Fingerprint {
    Fingerprint::from_bytes([byte; 4])
}

/// Software key.
pub fn signer_x() -> Fingerprint {
    fingerprint(0xa1)
}

/// Hardware card key.
pub fn signer_y() -> Fingerprint {
    fingerprint(0xb2)
}

/// Third key: server key or remote collaborator depending on wallet kind.
pub fn signer_z() -> Fingerprint {
    fingerprint(0xc3)
}

pub fn wallet_id() -> WalletId {
    WalletId::new("wallet-1")
}

/// 2-of-3 wallet policy.
pub fn wallet_policy(kind: WalletKind) -> WalletPolicy {
    let third = if kind.is_server_assisted() {
        SignerDescriptor::new(signer_z(), SignerKind::ServerKey, "server")
    } else {
        SignerDescriptor::new(signer_z(), SignerKind::RemoteCollaborator, "carol")
    };
    WalletPolicy::new(
        wallet_id(),
        kind,
        vec![
            SignerDescriptor::new(signer_x(), SignerKind::Software, "alice"),
            SignerDescriptor::new(signer_y(), SignerKind::HardwareCard, "bob"),
            third,
        ],
        2,
    )
}

/// Descriptor of `fingerprint` in `policy`.
///
/// Panics if the fingerprint is not part of the policy.
pub fn descriptor(policy: &WalletPolicy, fingerprint: &Fingerprint) -> SignerDescriptor {
    policy
        .signer(fingerprint)
        .cloned()
        .unwrap_or_else(|| panic!("{fingerprint} is not a signer of {}", policy.wallet_id))
}

/// PSBT bytes labelled by `tag`.
pub fn psbt(tag: &str) -> Psbt {
    Psbt::from_bytes(format!("psbt:{tag}").into_bytes())
}

/// Unsigned transaction awaiting signatures.
pub fn pending_transaction(id: &str, policy: &WalletPolicy) -> Transaction {
    Transaction::new(
        TxId::new(id),
        policy.wallet_id.clone(),
        psbt("unsigned"),
        policy.fingerprints().cloned(),
        policy.required,
    )
}

/// Transaction signed by `x` and `y`, ready to broadcast.
pub fn ready_transaction(id: &str, policy: &WalletPolicy) -> Transaction {
    let mut tx = pending_transaction(id, policy);
    tx.signers.insert(signer_x(), true);
    tx.signers.insert(signer_y(), true);
    tx.psbt = psbt("signed:x,y");
    tx.status = TransactionStatus::ReadyToBroadcast;
    tx
}

/// Partial signature of `fingerprint`. The PSBT is unique per signer.
pub fn proof(fingerprint: &Fingerprint) -> SignatureProof {
    SignatureProof::new(fingerprint.clone(), psbt(&format!("signed:{fingerprint}")))
}

/// Copy of `tx` with exactly `signed` marked, the given status and version.
pub fn snapshot(
    tx: &Transaction,
    signed: &[Fingerprint],
    status: TransactionStatus,
    version: u64,
) -> TransactionSnapshot {
    let mut tx = tx.clone();
    for (fp, has_signed) in tx.signers.iter_mut() {
        *has_signed = signed.contains(fp);
    }
    tx.status = status;
    TransactionSnapshot::new(tx).with_version(version)
}

/// Server record broadcasting at `broadcast_at`.
pub fn server_transaction(id: &str, broadcast_at: Duration) -> ServerTransaction {
    ServerTransaction::new(TxId::new(id)).with_broadcast_time(broadcast_at)
}

pub fn alert(id: &str, status: AlertStatus) -> Alert {
    Alert::new(AlertId::new(id), format!("Alert {id}"), status)
}

/// `count` alerts with ids `0..count`.
pub fn alerts(count: usize) -> Vec<Alert> {
    (0..count)
        .map(|i| alert(&i.to_string(), AlertStatus::New))
        .collect()
}

pub fn group(id: &str, status: GroupStatus) -> Group {
    Group::new(GroupId::new(id), status, format!("Group {id}"))
}

pub fn key_health(byte: u8, can_request_health_check: bool) -> KeyHealthStatus {
    KeyHealthStatus::new(fingerprint(byte), can_request_health_check)
}

//! Wallet policies and signer descriptors.

use crate::{Fingerprint, WalletId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a wallet's keys are held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    /// Single-party multisig; every key lives with the owner.
    Personal,
    /// Keys shared among several collaborating parties.
    Shared,
    /// One of the keys is a server-held cosigning key.
    Assisted,
}

impl WalletKind {
    /// Whether the remote service holds a cosigning key.
    pub fn is_server_assisted(self) -> bool {
        matches!(self, WalletKind::Assisted)
    }
}

/// Where a signer's key material lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerKind {
    /// Key held by the local software signer.
    Software,
    /// Key held on an NFC hardware security card.
    HardwareCard,
    /// Key held by another participant, signing on their own device.
    RemoteCollaborator,
    /// Cosigning key held by the remote service.
    ServerKey,
}

impl fmt::Display for SignerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignerKind::Software => "software",
            SignerKind::HardwareCard => "hardware_card",
            SignerKind::RemoteCollaborator => "remote_collaborator",
            SignerKind::ServerKey => "server_key",
        };
        f.write_str(name)
    }
}

/// Descriptor of one signing key or device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignerDescriptor {
    /// Master fingerprint of the key.
    pub fingerprint: Fingerprint,
    /// Where the key lives.
    pub kind: SignerKind,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

impl SignerDescriptor {
    /// Create a new descriptor.
    pub fn new(fingerprint: Fingerprint, kind: SignerKind, name: impl Into<String>) -> Self {
        Self {
            fingerprint,
            kind,
            name: name.into(),
        }
    }
}

/// M-of-N policy of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletPolicy {
    /// Wallet identifier.
    pub wallet_id: WalletId,
    /// How keys are held.
    pub kind: WalletKind,
    /// All N signers, in key order.
    pub signers: Vec<SignerDescriptor>,
    /// Signatures required (M).
    pub required: usize,
}

impl WalletPolicy {
    /// Create a new wallet policy.
    pub fn new(
        wallet_id: WalletId,
        kind: WalletKind,
        signers: Vec<SignerDescriptor>,
        required: usize,
    ) -> Self {
        Self {
            wallet_id,
            kind,
            signers,
            required,
        }
    }

    /// Look up a signer by fingerprint.
    pub fn signer(&self, fingerprint: &Fingerprint) -> Option<&SignerDescriptor> {
        self.signers.iter().find(|s| &s.fingerprint == fingerprint)
    }

    /// Fingerprints of every signer, in key order.
    pub fn fingerprints(&self) -> impl Iterator<Item = &Fingerprint> {
        self.signers.iter().map(|s| &s.fingerprint)
    }

    /// The server cosigning key, if this wallet has one.
    pub fn server_key(&self) -> Option<&SignerDescriptor> {
        self.signers.iter().find(|s| s.kind == SignerKind::ServerKey)
    }
}

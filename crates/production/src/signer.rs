//! Signer adapters.
//!
//! Every signer of a wallet produces a [`SignatureProof`] through one of four
//! variants. Dispatch is a plain `match`, and every variant honors the
//! caller's timeout.

use crate::error::SignerError;
use crate::traits::{RemoteWalletService, SigningBackend};
use cosign_types::{Fingerprint, Psbt, SignatureProof, SignerDescriptor, SignerKind, TxId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Produces a partial signature for one signer of a wallet.
#[derive(Clone)]
pub enum SignerAdapter {
    /// Key held by the local software wallet.
    Software {
        descriptor: SignerDescriptor,
        backend: Arc<dyn SigningBackend>,
    },

    /// Key on an NFC hardware card; the backend drives the card session.
    HardwareCard {
        descriptor: SignerDescriptor,
        backend: Arc<dyn SigningBackend>,
    },

    /// Key held by another participant, who sends the signed PSBT through
    /// the messaging transport.
    RemoteCollaborator {
        descriptor: SignerDescriptor,
        inbox: Arc<CollaboratorInbox>,
    },

    /// Server key of an assisted wallet.
    ServerAssisted {
        descriptor: SignerDescriptor,
        remote: Arc<dyn RemoteWalletService>,
    },
}

impl SignerAdapter {
    /// Pick the variant matching `descriptor.kind`.
    pub fn for_descriptor(
        descriptor: SignerDescriptor,
        backend: Arc<dyn SigningBackend>,
        remote: Arc<dyn RemoteWalletService>,
        inbox: Arc<CollaboratorInbox>,
    ) -> Self {
        match descriptor.kind {
            SignerKind::Software => SignerAdapter::Software { descriptor, backend },
            SignerKind::HardwareCard => SignerAdapter::HardwareCard { descriptor, backend },
            SignerKind::RemoteCollaborator => {
                SignerAdapter::RemoteCollaborator { descriptor, inbox }
            }
            SignerKind::ServerKey => SignerAdapter::ServerAssisted { descriptor, remote },
        }
    }

    pub fn descriptor(&self) -> &SignerDescriptor {
        match self {
            SignerAdapter::Software { descriptor, .. }
            | SignerAdapter::HardwareCard { descriptor, .. }
            | SignerAdapter::RemoteCollaborator { descriptor, .. }
            | SignerAdapter::ServerAssisted { descriptor, .. } => descriptor,
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.descriptor().fingerprint
    }

    /// Sign `psbt` of transaction `tx_id`, giving up after `timeout`.
    pub async fn sign(
        &self,
        tx_id: &TxId,
        psbt: &Psbt,
        timeout: Duration,
    ) -> Result<SignatureProof, SignerError> {
        let descriptor = self.descriptor();
        let timed_out = || SignerError::Timeout {
            kind: descriptor.kind,
            after: timeout,
        };

        let result = match self {
            SignerAdapter::Software { backend, .. } | SignerAdapter::HardwareCard { backend, .. } => {
                match tokio::time::timeout(timeout, backend.sign(descriptor, psbt)).await {
                    Ok(signed) => signed.map_err(SignerError::from),
                    Err(_) => Err(timed_out()),
                }
            }
            SignerAdapter::RemoteCollaborator { inbox, .. } => inbox
                .wait(tx_id, &descriptor.fingerprint, timeout)
                .await
                .ok_or_else(timed_out),
            SignerAdapter::ServerAssisted { remote, .. } => {
                match tokio::time::timeout(timeout, remote.request_co_sign(tx_id, psbt)).await {
                    Err(_) => Err(timed_out()),
                    Ok(Err(err)) => Err(err.into()),
                    Ok(Ok(snapshot)) if snapshot.transaction.is_signed_by(&descriptor.fingerprint) => {
                        Ok(SignatureProof::new(
                            descriptor.fingerprint.clone(),
                            snapshot.transaction.psbt,
                        ))
                    }
                    Ok(Ok(_)) => Err(SignerError::NotCoSigned(tx_id.clone())),
                }
            }
        };

        match &result {
            Ok(_) => info!(tx_id = %tx_id, signer = %descriptor.fingerprint, kind = %descriptor.kind, "Signature produced"),
            Err(err) => warn!(tx_id = %tx_id, signer = %descriptor.fingerprint, error = %err, "Signing failed"),
        }
        result
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Collaborator inbox
// ═══════════════════════════════════════════════════════════════════════════

enum Slot {
    Waiting(oneshot::Sender<SignatureProof>),
    Delivered(SignatureProof),
}

/// Rendezvous between the messaging transport and waiting signers.
///
/// A proof delivered before anyone waits is kept until collected.
#[derive(Default)]
pub struct CollaboratorInbox {
    slots: Mutex<HashMap<(TxId, Fingerprint), Slot>>,
}

impl CollaboratorInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand over a proof received from a collaborator.
    pub fn deliver(&self, tx_id: &TxId, proof: SignatureProof) {
        let key = (tx_id.clone(), proof.fingerprint.clone());
        let mut slots = self.slots.lock();
        match slots.remove(&key) {
            Some(Slot::Waiting(sender)) => {
                if let Err(proof) = sender.send(proof) {
                    // Waiter gave up; keep it for the next one.
                    slots.insert(key, Slot::Delivered(proof));
                }
            }
            Some(Slot::Delivered(_)) | None => {
                debug!(tx_id = %tx_id, signer = %key.1, "Proof queued");
                slots.insert(key, Slot::Delivered(proof));
            }
        }
    }

    /// Wait up to `timeout` for the proof of `fingerprint`.
    pub async fn wait(
        &self,
        tx_id: &TxId,
        fingerprint: &Fingerprint,
        timeout: Duration,
    ) -> Option<SignatureProof> {
        let key = (tx_id.clone(), fingerprint.clone());
        let receiver = {
            let mut slots = self.slots.lock();
            if let Some(Slot::Delivered(proof)) = slots.remove(&key) {
                return Some(proof);
            }
            let (sender, receiver) = oneshot::channel();
            slots.insert(key.clone(), Slot::Waiting(sender));
            receiver
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(proof)) => Some(proof),
            Ok(Err(_)) | Err(_) => {
                let mut slots = self.slots.lock();
                if matches!(slots.get(&key), Some(Slot::Waiting(_))) {
                    slots.remove(&key);
                }
                None
            }
        }
    }

    /// Drop every proof and waiter of `tx_id`.
    ///
    /// Dropped waiters return `None`. Returns how many slots were removed.
    pub fn forget(&self, tx_id: &TxId) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|(id, _), _| id != tx_id);
        let removed = before - slots.len();
        if removed > 0 {
            debug!(tx_id = %tx_id, removed, "Collaborator slots dropped");
        }
        removed
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// Number of proofs and waiters held.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Whether a proof is waiting to be collected.
    pub fn has_pending(&self, tx_id: &TxId, fingerprint: &Fingerprint) -> bool {
        matches!(
            self.slots.lock().get(&(tx_id.clone(), fingerprint.clone())),
            Some(Slot::Delivered(_))
        )
    }
}

//! Transaction signing state machine.

use crate::error::{CancelError, RefreshError, SignError, TransitionError};
use crate::watcher::SignedCountWatcher;
use cosign_core::Action;
use cosign_types::{
    Fingerprint, ServerTransaction, SignatureProof, Transaction, TransactionSnapshot,
    TransactionStatus, TxId, WalletKind,
};
use tracing::{debug, info, warn};

/// Result of an accepted input: the new status plus actions for the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Status after the input was applied.
    pub status: TransactionStatus,
    /// Actions to execute, in order.
    pub actions: Vec<Action>,
}

impl Transition {
    fn new(status: TransactionStatus) -> Self {
        Self {
            status,
            actions: Vec::new(),
        }
    }
}

/// Signing state of a single transaction.
///
/// Owns the signer map, the PSBT and the status, and enforces:
///
/// - `ReadyToBroadcast` is entered only from `PendingSignatures`, once the
///   signed count meets the wallet threshold
/// - terminal transactions accept no further mutation
/// - `ReadyToBroadcast` returns to `PendingSignatures` only through
///   [`apply_revocation`](Self::apply_revocation)
///
/// The machine is synchronous and performs no I/O. Mutations of one
/// transaction must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct TransactionStateMachine {
    tx: Transaction,

    /// Companion record for server-assisted wallets.
    server_transaction: Option<ServerTransaction>,

    /// How the wallet's keys are held.
    wallet_kind: WalletKind,

    /// Version of the last applied remote snapshot.
    version: Option<u64>,

    watcher: SignedCountWatcher,
}

impl TransactionStateMachine {
    /// Start tracking a transaction.
    pub fn new(tx: Transaction, wallet_kind: WalletKind) -> Self {
        let mut watcher = SignedCountWatcher::new(wallet_kind.is_server_assisted());
        watcher.observe(tx.signed_count(), tx.status);
        Self {
            tx,
            server_transaction: None,
            wallet_kind,
            version: None,
            watcher,
        }
    }

    /// Start tracking a transaction as fetched from the remote.
    pub fn from_snapshot(snapshot: TransactionSnapshot, wallet_kind: WalletKind) -> Self {
        let mut machine = Self::new(snapshot.transaction, wallet_kind);
        machine.server_transaction = snapshot.server_transaction;
        machine.version = snapshot.version;
        machine
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    /// Transaction identifier.
    pub fn tx_id(&self) -> &TxId {
        &self.tx.id
    }

    /// Current transaction record.
    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Current status.
    pub fn status(&self) -> TransactionStatus {
        self.tx.status
    }

    /// Number of signers that have signed.
    pub fn signed_count(&self) -> usize {
        self.tx.signed_count()
    }

    /// Highest signed count seen by the watcher.
    pub fn observed_signed_count(&self) -> usize {
        self.watcher.high_water().unwrap_or(0)
    }

    /// Whether the co-sign request fired in this session.
    pub fn co_sign_requested(&self) -> bool {
        self.watcher.co_sign_requested()
    }

    /// Whether the server acknowledged the co-sign request.
    pub fn co_sign_sent(&self) -> bool {
        self.watcher.co_sign_sent()
    }

    /// Server companion record, if any.
    pub fn server_transaction(&self) -> Option<&ServerTransaction> {
        self.server_transaction.as_ref()
    }

    /// Wallet kind.
    pub fn wallet_kind(&self) -> WalletKind {
        self.wallet_kind
    }

    /// Version of the last applied remote snapshot.
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    fn terminal_guard(&self) -> Option<TransactionStatus> {
        self.tx.status.is_terminal().then_some(self.tx.status)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Signing
    // ═══════════════════════════════════════════════════════════════════════════

    /// Apply a partial signature from `fingerprint`.
    ///
    /// On success the signer is marked, the PSBT is replaced by the proof's
    /// PSBT and, if the threshold is now met, the status moves to
    /// `ReadyToBroadcast` with an [`Action::ThresholdReached`]. Every error
    /// leaves the state unchanged.
    pub fn apply_signature(
        &mut self,
        fingerprint: &Fingerprint,
        proof: SignatureProof,
    ) -> Result<Transition, SignError> {
        if let Some(status) = self.terminal_guard() {
            warn!(tx_id = %self.tx.id, status = %status, "Signature for terminal transaction");
            return Err(SignError::AlreadyTerminal {
                tx_id: self.tx.id.clone(),
                status,
            });
        }

        let Some(signed) = self.tx.signers.get(fingerprint).copied() else {
            warn!(tx_id = %self.tx.id, fingerprint = %fingerprint, "Signature from unknown signer");
            return Err(SignError::UnknownSigner {
                tx_id: self.tx.id.clone(),
                fingerprint: fingerprint.clone(),
            });
        };

        if signed {
            debug!(tx_id = %self.tx.id, fingerprint = %fingerprint, "Duplicate signature ignored");
            return Err(SignError::DuplicateSignature {
                tx_id: self.tx.id.clone(),
                fingerprint: fingerprint.clone(),
            });
        }

        if self.tx.status != TransactionStatus::PendingSignatures {
            warn!(
                tx_id = %self.tx.id,
                status = %self.tx.status,
                "Signature after signing phase"
            );
            return Err(SignError::NotAcceptingSignatures {
                tx_id: self.tx.id.clone(),
                status: self.tx.status,
            });
        }

        if &proof.fingerprint != fingerprint {
            warn!(
                tx_id = %self.tx.id,
                expected = %fingerprint,
                actual = %proof.fingerprint,
                "Signature proof does not match signer"
            );
            return Err(SignError::ProofMismatch {
                expected: fingerprint.clone(),
                actual: proof.fingerprint,
            });
        }

        // All checks passed; mutate.
        if let Some(entry) = self.tx.signers.get_mut(fingerprint) {
            *entry = true;
        }
        self.tx.psbt = proof.psbt;

        let signed_count = self.tx.signed_count();
        let mut transition = Transition::new(self.tx.status);

        if signed_count >= self.tx.required_signatures {
            self.tx.status = TransactionStatus::ReadyToBroadcast;
            transition.status = self.tx.status;
            transition.actions.push(Action::ThresholdReached {
                tx_id: self.tx.id.clone(),
            });
            info!(
                tx_id = %self.tx.id,
                signed = signed_count,
                required = self.tx.required_signatures,
                "Signature threshold reached"
            );
        } else {
            debug!(
                tx_id = %self.tx.id,
                fingerprint = %fingerprint,
                signed = signed_count,
                required = self.tx.required_signatures,
                "Signature applied"
            );
        }

        self.observe_signed_count(&mut transition);
        Ok(transition)
    }

    /// The server acknowledged the co-sign request.
    ///
    /// Until then the request stays outstanding and is emitted again by the
    /// next input.
    pub fn on_co_sign_sent(&mut self) {
        self.watcher.confirm_co_sign();
    }

    /// Actions an earlier input left unfinished.
    ///
    /// Used when a retried input is otherwise a no-op, such as a redelivered
    /// signature after its co-sign request failed.
    pub fn resume(&self) -> Vec<Action> {
        if self.watcher.co_sign_outstanding(self.tx.status) {
            info!(tx_id = %self.tx.id, "Retrying server co-signature request");
            vec![self.co_sign_request()]
        } else {
            Vec::new()
        }
    }

    fn observe_signed_count(&mut self, transition: &mut Transition) {
        let crossed = self.watcher.observe(self.tx.signed_count(), self.tx.status);
        if crossed || self.watcher.co_sign_outstanding(self.tx.status) {
            info!(tx_id = %self.tx.id, retry = !crossed, "Requesting server co-signature");
            transition.actions.push(self.co_sign_request());
        }
    }

    fn co_sign_request(&self) -> Action {
        Action::RequestCoSign {
            tx_id: self.tx.id.clone(),
            psbt: self.tx.psbt.clone(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Remote Refresh
    // ═══════════════════════════════════════════════════════════════════════════

    /// Replace local state with a snapshot from the remote authority.
    ///
    /// A snapshot is refused with `RemoteAuthorityConflict` when:
    ///
    /// - its version is strictly older than the last applied version
    /// - it carries no version, the wallet is not server-assisted, and the
    ///   transaction is mid-flight (`ReadyToBroadcast`)
    /// - it would move `ReadyToBroadcast` back to `PendingSignatures`
    pub fn refresh_from_remote(
        &mut self,
        snapshot: TransactionSnapshot,
    ) -> Result<Transition, RefreshError> {
        self.check_snapshot(&snapshot)?;

        let remote_status = snapshot.transaction.status;
        let mid_flight = self.tx.status == TransactionStatus::ReadyToBroadcast;
        let stale = match (self.version, snapshot.version) {
            (Some(local), Some(remote)) => remote < local,
            (_, None) => !self.wallet_kind.is_server_assisted() && mid_flight,
            (None, Some(_)) => false,
        };
        let reverts = mid_flight && remote_status == TransactionStatus::PendingSignatures;
        let conflict = stale || reverts;

        if conflict {
            warn!(
                tx_id = %self.tx.id,
                local_version = ?self.version,
                remote_version = ?snapshot.version,
                local_status = %self.tx.status,
                remote_status = %remote_status,
                "Refusing remote snapshot"
            );
            return Err(RefreshError::RemoteAuthorityConflict {
                tx_id: self.tx.id.clone(),
                local_version: self.version,
                remote_version: snapshot.version,
                local_status: self.tx.status,
                remote_status,
            });
        }

        let newer = match (self.version, snapshot.version) {
            (Some(local), Some(remote)) => remote > local,
            (None, Some(_)) => true,
            _ => false,
        };

        let previous = self.replace(snapshot);
        let mut transition = self.transition_from(previous);

        self.observe_signed_count(&mut transition);
        if newer {
            self.watcher.rebaseline(self.tx.signed_count());
        }

        info!(
            tx_id = %self.tx.id,
            from = %previous,
            to = %self.tx.status,
            version = ?self.version,
            "Applied remote snapshot"
        );
        Ok(transition)
    }

    /// Apply a snapshot following a remote "signature revoked" event.
    ///
    /// This is a hard refresh. It skips the optimistic-state checks, so it is
    /// the only way back from `ReadyToBroadcast` to `PendingSignatures`. The
    /// watcher is re-baselined but keeps its co-sign state.
    pub fn apply_revocation(
        &mut self,
        snapshot: TransactionSnapshot,
    ) -> Result<Transition, RefreshError> {
        self.check_snapshot(&snapshot)?;

        let previous = self.replace(snapshot);
        let transition = self.transition_from(previous);
        self.watcher.reset(self.tx.signed_count());

        info!(
            tx_id = %self.tx.id,
            from = %previous,
            to = %self.tx.status,
            signed = self.tx.signed_count(),
            "Applied signature revocation"
        );
        Ok(transition)
    }

    fn check_snapshot(&self, snapshot: &TransactionSnapshot) -> Result<(), RefreshError> {
        if let Some(status) = self.terminal_guard() {
            debug!(tx_id = %self.tx.id, status = %status, "Ignoring snapshot for terminal transaction");
            return Err(RefreshError::AlreadyTerminal {
                tx_id: self.tx.id.clone(),
                status,
            });
        }
        if snapshot.transaction.id != self.tx.id {
            return Err(RefreshError::WrongTransaction {
                expected: self.tx.id.clone(),
                actual: snapshot.transaction.id.clone(),
            });
        }
        Ok(())
    }

    /// Swap in the snapshot wholesale. Returns the previous status.
    fn replace(&mut self, snapshot: TransactionSnapshot) -> TransactionStatus {
        let previous = self.tx.status;
        self.tx = snapshot.transaction;
        if snapshot.server_transaction.is_some() {
            self.server_transaction = snapshot.server_transaction;
        }
        self.version = self.version.max(snapshot.version);
        previous
    }

    fn transition_from(&self, previous: TransactionStatus) -> Transition {
        let mut transition = Transition::new(self.tx.status);
        if previous != TransactionStatus::ReadyToBroadcast
            && self.tx.status == TransactionStatus::ReadyToBroadcast
        {
            transition.actions.push(Action::ThresholdReached {
                tx_id: self.tx.id.clone(),
            });
        }
        if self.tx.status.is_terminal() {
            transition.actions.push(Action::StopTracking {
                tx_id: self.tx.id.clone(),
            });
        }
        transition
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════════

    /// Cancel the transaction.
    pub fn cancel(&mut self) -> Result<Transition, CancelError> {
        if let Some(status) = self.terminal_guard() {
            return Err(CancelError::AlreadyTerminal {
                tx_id: self.tx.id.clone(),
                status,
            });
        }
        let previous = self.tx.status;
        self.tx.status = TransactionStatus::Cancelled;
        info!(tx_id = %self.tx.id, from = %previous, "Transaction cancelled");
        Ok(self.transition_from(previous))
    }

    /// The network accepted the broadcast.
    pub fn on_broadcast_accepted(&mut self) -> Result<Transition, TransitionError> {
        self.advance(
            &[TransactionStatus::ReadyToBroadcast],
            TransactionStatus::PendingConfirmation,
        )
    }

    /// The transaction was mined.
    pub fn on_confirmed(&mut self) -> Result<Transition, TransitionError> {
        self.advance(
            &[TransactionStatus::PendingConfirmation],
            TransactionStatus::Confirmed,
        )
    }

    /// The network rejected the transaction.
    pub fn on_rejected(&mut self) -> Result<Transition, TransitionError> {
        self.advance(
            &[
                TransactionStatus::ReadyToBroadcast,
                TransactionStatus::PendingConfirmation,
            ],
            TransactionStatus::Rejected,
        )
    }

    fn advance(
        &mut self,
        allowed_from: &[TransactionStatus],
        to: TransactionStatus,
    ) -> Result<Transition, TransitionError> {
        let from = self.tx.status;
        if !allowed_from.contains(&from) {
            warn!(tx_id = %self.tx.id, from = %from, to = %to, "Invalid status transition");
            return Err(TransitionError::InvalidTransition {
                tx_id: self.tx.id.clone(),
                from,
                to,
            });
        }
        self.tx.status = to;
        info!(tx_id = %self.tx.id, from = %from, to = %to, "Status transition");
        Ok(self.transition_from(from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosign_test_helpers::fixtures;
    use tracing_test::traced_test;

    fn machine(kind: WalletKind) -> TransactionStateMachine {
        let policy = fixtures::wallet_policy(kind);
        TransactionStateMachine::new(fixtures::pending_transaction("tx-1", &policy), kind)
    }

    fn sign(machine: &mut TransactionStateMachine, fp: &Fingerprint) -> Result<Transition, SignError> {
        machine.apply_signature(fp, fixtures::proof(fp))
    }

    fn snapshot_with(
        machine: &TransactionStateMachine,
        signed: &[Fingerprint],
        status: TransactionStatus,
    ) -> TransactionSnapshot {
        let mut tx = machine.transaction().clone();
        for signer in tx.signers.values_mut() {
            *signer = false;
        }
        for fp in signed {
            tx.signers.insert(fp.clone(), true);
        }
        tx.status = status;
        TransactionSnapshot::new(tx)
    }

    #[traced_test]
    #[test]
    fn test_threshold_reached_on_second_signature() {
        let mut m = machine(WalletKind::Shared);

        let first = sign(&mut m, &fixtures::signer_x()).unwrap();
        assert_eq!(first.status, TransactionStatus::PendingSignatures);
        assert!(first.actions.is_empty());

        let second = sign(&mut m, &fixtures::signer_y()).unwrap();
        assert_eq!(second.status, TransactionStatus::ReadyToBroadcast);
        assert_eq!(
            second.actions,
            vec![Action::ThresholdReached {
                tx_id: TxId::new("tx-1")
            }]
        );
        assert_eq!(m.transaction().psbt, fixtures::proof(&fixtures::signer_y()).psbt);
        assert!(logs_contain("Signature threshold reached"));
    }

    #[test]
    fn test_duplicate_signature_leaves_state_unchanged() {
        let mut m = machine(WalletKind::Shared);
        sign(&mut m, &fixtures::signer_x()).unwrap();
        let before = m.transaction().clone();

        let err = sign(&mut m, &fixtures::signer_x()).unwrap_err();
        assert!(err.is_benign());
        assert!(matches!(err, SignError::DuplicateSignature { .. }));
        assert_eq!(m.transaction(), &before);
    }

    #[test]
    fn test_unknown_signer() {
        let mut m = machine(WalletKind::Shared);
        let stranger = Fingerprint::from_bytes([9, 9, 9, 9]);
        let err = sign(&mut m, &stranger).unwrap_err();
        assert!(matches!(err, SignError::UnknownSigner { .. }));
        assert!(!err.is_benign());
    }

    #[test]
    fn test_confirmed_always_already_terminal() {
        let mut m = machine(WalletKind::Shared);
        sign(&mut m, &fixtures::signer_x()).unwrap();
        sign(&mut m, &fixtures::signer_y()).unwrap();
        m.on_broadcast_accepted().unwrap();
        m.on_confirmed().unwrap();

        for fp in [
            fixtures::signer_x(),
            fixtures::signer_z(),
            Fingerprint::from_bytes([9, 9, 9, 9]),
        ] {
            let err = sign(&mut m, &fp).unwrap_err();
            assert!(matches!(err, SignError::AlreadyTerminal { .. }));
        }
    }

    #[test]
    fn test_signature_after_threshold_not_accepted() {
        let mut m = machine(WalletKind::Shared);
        sign(&mut m, &fixtures::signer_x()).unwrap();
        sign(&mut m, &fixtures::signer_y()).unwrap();

        let err = sign(&mut m, &fixtures::signer_z()).unwrap_err();
        assert!(matches!(err, SignError::NotAcceptingSignatures { .. }));
        assert_eq!(m.signed_count(), 2);
    }

    #[test]
    fn test_proof_mismatch() {
        let mut m = machine(WalletKind::Shared);
        let proof = fixtures::proof(&fixtures::signer_y());
        let err = m.apply_signature(&fixtures::signer_x(), proof).unwrap_err();
        assert!(matches!(err, SignError::ProofMismatch { .. }));
        assert_eq!(m.signed_count(), 0);
    }

    #[test]
    fn test_cancel() {
        let mut m = machine(WalletKind::Shared);
        let transition = m.cancel().unwrap();
        assert_eq!(transition.status, TransactionStatus::Cancelled);
        assert_eq!(
            transition.actions,
            vec![Action::StopTracking {
                tx_id: TxId::new("tx-1")
            }]
        );
        assert!(matches!(m.cancel(), Err(CancelError::AlreadyTerminal { .. })));
    }

    #[test]
    fn test_co_sign_requested_once_for_assisted_wallet() {
        let mut m = machine(WalletKind::Assisted);
        let first = sign(&mut m, &fixtures::signer_x()).unwrap();
        assert!(matches!(first.actions.as_slice(), [Action::RequestCoSign { .. }]));
        assert!(m.co_sign_requested());
        m.on_co_sign_sent();

        // A retried delivery does not fire again.
        assert!(sign(&mut m, &fixtures::signer_x()).is_err());
        assert!(m.resume().is_empty());

        // Nor does a stale unversioned snapshot showing zero then one signature.
        m.refresh_from_remote(snapshot_with(&m, &[], TransactionStatus::PendingSignatures))
            .unwrap();
        let again = m
            .refresh_from_remote(snapshot_with(
                &m,
                &[fixtures::signer_x()],
                TransactionStatus::PendingSignatures,
            ))
            .unwrap();
        assert!(again.actions.is_empty());
    }

    #[test]
    fn test_no_co_sign_for_shared_wallet() {
        let mut m = machine(WalletKind::Shared);
        let first = sign(&mut m, &fixtures::signer_x()).unwrap();
        assert!(first.actions.is_empty());
        assert!(!m.co_sign_requested());
    }

    #[test]
    fn test_older_version_conflicts() {
        let mut m = machine(WalletKind::Assisted);
        let newer = snapshot_with(&m, &[fixtures::signer_x()], TransactionStatus::PendingSignatures)
            .with_version(5);
        m.refresh_from_remote(newer).unwrap();

        let older = snapshot_with(&m, &[], TransactionStatus::PendingSignatures).with_version(4);
        let err = m.refresh_from_remote(older).unwrap_err();
        assert!(matches!(err, RefreshError::RemoteAuthorityConflict { .. }));
        assert_eq!(m.signed_count(), 1);
        assert_eq!(m.version(), Some(5));

        let same = snapshot_with(&m, &[fixtures::signer_x()], TransactionStatus::PendingSignatures)
            .with_version(5);
        assert!(m.refresh_from_remote(same).is_ok());
    }

    #[test]
    fn test_unversioned_snapshot_refused_mid_flight_for_local_wallet() {
        let mut m = machine(WalletKind::Personal);
        sign(&mut m, &fixtures::signer_x()).unwrap();
        sign(&mut m, &fixtures::signer_y()).unwrap();

        let remote = snapshot_with(
            &m,
            &[fixtures::signer_x(), fixtures::signer_y()],
            TransactionStatus::PendingConfirmation,
        );
        assert!(matches!(
            m.refresh_from_remote(remote),
            Err(RefreshError::RemoteAuthorityConflict { .. })
        ));
        assert_eq!(m.status(), TransactionStatus::ReadyToBroadcast);
    }

    #[test]
    fn test_unversioned_snapshot_authoritative_for_assisted_wallet() {
        let mut m = machine(WalletKind::Assisted);
        let remote = snapshot_with(
            &m,
            &[fixtures::signer_x(), fixtures::signer_z()],
            TransactionStatus::ReadyToBroadcast,
        );
        let transition = m.refresh_from_remote(remote).unwrap();
        assert_eq!(transition.status, TransactionStatus::ReadyToBroadcast);
        assert!(transition
            .actions
            .contains(&Action::ThresholdReached { tx_id: TxId::new("tx-1") }));
    }

    #[test]
    fn test_refresh_cannot_revert_ready() {
        let mut m = machine(WalletKind::Assisted);
        sign(&mut m, &fixtures::signer_x()).unwrap();
        sign(&mut m, &fixtures::signer_y()).unwrap();

        let remote = snapshot_with(&m, &[fixtures::signer_x()], TransactionStatus::PendingSignatures)
            .with_version(10);
        assert!(matches!(
            m.refresh_from_remote(remote.clone()),
            Err(RefreshError::RemoteAuthorityConflict { .. })
        ));

        let transition = m.apply_revocation(remote).unwrap();
        assert_eq!(transition.status, TransactionStatus::PendingSignatures);
        assert_eq!(m.signed_count(), 1);
        assert_eq!(m.observed_signed_count(), 1);
    }

    #[test]
    fn test_co_sign_not_repeated_after_revocation() {
        let mut m = machine(WalletKind::Assisted);
        let first = sign(&mut m, &fixtures::signer_x()).unwrap();
        assert!(matches!(first.actions.as_slice(), [Action::RequestCoSign { .. }]));
        m.on_co_sign_sent();

        let revoked = snapshot_with(&m, &[], TransactionStatus::PendingSignatures).with_version(3);
        m.apply_revocation(revoked).unwrap();
        assert_eq!(m.signed_count(), 0);

        let again = sign(&mut m, &fixtures::signer_x()).unwrap();
        assert!(again.actions.is_empty());
        assert!(m.co_sign_sent());
    }

    #[traced_test]
    #[test]
    fn test_unacknowledged_co_sign_is_requested_again() {
        let mut m = machine(WalletKind::Assisted);
        sign(&mut m, &fixtures::signer_x()).unwrap();
        assert!(!m.co_sign_sent());

        // The redelivered signature is a duplicate, but the request resumes.
        assert!(sign(&mut m, &fixtures::signer_x()).unwrap_err().is_benign());
        assert!(matches!(m.resume().as_slice(), [Action::RequestCoSign { .. }]));
        assert!(logs_contain("Retrying server co-signature request"));

        // A refresh while still outstanding also carries it.
        let refreshed = m
            .refresh_from_remote(snapshot_with(
                &m,
                &[fixtures::signer_x()],
                TransactionStatus::PendingSignatures,
            ))
            .unwrap();
        assert!(matches!(refreshed.actions.as_slice(), [Action::RequestCoSign { .. }]));

        m.on_co_sign_sent();
        assert!(m.resume().is_empty());
    }

    #[test]
    fn test_refresh_terminal_snapshot_stops_tracking() {
        let mut m = machine(WalletKind::Assisted);
        let remote = snapshot_with(&m, &[], TransactionStatus::Cancelled);
        let transition = m.refresh_from_remote(remote).unwrap();
        assert_eq!(
            transition.actions,
            vec![Action::StopTracking {
                tx_id: TxId::new("tx-1")
            }]
        );

        let again = snapshot_with(&m, &[], TransactionStatus::Cancelled);
        assert!(matches!(
            m.refresh_from_remote(again),
            Err(RefreshError::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn test_refresh_rejects_other_transaction() {
        let mut m = machine(WalletKind::Assisted);
        let mut remote = snapshot_with(&m, &[], TransactionStatus::PendingSignatures);
        remote.transaction.id = TxId::new("other");
        assert!(matches!(
            m.refresh_from_remote(remote),
            Err(RefreshError::WrongTransaction { .. })
        ));
    }

    #[test]
    fn test_newer_version_rebaselines_watcher() {
        let mut m = machine(WalletKind::Assisted);
        let two = snapshot_with(
            &m,
            &[fixtures::signer_x()],
            TransactionStatus::PendingSignatures,
        )
        .with_version(1);
        m.refresh_from_remote(two).unwrap();
        assert_eq!(m.observed_signed_count(), 1);

        let zero = snapshot_with(&m, &[], TransactionStatus::PendingSignatures).with_version(2);
        m.refresh_from_remote(zero).unwrap();
        assert_eq!(m.observed_signed_count(), 0);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut m = machine(WalletKind::Shared);
        assert!(matches!(
            m.on_broadcast_accepted(),
            Err(TransitionError::InvalidTransition { .. })
        ));
        sign(&mut m, &fixtures::signer_x()).unwrap();
        sign(&mut m, &fixtures::signer_y()).unwrap();

        assert!(m.on_confirmed().is_err());
        let accepted = m.on_broadcast_accepted().unwrap();
        assert_eq!(accepted.status, TransactionStatus::PendingConfirmation);
        assert!(accepted.actions.is_empty());

        let rejected = m.on_rejected().unwrap();
        assert_eq!(rejected.status, TransactionStatus::Rejected);
        assert!(matches!(rejected.actions.as_slice(), [Action::StopTracking { .. }]));
    }
}

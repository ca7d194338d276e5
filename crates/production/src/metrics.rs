//! Prometheus counters for a session.
//!
//! Counters are registered on a registry owned by the session, never on the
//! global default registry, so two sessions in one process do not collide.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::debug;

/// Outcome label of a broadcast attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastLabel {
    Submitted,
    Failed,
    Scheduled,
    Cancelled,
}

impl BroadcastLabel {
    fn as_str(self) -> &'static str {
        match self {
            BroadcastLabel::Submitted => "submitted",
            BroadcastLabel::Failed => "failed",
            BroadcastLabel::Scheduled => "scheduled",
            BroadcastLabel::Cancelled => "cancelled",
        }
    }
}

/// Session metrics.
pub struct CoordinatorMetrics {
    registry: Registry,
    signatures_applied: IntCounter,
    duplicate_signatures: IntCounter,
    co_sign_requests: IntCounter,
    broadcasts: IntCounterVec,
    reconciliations: IntCounterVec,
    notifications: IntCounterVec,
}

impl CoordinatorMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("cosign".to_string()), None)?;

        let signatures_applied =
            IntCounter::new("signatures_applied_total", "Partial signatures applied")?;
        let duplicate_signatures = IntCounter::new(
            "duplicate_signatures_total",
            "Signatures ignored because the signer had already signed",
        )?;
        let co_sign_requests =
            IntCounter::new("co_sign_requests_total", "Server key co-sign requests issued")?;
        let broadcasts = IntCounterVec::new(
            Opts::new("broadcasts_total", "Broadcast attempts by outcome"),
            &["outcome"],
        )?;
        let reconciliations = IntCounterVec::new(
            Opts::new("reconciliations_total", "Reconciliation runs by entity kind and outcome"),
            &["kind", "outcome"],
        )?;
        let notifications = IntCounterVec::new(
            Opts::new("notifications_total", "Inbound notifications by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(signatures_applied.clone()))?;
        registry.register(Box::new(duplicate_signatures.clone()))?;
        registry.register(Box::new(co_sign_requests.clone()))?;
        registry.register(Box::new(broadcasts.clone()))?;
        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(notifications.clone()))?;

        debug!(metric_count = 6, "Registered session metrics");
        Ok(Self {
            registry,
            signatures_applied,
            duplicate_signatures,
            co_sign_requests,
            broadcasts,
            reconciliations,
            notifications,
        })
    }

    pub fn inc_signature_applied(&self) {
        self.signatures_applied.inc();
    }

    pub fn inc_duplicate_signature(&self) {
        self.duplicate_signatures.inc();
    }

    pub fn inc_co_sign_request(&self) {
        self.co_sign_requests.inc();
    }

    pub fn inc_broadcast(&self, outcome: BroadcastLabel) {
        self.broadcasts.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn inc_reconciliation(&self, kind: &str, outcome: &str) {
        self.reconciliations.with_label_values(&[kind, outcome]).inc();
    }

    pub fn inc_notification(&self, outcome: &str) {
        self.notifications.with_label_values(&[outcome]).inc();
    }

    pub fn signatures_applied(&self) -> u64 {
        self.signatures_applied.get()
    }

    pub fn duplicate_signatures(&self) -> u64 {
        self.duplicate_signatures.get()
    }

    pub fn co_sign_requests(&self) -> u64 {
        self.co_sign_requests.get()
    }

    pub fn broadcasts(&self, outcome: BroadcastLabel) -> u64 {
        self.broadcasts.with_label_values(&[outcome.as_str()]).get()
    }

    pub fn reconciliations(&self, kind: &str, outcome: &str) -> u64 {
        self.reconciliations.with_label_values(&[kind, outcome]).get()
    }

    pub fn notifications(&self, outcome: &str) -> u64 {
        self.notifications.with_label_values(&[outcome]).get()
    }

    /// Render every counter in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}

//! Async runner for collaborative multisig signing.
//!
//! The pure state machines (`cosign-transaction`, `cosign-broadcast`,
//! `cosign-sync`) decide; this crate performs the I/O they ask for.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SessionContext                           │
//! │                                                                 │
//! │  Notification ──▶ NotificationRouter ──▶ EventDedupGuard.admit  │
//! │                        │                                        │
//! │          ┌─────────────┴──────────────┐                         │
//! │          ▼                            ▼                         │
//! │  TransactionCoordinator          Reconciler                     │
//! │   ├─ TransactionStateMachine      ├─ PageAccumulator            │
//! │   ├─ BroadcastScheduler           ├─ reconcile_entities         │
//! │   └─ BroadcastTimers              └─ EntityStore.commit         │
//! │          │                            │                         │
//! │          ▼                            ▼                         │
//! │  SigningBackend / RemoteWalletService / EntityStore             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`SessionContext`] - Owns every component of one authenticated session
//! - [`TransactionCoordinator`] - Per-transaction serialization and action execution
//! - [`BroadcastTimers`] - Cancellable one-shot timers
//! - [`Reconciler`] - Fetch, diff and commit under a per-scope lock
//! - [`EventDedupGuard`] - Exactly-once notification admission
//! - [`NotificationRouter`] - Dispatch by notification kind
//! - [`SignerAdapter`] - Software, hardware card, collaborator and server keys
//! - [`CoordinatorMetrics`] - Prometheus counters
//! - [`telemetry`] - Tracing subscriber setup

pub mod config;
mod coordinator;
pub mod dedup;
pub mod error;
mod locks;
mod metrics;
mod reconciler;
mod router;
mod session;
mod signer;
mod store;
pub mod telemetry;
mod timers;
pub mod traits;

pub use config::{ConfigError, CoordinatorConfig};
pub use coordinator::{BroadcastOutcome, TransactionCoordinator};
pub use dedup::{DedupConfig, EventDedupGuard};
pub use error::{
    BackendError, CoordinatorError, RemoteError, SignerError, StoreError, SyncFailure,
};
pub use locks::{KeyedGuard, KeyedLocks};
pub use metrics::{BroadcastLabel, CoordinatorMetrics};
pub use reconciler::{EntityStores, ReconcileReport, Reconciler};
pub use router::{NotificationRouter, RouteOutcome};
pub use session::{Collaborators, SessionContext, SessionError};
pub use signer::{CollaboratorInbox, SignerAdapter};
pub use store::MemoryEntityStore;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, TelemetryError, TelemetryGuard};
pub use timers::BroadcastTimers;
pub use traits::{EntityStore, Page, RemoteWalletService, SigningBackend};

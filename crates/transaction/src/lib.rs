//! Signing state machine for multisig transactions.
//!
//! # Architecture
//!
//! ```text
//! SignerAdapter ──SignatureProof──▶ TransactionStateMachine.apply_signature
//!                                        │
//!                                        ├─ marks signer, replaces PSBT
//!                                        ├─ threshold met? → Action::ThresholdReached
//!                                        └─ SignedCountWatcher → Action::RequestCoSign
//!
//! Remote snapshot ───────────────▶ TransactionStateMachine.refresh_from_remote
//!                                        │
//!                                        └─ version / optimistic-state checks
//! ```
//!
//! # Components
//!
//! - [`TransactionStateMachine`] - Per-transaction signing state
//! - [`SignedCountWatcher`] - Forward-only signed-count observer
//! - [`Transition`] - Status plus actions returned by every accepted input

mod error;
mod state;
mod watcher;

pub use error::{CancelError, RefreshError, SignError, TransitionError};
pub use state::{TransactionStateMachine, Transition};
pub use watcher::SignedCountWatcher;

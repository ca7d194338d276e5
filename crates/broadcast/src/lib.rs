//! Broadcast scheduling for fully-signed transactions.
//!
//! Server-assisted wallets may carry a policy-imposed earliest broadcast
//! time. The [`BroadcastScheduler`] turns a ready transaction plus its
//! server record into either an immediate [`Action::Broadcast`] or a
//! generation-tagged one-shot timer, and guarantees at most one armed timer
//! per transaction.
//!
//! [`Action::Broadcast`]: cosign_core::Action::Broadcast

mod config;
mod scheduler;

pub use config::BroadcastConfig;
pub use scheduler::{BroadcastDecision, BroadcastScheduler, ScheduleError};

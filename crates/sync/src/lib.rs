//! Diff-based reconciliation of remote wallet metadata.
//!
//! The remote service only exposes list endpoints, so the local cache is
//! kept consistent by diffing each fetched list against the cached entities
//! of the same scope:
//!
//! ```text
//! remote pages ──▶ PageAccumulator ──▶ full remote list ─┐
//!                                                        ├─▶ reconcile ──▶ Diff { insert, update, delete }
//! local cache (same ScopeKey) ───────────────────────────┘                        │
//!                                                                                 ▼
//!                                                                  one atomic commit
//! ```
//!
//! This crate is pure. Fetching, locking and committing happen in the
//! production runner.
//!
//! # Components
//!
//! - [`reconcile`] / [`reconcile_entities`] - Three-way diff
//! - [`Reconcilable`] - Per-kind key, merge and tombstone policy
//! - [`PageAccumulator`] - Offset pagination
//! - [`ScopeKey`] - Query scope of one run
//! - [`SyncConfig`] - Page size and limits

mod config;
mod diff;
mod entity;
mod pagination;

pub use config::SyncConfig;
pub use diff::{reconcile, reconcile_entities, Diff};
pub use entity::{EntityKind, Reconcilable, ScopeKey};
pub use pagination::{PageAccumulator, PaginationError};

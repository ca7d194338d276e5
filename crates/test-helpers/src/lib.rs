//! Test helpers for cosign.
//!
//! - [`fixtures`] - Deterministic wallets, transactions, signatures and entities
//! - [`fakes`] - In-memory remote wallet service and signing backend with
//!   failure injection

pub mod fakes;
pub mod fixtures;

pub use fakes::{FakeBackend, FakeRemote};

//! Core types for the cosigning state machines.
//!
//! - [`Action`]: outbound effects returned by the pure state machines
//! - [`TimerId`]: generation-tagged one-shot timers
//! - [`Notification`]: inbound push events, as a tagged union
//! - [`StateMachine`] and [`Clock`]: time injection

mod action;
mod notification;
mod traits;

pub use action::{Action, TimerId};
pub use notification::{Notification, NotificationKind};
pub use traits::{Clock, ManualClock, StateMachine, SystemClock};

//! Aggregate ports (LAGs).
//!
//! The control-plane side ([`LagManager`], one [`LagController`] per group)
//! reacts to forwarding-state transitions of each subport. The link-event
//! side ([`LinkEventHandler`]) shrinks a group straight in hardware when a
//! member's link drops, without going through the controller. The two meet
//! only in [`LagStats`] and in the driver, where a remove that lost the race
//! reports not-found and is treated as success.

mod controller;
mod link_event;
mod manager;
mod stats;
mod types;

pub use controller::LagController;
pub use link_event::{LinkDownOutcome, LinkEvent, LinkEventHandler};
pub use manager::LagManager;
pub use stats::{GroupCounters, LagStats};
pub use types::{AggregatePort, ForwardingState, MemberState, Subport};

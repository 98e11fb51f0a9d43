//! Next-hop groups and their dependency-driven memberships.
//!
//! A group is shared by every route with the same next-hop set. Each of its
//! next hops is a membership that exists in hardware only while the next
//! hop's neighbor is resolved; neighbor flips create and destroy the member
//! objects without touching the group.
//!
//! Next hops come in two flavors, plain IP and MPLS (with a label stack).
//! Both run through the same generic [`NextHopMembership`]; the
//! [`MemberSubscriber`] facade picks the flavor per next hop.

mod manager;
mod subscriber;
mod types;

pub use manager::{NextHopEnv, NextHopGroupManager, NhgManagerStats};
pub use subscriber::{
    IpNextHop, MemberSubscriber, MplsNextHop, NextHopFlavor, NextHopMembership, NextHopRegistries,
};
pub use types::{MemberKey, MplsNextHopKey, NextHopSet, ResolvedNextHop};

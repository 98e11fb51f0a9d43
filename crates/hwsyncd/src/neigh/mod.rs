//! Neighbor resolution state, the dependency feed for next-hop groups.
//!
//! Updates arrive at least once and may repeat; [`NeighborTable`] turns them
//! into [`DependencyEvent`]s that fire only when a neighbor actually flips
//! between resolved and unresolved.

mod table;
mod types;

pub use table::{NeighborTable, NeighborTableStats};
pub use types::{DependencyEvent, NeighborKey, NeighborUpdate};

//! Hardware sync agent.
//!
//! Keeps the forwarding ASIC in line with the control plane's intent:
//!
//! ```text
//! [control plane] ──updates──> [SwitchAgent] ──> [SaiDriver] ──> [ASIC]
//!                                                     ^
//! [link monitor] ──link down──> [LinkEventHandler] ───┘
//! ```
//!
//! # Key Components
//!
//! - [`nhg`]: next-hop groups whose members follow neighbor resolution
//! - [`lag`]: link aggregation groups and the link-down fast path
//! - [`route`]: per-client routes programmed in batches
//! - [`fdb`]: static MAC entries
//! - [`daemon`]: the agent that ties them together and its run loop
//!
//! Every hardware object is owned through a
//! [`sonic_orch_common::ObjectRegistry`], so a warm restart adopts what a
//! previous instance left behind instead of recreating it.

pub mod audit;
pub mod config;
pub mod daemon;
pub mod fdb;
pub mod lag;
pub mod neigh;
pub mod nhg;
pub mod ports;
pub mod route;

pub use config::{AgentConfig, LogFormat};
pub use daemon::{run, ControlPlaneUpdate, DesiredState, SwitchAgent};

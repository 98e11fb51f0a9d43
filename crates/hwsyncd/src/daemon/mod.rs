//! The control-plane daemon.
//!
//! [`SwitchAgent`] wires every manager around one driver and applies
//! [`ControlPlaneUpdate`]s one at a time. [`run`] drives it from a channel
//! while a second task feeds link events to the fast path.

mod agent;
mod runner;
mod state;

pub use agent::{AgentStats, AgentSummary, StartReport, SwitchAgent, WARM_BOOT_OBJECT_TYPES};
pub use runner::run;
pub use state::{ControlPlaneUpdate, DesiredState, InterfaceSpec, PortSpec, RouteSpec};

//! Route programming.
//!
//! Route producers queue adds and deletes per `(router, client)` in a
//! [`RouteUpdater`]; one `program()` call flushes everything queued to the
//! [`RouteTable`] through the backend chosen at startup.

mod backend;
mod table;
mod types;
mod updater;

pub use backend::RibBackend;
pub use table::{RouteContext, RouteStats, RouteTable};
pub use types::{AddDelRoutes, ProgramReport, RouteFailure, RouteNextHopEntry};
pub use updater::RouteUpdater;

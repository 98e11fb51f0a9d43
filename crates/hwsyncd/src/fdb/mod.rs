//! MAC (FDB) entries.

mod manager;
mod types;

pub use manager::{FdbError, FdbManager, FdbStats};
pub use types::{FdbKey, MacEntry};
